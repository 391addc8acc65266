use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    pub confidence_level: f64,
    /// À partir de cette taille d'échantillon, le quantile normal remplace Student-t.
    pub normal_approximation_threshold: usize,
    /// Hypothèse nulle quand l'indicateur ne déclare pas de valeur de référence.
    pub null_hypothesis: f64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            confidence_level: 0.95,
            normal_approximation_threshold: 30,
            null_hypothesis: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    pub train_ratio: f64,
    pub min_split_size: usize,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            train_ratio: 0.8,
            min_split_size: 30,
        }
    }
}

/// Seuils des trois critères et règle d'agrégation du niveau de risque.
///
/// Un indicateur est « fortement exposé » quand au moins `high_criteria_count`
/// critères se déclenchent (ou quand il n'est pas validable). Le risque est
/// HIGH si la part d'indicateurs fortement exposés dépasse
/// `high_indicator_fraction`, MEDIUM si la part d'indicateurs avec au moins un
/// critère dépasse `medium_indicator_fraction`, LOW sinon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverfittingConfig {
    pub degradation_threshold: f64,
    pub cv_threshold: f64,
    pub significance_threshold: f64,
    pub high_criteria_count: usize,
    pub high_indicator_fraction: f64,
    pub medium_indicator_fraction: f64,
    pub performance_degradation_threshold: f64,
}

impl Default for OverfittingConfig {
    fn default() -> Self {
        Self {
            degradation_threshold: 0.25,
            cv_threshold: 0.5,
            significance_threshold: 0.05,
            high_criteria_count: 2,
            high_indicator_fraction: 0.5,
            medium_indicator_fraction: 0.0,
            performance_degradation_threshold: 0.25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub subset_size: usize,
    pub universe_size: usize,
    pub reference_window: usize,
    pub cv_window: usize,
    pub hit_threshold: usize,
    pub min_hit_rate: f64,
    pub min_correlation: f64,
    pub max_retries: usize,
    pub retry_penalty: f64,
    /// Tirages rejoués pas à pas pour la corrélation rétroactive du rapport.
    pub retro_window: usize,
    /// Paliers tronqués du classement, en plus de l'univers complet.
    pub tiers: Vec<usize>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            subset_size: 6,
            universe_size: 25,
            reference_window: 200,
            cv_window: 200,
            hit_threshold: 3,
            min_hit_rate: 0.10,
            min_correlation: 0.0,
            max_retries: 3,
            retry_penalty: 0.5,
            retro_window: 50,
            tiers: vec![20, 15, 10, 9],
        }
    }
}

impl SelectorConfig {
    /// Palier utilisé pour la validation croisée (le plus petit).
    pub fn primary_tier(&self) -> usize {
        self.tiers.iter().copied().min().unwrap_or(self.universe_size)
    }

    /// Tous les paliers, univers complet inclus, du plus grand au plus petit.
    pub fn all_tiers(&self) -> Vec<usize> {
        let mut tiers = self.tiers.clone();
        tiers.push(self.universe_size);
        tiers.sort_unstable_by(|a, b| b.cmp(a));
        tiers.dedup();
        tiers
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub enabled: bool,
    pub min_sum: u32,
    pub max_sum: u32,
    pub min_even: usize,
    pub max_even: usize,
    pub max_per_quadrant: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_sum: 120,
            max_sum: 250,
            min_even: 2,
            max_even: 4,
            max_per_quadrant: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub count: usize,
    pub seed: u64,
    pub max_attempts: usize,
    pub filters: FilterConfig,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            count: 100,
            seed: 42,
            max_attempts: 1000,
            filters: FilterConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub stats: StatsConfig,
    pub split: SplitConfig,
    pub overfitting: OverfittingConfig,
    pub selector: SelectorConfig,
    pub games: GameConfig,
    /// Indicateurs retenus ; `None` = tout le registre.
    pub indicators: Option<Vec<String>>,
}

fn invalid(msg: String) -> CoreError {
    CoreError::InvalidConfig(msg)
}

impl PipelineConfig {
    pub fn validate(&self) -> CoreResult<()> {
        let s = &self.stats;
        if !(s.confidence_level > 0.0 && s.confidence_level < 1.0) {
            return Err(invalid(format!(
                "confidence_level doit être dans ]0, 1[ (reçu {})",
                s.confidence_level
            )));
        }
        if s.normal_approximation_threshold < 2 {
            return Err(invalid("normal_approximation_threshold doit être ≥ 2".into()));
        }

        let sp = &self.split;
        if !(sp.train_ratio > 0.0 && sp.train_ratio < 1.0) {
            return Err(invalid(format!(
                "train_ratio doit être dans ]0, 1[ (reçu {})",
                sp.train_ratio
            )));
        }
        if sp.min_split_size < 2 {
            return Err(invalid("min_split_size doit être ≥ 2".into()));
        }

        let o = &self.overfitting;
        if o.degradation_threshold < 0.0
            || o.cv_threshold < 0.0
            || o.performance_degradation_threshold < 0.0
        {
            return Err(invalid("les seuils de dégradation et de CV doivent être ≥ 0".into()));
        }
        if !(0.0..=1.0).contains(&o.significance_threshold) {
            return Err(invalid("significance_threshold doit être dans [0, 1]".into()));
        }
        if !(1..=3).contains(&o.high_criteria_count) {
            return Err(invalid("high_criteria_count doit être entre 1 et 3".into()));
        }
        for (name, f) in [
            ("high_indicator_fraction", o.high_indicator_fraction),
            ("medium_indicator_fraction", o.medium_indicator_fraction),
        ] {
            if !(0.0..1.0).contains(&f) {
                return Err(invalid(format!("{name} doit être dans [0, 1[ (reçu {f})")));
            }
        }

        let sel = &self.selector;
        if !(5..=7).contains(&sel.subset_size) {
            return Err(invalid(format!(
                "subset_size doit être entre 5 et 7 (reçu {})",
                sel.subset_size
            )));
        }
        if sel.universe_size < 6 || sel.universe_size > megasena_db::models::POOL_SIZE as usize {
            return Err(invalid(format!(
                "universe_size doit être entre 6 et 60 (reçu {})",
                sel.universe_size
            )));
        }
        if sel.tiers.is_empty() {
            return Err(invalid("au moins un palier est requis".into()));
        }
        if let Some(&t) = sel.tiers.iter().find(|&&t| t < 6 || t > sel.universe_size) {
            return Err(invalid(format!(
                "palier TOP {t} hors de [6, {}]",
                sel.universe_size
            )));
        }
        if sel.reference_window == 0 || sel.cv_window == 0 || sel.retro_window == 0 {
            return Err(invalid(
                "reference_window, cv_window et retro_window doivent être > 0".into(),
            ));
        }
        if !(1..=6).contains(&sel.hit_threshold) {
            return Err(invalid("hit_threshold doit être entre 1 et 6".into()));
        }
        if !(0.0..=1.0).contains(&sel.min_hit_rate) || !(0.0..=1.0).contains(&sel.min_correlation) {
            return Err(invalid("min_hit_rate et min_correlation doivent être dans [0, 1]".into()));
        }
        if sel.retry_penalty < 0.0 {
            return Err(invalid("retry_penalty doit être ≥ 0".into()));
        }

        let g = &self.games;
        if g.count == 0 || g.max_attempts == 0 {
            return Err(invalid("games.count et games.max_attempts doivent être > 0".into()));
        }
        let f = &g.filters;
        if f.min_sum > f.max_sum || f.min_even > f.max_even || f.max_even > 6 {
            return Err(invalid("bornes des filtres incohérentes".into()));
        }

        if let Some(names) = &self.indicators {
            if names.is_empty() {
                return Err(invalid("la liste d'indicateurs est vide".into()));
            }
            let distinct: BTreeSet<&str> = names.iter().map(String::as_str).collect();
            if distinct.len() < sel.subset_size {
                return Err(invalid(format!(
                    "{} indicateurs distincts, subset_size en demande {}",
                    distinct.len(),
                    sel.subset_size
                )));
            }
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Impossible de lire {:?}", path))?;
    let config: PipelineConfig = serde_json::from_str(&json)
        .with_context(|| format!("Configuration JSON invalide dans {:?}", path))?;
    config.validate()?;
    Ok(config)
}

pub fn save_config(config: &PipelineConfig, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(path, json).with_context(|| format!("Impossible d'écrire {:?}", path))?;
    Ok(())
}
