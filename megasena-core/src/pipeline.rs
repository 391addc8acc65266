use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;

use crate::advisory::IndicatorAdvisor;
use crate::config::PipelineConfig;
use crate::correlation::RetroCorrelationReport;
use crate::error::{CoreError, CoreResult};
use crate::games::{Game, GameSet, all_combinations, generate_games};
use crate::history::History;
use crate::indicators::IndicatorRegistry;
use crate::overfitting::{OverfittingVerdict, RiskLevel, detect};
use crate::selector::ranker::{AdvisoryRanker, IndicatorRanker, StabilityRanker};
use crate::selector::walk_forward::walk_forward;
use crate::selector::{ConservativeSelector, UniverseSelection};
use crate::validation::{ValidationReport, validate};

/// Rapport complet du mode conservateur, sérialisé en JSON par la CLI.
#[derive(Debug, Clone, Serialize)]
pub struct ConservativeReport {
    pub generated_at: DateTime<Utc>,
    pub history_size: usize,
    pub last_sequence_id: Option<u32>,
    pub config: PipelineConfig,
    pub indicators: Vec<String>,
    pub validation: ValidationReport,
    pub verdict: OverfittingVerdict,
    /// Erreur non fatale ayant empêché la sélection (historique trop court...).
    pub selection: Result<UniverseSelection, CoreError>,
    /// Un lot par palier, du plus grand au plus petit.
    pub game_sets: Vec<GameSet>,
    pub top_combinations: Vec<Game>,
    /// Palier principal reconstruit avant chacun des `retro_window` derniers
    /// tirages avec les poids retenus, puis comparé au tirage réel.
    pub retro: Option<RetroCorrelationReport>,
}

impl ConservativeReport {
    pub fn selection(&self) -> Option<&UniverseSelection> {
        self.selection.as_ref().ok()
    }

    /// Risque effectif : élevé si la sélection a échoué.
    pub fn effective_risk(&self) -> RiskLevel {
        match &self.selection {
            Ok(_) => self.verdict.risk_level,
            Err(_) => RiskLevel::High,
        }
    }
}

/// Validation → verdict → sélection → jeux par palier → combinaisons du
/// palier principal → corrélation rétroactive pas à pas.
///
/// Seules les erreurs fatales (indicateur inconnu, configuration invalide)
/// interrompent le run ; un historique trop court donne un rapport sans
/// sélection et un risque élevé.
pub fn run_conservative(
    history: &History,
    registry: &IndicatorRegistry,
    config: &PipelineConfig,
    advisor: Option<&dyn IndicatorAdvisor>,
) -> CoreResult<ConservativeReport> {
    config.validate()?;
    let names = registry.resolve(config.indicators.as_deref())?;
    info!("Mode conservateur : {} indicateurs, {} tirages", names.len(), history.len());

    let validation = validate(history, registry, &names, config)?;
    let verdict = detect(&validation, &config.overfitting);
    info!("Risque de surapprentissage : {}", verdict.risk_level);

    let ranker: Box<dyn IndicatorRanker + '_> = match advisor {
        Some(a) => Box::new(AdvisoryRanker::new(a)),
        None => Box::new(StabilityRanker),
    };
    let selector = ConservativeSelector::new(history, registry, config);
    let selection = match selector.run(&validation, ranker.as_ref()) {
        Ok(s) => Ok(s),
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => {
            warn!("Sélection impossible : {e}");
            Err(e)
        }
    };

    let mut game_sets = Vec::new();
    let mut top_combinations = Vec::new();
    let mut retro = None;
    if let Ok(sel) = &selection {
        for tier in &sel.tiers {
            game_sets.push(generate_games(
                tier,
                &sel.universe,
                config.games.count,
                config.games.seed,
                &config.games,
            )?);
        }
        top_combinations = all_combinations(sel.primary_tier());
        retro = retro_correlation(history, registry, sel, config)?;
    }

    Ok(ConservativeReport {
        generated_at: Utc::now(),
        history_size: history.len(),
        last_sequence_id: history.last().map(|d| d.sequence_id),
        config: config.clone(),
        indicators: names,
        validation,
        verdict,
        selection,
        game_sets,
        top_combinations,
        retro,
    })
}

/// Rejeu pas à pas sur les derniers tirages postérieurs à une fenêtre de
/// référence complète : `min(retro_window, n - reference_window)`.
fn retro_correlation(
    history: &History,
    registry: &IndicatorRegistry,
    selection: &UniverseSelection,
    config: &PipelineConfig,
) -> CoreResult<Option<RetroCorrelationReport>> {
    let sel = &config.selector;
    let last_n = sel.retro_window.min(history.len().saturating_sub(sel.reference_window));
    if last_n == 0 {
        warn!(
            "Corrélation rétroactive ignorée : {} tirages, fenêtre de référence {}",
            history.len(),
            sel.reference_window
        );
        return Ok(None);
    }
    match walk_forward(history, registry, &selection.weights, config, last_n, None) {
        Ok(report) => Ok(Some(report)),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            warn!("Corrélation rétroactive impossible : {e}");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisory::StaticAdvisor;
    use crate::history::{make_biased_draws, make_regime_shift_draws, make_test_draws};
    use crate::indicators::default_registry;
    use crate::selector::SelectionStatus;

    #[test]
    fn test_conservative_run_on_biased_history() {
        let registry = default_registry();
        let history = History::new(make_biased_draws(260, 42)).unwrap();
        let report = run_conservative(&history, &registry, &PipelineConfig::default(), None).unwrap();

        let sel = report.selection().unwrap();
        assert_eq!(sel.status, SelectionStatus::Accepted);
        assert_eq!(sel.primary_tier().sorted_numbers(), (1..=9).collect::<Vec<u8>>());
        assert_eq!(report.game_sets.len(), 5);
        assert_eq!(report.game_sets[0].tier_size, 25);
        assert_eq!(report.game_sets[4].games.len(), 84);
        assert_eq!(report.top_combinations.len(), 84);
        assert_eq!(report.last_sequence_id, Some(260));

        let retro = report.retro.as_ref().unwrap();
        assert_eq!(retro.tier_size, 9);
        assert_eq!(retro.window_size, 50);
        assert!(retro.hit_rate > 0.9);

        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"top_combinations\""));
    }

    #[test]
    fn test_retro_is_replayed_walk_forward_after_failed_cross_validation() {
        let registry = default_registry();
        let history = History::new(make_regime_shift_draws(60, 200, 42)).unwrap();
        let config = PipelineConfig::default();
        let report = run_conservative(&history, &registry, &config, None).unwrap();

        let sel = report.selection().unwrap();
        assert!(matches!(sel.status, SelectionStatus::RetryExhausted { .. }));
        assert!(!sel.cross_validation.passed);

        // univers reconstruits avant chacun des 50 derniers tirages, jamais sur la fenêtre rejouée
        let retro = report.retro.as_ref().unwrap();
        assert_eq!(retro.window_size, 50);
        let expected = walk_forward(&history, &registry, &sel.weights, &config, 50, None).unwrap();
        assert_eq!(retro, &expected);
        assert!(retro.best_draw.as_ref().unwrap().sequence_id > 210);
        assert!(retro.worst_draw.as_ref().unwrap().sequence_id > 210);
    }

    #[test]
    fn test_retro_window_is_configurable_and_clamped() {
        let registry = default_registry();
        let history = History::new(make_biased_draws(230, 42)).unwrap();
        let mut config = PipelineConfig::default();
        config.selector.retro_window = 80;
        let report = run_conservative(&history, &registry, &config, None).unwrap();
        assert_eq!(report.retro.as_ref().unwrap().window_size, 30);

        config.selector.retro_window = 10;
        let report = run_conservative(&history, &registry, &config, None).unwrap();
        assert_eq!(report.retro.as_ref().unwrap().window_size, 10);
    }

    #[test]
    fn test_short_history_yields_high_risk_without_selection() {
        let registry = default_registry();
        let history = History::new(make_test_draws(40)).unwrap();
        let report = run_conservative(&history, &registry, &PipelineConfig::default(), None).unwrap();
        assert!(report.selection().is_none());
        assert_eq!(report.verdict.risk_level, RiskLevel::High);
        assert_eq!(report.effective_risk(), RiskLevel::High);
        assert!(report.game_sets.is_empty());
        assert!(report.retro.is_none());
    }

    #[test]
    fn test_unknown_indicator_is_fatal() {
        let registry = default_registry();
        let history = History::new(make_biased_draws(260, 42)).unwrap();
        let config = PipelineConfig {
            indicators: Some(
                ["sum", "parity", "primes", "decades", "frequency", "numerology"]
                    .map(String::from)
                    .to_vec(),
            ),
            ..PipelineConfig::default()
        };
        let result = run_conservative(&history, &registry, &config, None);
        assert_eq!(result.unwrap_err(), CoreError::UnknownIndicator("numerology".into()));
    }

    #[test]
    fn test_advisor_candidates_are_reported() {
        let registry = default_registry();
        let history = History::new(make_biased_draws(260, 42)).unwrap();
        let advisor = StaticAdvisor::new(vec!["frequency".into(), "decades".into()]);
        let report = run_conservative(&history, &registry, &PipelineConfig::default(), Some(&advisor)).unwrap();
        let sel = report.selection().unwrap();
        assert!(sel.ranking_source.starts_with("conseil"));
        assert_eq!(sel.indicators.len(), PipelineConfig::default().selector.subset_size);
        let mut advised: Vec<&str> = sel.indicators[..2].iter().map(|r| r.name.as_str()).collect();
        advised.sort();
        assert_eq!(advised, vec!["decades", "frequency"]);
    }

    #[test]
    fn test_too_few_indicators_is_rejected() {
        let registry = default_registry();
        let history = History::new(make_biased_draws(260, 42)).unwrap();
        let config = PipelineConfig {
            indicators: Some(vec!["sum".into(), "parity".into()]),
            ..PipelineConfig::default()
        };
        let result = run_conservative(&history, &registry, &config, None);
        assert!(matches!(result, Err(CoreError::InvalidConfig(_))));
    }

    #[test]
    fn test_run_is_deterministic() {
        let registry = default_registry();
        let history = History::new(make_biased_draws(260, 9)).unwrap();
        let config = PipelineConfig::default();
        let a = run_conservative(&history, &registry, &config, None).unwrap();
        let b = run_conservative(&history, &registry, &config, None).unwrap();
        assert_eq!(a.selection, b.selection);
        assert_eq!(a.game_sets, b.game_sets);
    }
}
