use std::collections::BTreeMap;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::advisory::IndicatorAdvisor;
use crate::universe::{IndicatorWeight, normalize_weights};
use crate::validation::{IndicatorValidation, ValidationReport};

/// Indicateur classé par stabilité (plus bas = plus stable).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedIndicator {
    pub name: String,
    pub stability: f64,
}

/// Pénalités accumulées au fil des tentatives, par indicateur.
pub type Penalties = BTreeMap<String, f64>;

pub trait IndicatorRanker {
    /// Origine du classement, pour les rapports.
    fn source(&self) -> String;

    fn rank(&self, validation: &ValidationReport, penalties: &Penalties) -> Vec<RankedIndicator>;
}

/// CV + |dégradation| + pénalité, `None` si l'indicateur n'est pas validable.
pub fn stability_score(v: &IndicatorValidation, penalties: &Penalties) -> Option<f64> {
    let cv = v.max_cv()?;
    let degradation = v.degradation?;
    let penalty = penalties.get(&v.name).copied().unwrap_or(0.0);
    Some(cv + degradation.abs() + penalty)
}

fn rank_candidates<'a>(
    candidates: impl Iterator<Item = &'a IndicatorValidation>,
    penalties: &Penalties,
) -> Vec<RankedIndicator> {
    let mut ranked: Vec<RankedIndicator> = candidates
        .filter_map(|v| {
            let score = stability_score(v, penalties);
            if score.is_none() {
                debug!("{} exclu du classement (non validable)", v.name);
            }
            score.map(|stability| RankedIndicator {
                name: v.name.clone(),
                stability,
            })
        })
        .collect();
    ranked.sort_by(|a, b| a.stability.total_cmp(&b.stability).then_with(|| a.name.cmp(&b.name)));
    ranked
}

/// Poids 1 / (1 + stabilité), normalisés.
pub fn weights_for(selected: &[RankedIndicator]) -> Vec<IndicatorWeight> {
    let mut weights: Vec<IndicatorWeight> = selected
        .iter()
        .map(|r| IndicatorWeight {
            name: r.name.clone(),
            weight: 1.0 / (1.0 + r.stability),
        })
        .collect();
    normalize_weights(&mut weights);
    weights
}

/// Classement interne sur l'historique de validation.
#[derive(Debug, Default, Clone, Copy)]
pub struct StabilityRanker;

impl IndicatorRanker for StabilityRanker {
    fn source(&self) -> String {
        "stabilité".to_string()
    }

    fn rank(&self, validation: &ValidationReport, penalties: &Penalties) -> Vec<RankedIndicator> {
        rank_candidates(validation.indicators.iter(), penalties)
    }
}

/// Candidats proposés par un conseiller externe, notés exactement comme en
/// interne, puis complétés par le classement interne pour que le sélecteur
/// dispose toujours d'un sous-ensemble complet. Retombe sur le classement
/// interne si le conseiller échoue ou ne propose rien d'exploitable.
pub struct AdvisoryRanker<'a> {
    advisor: &'a dyn IndicatorAdvisor,
    fallback: StabilityRanker,
}

impl<'a> AdvisoryRanker<'a> {
    pub fn new(advisor: &'a dyn IndicatorAdvisor) -> Self {
        Self {
            advisor,
            fallback: StabilityRanker,
        }
    }
}

impl IndicatorRanker for AdvisoryRanker<'_> {
    fn source(&self) -> String {
        format!("conseil ({})", self.advisor.source())
    }

    fn rank(&self, validation: &ValidationReport, penalties: &Penalties) -> Vec<RankedIndicator> {
        let available: Vec<String> = validation.indicators.iter().map(|v| v.name.clone()).collect();
        let suggested = match self.advisor.suggest(&available) {
            Ok(names) => names,
            Err(e) => {
                warn!("Conseiller {} indisponible : {e:#}", self.advisor.source());
                return self.fallback.rank(validation, penalties);
            }
        };

        let mut candidates: Vec<&IndicatorValidation> = Vec::new();
        for name in &suggested {
            match validation.get(name) {
                Some(v) if !candidates.iter().any(|c| c.name == *name) => candidates.push(v),
                Some(_) => {}
                None => warn!("Suggestion ignorée, indicateur inconnu : {name}"),
            }
        }

        let mut ranked = rank_candidates(candidates.into_iter(), penalties);
        let internal = self.fallback.rank(validation, penalties);
        if ranked.is_empty() {
            warn!("Aucune suggestion exploitable, classement interne utilisé");
            return internal;
        }
        let suggested_count = ranked.len();
        for r in internal {
            if !ranked.iter().any(|c| c.name == r.name) {
                ranked.push(r);
            }
        }
        debug!(
            "{suggested_count} candidats du conseiller, {} complétés par le classement interne",
            ranked.len() - suggested_count
        );
        ranked
    }
}
