use std::collections::BTreeSet;
use std::fmt;

use log::info;
use serde::{Deserialize, Serialize};

use crate::config::OverfittingConfig;
use crate::validation::{HoldoutReplay, IndicatorValidation, ValidationReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Niveau immédiatement supérieur, `High` reste `High`.
    pub fn escalate(self) -> RiskLevel {
        match self {
            RiskLevel::Low => RiskLevel::Medium,
            RiskLevel::Medium | RiskLevel::High => RiskLevel::High,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "FAIBLE"),
            RiskLevel::Medium => write!(f, "MOYEN"),
            RiskLevel::High => write!(f, "ÉLEVÉ"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Criterion {
    /// |dégradation train → test| au-delà du seuil.
    Degradation,
    /// Coefficient de variation au-delà du seuil.
    Consistency,
    /// p-value train au-delà du seuil de signification.
    Significance,
    /// Chute du taux de réussite du palier principal entre train et test.
    /// Évalué sur le rejeu hors échantillon, pas par indicateur.
    Performance,
}

impl Criterion {
    /// Critères évalués indicateur par indicateur.
    pub const ALL: [Criterion; 3] = [
        Criterion::Degradation,
        Criterion::Consistency,
        Criterion::Significance,
    ];

    fn recommendation(&self) -> &'static str {
        match self {
            Criterion::Degradation => {
                "Dégradation train/test : réduire le nombre d'indicateurs ou allonger la fenêtre d'entraînement."
            }
            Criterion::Consistency => {
                "Variabilité élevée : privilégier les indicateurs les plus stables ou lisser sur une fenêtre plus longue."
            }
            Criterion::Significance => {
                "Effet non significatif : l'indicateur ne se distingue pas du hasard, ne pas lui accorder de poids."
            }
            Criterion::Performance => {
                "Performance dégradée hors échantillon : l'univers ne reproduit pas ses résultats d'entraînement, réduire la sélection ou attendre de nouveaux tirages."
            }
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Criterion::Degradation => write!(f, "Dégradation"),
            Criterion::Consistency => write!(f, "Consistance"),
            Criterion::Significance => write!(f, "Signification"),
            Criterion::Performance => write!(f, "Performance"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorAssessment {
    pub name: String,
    pub triggered: BTreeSet<Criterion>,
    /// Raison pour laquelle l'indicateur n'a pas pu être validé.
    pub undetermined: Option<String>,
}

impl IndicatorAssessment {
    /// Nombre de critères retenus ; un indicateur non validable compte pour tous.
    pub fn criteria_count(&self) -> usize {
        if self.undetermined.is_some() {
            Criterion::ALL.len()
        } else {
            self.triggered.len()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverfittingVerdict {
    pub risk_level: RiskLevel,
    pub triggered_criteria: BTreeSet<Criterion>,
    pub recommendations: Vec<String>,
    pub assessments: Vec<IndicatorAssessment>,
}

pub fn assess_indicator(v: &IndicatorValidation, config: &OverfittingConfig) -> IndicatorAssessment {
    let undetermined = |reason: String| IndicatorAssessment {
        name: v.name.clone(),
        triggered: BTreeSet::new(),
        undetermined: Some(reason),
    };

    let train = match &v.train {
        Ok(m) => m,
        Err(e) => return undetermined(e.to_string()),
    };
    if let Err(e) = &v.test {
        return undetermined(e.to_string());
    }
    let Some(degradation) = v.degradation else {
        return undetermined("dégradation indéfinie (moyenne train nulle)".into());
    };
    let Some(cv) = v.max_cv() else {
        return undetermined("coefficient de variation indéfini (moyenne nulle)".into());
    };

    let mut triggered = BTreeSet::new();
    if degradation.abs() > config.degradation_threshold {
        triggered.insert(Criterion::Degradation);
    }
    if cv > config.cv_threshold {
        triggered.insert(Criterion::Consistency);
    }
    if train.p_value > config.significance_threshold {
        triggered.insert(Criterion::Significance);
    }

    IndicatorAssessment {
        name: v.name.clone(),
        triggered,
        undetermined: None,
    }
}

/// Règle d'agrégation sur les nombres de critères par indicateur.
/// Monotone : augmenter un compte ne fait jamais baisser le niveau.
pub fn aggregate_risk(criteria_counts: &[usize], config: &OverfittingConfig) -> RiskLevel {
    if criteria_counts.is_empty() {
        return RiskLevel::High;
    }
    let n = criteria_counts.len() as f64;
    let strongly = criteria_counts
        .iter()
        .filter(|&&c| c >= config.high_criteria_count)
        .count() as f64;
    let any = criteria_counts.iter().filter(|&&c| c >= 1).count() as f64;

    if strongly / n > config.high_indicator_fraction {
        RiskLevel::High
    } else if any / n > config.medium_indicator_fraction {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

fn headline(level: RiskLevel) -> &'static str {
    match level {
        RiskLevel::High => {
            "Risque ÉLEVÉ : résultats non fiables, ne pas utiliser l'univers sans revalidation."
        }
        RiskLevel::Medium => "Risque MOYEN : utiliser l'univers avec prudence et surveiller les prochains tirages.",
        RiskLevel::Low => "Risque FAIBLE : les indicateurs généralisent correctement sur la période test.",
    }
}

/// Dégradation du taux de réussite hors échantillon, si elle dépasse le seuil.
pub fn performance_degradation(holdout: &HoldoutReplay, config: &OverfittingConfig) -> Option<f64> {
    holdout
        .hit_rate_degradation
        .filter(|&d| d > config.performance_degradation_threshold)
}

/// Verdict multi-critères. Ne lève jamais d'erreur : un indicateur non
/// validable est compté comme fortement exposé. Une chute de performance du
/// rejeu hors échantillon relève le niveau d'un cran.
pub fn detect(report: &ValidationReport, config: &OverfittingConfig) -> OverfittingVerdict {
    let assessments: Vec<IndicatorAssessment> = report
        .indicators
        .iter()
        .map(|v| assess_indicator(v, config))
        .collect();

    let counts: Vec<usize> = assessments.iter().map(|a| a.criteria_count()).collect();
    let mut risk_level = aggregate_risk(&counts, config);

    let mut triggered_criteria: BTreeSet<Criterion> = assessments
        .iter()
        .flat_map(|a| a.triggered.iter().copied())
        .collect();

    let performance = report
        .holdout
        .as_ref()
        .and_then(|h| performance_degradation(h, config).map(|d| (h, d)));
    if performance.is_some() {
        triggered_criteria.insert(Criterion::Performance);
        risk_level = risk_level.escalate();
    }

    let mut recommendations = vec![headline(risk_level).to_string()];
    for criterion in &triggered_criteria {
        if let (Criterion::Performance, Some((h, d))) = (criterion, performance) {
            recommendations.push(format!(
                "{} (TOP {} : {:.1}% → {:.1}%, dégradation {:.1}% > {:.0}%)",
                criterion.recommendation(),
                h.tier.len(),
                h.in_sample.hit_rate * 100.0,
                h.out_of_sample.hit_rate * 100.0,
                d * 100.0,
                config.performance_degradation_threshold * 100.0
            ));
            continue;
        }
        let names: Vec<&str> = assessments
            .iter()
            .filter(|a| a.triggered.contains(criterion))
            .map(|a| a.name.as_str())
            .collect();
        recommendations.push(format!("{} ({})", criterion.recommendation(), names.join(", ")));
    }
    let undetermined: Vec<&str> = assessments
        .iter()
        .filter(|a| a.undetermined.is_some())
        .map(|a| a.name.as_str())
        .collect();
    if !undetermined.is_empty() {
        recommendations.push(format!(
            "Indicateurs non validables, traités comme à risque : {}. Élargir l'historique ou réduire la taille minimale de partition.",
            undetermined.join(", ")
        ));
    }
    if assessments.is_empty() {
        recommendations.push("Aucun indicateur évalué.".to_string());
    }

    info!(
        "Détection de sur-apprentissage : risque {} ({} indicateurs, critères {:?})",
        risk_level,
        assessments.len(),
        triggered_criteria
    );

    OverfittingVerdict {
        risk_level,
        triggered_criteria,
        recommendations,
        assessments,
    }
}
