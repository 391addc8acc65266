pub mod catalogue;

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use megasena_db::models::{Draw, POOL_SIZE};

use crate::config::StatsConfig;
use crate::error::{CoreError, CoreResult};
use crate::stats::{ConfidenceMetric, summarize};

/// Caractéristique statistique nommée, pure et sans état.
///
/// Les fenêtres sont ordonnées du plus ancien au plus récent.
pub trait Indicator: Send + Sync {
    fn name(&self) -> &str;

    /// Nombre de tirages précédents nécessaires pour évaluer un tirage.
    fn context_len(&self) -> usize {
        0
    }

    /// Valeur de l'indicateur pour `draw`, `context` contenant exactement les
    /// `context_len()` tirages qui le précèdent.
    fn draw_value(&self, context: &[Draw], draw: &Draw) -> f64;

    /// Score positif d'un numéro candidat sur une fenêtre de référence.
    /// Lift par rapport à l'attente uniforme : 1.0 est neutre (et vaut pour une fenêtre vide).
    fn number_score(&self, number: u8, window: &[Draw]) -> f64;

    /// Espérance de `draw_value` sous tirages uniformes, si elle est connue.
    fn baseline(&self) -> Option<f64> {
        None
    }
}

/// Valeurs d'un indicateur sur une fenêtre, dans l'ordre chronologique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub indicator: String,
    pub values: Vec<f64>,
}

impl Sample {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Registre nom → indicateur. L'ordre d'itération est celui des noms.
#[derive(Default)]
pub struct IndicatorRegistry {
    indicators: BTreeMap<String, Box<dyn Indicator>>,
}

impl IndicatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, indicator: Box<dyn Indicator>) -> CoreResult<()> {
        let name = indicator.name().to_string();
        if self.indicators.contains_key(&name) {
            return Err(CoreError::InvalidConfig(format!(
                "indicateur déjà enregistré : {name}"
            )));
        }
        self.indicators.insert(name, indicator);
        Ok(())
    }

    pub fn get(&self, name: &str) -> CoreResult<&dyn Indicator> {
        self.indicators
            .get(name)
            .map(|b| b.as_ref())
            .ok_or_else(|| CoreError::UnknownIndicator(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        self.indicators.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.indicators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indicators.is_empty()
    }

    /// Résout une liste de noms (ou tout le registre), triée et sans doublon.
    /// Le premier nom inconnu fait échouer la résolution.
    pub fn resolve(&self, names: Option<&[String]>) -> CoreResult<Vec<String>> {
        let Some(names) = names else {
            return Ok(self.names());
        };
        let mut resolved = Vec::with_capacity(names.len());
        for name in names {
            self.get(name)?;
            resolved.push(name.clone());
        }
        resolved.sort();
        resolved.dedup();
        Ok(resolved)
    }

    /// Applique un indicateur à chaque tirage de `window` disposant de son contexte complet.
    pub fn evaluate(&self, name: &str, window: &[Draw]) -> CoreResult<Sample> {
        let indicator = self.get(name)?;
        let ctx = indicator.context_len();
        if window.len() < ctx + 1 {
            return Err(CoreError::InsufficientWindow {
                indicator: name.to_string(),
                required: ctx + 1,
                actual: window.len(),
            });
        }
        let values = (ctx..window.len())
            .map(|i| indicator.draw_value(&window[i - ctx..i], &window[i]))
            .collect();
        Ok(Sample {
            indicator: name.to_string(),
            values,
        })
    }

    /// Évalue plusieurs indicateurs en parallèle ; résultats dans l'ordre de `names`.
    pub fn evaluate_all(&self, names: &[String], window: &[Draw]) -> Vec<CoreResult<Sample>> {
        names
            .par_iter()
            .map(|name| self.evaluate(name, window))
            .collect()
    }

    /// Métrique de confiance de chaque indicateur sur `window`, testée contre
    /// sa valeur attendue sous tirage uniforme.
    pub fn confidence_metrics(
        &self,
        names: &[String],
        window: &[Draw],
        config: &StatsConfig,
    ) -> Vec<(String, CoreResult<ConfidenceMetric>)> {
        names
            .iter()
            .zip(self.evaluate_all(names, window))
            .map(|(name, sample)| {
                let metric = sample.and_then(|s| {
                    let baseline = self.get(name)?.baseline();
                    summarize(&s.values, config, baseline)
                });
                (name.clone(), metric)
            })
            .collect()
    }

    /// Scores des numéros 1..=60 (index 0 = numéro 1).
    pub fn number_scores(&self, name: &str, window: &[Draw]) -> CoreResult<Vec<f64>> {
        let indicator = self.get(name)?;
        Ok((1..=POOL_SIZE)
            .map(|n| indicator.number_score(n, window))
            .collect())
    }
}

pub fn default_registry() -> IndicatorRegistry {
    let mut registry = IndicatorRegistry::new();
    for indicator in catalogue::all_indicators() {
        if let Err(e) = registry.register(indicator) {
            log::warn!("{e}");
        }
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::make_test_draws;

    #[test]
    fn test_default_registry_names_sorted() {
        let registry = default_registry();
        assert_eq!(
            registry.names(),
            vec![
                "decades",
                "delay",
                "fibonacci",
                "frequency",
                "multiples_of_3",
                "multiples_of_5",
                "parity",
                "primes",
                "quadrants",
                "recency",
                "sum",
                "symmetry",
            ]
        );
    }

    #[test]
    fn test_unknown_indicator() {
        let registry = default_registry();
        let draws = make_test_draws(10);
        assert_eq!(
            registry.evaluate("astrology", &draws),
            Err(CoreError::UnknownIndicator("astrology".into()))
        );
        assert!(registry.get("astrology").is_err());
    }

    #[test]
    fn test_resolve_eager() {
        let registry = default_registry();
        let names = vec!["sum".to_string(), "parity".to_string(), "sum".to_string()];
        assert_eq!(registry.resolve(Some(&names)).unwrap(), vec!["parity", "sum"]);

        let bad = vec!["sum".to_string(), "nope".to_string()];
        assert_eq!(
            registry.resolve(Some(&bad)),
            Err(CoreError::UnknownIndicator("nope".into()))
        );
        assert_eq!(registry.resolve(None).unwrap().len(), 12);
    }

    #[test]
    fn test_register_duplicate_rejected() {
        let mut registry = default_registry();
        let dup = catalogue::all_indicators().into_iter().next().unwrap();
        assert!(matches!(registry.register(dup), Err(CoreError::InvalidConfig(_))));
    }

    #[test]
    fn test_evaluate_context_free() {
        let registry = default_registry();
        let draws = make_test_draws(5);
        let sample = registry.evaluate("sum", &draws).unwrap();
        assert_eq!(sample.len(), 5);
        let expected: f64 = draws[0].numbers.iter().map(|&n| n as f64).sum();
        assert_eq!(sample.values[0], expected);
    }

    #[test]
    fn test_evaluate_insufficient_window() {
        let registry = default_registry();
        let draws = make_test_draws(5);
        assert!(matches!(
            registry.evaluate("recency", &draws),
            Err(CoreError::InsufficientWindow { required: 11, actual: 5, .. })
        ));
        assert!(registry.evaluate("sum", &[]).is_err());
    }

    #[test]
    fn test_evaluate_with_context() {
        let registry = default_registry();
        let draws = make_test_draws(15);
        let sample = registry.evaluate("recency", &draws).unwrap();
        assert_eq!(sample.len(), 5);
    }

    #[test]
    fn test_evaluate_all_order_and_determinism() {
        let registry = default_registry();
        let draws = make_test_draws(80);
        let names = registry.names();
        let first = registry.evaluate_all(&names, &draws);
        let second = registry.evaluate_all(&names, &draws);
        assert_eq!(first, second);
        for (name, result) in names.iter().zip(&first) {
            assert_eq!(&result.as_ref().unwrap().indicator, name);
        }
    }

    #[test]
    fn test_number_scores_shape() {
        let registry = default_registry();
        let draws = make_test_draws(60);
        for name in registry.names() {
            let scores = registry.number_scores(&name, &draws).unwrap();
            assert_eq!(scores.len(), 60);
            assert!(scores.iter().all(|s| s.is_finite() && *s >= 0.0), "{name}");
        }
    }

    #[test]
    fn test_confidence_metrics_per_indicator() {
        let registry = default_registry();
        let draws = make_test_draws(80);
        let names = vec!["parity".to_string(), "sum".to_string()];
        let metrics = registry.confidence_metrics(&names, &draws, &StatsConfig::default());
        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics[0].0, "parity");
        let parity = metrics[0].1.as_ref().unwrap();
        assert_eq!(parity.n, 80);
        assert_eq!(parity.null_hypothesis, 3.0);
        assert!(parity.ci_lower <= parity.mean && parity.mean <= parity.ci_upper);

        let short = registry.confidence_metrics(&names, &draws[..1], &StatsConfig::default());
        assert!(matches!(short[0].1, Err(CoreError::InsufficientSample { n: 1 })));
    }
}
