use log::{debug, info, warn};
use rayon::prelude::*;
use serde::Serialize;

use megasena_db::models::Draw;

use crate::config::PipelineConfig;
use crate::correlation::{RetroCorrelationReport, correlate};
use crate::error::{CoreError, CoreResult};
use crate::history::History;
use crate::indicators::{IndicatorRegistry, Sample};
use crate::stats::{ConfidenceMetric, SampleComparison, compare_samples, summarize};
use crate::universe::{IndicatorWeight, build_universe, normalize_weights};

/// Partition chronologique : `train` précède toujours `test`.
#[derive(Debug, Clone, Copy)]
pub struct Split<'a> {
    pub train: &'a [Draw],
    pub test: &'a [Draw],
}

impl Split<'_> {
    pub fn check_size(&self, min_split_size: usize) -> CoreResult<()> {
        if self.train.len() < min_split_size || self.test.len() < min_split_size {
            return Err(CoreError::SplitTooSmall {
                train: self.train.len(),
                test: self.test.len(),
                min: min_split_size,
            });
        }
        Ok(())
    }
}

/// Les `floor(n * train_ratio)` premiers tirages en train, le reste en test.
pub fn split_history(draws: &[Draw], train_ratio: f64) -> Split<'_> {
    let n_train = ((draws.len() as f64 * train_ratio).floor() as usize).min(draws.len());
    let (train, test) = draws.split_at(n_train);
    Split { train, test }
}

/// (train - test) / train ; `None` si la moyenne train est nulle.
pub fn degradation(train_mean: f64, test_mean: f64) -> Option<f64> {
    if train_mean == 0.0 {
        None
    } else {
        Some((train_mean - test_mean) / train_mean)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorValidation {
    pub name: String,
    pub train: Result<ConfidenceMetric, CoreError>,
    pub test: Result<ConfidenceMetric, CoreError>,
    pub degradation: Option<f64>,
    pub comparison: Option<SampleComparison>,
}

impl IndicatorValidation {
    fn failed(name: &str, error: CoreError) -> Self {
        Self {
            name: name.to_string(),
            train: Err(error.clone()),
            test: Err(error),
            degradation: None,
            comparison: None,
        }
    }

    /// Première erreur rencontrée, le cas échéant.
    pub fn error(&self) -> Option<&CoreError> {
        self.train.as_ref().err().or(self.test.as_ref().err())
    }

    /// Plus grand CV entre train et test, si les deux sont définis.
    pub fn max_cv(&self) -> Option<f64> {
        let train = self.train.as_ref().ok()?.coefficient_of_variation?;
        let test = self.test.as_ref().ok()?.coefficient_of_variation?;
        Some(train.max(test))
    }
}

/// Palier construit sur `train` seul, rejoué sur la fin de `train` puis sur `test`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HoldoutReplay {
    pub tier: Vec<u8>,
    pub in_sample: RetroCorrelationReport,
    pub out_of_sample: RetroCorrelationReport,
    pub hit_rate_degradation: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub train_size: usize,
    pub test_size: usize,
    pub train_ratio: f64,
    pub train_last_id: Option<u32>,
    pub test_first_id: Option<u32>,
    pub indicators: Vec<IndicatorValidation>,
    pub holdout: Option<HoldoutReplay>,
}

impl ValidationReport {
    pub fn get(&self, name: &str) -> Option<&IndicatorValidation> {
        self.indicators.iter().find(|v| v.name == name)
    }
}

fn validate_indicator(
    registry: &IndicatorRegistry,
    name: &str,
    split: &Split<'_>,
    config: &PipelineConfig,
) -> CoreResult<IndicatorValidation> {
    let indicator = registry.get(name)?;
    let baseline = indicator.baseline();
    let ctx = indicator.context_len();

    let train_sample = registry.evaluate(name, split.train);
    // Les valeurs test peuvent s'appuyer sur les derniers tirages train comme contexte
    let test_start = split.train.len().saturating_sub(ctx);
    let full = [split.train, split.test].concat();
    let test_sample = registry.evaluate(name, &full[test_start..]);

    let summarize_sample = |sample: &CoreResult<Sample>| {
        sample
            .as_ref()
            .map_err(|e| e.clone())
            .and_then(|s| summarize(&s.values, &config.stats, baseline))
    };
    let train = summarize_sample(&train_sample);
    let test = summarize_sample(&test_sample);

    let degradation = match (&train, &test) {
        (Ok(tr), Ok(te)) => degradation(tr.mean, te.mean),
        _ => None,
    };
    let comparison = match (&train_sample, &test_sample) {
        (Ok(a), Ok(b)) => compare_samples(&a.values, &b.values, &config.stats).ok(),
        _ => None,
    };

    debug!(
        "{name}: train {:?}, test {:?}, dégradation {:?}",
        train.as_ref().map(|m| m.mean),
        test.as_ref().map(|m| m.mean),
        degradation
    );

    Ok(IndicatorValidation {
        name: name.to_string(),
        train,
        test,
        degradation,
        comparison,
    })
}

fn holdout_replay(
    registry: &IndicatorRegistry,
    names: &[String],
    split: &Split<'_>,
    config: &PipelineConfig,
) -> CoreResult<HoldoutReplay> {
    let sel = &config.selector;
    let mut weights: Vec<IndicatorWeight> = names
        .iter()
        .map(|n| IndicatorWeight {
            name: n.clone(),
            weight: 1.0,
        })
        .collect();
    normalize_weights(&mut weights);

    let reference = &split.train[split.train.len().saturating_sub(sel.reference_window)..];
    let universe = build_universe(registry, &weights, reference, sel.universe_size)?;
    let tier = universe.tier(sel.primary_tier()).numbers;

    let trailing = &split.train[split.train.len().saturating_sub(split.test.len())..];
    let in_sample = correlate(&tier, trailing, sel.hit_threshold);
    let out_of_sample = correlate(&tier, split.test, sel.hit_threshold);
    let hit_rate_degradation = degradation(in_sample.hit_rate, out_of_sample.hit_rate);

    Ok(HoldoutReplay {
        tier,
        in_sample,
        out_of_sample,
        hit_rate_degradation,
    })
}

/// Découpe l'historique et recalcule les métriques de chaque indicateur sur
/// train et test. Seuls les indicateurs inconnus interrompent la validation ;
/// une partition trop petite est consignée sur chaque indicateur.
pub fn validate(
    history: &History,
    registry: &IndicatorRegistry,
    names: &[String],
    config: &PipelineConfig,
) -> CoreResult<ValidationReport> {
    for name in names {
        registry.get(name)?;
    }

    let split = split_history(history.draws(), config.split.train_ratio);
    info!(
        "Validation train/test : {} tirages train, {} tirages test",
        split.train.len(),
        split.test.len()
    );

    let (indicators, holdout) = match split.check_size(config.split.min_split_size) {
        Err(e) => {
            warn!("{e}");
            let failed = names
                .iter()
                .map(|n| IndicatorValidation::failed(n, e.clone()))
                .collect();
            (failed, None)
        }
        Ok(()) => {
            let indicators = names
                .par_iter()
                .map(|n| validate_indicator(registry, n, &split, config))
                .collect::<CoreResult<Vec<_>>>()?;
            let holdout = holdout_replay(registry, names, &split, config)?;
            (indicators, Some(holdout))
        }
    };

    Ok(ValidationReport {
        train_size: split.train.len(),
        test_size: split.test.len(),
        train_ratio: config.split.train_ratio,
        train_last_id: split.train.last().map(|d| d.sequence_id),
        test_first_id: split.test.first().map(|d| d.sequence_id),
        indicators,
        holdout,
    })
}
