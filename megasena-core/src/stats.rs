use std::fmt;

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal, StudentsT};

use crate::config::StatsConfig;
use crate::error::{CoreError, CoreResult};

/// Résumé statistique d'un échantillon avec intervalle de confiance et test t.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceMetric {
    pub n: usize,
    pub mean: f64,
    pub stddev: f64,
    pub confidence_level: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub margin_of_error: f64,
    /// `None` quand la moyenne est nulle.
    pub coefficient_of_variation: Option<f64>,
    pub null_hypothesis: f64,
    pub t_statistic: f64,
    pub p_value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Consistency {
    High,
    Medium,
    Low,
    Undefined,
}

impl fmt::Display for Consistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Consistency::High => write!(f, "Élevée"),
            Consistency::Medium => write!(f, "Moyenne"),
            Consistency::Low => write!(f, "Faible"),
            Consistency::Undefined => write!(f, "Indéfinie"),
        }
    }
}

impl ConfidenceMetric {
    pub fn width(&self) -> f64 {
        self.ci_upper - self.ci_lower
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.ci_lower && value <= self.ci_upper
    }

    pub fn consistency(&self) -> Consistency {
        match self.coefficient_of_variation {
            None => Consistency::Undefined,
            Some(cv) if cv < 0.10 => Consistency::High,
            Some(cv) if cv < 0.25 => Consistency::Medium,
            Some(_) => Consistency::Low,
        }
    }

    pub fn is_significant(&self, alpha: f64) -> bool {
        self.p_value < alpha
    }
}

impl fmt::Display for ConfidenceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.3} (IC {:.0}% : {:.3} – {:.3})",
            self.mean,
            self.confidence_level * 100.0,
            self.ci_lower,
            self.ci_upper
        )
    }
}

/// Test t de Welch entre deux échantillons (typiquement train et test).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleComparison {
    pub mean_difference: f64,
    pub t_statistic: f64,
    pub degrees_of_freedom: f64,
    pub p_value: f64,
    pub significant: bool,
}

fn distribution_error(e: impl fmt::Display) -> CoreError {
    CoreError::Distribution(e.to_string())
}

/// Loi de référence : normale au-delà du seuil, Student-t sinon.
enum Reference {
    Normal(Normal),
    Student(StudentsT),
}

impl Reference {
    fn new(df: f64, use_normal: bool) -> CoreResult<Self> {
        if use_normal {
            Ok(Reference::Normal(Normal::new(0.0, 1.0).map_err(distribution_error)?))
        } else {
            Ok(Reference::Student(
                StudentsT::new(0.0, 1.0, df).map_err(distribution_error)?,
            ))
        }
    }

    fn inverse_cdf(&self, p: f64) -> f64 {
        match self {
            Reference::Normal(d) => d.inverse_cdf(p),
            Reference::Student(d) => d.inverse_cdf(p),
        }
    }

    fn cdf(&self, x: f64) -> f64 {
        match self {
            Reference::Normal(d) => d.cdf(x),
            Reference::Student(d) => d.cdf(x),
        }
    }

    fn two_tailed_p(&self, t: f64) -> f64 {
        if t.is_infinite() {
            return 0.0;
        }
        (2.0 * (1.0 - self.cdf(t.abs()))).clamp(0.0, 1.0)
    }
}

/// Quantile bilatéral pour `confidence_level` à `df` degrés de liberté.
pub fn t_critical(confidence_level: f64, df: f64, use_normal: bool) -> CoreResult<f64> {
    let reference = Reference::new(df, use_normal)?;
    Ok(reference.inverse_cdf(1.0 - (1.0 - confidence_level) / 2.0))
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Variance d'échantillon (dénominateur n-1).
pub fn sample_variance(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (n - 1) as f64
}

/// t et p quand l'erreur standard est nulle : aucune dispersion, soit la
/// moyenne vaut exactement l'hypothèse, soit l'écart est infiniment significatif.
fn degenerate_test(diff: f64) -> (f64, f64) {
    if diff == 0.0 {
        (0.0, 1.0)
    } else {
        (diff.signum() * f64::INFINITY, 0.0)
    }
}

/// Calcule moyenne, écart-type, IC et test t à un échantillon contre
/// `null_hypothesis` (ou `config.null_hypothesis` si `None`).
pub fn summarize(
    values: &[f64],
    config: &StatsConfig,
    null_hypothesis: Option<f64>,
) -> CoreResult<ConfidenceMetric> {
    let n = values.len();
    if n < 2 {
        return Err(CoreError::InsufficientSample { n });
    }
    let null = null_hypothesis.unwrap_or(config.null_hypothesis);

    let m = mean(values);
    let stddev = sample_variance(values).sqrt();
    let df = (n - 1) as f64;
    let reference = Reference::new(df, n >= config.normal_approximation_threshold)?;

    let critical = reference.inverse_cdf(1.0 - (1.0 - config.confidence_level) / 2.0);
    let standard_error = stddev / (n as f64).sqrt();
    let margin_of_error = critical * standard_error;

    let coefficient_of_variation = if m == 0.0 {
        None
    } else {
        Some(stddev / m.abs())
    };

    let (t_statistic, p_value) = if standard_error == 0.0 {
        degenerate_test(m - null)
    } else {
        let t = (m - null) / standard_error;
        (t, reference.two_tailed_p(t))
    };

    Ok(ConfidenceMetric {
        n,
        mean: m,
        stddev,
        confidence_level: config.confidence_level,
        ci_lower: m - margin_of_error,
        ci_upper: m + margin_of_error,
        margin_of_error,
        coefficient_of_variation,
        null_hypothesis: null,
        t_statistic,
        p_value,
    })
}

/// Test t de Welch (variances inégales) : `a` contre `b`.
pub fn compare_samples(a: &[f64], b: &[f64], config: &StatsConfig) -> CoreResult<SampleComparison> {
    if a.len() < 2 {
        return Err(CoreError::InsufficientSample { n: a.len() });
    }
    if b.len() < 2 {
        return Err(CoreError::InsufficientSample { n: b.len() });
    }
    let (na, nb) = (a.len() as f64, b.len() as f64);
    let (va, vb) = (sample_variance(a) / na, sample_variance(b) / nb);
    let diff = mean(a) - mean(b);
    let alpha = 1.0 - config.confidence_level;

    let standard_error = (va + vb).sqrt();
    if standard_error == 0.0 {
        let (t, p) = degenerate_test(diff);
        return Ok(SampleComparison {
            mean_difference: diff,
            t_statistic: t,
            degrees_of_freedom: na + nb - 2.0,
            p_value: p,
            significant: p < alpha,
        });
    }

    // Welch-Satterthwaite
    let df = (va + vb).powi(2) / (va.powi(2) / (na - 1.0) + vb.powi(2) / (nb - 1.0));
    let reference = Reference::new(df, df >= config.normal_approximation_threshold as f64)?;
    let t = diff / standard_error;
    let p = reference.two_tailed_p(t);

    Ok(SampleComparison {
        mean_difference: diff,
        t_statistic: t,
        degrees_of_freedom: df,
        p_value: p,
        significant: p < alpha,
    })
}

/// Coefficient binomial C(n, k) en flottant.
pub fn binomial(n: u64, k: u64) -> f64 {
    if k > n {
        return 0.0;
    }
    let k = k.min(n - k);
    (0..k).fold(1.0, |acc, i| acc * (n - i) as f64 / (i + 1) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> StatsConfig {
        StatsConfig::default()
    }

    #[test]
    fn test_insufficient_sample() {
        assert_eq!(
            summarize(&[4.2], &cfg(), None),
            Err(CoreError::InsufficientSample { n: 1 })
        );
        assert!(summarize(&[], &cfg(), None).is_err());
    }

    #[test]
    fn test_basic_summary() {
        let m = summarize(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0], &cfg(), None).unwrap();
        assert_eq!(m.n, 8);
        assert!((m.mean - 5.0).abs() < 1e-12);
        // variance n-1 = 32 / 7
        assert!((m.stddev - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
        assert!(m.ci_lower <= m.mean && m.mean <= m.ci_upper);
        assert!((m.width() - 2.0 * m.margin_of_error).abs() < 1e-12);
        assert!(m.contains(5.0));
        assert!((m.coefficient_of_variation.unwrap() - m.stddev / 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_t_critical_values() {
        // t(0.975, 7) ≈ 2.3646
        let t = t_critical(0.95, 7.0, false).unwrap();
        assert!((t - 2.3646).abs() < 1e-3, "t = {t}");
        let z = t_critical(0.95, 100.0, true).unwrap();
        assert!((z - 1.95996).abs() < 1e-4, "z = {z}");
    }

    #[test]
    fn test_interval_contains_mean() {
        let samples: Vec<Vec<f64>> = vec![
            vec![1.0, 2.0],
            vec![-3.0, 10.0, 0.5],
            (0..50).map(|i| (i as f64 * 1.7).sin() * 10.0).collect(),
        ];
        for s in samples {
            let m = summarize(&s, &cfg(), None).unwrap();
            assert!(m.ci_lower <= m.mean && m.mean <= m.ci_upper);
        }
    }

    #[test]
    fn test_width_decreases_with_n() {
        // Alternance ±1 : variance quasi constante, n croissant (y compris au passage du seuil normal)
        let mut previous = f64::INFINITY;
        for n in [4usize, 8, 16, 28, 30, 32, 64, 128] {
            let values: Vec<f64> = (0..n).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
            let m = summarize(&values, &cfg(), None).unwrap();
            assert!(m.width() < previous, "n = {n}");
            previous = m.width();
        }
    }

    #[test]
    fn test_cv_undefined_when_mean_zero() {
        let m = summarize(&[-1.0, 1.0, -1.0, 1.0], &cfg(), None).unwrap();
        assert!(m.coefficient_of_variation.is_none());
        assert_eq!(m.consistency(), Consistency::Undefined);
    }

    #[test]
    fn test_t_test_against_baseline() {
        let values = [10.2, 9.8, 10.1, 9.9, 10.0, 10.3, 9.7];
        let against_self = summarize(&values, &cfg(), Some(10.0)).unwrap();
        assert!(against_self.p_value > 0.5);
        assert!(!against_self.is_significant(0.05));

        let against_zero = summarize(&values, &cfg(), None).unwrap();
        assert!(against_zero.t_statistic > 50.0);
        assert!(against_zero.is_significant(0.05));
    }

    #[test]
    fn test_zero_variance_sample() {
        let m = summarize(&[3.0, 3.0, 3.0], &cfg(), Some(3.0)).unwrap();
        assert_eq!(m.stddev, 0.0);
        assert_eq!(m.ci_lower, 3.0);
        assert_eq!(m.ci_upper, 3.0);
        assert_eq!(m.t_statistic, 0.0);
        assert_eq!(m.p_value, 1.0);
        assert_eq!(m.consistency(), Consistency::High);

        let m = summarize(&[3.0, 3.0, 3.0], &cfg(), Some(1.0)).unwrap();
        assert!(m.t_statistic.is_infinite() && m.t_statistic > 0.0);
        assert_eq!(m.p_value, 0.0);
    }

    #[test]
    fn test_consistency_classes() {
        let high = summarize(&[100.0, 101.0, 99.0, 100.0], &cfg(), None).unwrap();
        assert_eq!(high.consistency(), Consistency::High);
        let low = summarize(&[1.0, 5.0, 0.5, 9.0], &cfg(), None).unwrap();
        assert_eq!(low.consistency(), Consistency::Low);
    }

    #[test]
    fn test_welch_identical_samples() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0];
        let c = compare_samples(&a, &a, &cfg()).unwrap();
        assert_eq!(c.mean_difference, 0.0);
        assert!(c.p_value > 0.99);
        assert!(!c.significant);
    }

    #[test]
    fn test_welch_separated_samples() {
        let a: Vec<f64> = (0..40).map(|i| 10.0 + (i % 3) as f64 * 0.1).collect();
        let b: Vec<f64> = (0..40).map(|i| 5.0 + (i % 4) as f64 * 0.1).collect();
        let c = compare_samples(&a, &b, &cfg()).unwrap();
        assert!(c.mean_difference > 4.5);
        assert!(c.significant);
        assert!(compare_samples(&a, &[1.0], &cfg()).is_err());
    }

    #[test]
    fn test_display_format() {
        let m = summarize(&[1.0, 2.0, 3.0], &cfg(), None).unwrap();
        let s = m.to_string();
        assert!(s.starts_with("2.000 (IC 95% : "), "{s}");
    }

    #[test]
    fn test_binomial() {
        assert_eq!(binomial(9, 6), 84.0);
        assert_eq!(binomial(60, 6), 50_063_860.0);
        assert_eq!(binomial(5, 6), 0.0);
        assert_eq!(binomial(25, 6), 177_100.0);
    }
}
