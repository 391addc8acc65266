use serde::{Deserialize, Serialize};

use megasena_db::models::{Draw, PICK_COUNT, POOL_SIZE};

use crate::stats::binomial;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawHits {
    pub sequence_id: u32,
    pub hits: usize,
}

/// Rejeu d'un palier de l'univers contre des tirages réels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetroCorrelationReport {
    pub window_size: usize,
    pub tier_size: usize,
    pub hit_threshold: usize,
    /// Part des tirages avec au moins `hit_threshold` numéros dans le palier.
    pub hit_rate: f64,
    pub mean_hits: f64,
    /// Recouvrement moyen normalisé par min(6, taille du palier).
    pub mean_correlation: f64,
    /// hit_distribution[k] = nombre de tirages avec exactement k numéros communs.
    pub hit_distribution: [usize; PICK_COUNT + 1],
    /// Taux attendu pour un palier de même taille choisi au hasard.
    pub random_baseline_hit_rate: f64,
    pub best_draw: Option<DrawHits>,
    pub worst_draw: Option<DrawHits>,
    /// Chute relative du taux de réussite entre la moitié ancienne et la moitié
    /// récente de la fenêtre (0 = stable).
    pub overfitting_score: f64,
}

impl RetroCorrelationReport {
    /// Gain du taux de réussite par rapport au hasard (1.0 = hasard).
    pub fn lift_over_random(&self) -> Option<f64> {
        if self.random_baseline_hit_rate > 0.0 {
            Some(self.hit_rate / self.random_baseline_hit_rate)
        } else {
            None
        }
    }
}

pub fn overlap(tier: &[u8], draw: &Draw) -> usize {
    draw.numbers.iter().filter(|n| tier.contains(n)).count()
}

/// P(X ≥ threshold) pour X hypergéométrique : 6 numéros tirés parmi 60,
/// dont `tier_size` sont « bons ».
pub fn random_hit_probability(tier_size: usize, hit_threshold: usize) -> f64 {
    let pool = POOL_SIZE as u64;
    let pick = PICK_COUNT as u64;
    let tier = (tier_size as u64).min(pool);
    let total = binomial(pool, pick);
    (hit_threshold as u64..=pick)
        .map(|k| binomial(tier, k) * binomial(pool - tier, pick - k) / total)
        .sum()
}

fn rate(overlaps: &[DrawHits], hit_threshold: usize) -> f64 {
    if overlaps.is_empty() {
        return 0.0;
    }
    overlaps.iter().filter(|o| o.hits >= hit_threshold).count() as f64 / overlaps.len() as f64
}

/// Agrège des recouvrements déjà calculés (ordre chronologique).
pub fn summarize_hits(
    tier_size: usize,
    hit_threshold: usize,
    overlaps: &[DrawHits],
) -> RetroCorrelationReport {
    let n = overlaps.len();
    let mut hit_distribution = [0usize; PICK_COUNT + 1];
    for o in overlaps {
        hit_distribution[o.hits.min(PICK_COUNT)] += 1;
    }

    let mean_hits = if n == 0 {
        0.0
    } else {
        overlaps.iter().map(|o| o.hits as f64).sum::<f64>() / n as f64
    };
    let normaliser = tier_size.clamp(1, PICK_COUNT) as f64;

    // En cas d'égalité, le tirage le plus ancien
    let best_draw = overlaps
        .iter()
        .copied()
        .reduce(|best, o| if o.hits > best.hits { o } else { best });
    let worst_draw = overlaps
        .iter()
        .copied()
        .reduce(|worst, o| if o.hits < worst.hits { o } else { worst });

    let half = n / 2;
    let older = rate(&overlaps[..half], hit_threshold);
    let newer = rate(&overlaps[half..], hit_threshold);
    let overfitting_score = if older > 0.0 {
        ((older - newer) / older).max(0.0)
    } else {
        0.0
    };

    RetroCorrelationReport {
        window_size: n,
        tier_size,
        hit_threshold,
        hit_rate: rate(overlaps, hit_threshold),
        mean_hits,
        mean_correlation: mean_hits / normaliser,
        hit_distribution,
        random_baseline_hit_rate: random_hit_probability(tier_size, hit_threshold),
        best_draw,
        worst_draw,
        overfitting_score,
    }
}

/// Rejoue `tier` contre chaque tirage de `window`.
pub fn correlate(tier: &[u8], window: &[Draw], hit_threshold: usize) -> RetroCorrelationReport {
    let overlaps: Vec<DrawHits> = window
        .iter()
        .map(|d| DrawHits {
            sequence_id: d.sequence_id,
            hits: overlap(tier, d),
        })
        .collect();
    summarize_hits(tier.len(), hit_threshold, &overlaps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{make_biased_draws, make_test_draws};

    #[test]
    fn test_random_baseline_top9() {
        let p = random_hit_probability(9, 3);
        assert!((p - 0.03828).abs() < 1e-4, "p = {p}");
        assert!((random_hit_probability(60, 6) - 1.0).abs() < 1e-12);
        assert!((random_hit_probability(9, 0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_correlate_counts_overlap() {
        let draws = make_test_draws(3);
        let tier: Vec<u8> = draws[0].numbers.to_vec();
        let report = correlate(&tier, &draws[..1], 3);
        assert_eq!(report.window_size, 1);
        assert_eq!(report.mean_hits, 6.0);
        assert_eq!(report.hit_rate, 1.0);
        assert_eq!(report.mean_correlation, 1.0);
        assert_eq!(report.hit_distribution[6], 1);
        assert_eq!(report.best_draw.unwrap().hits, 6);
    }

    #[test]
    fn test_correlate_empty_window() {
        let report = correlate(&[1, 2, 3, 4, 5, 6, 7, 8, 9], &[], 3);
        assert_eq!(report.window_size, 0);
        assert_eq!(report.hit_rate, 0.0);
        assert_eq!(report.mean_correlation, 0.0);
        assert!(report.best_draw.is_none());
        assert_eq!(report.overfitting_score, 0.0);
    }

    #[test]
    fn test_biased_history_top9_hits() {
        let draws = make_biased_draws(100, 11);
        let tier: Vec<u8> = (1..=9).collect();
        let report = correlate(&tier, &draws, 3);
        // 4 numéros de 1..=9 par tirage
        assert_eq!(report.hit_rate, 1.0);
        assert_eq!(report.hit_distribution[4], 100);
        assert!((report.mean_correlation - 4.0 / 6.0).abs() < 1e-12);
        assert!(report.lift_over_random().unwrap() > 20.0);
        assert_eq!(report.overfitting_score, 0.0);
    }

    #[test]
    fn test_overfitting_score_detects_drop() {
        let hits = |v: &[usize]| -> Vec<DrawHits> {
            v.iter()
                .enumerate()
                .map(|(i, &h)| DrawHits { sequence_id: i as u32, hits: h })
                .collect()
        };
        let report = summarize_hits(9, 3, &hits(&[3, 3, 3, 3, 0, 0, 3, 0]));
        // ancienne moitié 100 %, récente 25 %
        assert!((report.overfitting_score - 0.75).abs() < 1e-12);

        let improving = summarize_hits(9, 3, &hits(&[0, 0, 3, 3]));
        assert_eq!(improving.overfitting_score, 0.0);
    }

    #[test]
    fn test_best_and_worst_keep_first() {
        let hits = vec![
            DrawHits { sequence_id: 10, hits: 2 },
            DrawHits { sequence_id: 11, hits: 4 },
            DrawHits { sequence_id: 12, hits: 4 },
            DrawHits { sequence_id: 13, hits: 0 },
            DrawHits { sequence_id: 14, hits: 0 },
        ];
        let report = summarize_hits(10, 3, &hits);
        assert_eq!(report.best_draw.unwrap().sequence_id, 11);
        assert_eq!(report.worst_draw.unwrap().sequence_id, 13);
    }
}
