use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use megasena_db::models::{Draw, POOL_SIZE};

use crate::error::CoreResult;
use crate::indicators::IndicatorRegistry;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorWeight {
    pub name: String,
    pub weight: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredNumber {
    pub number: u8,
    pub score: f64,
}

/// Troncature du classement : les `size` meilleurs numéros, dans l'ordre du rang.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniverseTier {
    pub size: usize,
    pub numbers: Vec<u8>,
}

impl UniverseTier {
    pub fn label(&self) -> String {
        format!("TOP {}", self.size)
    }

    pub fn sorted_numbers(&self) -> Vec<u8> {
        let mut numbers = self.numbers.clone();
        numbers.sort_unstable();
        numbers
    }
}

/// Univers réduit : numéros classés par score composite décroissant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Universe {
    pub indicators: Vec<IndicatorWeight>,
    pub ranked: Vec<ScoredNumber>,
    /// Nombre de tirages de la fenêtre de référence.
    pub reference_size: usize,
    pub reference_last_id: Option<u32>,
}

impl Universe {
    pub fn len(&self) -> usize {
        self.ranked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }

    pub fn numbers(&self) -> Vec<u8> {
        self.ranked.iter().map(|s| s.number).collect()
    }

    pub fn score_of(&self, number: u8) -> Option<f64> {
        self.ranked.iter().find(|s| s.number == number).map(|s| s.score)
    }

    pub fn tier(&self, size: usize) -> UniverseTier {
        let size = size.min(self.ranked.len());
        UniverseTier {
            size,
            numbers: self.ranked[..size].iter().map(|s| s.number).collect(),
        }
    }

    /// Paliers du plus grand au plus petit.
    pub fn tiers(&self, sizes: &[usize]) -> Vec<UniverseTier> {
        let mut sizes = sizes.to_vec();
        sizes.sort_unstable_by(|a, b| b.cmp(a));
        sizes.dedup();
        sizes.into_iter().map(|s| self.tier(s)).collect()
    }
}

/// Normalise des poids positifs pour que leur somme vaille 1.
pub fn normalize_weights(weights: &mut [IndicatorWeight]) {
    let total: f64 = weights.iter().map(|w| w.weight.max(0.0)).sum();
    if total > 0.0 {
        for w in weights.iter_mut() {
            w.weight = w.weight.max(0.0) / total;
        }
    } else if !weights.is_empty() {
        let uniform = 1.0 / weights.len() as f64;
        for w in weights.iter_mut() {
            w.weight = uniform;
        }
    }
}

/// Score composite Σ wᵢ · scoreᵢ(n) des 60 numéros, classés (score décroissant,
/// puis plus petit numéro).
pub fn composite_scores(
    registry: &IndicatorRegistry,
    weights: &[IndicatorWeight],
    window: &[Draw],
) -> CoreResult<Vec<ScoredNumber>> {
    let per_indicator: Vec<Vec<f64>> = weights
        .par_iter()
        .map(|w| registry.number_scores(&w.name, window))
        .collect::<CoreResult<_>>()?;

    let mut composite = vec![0.0f64; POOL_SIZE as usize];
    // Fusion séquentielle dans l'ordre des poids
    for (w, scores) in weights.iter().zip(&per_indicator) {
        for (acc, s) in composite.iter_mut().zip(scores) {
            *acc += w.weight * s;
        }
    }

    let mut ranked: Vec<ScoredNumber> = composite
        .into_iter()
        .enumerate()
        .map(|(i, score)| ScoredNumber {
            number: i as u8 + 1,
            score,
        })
        .collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.number.cmp(&b.number)));
    Ok(ranked)
}

pub fn build_universe(
    registry: &IndicatorRegistry,
    weights: &[IndicatorWeight],
    window: &[Draw],
    universe_size: usize,
) -> CoreResult<Universe> {
    let mut ranked = composite_scores(registry, weights, window)?;
    ranked.truncate(universe_size);
    Ok(Universe {
        indicators: weights.to_vec(),
        ranked,
        reference_size: window.len(),
        reference_last_id: window.last().map(|d| d.sequence_id),
    })
}
