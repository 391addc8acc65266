use std::collections::HashSet;

use log::{debug, warn};
use rand::SeedableRng;
use rand::distr::weighted::WeightedIndex;
use rand::prelude::Distribution;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use megasena_db::models::PICK_COUNT;

use crate::config::{FilterConfig, GameConfig};
use crate::error::{CoreError, CoreResult};
use crate::stats::binomial;
use crate::universe::{Universe, UniverseTier};

pub type Game = [u8; PICK_COUNT];

/// Poids plancher d'un numéro en avance sur son quota.
const MIN_WEIGHT: f64 = 1e-3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSet {
    pub tier_size: usize,
    pub seed: u64,
    pub requested: usize,
    pub games: Vec<Game>,
    /// (numéro, nombre de jeux le contenant), dans l'ordre du palier.
    pub inclusion: Vec<(u8, usize)>,
    /// Jeux complétés par énumération après épuisement des tirages aléatoires.
    pub fallback_games: usize,
    /// Jeux émis hors filtres, faute de combinaison conforme restante.
    pub filter_violations: usize,
}

impl FilterConfig {
    /// Filtres « intelligents » : somme, parité, répartition par quadrant.
    pub fn accepts(&self, game: &Game) -> bool {
        if !self.enabled {
            return true;
        }
        let sum: u32 = game.iter().map(|&n| n as u32).sum();
        if sum < self.min_sum || sum > self.max_sum {
            return false;
        }
        let even = game.iter().filter(|&&n| n % 2 == 0).count();
        if even < self.min_even || even > self.max_even {
            return false;
        }
        let mut quadrants = [0usize; 4];
        for &n in game {
            quadrants[((n - 1) / 15) as usize] += 1;
        }
        quadrants.iter().all(|&c| c <= self.max_per_quadrant)
    }
}

/// Itérateur sur les combinaisons de 6 parmi `numbers`, ordre lexicographique des indices.
pub struct Combinations<'a> {
    numbers: &'a [u8],
    indices: Option<[usize; PICK_COUNT]>,
}

impl<'a> Combinations<'a> {
    pub fn new(numbers: &'a [u8]) -> Self {
        let indices = if numbers.len() >= PICK_COUNT {
            Some(std::array::from_fn(|i| i))
        } else {
            None
        };
        Self { numbers, indices }
    }
}

impl Iterator for Combinations<'_> {
    type Item = Game;

    fn next(&mut self) -> Option<Game> {
        let indices = self.indices?;
        let mut game: Game = std::array::from_fn(|i| self.numbers[indices[i]]);
        game.sort_unstable();

        // Avance à la combinaison suivante
        let n = self.numbers.len();
        let mut next = indices;
        let mut i = PICK_COUNT;
        self.indices = loop {
            if i == 0 {
                break None;
            }
            i -= 1;
            if next[i] < n - PICK_COUNT + i {
                next[i] += 1;
                for j in i + 1..PICK_COUNT {
                    next[j] = next[j - 1] + 1;
                }
                break Some(next);
            }
        };
        Some(game)
    }
}

/// Toutes les combinaisons de 6 numéros du palier (84 pour un TOP 9).
pub fn all_combinations(tier: &UniverseTier) -> Vec<Game> {
    let mut games: Vec<Game> = Combinations::new(&tier.numbers).collect();
    games.sort_unstable();
    games
}

fn sample_game(weights: &[f64], numbers: &[u8], rng: &mut StdRng) -> CoreResult<Game> {
    let mut available: Vec<(u8, f64)> = numbers.iter().copied().zip(weights.iter().copied()).collect();
    let mut game = [0u8; PICK_COUNT];
    for slot in game.iter_mut() {
        let w: Vec<f64> = available.iter().map(|(_, w)| *w).collect();
        let dist = WeightedIndex::new(&w).map_err(|e| CoreError::Distribution(e.to_string()))?;
        let idx = dist.sample(rng);
        *slot = available.remove(idx).0;
    }
    game.sort_unstable();
    Ok(game)
}

/// Génère des jeux distincts dans le palier. Chaque numéro vise un quota
/// d'apparitions proportionnel à son score composite ; le tirage pondère par
/// le déficit courant. Déterministe pour une graine donnée.
pub fn generate_games(
    tier: &UniverseTier,
    universe: &Universe,
    count: usize,
    seed: u64,
    config: &GameConfig,
) -> CoreResult<GameSet> {
    let numbers = &tier.numbers;
    if numbers.len() < PICK_COUNT {
        return Err(CoreError::InvalidConfig(format!(
            "palier {} trop petit pour former des jeux de {PICK_COUNT}",
            tier.label()
        )));
    }

    let capacity = binomial(numbers.len() as u64, PICK_COUNT as u64);
    let target = if (count as f64) > capacity {
        warn!(
            "{} jeux demandés mais seulement {capacity} combinaisons dans le {}",
            count,
            tier.label()
        );
        capacity as usize
    } else {
        count
    };

    let scores: Vec<f64> = numbers
        .iter()
        .map(|&n| universe.score_of(n).unwrap_or(0.0).max(MIN_WEIGHT))
        .collect();
    let total: f64 = scores.iter().sum();
    let shares: Vec<f64> = scores.iter().map(|s| s / total).collect();

    let mut rng = StdRng::seed_from_u64(seed);
    let mut used = vec![0usize; numbers.len()];
    let mut seen: HashSet<Game> = HashSet::with_capacity(target);
    let mut games: Vec<Game> = Vec::with_capacity(target);
    let mut fallback_games = 0usize;
    let mut filter_violations = 0usize;

    for g in 0..target {
        let weights: Vec<f64> = shares
            .iter()
            .zip(&used)
            .map(|(&p, &u)| ((g + 1) as f64 * PICK_COUNT as f64 * p - u as f64).max(MIN_WEIGHT))
            .collect();

        let mut chosen = None;
        for _ in 0..config.max_attempts {
            let game = sample_game(&weights, numbers, &mut rng)?;
            if !seen.contains(&game) && config.filters.accepts(&game) {
                chosen = Some(game);
                break;
            }
        }

        let game = match chosen {
            Some(game) => game,
            None => {
                // Première combinaison inédite, filtrée si possible
                let mut unseen = Combinations::new(numbers).filter(|c| !seen.contains(c));
                let first = unseen.next();
                let filtered = first
                    .filter(|c| config.filters.accepts(c))
                    .or_else(|| unseen.find(|c| config.filters.accepts(c)));
                let Some(game) = filtered.or(first) else {
                    break;
                };
                fallback_games += 1;
                if !config.filters.accepts(&game) {
                    filter_violations += 1;
                }
                game
            }
        };

        for n in &game {
            if let Some(i) = numbers.iter().position(|x| x == n) {
                used[i] += 1;
            }
        }
        seen.insert(game);
        games.push(game);
    }

    if fallback_games > 0 {
        debug!("{fallback_games} jeux complétés par énumération");
    }
    if filter_violations > 0 {
        warn!(
            "{filter_violations} jeux du {} ne respectent pas les filtres (aucune combinaison conforme restante)",
            tier.label()
        );
    }

    let inclusion = numbers.iter().copied().zip(used.iter().copied()).collect();
    Ok(GameSet {
        tier_size: numbers.len(),
        seed,
        requested: count,
        games,
        inclusion,
        fallback_games,
        filter_violations,
    })
}
