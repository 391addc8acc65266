use chrono::{Duration, NaiveDate};
use rand::SeedableRng;
use rand::rngs::StdRng;

use megasena_db::models::{Draw, POOL_SIZE, validate_numbers};

use crate::error::{CoreError, CoreResult};

/// Historique validé, du plus ancien au plus récent, immuable pendant un run.
#[derive(Debug, Clone)]
pub struct History {
    draws: Vec<Draw>,
}

impl History {
    pub fn new(draws: Vec<Draw>) -> CoreResult<Self> {
        for (i, draw) in draws.iter().enumerate() {
            validate_numbers(&draw.numbers).map_err(|e| {
                CoreError::MalformedHistory(format!("concours {} : {}", draw.sequence_id, e))
            })?;
            if i > 0 && draws[i - 1].sequence_id >= draw.sequence_id {
                return Err(CoreError::MalformedHistory(format!(
                    "sequence_id non strictement croissant : {} puis {}",
                    draws[i - 1].sequence_id, draw.sequence_id
                )));
            }
        }
        Ok(Self { draws })
    }

    pub fn draws(&self) -> &[Draw] {
        &self.draws
    }

    pub fn len(&self) -> usize {
        self.draws.len()
    }

    pub fn is_empty(&self) -> bool {
        self.draws.is_empty()
    }

    pub fn last(&self) -> Option<&Draw> {
        self.draws.last()
    }

    /// Les `n` derniers tirages (ou tout l'historique s'il est plus court).
    pub fn tail(&self, n: usize) -> &[Draw] {
        &self.draws[self.draws.len().saturating_sub(n)..]
    }
}

fn fixture_date(i: usize) -> NaiveDate {
    NaiveDate::from_ymd_opt(2015, 1, 3).unwrap_or_default() + Duration::days(3 * i as i64)
}

/// Historique déterministe sans biais marqué, pour les tests.
pub fn make_test_draws(n: usize) -> Vec<Draw> {
    (0..n)
        .map(|i| {
            let base = (i * 7) % 60;
            let mut numbers = [0u8; 6];
            for (k, slot) in numbers.iter_mut().enumerate() {
                *slot = ((base + k * 11) % 60 + 1) as u8;
            }
            numbers.sort_unstable();
            Draw {
                sequence_id: i as u32 + 1,
                date: fixture_date(i),
                numbers,
            }
        })
        .collect()
}

/// Historique biaisé : chaque tirage contient 4 numéros de 1..=9 et 2 de 10..=60,
/// de sorte que chaque numéro de {1..9} sort dans ~44 % des tirages.
pub fn make_biased_draws(n: usize, seed: u64) -> Vec<Draw> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|i| {
            let mut numbers = [0u8; 6];
            let low = rand::seq::index::sample(&mut rng, 9, 4);
            let high = rand::seq::index::sample(&mut rng, 51, 2);
            for (slot, idx) in numbers.iter_mut().zip(low.into_iter()) {
                *slot = idx as u8 + 1;
            }
            for (slot, idx) in numbers[4..].iter_mut().zip(high.into_iter()) {
                *slot = idx as u8 + 10;
            }
            numbers.sort_unstable();
            Draw {
                sequence_id: i as u32 + 1,
                date: fixture_date(i),
                numbers,
            }
        })
        .collect()
}

/// Rupture de régime : `before` tirages biaisés vers 1..=9, puis `after`
/// tirages biaisés vers 52..=60.
pub fn make_regime_shift_draws(before: usize, after: usize, seed: u64) -> Vec<Draw> {
    let mut draws = make_biased_draws(before, seed);
    for (i, d) in make_biased_draws(after, seed.wrapping_add(1)).into_iter().enumerate() {
        let mut numbers = d.numbers.map(|n| POOL_SIZE + 1 - n);
        numbers.sort_unstable();
        draws.push(Draw {
            sequence_id: (before + i) as u32 + 1,
            date: fixture_date(before + i),
            numbers,
        });
    }
    draws
}
