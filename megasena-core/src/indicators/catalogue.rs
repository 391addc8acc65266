use megasena_db::models::{Draw, PICK_COUNT, POOL_SIZE};

use super::Indicator;
use crate::stats::binomial;

const POOL: f64 = POOL_SIZE as f64;
const PICK: f64 = PICK_COUNT as f64;
/// Probabilité qu'un numéro donné sorte dans un tirage (6/60).
const HIT_PROBABILITY: f64 = PICK / POOL;

const FIBONACCI: [u8; 9] = [1, 2, 3, 5, 8, 13, 21, 34, 55];

fn is_prime(n: u8) -> bool {
    if n < 2 {
        return false;
    }
    (2..n).take_while(|d| d * d <= n).all(|d| n % d != 0)
}

pub fn all_indicators() -> Vec<Box<dyn Indicator>> {
    vec![
        Box::new(ClassIndicator::new("fibonacci", |n| FIBONACCI.contains(&n))),
        Box::new(ClassIndicator::new("multiples_of_3", |n| n % 3 == 0)),
        Box::new(ClassIndicator::new("multiples_of_5", |n| n % 5 == 0)),
        Box::new(ClassIndicator::new("parity", |n| n % 2 == 0)),
        Box::new(ClassIndicator::new("primes", is_prime)),
        Box::new(ClassIndicator::new("symmetry", |n| n <= POOL_SIZE / 2)),
        Box::new(GroupIndicator::decades()),
        Box::new(GroupIndicator::quadrants()),
        Box::new(FrequencyIndicator::new(50)),
        Box::new(RecencyIndicator::new(10, 0.9)),
        Box::new(DelayIndicator::new(30)),
        Box::new(SumIndicator::new(10.0)),
    ]
}

// ── Classes de numéros ──

/// Compte des numéros tirés appartenant à une classe (pairs, premiers...).
pub struct ClassIndicator {
    name: &'static str,
    member: fn(u8) -> bool,
    class_size: usize,
}

impl ClassIndicator {
    pub fn new(name: &'static str, member: fn(u8) -> bool) -> Self {
        let class_size = (1..=POOL_SIZE).filter(|&n| member(n)).count();
        Self {
            name,
            member,
            class_size,
        }
    }

    fn class_share(&self) -> f64 {
        self.class_size as f64 / POOL
    }
}

impl Indicator for ClassIndicator {
    fn name(&self) -> &str {
        self.name
    }

    fn draw_value(&self, _context: &[Draw], draw: &Draw) -> f64 {
        draw.numbers.iter().filter(|&&n| (self.member)(n)).count() as f64
    }

    fn number_score(&self, number: u8, window: &[Draw]) -> f64 {
        if window.is_empty() {
            return 1.0;
        }
        let in_class: usize = window
            .iter()
            .map(|d| d.numbers.iter().filter(|&&n| (self.member)(n)).count())
            .sum();
        let observed = in_class as f64 / (PICK * window.len() as f64);
        let share = self.class_share();
        // Un numéro hors classe reçoit le lift du complément
        if (self.member)(number) {
            observed / share
        } else {
            (1.0 - observed) / (1.0 - share)
        }
    }

    fn baseline(&self) -> Option<f64> {
        Some(PICK * self.class_share())
    }
}

// ── Groupes contigus (dizaines, quadrants) ──

#[derive(Clone, Copy)]
enum GroupStat {
    /// Nombre de groupes distincts couverts.
    Coverage,
    /// Σ |effectif − attendu| sur les groupes.
    Imbalance,
}

/// Partition de 1..=60 en groupes contigus de taille `group_size`.
pub struct GroupIndicator {
    name: &'static str,
    group_size: u8,
    stat: GroupStat,
}

impl GroupIndicator {
    pub fn decades() -> Self {
        Self {
            name: "decades",
            group_size: 10,
            stat: GroupStat::Coverage,
        }
    }

    pub fn quadrants() -> Self {
        Self {
            name: "quadrants",
            group_size: 15,
            stat: GroupStat::Imbalance,
        }
    }

    fn group_count(&self) -> usize {
        (POOL_SIZE / self.group_size) as usize
    }

    fn group_of(&self, n: u8) -> usize {
        ((n - 1) / self.group_size) as usize
    }

    fn counts(&self, numbers: &[u8]) -> Vec<usize> {
        let mut counts = vec![0usize; self.group_count()];
        for &n in numbers {
            counts[self.group_of(n)] += 1;
        }
        counts
    }

    fn expected_per_group(&self) -> f64 {
        PICK / self.group_count() as f64
    }

    fn stat_of(&self, counts: &[usize]) -> f64 {
        match self.stat {
            GroupStat::Coverage => counts.iter().filter(|&&c| c > 0).count() as f64,
            GroupStat::Imbalance => {
                let expected = self.expected_per_group();
                counts.iter().map(|&c| (c as f64 - expected).abs()).sum()
            }
        }
    }

    /// Espérance exacte sous tirage sans remise (loi hypergéométrique multivariée).
    fn exact_expectation(&self) -> f64 {
        let groups = self.group_count();
        let size = self.group_size as u64;
        let total = binomial(POOL_SIZE as u64, PICK_COUNT as u64);
        let mut expectation = 0.0;
        let mut counts = vec![0usize; groups];
        enumerate_compositions(&mut counts, 0, PICK_COUNT, &mut |c| {
            let ways: f64 = c.iter().map(|&k| binomial(size, k as u64)).product();
            expectation += self.stat_of(c) * ways / total;
        });
        expectation
    }
}

/// Parcourt toutes les répartitions de `remaining` boules dans `counts[idx..]`.
fn enumerate_compositions(
    counts: &mut [usize],
    idx: usize,
    remaining: usize,
    visit: &mut dyn FnMut(&[usize]),
) {
    if idx == counts.len() - 1 {
        counts[idx] = remaining;
        visit(&counts[..]);
        return;
    }
    for k in 0..=remaining {
        counts[idx] = k;
        enumerate_compositions(counts, idx + 1, remaining - k, visit);
    }
}

impl Indicator for GroupIndicator {
    fn name(&self) -> &str {
        self.name
    }

    fn draw_value(&self, _context: &[Draw], draw: &Draw) -> f64 {
        self.stat_of(&self.counts(&draw.numbers))
    }

    fn number_score(&self, number: u8, window: &[Draw]) -> f64 {
        if window.is_empty() {
            return 1.0;
        }
        let group = self.group_of(number);
        let in_group: usize = window
            .iter()
            .map(|d| d.numbers.iter().filter(|&&n| self.group_of(n) == group).count())
            .sum();
        let observed = in_group as f64 / (PICK * window.len() as f64);
        observed * self.group_count() as f64
    }

    fn baseline(&self) -> Option<f64> {
        Some(self.exact_expectation())
    }
}

// ── Fréquence ──

pub struct FrequencyIndicator {
    window: usize,
}

impl FrequencyIndicator {
    pub fn new(window: usize) -> Self {
        Self { window }
    }

    fn lift(number: u8, draws: &[Draw]) -> f64 {
        if draws.is_empty() {
            return 1.0;
        }
        let count = draws.iter().filter(|d| d.contains(number)).count();
        count as f64 / (draws.len() as f64 * HIT_PROBABILITY)
    }
}

impl Indicator for FrequencyIndicator {
    fn name(&self) -> &str {
        "frequency"
    }

    fn context_len(&self) -> usize {
        self.window
    }

    /// Lift moyen des numéros tirés sur les tirages précédents.
    fn draw_value(&self, context: &[Draw], draw: &Draw) -> f64 {
        draw.numbers.iter().map(|&n| Self::lift(n, context)).sum::<f64>() / PICK
    }

    fn number_score(&self, number: u8, window: &[Draw]) -> f64 {
        let start = window.len().saturating_sub(self.window);
        Self::lift(number, &window[start..])
    }

    fn baseline(&self) -> Option<f64> {
        Some(1.0)
    }
}

// ── Récence ──

pub struct RecencyIndicator {
    span: usize,
    alpha: f64,
}

impl RecencyIndicator {
    pub fn new(span: usize, alpha: f64) -> Self {
        Self { span, alpha }
    }
}

impl Indicator for RecencyIndicator {
    fn name(&self) -> &str {
        "recency"
    }

    fn context_len(&self) -> usize {
        self.span
    }

    /// Numéros tirés déjà vus dans les `span` tirages précédents.
    fn draw_value(&self, context: &[Draw], draw: &Draw) -> f64 {
        draw.numbers
            .iter()
            .filter(|&&n| context.iter().any(|d| d.contains(n)))
            .count() as f64
    }

    /// Moyenne mobile exponentielle de présence, rapportée à 6/60.
    fn number_score(&self, number: u8, window: &[Draw]) -> f64 {
        let weight = window.iter().fold(HIT_PROBABILITY, |w, d| {
            let hit = if d.contains(number) { 1.0 } else { 0.0 };
            self.alpha * w + (1.0 - self.alpha) * hit
        });
        weight / HIT_PROBABILITY
    }

    fn baseline(&self) -> Option<f64> {
        Some(PICK * (1.0 - (1.0 - HIT_PROBABILITY).powi(self.span as i32)))
    }
}

// ── Retard ──

pub struct DelayIndicator {
    cap: usize,
}

impl DelayIndicator {
    pub fn new(cap: usize) -> Self {
        Self { cap }
    }

    /// Tirages écoulés depuis la dernière sortie (0 = sorti au dernier tirage), plafonné.
    fn gap(&self, number: u8, draws: &[Draw]) -> usize {
        draws
            .iter()
            .rev()
            .take(self.cap)
            .position(|d| d.contains(number))
            .unwrap_or(self.cap)
    }

    /// E[min(G, cap)] avec G géométrique de paramètre 6/60.
    fn expected_gap(&self) -> f64 {
        let q = 1.0 - HIT_PROBABILITY;
        q * (1.0 - q.powi(self.cap as i32)) / HIT_PROBABILITY
    }
}

impl Indicator for DelayIndicator {
    fn name(&self) -> &str {
        "delay"
    }

    fn context_len(&self) -> usize {
        self.cap
    }

    fn draw_value(&self, context: &[Draw], draw: &Draw) -> f64 {
        draw.numbers
            .iter()
            .map(|&n| self.gap(n, context) as f64)
            .sum::<f64>()
            / PICK
    }

    /// Ratio de retard : retard observé / retard attendu.
    fn number_score(&self, number: u8, window: &[Draw]) -> f64 {
        if window.is_empty() {
            return 1.0;
        }
        self.gap(number, window) as f64 / self.expected_gap()
    }

    fn baseline(&self) -> Option<f64> {
        Some(self.expected_gap())
    }
}

// ── Somme ──

pub struct SumIndicator {
    scale: f64,
}

impl SumIndicator {
    pub fn new(scale: f64) -> Self {
        Self { scale }
    }

    fn closeness(&self, number: u8, target: f64) -> f64 {
        (-(number as f64 - target).abs() / self.scale).exp()
    }
}

impl Indicator for SumIndicator {
    fn name(&self) -> &str {
        "sum"
    }

    fn draw_value(&self, _context: &[Draw], draw: &Draw) -> f64 {
        draw.numbers.iter().map(|&n| n as f64).sum()
    }

    /// Proximité du numéro avec la somme moyenne / 6, normalisée sur le pool.
    fn number_score(&self, number: u8, window: &[Draw]) -> f64 {
        if window.is_empty() {
            return 1.0;
        }
        let mean_sum = window
            .iter()
            .map(|d| d.numbers.iter().map(|&n| n as f64).sum::<f64>())
            .sum::<f64>()
            / window.len() as f64;
        let target = mean_sum / PICK;
        let pool_mean = (1..=POOL_SIZE)
            .map(|n| self.closeness(n, target))
            .sum::<f64>()
            / POOL;
        self.closeness(number, target) / pool_mean
    }

    fn baseline(&self) -> Option<f64> {
        Some(PICK * (POOL + 1.0) / 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{make_biased_draws, make_test_draws};
    use chrono::NaiveDate;

    fn draw(numbers: [u8; 6]) -> Draw {
        Draw {
            sequence_id: 1,
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            numbers,
        }
    }

    fn by_name(name: &str) -> Box<dyn Indicator> {
        all_indicators()
            .into_iter()
            .find(|i| i.name() == name)
            .unwrap()
    }

    #[test]
    fn test_is_prime() {
        let primes: Vec<u8> = (1..=60).filter(|&n| is_prime(n)).collect();
        assert_eq!(primes.len(), 17);
        assert_eq!(&primes[..5], &[2, 3, 5, 7, 11]);
        assert_eq!(*primes.last().unwrap(), 59);
    }

    #[test]
    fn test_class_baselines() {
        let expect = [
            ("fibonacci", 0.9),
            ("multiples_of_3", 2.0),
            ("multiples_of_5", 1.2),
            ("parity", 3.0),
            ("primes", 1.7),
            ("symmetry", 3.0),
        ];
        for (name, baseline) in expect {
            let b = by_name(name).baseline().unwrap();
            assert!((b - baseline).abs() < 1e-12, "{name}: {b}");
        }
    }

    #[test]
    fn test_class_draw_values() {
        let d = draw([2, 3, 10, 21, 44, 55]);
        assert_eq!(by_name("parity").draw_value(&[], &d), 3.0);
        assert_eq!(by_name("fibonacci").draw_value(&[], &d), 4.0);
        assert_eq!(by_name("primes").draw_value(&[], &d), 2.0);
        assert_eq!(by_name("multiples_of_5").draw_value(&[], &d), 2.0);
        assert_eq!(by_name("symmetry").draw_value(&[], &d), 4.0);
    }

    #[test]
    fn test_class_number_score_complement() {
        // Uniquement des pairs : lift 2 pour les pairs, 0 pour les impairs
        let window = vec![draw([2, 4, 6, 8, 10, 12]); 3];
        let parity = by_name("parity");
        assert!((parity.number_score(2, &window) - 2.0).abs() < 1e-12);
        assert_eq!(parity.number_score(3, &window), 0.0);
        assert_eq!(parity.number_score(3, &[]), 1.0);
    }

    #[test]
    fn test_group_draw_values() {
        let d = draw([1, 2, 3, 16, 31, 46]);
        assert_eq!(by_name("decades").draw_value(&[], &d), 4.0);
        // quadrants : 3,1,1,1 -> 1.5 + 0.5 * 3
        assert_eq!(by_name("quadrants").draw_value(&[], &d), 3.0);
    }

    #[test]
    fn test_group_baselines() {
        let decades = by_name("decades").baseline().unwrap();
        let expected = 6.0 * (1.0 - binomial(50, 6) / binomial(60, 6));
        assert!((decades - expected).abs() < 1e-9, "{decades} vs {expected}");

        let quadrants = by_name("quadrants").baseline().unwrap();
        assert!(quadrants > 1.5 && quadrants < 3.5, "{quadrants}");
    }

    #[test]
    fn test_recency_and_delay_baselines() {
        let r = by_name("recency").baseline().unwrap();
        assert!((r - 6.0 * (1.0 - 0.9f64.powi(10))).abs() < 1e-12);
        let d = by_name("delay").baseline().unwrap();
        assert!((d - 9.0 * (1.0 - 0.9f64.powi(30))).abs() < 1e-9);
        assert_eq!(by_name("sum").baseline(), Some(183.0));
        assert_eq!(by_name("frequency").baseline(), Some(1.0));
    }

    #[test]
    fn test_delay_gap() {
        let delay = DelayIndicator::new(30);
        let window = vec![
            draw([1, 2, 3, 4, 5, 6]),
            draw([7, 8, 9, 10, 11, 12]),
            draw([1, 20, 30, 40, 50, 60]),
        ];
        assert_eq!(delay.gap(1, &window), 0);
        assert_eq!(delay.gap(7, &window), 1);
        assert_eq!(delay.gap(2, &window), 2);
        assert_eq!(delay.gap(59, &window), 30);
        let long = make_test_draws(100);
        assert_eq!(delay.gap(61, &long), 30);
    }

    #[test]
    fn test_frequency_favors_biased_numbers() {
        let draws = make_biased_draws(200, 3);
        let freq = by_name("frequency");
        let low = freq.number_score(5, &draws);
        let high = freq.number_score(40, &draws);
        assert!(low > 2.0, "{low}");
        assert!(high < 1.5, "{high}");
    }

    #[test]
    fn test_recency_neutral_on_empty_window() {
        assert!((by_name("recency").number_score(7, &[]) - 1.0).abs() < 1e-12);
        assert_eq!(by_name("sum").number_score(7, &[]), 1.0);
        assert_eq!(by_name("delay").number_score(7, &[]), 1.0);
    }

    #[test]
    fn test_sum_scores_average_to_one() {
        let draws = make_test_draws(40);
        let sum = by_name("sum");
        let mean: f64 = (1..=60).map(|n| sum.number_score(n, &draws)).sum::<f64>() / 60.0;
        assert!((mean - 1.0).abs() < 1e-9);
    }
}
