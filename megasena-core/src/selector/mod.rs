pub mod ranker;
pub mod walk_forward;

use std::fmt;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use megasena_db::models::Draw;

use crate::config::PipelineConfig;
use crate::correlation::{RetroCorrelationReport, correlate};
use crate::error::{CoreError, CoreResult};
use crate::history::History;
use crate::indicators::IndicatorRegistry;
use crate::universe::{IndicatorWeight, Universe, UniverseTier, build_universe};
use crate::validation::ValidationReport;

use ranker::{IndicatorRanker, Penalties, RankedIndicator, weights_for};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectorState {
    SelectIndicators,
    BuildUniverse,
    CrossValidate,
    Accepted,
    RetryExhausted,
}

impl SelectorState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SelectorState::Accepted | SelectorState::RetryExhausted)
    }
}

impl fmt::Display for SelectorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SelectorState::SelectIndicators => "SELECT_INDICATORS",
            SelectorState::BuildUniverse => "BUILD_UNIVERSE",
            SelectorState::CrossValidate => "CROSS_VALIDATE",
            SelectorState::Accepted => "ACCEPTED",
            SelectorState::RetryExhausted => "RETRY_EXHAUSTED",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Completed,
    Passed,
    Failed,
}

/// Transition pure de la machine à états.
///
/// `failures` compte les validations croisées échouées, celle-ci comprise :
/// au plus `max_retries + 1` tentatives au total.
pub fn transition(
    state: SelectorState,
    outcome: StepOutcome,
    failures: usize,
    max_retries: usize,
) -> SelectorState {
    use SelectorState::*;
    match (state, outcome) {
        (SelectIndicators, StepOutcome::Completed) => BuildUniverse,
        (BuildUniverse, StepOutcome::Completed) => CrossValidate,
        (CrossValidate, StepOutcome::Passed) => Accepted,
        (CrossValidate, StepOutcome::Failed) if failures <= max_retries => SelectIndicators,
        (CrossValidate, StepOutcome::Failed) => RetryExhausted,
        (s, _) => s,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierReplay {
    pub size: usize,
    pub report: RetroCorrelationReport,
}

/// Rejeu hors échantillon : univers construit avant la fenêtre, rejoué dessus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossValidation {
    pub reference_size: usize,
    pub window_size: usize,
    /// Palier le plus petit, celui qui décide de l'acceptation.
    pub primary: TierReplay,
    pub tiers: Vec<TierReplay>,
    pub passed: bool,
}

impl CrossValidation {
    fn better_than(&self, other: &CrossValidation) -> bool {
        let (a, b) = (&self.primary.report, &other.primary.report);
        a.hit_rate
            .total_cmp(&b.hit_rate)
            .then(a.mean_correlation.total_cmp(&b.mean_correlation))
            .is_gt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionStatus {
    Accepted,
    /// Aucune tentative n'a passé la validation croisée ; la meilleure est jointe.
    /// `retries` compte les tentatives après la première : `attempts - 1`.
    RetryExhausted { retries: usize },
}

impl fmt::Display for SelectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionStatus::Accepted => write!(f, "VALIDÉ"),
            SelectionStatus::RetryExhausted { retries } => {
                write!(f, "NON VALIDÉ après {retries} nouvelles tentatives")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniverseSelection {
    pub ranking_source: String,
    pub indicators: Vec<RankedIndicator>,
    pub weights: Vec<IndicatorWeight>,
    /// Univers final, reconstruit sur la fenêtre de référence la plus récente.
    pub universe: Universe,
    pub tiers: Vec<UniverseTier>,
    pub cross_validation: CrossValidation,
    pub status: SelectionStatus,
    pub attempts: usize,
}

impl UniverseSelection {
    pub fn passed(&self) -> bool {
        matches!(self.status, SelectionStatus::Accepted)
    }

    /// Le plus petit palier (TOP 9 par défaut).
    pub fn primary_tier(&self) -> &UniverseTier {
        // tiers est trié du plus grand au plus petit et jamais vide
        &self.tiers[self.tiers.len() - 1]
    }
}

struct Attempt {
    indicators: Vec<RankedIndicator>,
    weights: Vec<IndicatorWeight>,
    cross_validation: CrossValidation,
}

/// Première erreur des validations, faute d'indicateur classable.
fn no_usable_indicator(validation: &ValidationReport) -> CoreError {
    validation
        .indicators
        .iter()
        .find_map(|v| v.error().cloned())
        .unwrap_or(CoreError::InsufficientSample { n: 0 })
}

pub struct ConservativeSelector<'a> {
    history: &'a History,
    registry: &'a IndicatorRegistry,
    config: &'a PipelineConfig,
}

impl<'a> ConservativeSelector<'a> {
    pub fn new(history: &'a History, registry: &'a IndicatorRegistry, config: &'a PipelineConfig) -> Self {
        Self {
            history,
            registry,
            config,
        }
    }

    /// (fenêtre de référence, fenêtre de validation croisée). La fenêtre de
    /// validation est réduite si l'historique ne laisse pas `min_split_size`
    /// tirages de référence.
    pub fn cross_validation_windows(&self) -> CoreResult<(&'a [Draw], &'a [Draw])> {
        let sel = &self.config.selector;
        let draws = self.history.draws();
        let n = draws.len();
        let min_reference = self.config.split.min_split_size;

        let cv = sel.cv_window.min(n.saturating_sub(min_reference));
        if cv == 0 {
            return Err(CoreError::SplitTooSmall {
                train: n,
                test: 0,
                min: min_reference,
            });
        }
        if cv < sel.cv_window {
            warn!(
                "Fenêtre de validation croisée réduite à {cv} tirages (demandé : {})",
                sel.cv_window
            );
        }
        let (before, window) = draws.split_at(n - cv);
        let reference = &before[before.len().saturating_sub(sel.reference_window)..];
        Ok((reference, window))
    }

    pub fn replay(&self, universe: &Universe, window: &[Draw]) -> CrossValidation {
        let sel = &self.config.selector;
        let tiers: Vec<TierReplay> = universe
            .tiers(&sel.all_tiers())
            .into_iter()
            .map(|t| TierReplay {
                size: t.size,
                report: correlate(&t.numbers, window, sel.hit_threshold),
            })
            .collect();
        let primary_tier = universe.tier(sel.primary_tier());
        let primary = TierReplay {
            size: primary_tier.size,
            report: correlate(&primary_tier.numbers, window, sel.hit_threshold),
        };
        let passed = primary.report.hit_rate >= sel.min_hit_rate
            && primary.report.mean_correlation >= sel.min_correlation;
        CrossValidation {
            reference_size: universe.reference_size,
            window_size: window.len(),
            primary,
            tiers,
            passed,
        }
    }

    /// Boucle SELECT_INDICATORS → BUILD_UNIVERSE → CROSS_VALIDATE, séquentielle.
    pub fn run(
        &self,
        validation: &ValidationReport,
        ranker: &dyn IndicatorRanker,
    ) -> CoreResult<UniverseSelection> {
        let sel = &self.config.selector;
        let (reference, window) = self.cross_validation_windows()?;

        let mut state = SelectorState::SelectIndicators;
        let mut penalties = Penalties::new();
        let mut failures = 0usize;
        let mut attempts = 0usize;
        let mut selected: Vec<RankedIndicator> = Vec::new();
        let mut weights: Vec<IndicatorWeight> = Vec::new();
        let mut candidate: Option<Universe> = None;
        let mut best: Option<Attempt> = None;
        let mut accepted: Option<Attempt> = None;

        while !state.is_terminal() {
            let outcome = match state {
                SelectorState::SelectIndicators => {
                    attempts += 1;
                    let ranked = ranker.rank(validation, &penalties);
                    if ranked.is_empty() {
                        return Err(no_usable_indicator(validation));
                    }
                    if ranked.len() < sel.subset_size {
                        warn!(
                            "{} indicateurs classables, {} requis",
                            ranked.len(),
                            sel.subset_size
                        );
                        return Err(CoreError::InsufficientIndicators {
                            available: ranked.len(),
                            required: sel.subset_size,
                        });
                    }
                    selected = ranked.into_iter().take(sel.subset_size).collect();
                    weights = weights_for(&selected);
                    info!(
                        "Tentative {attempts} : indicateurs {:?}",
                        selected.iter().map(|r| r.name.as_str()).collect::<Vec<_>>()
                    );
                    StepOutcome::Completed
                }
                SelectorState::BuildUniverse => {
                    candidate = Some(build_universe(self.registry, &weights, reference, sel.universe_size)?);
                    StepOutcome::Completed
                }
                SelectorState::CrossValidate => {
                    let Some(universe) = candidate.take() else {
                        return Err(CoreError::InvalidConfig("univers candidat absent".into()));
                    };
                    let cv = self.replay(&universe, window);
                    info!(
                        "Validation croisée TOP {} : taux {:.3}, corrélation {:.3}",
                        cv.primary.size, cv.primary.report.hit_rate, cv.primary.report.mean_correlation
                    );
                    let attempt = Attempt {
                        indicators: selected.clone(),
                        weights: weights.clone(),
                        cross_validation: cv,
                    };
                    if attempt.cross_validation.passed {
                        accepted = Some(attempt);
                        StepOutcome::Passed
                    } else {
                        failures += 1;
                        for r in &selected {
                            *penalties.entry(r.name.clone()).or_insert(0.0) += sel.retry_penalty;
                        }
                        let improves = best
                            .as_ref()
                            .is_none_or(|b| attempt.cross_validation.better_than(&b.cross_validation));
                        if improves {
                            best = Some(attempt);
                        }
                        StepOutcome::Failed
                    }
                }
                SelectorState::Accepted | SelectorState::RetryExhausted => break,
            };
            let next = transition(state, outcome, failures, sel.max_retries);
            info!("Sélecteur : {state} → {next}");
            state = next;
        }

        let (chosen, status) = match accepted {
            Some(a) => (a, SelectionStatus::Accepted),
            None => {
                let Some(b) = best else {
                    return Err(no_usable_indicator(validation));
                };
                warn!("Aucune sélection n'a passé la validation croisée, meilleure tentative conservée");
                (b, SelectionStatus::RetryExhausted { retries: failures.saturating_sub(1) })
            }
        };

        let latest = self.history.tail(sel.reference_window);
        let universe = build_universe(self.registry, &chosen.weights, latest, sel.universe_size)?;
        let tiers = universe.tiers(&sel.all_tiers());

        Ok(UniverseSelection {
            ranking_source: ranker.source(),
            indicators: chosen.indicators,
            weights: chosen.weights,
            universe,
            tiers,
            cross_validation: chosen.cross_validation,
            status,
            attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{make_biased_draws, make_test_draws};
    use crate::indicators::default_registry;
    use crate::validation::validate;
    use ranker::StabilityRanker;

    fn run(draws: Vec<megasena_db::models::Draw>, config: &PipelineConfig) -> CoreResult<UniverseSelection> {
        let registry = default_registry();
        let history = History::new(draws).unwrap();
        let validation = validate(&history, &registry, &registry.names(), config).unwrap();
        ConservativeSelector::new(&history, &registry, config).run(&validation, &StabilityRanker)
    }

    #[test]
    fn test_transition_happy_path() {
        use SelectorState::*;
        let s = transition(SelectIndicators, StepOutcome::Completed, 0, 3);
        assert_eq!(s, BuildUniverse);
        let s = transition(s, StepOutcome::Completed, 0, 3);
        assert_eq!(s, CrossValidate);
        assert_eq!(transition(s, StepOutcome::Passed, 0, 3), Accepted);
    }

    #[test]
    fn test_transition_retries_then_exhausts() {
        use SelectorState::*;
        assert_eq!(transition(CrossValidate, StepOutcome::Failed, 1, 3), SelectIndicators);
        assert_eq!(transition(CrossValidate, StepOutcome::Failed, 3, 3), SelectIndicators);
        assert_eq!(transition(CrossValidate, StepOutcome::Failed, 4, 3), RetryExhausted);
        assert_eq!(transition(CrossValidate, StepOutcome::Failed, 1, 0), RetryExhausted);
    }

    #[test]
    fn test_terminal_states_are_absorbing() {
        use SelectorState::*;
        for outcome in [StepOutcome::Completed, StepOutcome::Passed, StepOutcome::Failed] {
            assert_eq!(transition(Accepted, outcome, 9, 3), Accepted);
            assert_eq!(transition(RetryExhausted, outcome, 0, 3), RetryExhausted);
        }
        assert!(Accepted.is_terminal() && RetryExhausted.is_terminal());
        assert!(!CrossValidate.is_terminal());
    }

    #[test]
    fn test_biased_history_selects_low_numbers_first_try() {
        let config = PipelineConfig::default();
        let selection = run(make_biased_draws(260, 42), &config).unwrap();
        assert_eq!(selection.status, SelectionStatus::Accepted);
        assert_eq!(selection.attempts, 1);
        assert_eq!(selection.indicators.len(), 6);
        assert_eq!(selection.primary_tier().sorted_numbers(), (1..=9).collect::<Vec<u8>>());
        assert!(selection.cross_validation.primary.report.hit_rate > config.selector.min_hit_rate);
        assert_eq!(selection.cross_validation.window_size, 200);
        assert_eq!(selection.cross_validation.reference_size, 60);
    }

    #[test]
    fn test_tiers_nested() {
        let selection = run(make_biased_draws(260, 42), &PipelineConfig::default()).unwrap();
        let sizes: Vec<usize> = selection.tiers.iter().map(|t| t.size).collect();
        assert_eq!(sizes, vec![25, 20, 15, 10, 9]);
        let top25 = &selection.tiers[0].numbers;
        let top20 = &selection.tiers[1].numbers;
        let top9 = &selection.tiers[4].numbers;
        assert!(top9.iter().all(|n| top20.contains(n)));
        assert!(top20.iter().all(|n| top25.contains(n)));
    }

    #[test]
    fn test_retry_exhausted_keeps_best() {
        let mut config = PipelineConfig::default();
        config.selector.min_hit_rate = 1.0;
        config.selector.min_correlation = 1.0;
        config.selector.max_retries = 2;
        let selection = run(make_test_draws(260), &config).unwrap();
        assert_eq!(selection.status, SelectionStatus::RetryExhausted { retries: 2 });
        assert_eq!(selection.attempts, 3);
        if let SelectionStatus::RetryExhausted { retries } = selection.status {
            assert_eq!(retries, selection.attempts - 1);
        }
        assert!(!selection.passed());
        assert!(!selection.cross_validation.passed);
        assert_eq!(selection.primary_tier().size, 9);
    }

    struct ShortRanker;

    impl IndicatorRanker for ShortRanker {
        fn source(&self) -> String {
            "court".to_string()
        }

        fn rank(&self, validation: &ValidationReport, penalties: &Penalties) -> Vec<RankedIndicator> {
            StabilityRanker.rank(validation, penalties).into_iter().take(2).collect()
        }
    }

    #[test]
    fn test_too_few_ranked_indicators_is_an_error() {
        let registry = default_registry();
        let config = PipelineConfig::default();
        let history = History::new(make_biased_draws(260, 42)).unwrap();
        let validation = validate(&history, &registry, &registry.names(), &config).unwrap();
        let result = ConservativeSelector::new(&history, &registry, &config).run(&validation, &ShortRanker);
        let err = result.unwrap_err();
        assert_eq!(err, CoreError::InsufficientIndicators { available: 2, required: 6 });
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_selection_is_deterministic() {
        let config = PipelineConfig::default();
        let a = run(make_biased_draws(260, 9), &config).unwrap();
        let b = run(make_biased_draws(260, 9), &config).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_short_history_shrinks_cv_window() {
        let registry = default_registry();
        let config = PipelineConfig::default();
        let history = History::new(make_test_draws(100)).unwrap();
        let selector = ConservativeSelector::new(&history, &registry, &config);
        let (reference, window) = selector.cross_validation_windows().unwrap();
        assert_eq!(window.len(), 70);
        assert_eq!(reference.len(), 30);

        let tiny = History::new(make_test_draws(20)).unwrap();
        let selector = ConservativeSelector::new(&tiny, &registry, &config);
        assert!(matches!(
            selector.cross_validation_windows(),
            Err(CoreError::SplitTooSmall { .. })
        ));
    }
}
