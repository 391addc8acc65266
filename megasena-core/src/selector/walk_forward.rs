use log::info;
use rayon::prelude::*;

use crate::config::PipelineConfig;
use crate::correlation::{DrawHits, RetroCorrelationReport, overlap, summarize_hits};
use crate::error::{CoreError, CoreResult};
use crate::history::History;
use crate::indicators::IndicatorRegistry;
use crate::universe::{IndicatorWeight, build_universe};

/// Validation rétroactive pas à pas : pour chacun des `last_n` derniers
/// tirages, le palier principal est reconstruit à partir des seuls tirages
/// antérieurs puis comparé au tirage réel. Aucune fuite du futur.
pub fn walk_forward(
    history: &History,
    registry: &IndicatorRegistry,
    weights: &[IndicatorWeight],
    config: &PipelineConfig,
    last_n: usize,
    progress: Option<&(dyn Fn() + Sync)>,
) -> CoreResult<RetroCorrelationReport> {
    let sel = &config.selector;
    let draws = history.draws();
    let n = draws.len();
    let min_reference = config.split.min_split_size;

    let last_n = last_n.min(n.saturating_sub(min_reference));
    if last_n == 0 {
        return Err(CoreError::SplitTooSmall {
            train: n,
            test: 0,
            min: min_reference,
        });
    }

    let tier_size = sel.primary_tier();
    info!("Validation pas à pas sur {last_n} tirages (TOP {tier_size})");

    let overlaps: Vec<DrawHits> = (n - last_n..n)
        .into_par_iter()
        .map(|t| {
            let start = t.saturating_sub(sel.reference_window);
            let universe = build_universe(registry, weights, &draws[start..t], tier_size)?;
            if let Some(tick) = progress {
                tick();
            }
            Ok(DrawHits {
                sequence_id: draws[t].sequence_id,
                hits: overlap(&universe.numbers(), &draws[t]),
            })
        })
        .collect::<CoreResult<_>>()?;

    Ok(summarize_hits(tier_size, sel.hit_threshold, &overlaps))
}
