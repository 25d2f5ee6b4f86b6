use super::weighted::WeightedScoreStrategy;
use super::{EvictionContext, EvictionStrategy, Selection};

/// Number of absent keys requested from the predictor per eviction.
pub(crate) const PREFETCH_CANDIDATES: usize = 5;

/// Queues loads for the keys most likely to be requested next that are not
/// currently cached, then evicts like [`WeightedScoreStrategy`].
///
/// The loads themselves run after the instance lock is released.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct PredictivePrefetchStrategy;

impl EvictionStrategy for PredictivePrefetchStrategy {
  fn select_victim<V>(&self, ctx: &mut EvictionContext<'_, V>) -> Selection {
    if ctx.can_prefetch {
      let wanted: Vec<String> = ctx
        .predictor
        .predictions(ctx.now)
        .into_iter()
        .filter(|prediction| !ctx.entries.contains_key(&prediction.key))
        .filter(|prediction| ctx.protected != Some(prediction.key.as_str()))
        .take(PREFETCH_CANDIDATES)
        .map(|prediction| prediction.key)
        .collect();

      for key in wanted {
        if !ctx.prefetch.contains(&key) {
          ctx.prefetch.push(key);
        }
      }
    }

    WeightedScoreStrategy.select_victim(ctx)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::policy::test_support::{entries, EntryFixture};
  use crate::policy::ScoreWeights;
  use crate::predictor::{AccessKind, UsagePredictor};
  use std::time::Duration;

  #[test]
  fn requests_top_absent_keys_and_still_evicts() {
    let now = Duration::from_secs(1);
    let mut predictor = UsagePredictor::new(32);
    for key in ["cached", "p1", "p2", "p3", "p4", "p5", "p6"] {
      predictor.update_pattern(key, AccessKind::Hit, now);
    }
    predictor.update_pattern("cold", AccessKind::Miss, now);

    let map = entries(vec![EntryFixture::new("cached"), EntryFixture::new("other")]);
    let weights = ScoreWeights::default();
    let mut ctx = EvictionContext {
      entries: &map,
      predictor: &predictor,
      weights: &weights,
      now,
      protected: None,
      can_prefetch: true,
      prefetch: Vec::new(),
    };

    let selection = PredictivePrefetchStrategy.select_victim(&mut ctx);
    assert_eq!(selection, Selection::Victim("other".into()));
    assert_eq!(ctx.prefetch, vec!["p1", "p2", "p3", "p4", "p5"]);
  }

  #[test]
  fn without_a_loader_nothing_is_requested() {
    let now = Duration::from_secs(1);
    let mut predictor = UsagePredictor::new(8);
    predictor.update_pattern("p1", AccessKind::Hit, now);

    let map = entries(vec![EntryFixture::new("a")]);
    let weights = ScoreWeights::default();
    let mut ctx = EvictionContext {
      entries: &map,
      predictor: &predictor,
      weights: &weights,
      now,
      protected: None,
      can_prefetch: false,
      prefetch: Vec::new(),
    };

    assert_eq!(
      PredictivePrefetchStrategy.select_victim(&mut ctx),
      Selection::Victim("a".into())
    );
    assert!(ctx.prefetch.is_empty());
  }
}
