use super::{EvictionContext, EvictionStrategy, Selection};

/// Selects every entry whose TTL has elapsed. The only strategy that can
/// free more than one entry per call.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ExpiryStrategy;

impl EvictionStrategy for ExpiryStrategy {
  fn select_victim<V>(&self, ctx: &mut EvictionContext<'_, V>) -> Selection {
    let now = ctx.now;
    let mut expired: Vec<String> = ctx
      .candidates()
      .filter(|entry| entry.is_expired(now))
      .map(|entry| entry.key.clone())
      .collect();

    if expired.is_empty() {
      Selection::NoVictim
    } else {
      expired.sort();
      Selection::Expired(expired)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::policy::test_support::{entries, EntryFixture};
  use crate::policy::ScoreWeights;
  use crate::predictor::UsagePredictor;
  use std::time::Duration;

  fn select(specs: Vec<EntryFixture>, now_ms: u64) -> Selection {
    let map = entries(specs);
    let predictor = UsagePredictor::new(8);
    let weights = ScoreWeights::default();
    let mut ctx = EvictionContext {
      entries: &map,
      predictor: &predictor,
      weights: &weights,
      now: Duration::from_millis(now_ms),
      protected: None,
      can_prefetch: false,
      prefetch: Vec::new(),
    };
    ExpiryStrategy.select_victim(&mut ctx)
  }

  #[test]
  fn selects_all_expired_entries_at_once() {
    let selection = select(
      vec![
        EntryFixture::new("c").ttl(100),
        EntryFixture::new("a").ttl(50),
        EntryFixture::new("b").ttl(10_000),
        EntryFixture::new("d"),
      ],
      200,
    );
    assert_eq!(selection, Selection::Expired(vec!["a".into(), "c".into()]));
  }

  #[test]
  fn nothing_expired_means_no_victim() {
    let selection = select(vec![EntryFixture::new("a").ttl(1_000), EntryFixture::new("b")], 10);
    assert_eq!(selection, Selection::NoVictim);
  }
}
