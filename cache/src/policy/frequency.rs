use super::{min_by_rank, EvictionContext, EvictionStrategy, Selection};

/// Evicts the least accessed entry; among equals, the one accessed longest ago.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct FrequencyStrategy;

impl EvictionStrategy for FrequencyStrategy {
  fn select_victim<V>(&self, ctx: &mut EvictionContext<'_, V>) -> Selection {
    min_by_rank(ctx.candidates(), |entry| {
      (entry.access_count, entry.last_accessed_at)
    })
  }
}
