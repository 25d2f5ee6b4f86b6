use super::{min_by_rank, EvictionContext, EvictionStrategy, Selection};

/// Evicts the entry whose last access is oldest.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct RecencyStrategy;

impl EvictionStrategy for RecencyStrategy {
  fn select_victim<V>(&self, ctx: &mut EvictionContext<'_, V>) -> Selection {
    min_by_rank(ctx.candidates(), |entry| entry.last_accessed_at)
  }
}
