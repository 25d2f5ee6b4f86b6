//! Background tasks of the engine: the janitor, which drives expiry sweeps,
//! pattern pruning and self-tuning on a fixed period, and the prefetcher,
//! which runs background loads one at a time from a bounded queue.

pub(crate) mod janitor;
pub(crate) mod prefetcher;
