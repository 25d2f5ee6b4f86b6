use crate::engine::EngineShared;
use crate::instance::CacheInstance;

use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use ahash::{HashSet, HashSetExt};
use parking_lot::{Condvar, Mutex};
use tracing::debug;

/// Background loads that may wait for the worker at once. Further requests
/// are dropped until it catches up.
pub(crate) const MAX_QUEUED_LOADS: usize = 64;

/// A key to load through an instance's loader.
pub(crate) struct LoadRequest<V> {
  pub(crate) instance: Arc<CacheInstance<V>>,
  pub(crate) key: String,
}

impl<V> LoadRequest<V> {
  fn id(&self) -> (String, String) {
    (self.instance.name().to_string(), self.key.clone())
  }
}

struct QueueState<V> {
  requests: VecDeque<LoadRequest<V>>,
  /// `(cache, key)` of every queued request.
  queued: HashSet<(String, String)>,
  stopped: bool,
}

/// A bounded FIFO of background loads, shared by the engine and its worker.
pub(crate) struct LoadQueue<V> {
  state: Mutex<QueueState<V>>,
  available: Condvar,
  capacity: usize,
}

impl<V> LoadQueue<V> {
  pub(crate) fn new(capacity: usize) -> Self {
    Self {
      state: Mutex::new(QueueState {
        requests: VecDeque::new(),
        queued: HashSet::new(),
        stopped: false,
      }),
      available: Condvar::new(),
      capacity,
    }
  }

  /// Queues a load. Returns `false` if the key is already queued, the queue
  /// is full or the worker has stopped.
  pub(crate) fn push(&self, request: LoadRequest<V>) -> bool {
    let mut state = self.state.lock();
    if state.stopped {
      return false;
    }
    if state.requests.len() >= self.capacity {
      debug!(
        cache = request.instance.name(),
        key = request.key.as_str(),
        "background load queue is full, dropping request"
      );
      return false;
    }
    if !state.queued.insert(request.id()) {
      return false;
    }
    state.requests.push_back(request);
    drop(state);
    self.available.notify_one();
    true
  }

  /// Blocks until a request is available. `None` once the queue is stopped.
  fn pop(&self) -> Option<LoadRequest<V>> {
    let mut state = self.state.lock();
    loop {
      if state.stopped {
        return None;
      }
      if let Some(request) = state.requests.pop_front() {
        state.queued.remove(&request.id());
        return Some(request);
      }
      self.available.wait(&mut state);
    }
  }

  /// Drops every queued request and wakes the worker so it can exit.
  fn stop(&self) {
    let mut state = self.state.lock();
    state.stopped = true;
    state.requests.clear();
    state.queued.clear();
    drop(state);
    self.available.notify_all();
  }

  #[cfg(test)]
  fn len(&self) -> usize {
    self.state.lock().requests.len()
  }
}

/// The single thread that runs background loads: prefetches requested by
/// eviction and `predictive_load` reads.
///
/// Like the janitor it holds only a weak reference to the engine.
pub(crate) struct Prefetcher<V> {
  handle: JoinHandle<()>,
  queue: Arc<LoadQueue<V>>,
}

impl<V> Prefetcher<V>
where
  V: Send + Sync + 'static,
{
  pub(crate) fn spawn(shared: Weak<EngineShared<V>>, queue: Arc<LoadQueue<V>>) -> Self {
    let worker_queue = Arc::clone(&queue);

    let handle = thread::spawn(move || {
      debug!("background loader started");
      while let Some(request) = worker_queue.pop() {
        match shared.upgrade() {
          Some(shared) => shared.background_load(&request.instance, &request.key),
          None => break,
        }
      }
      debug!("background loader stopped");
    });

    Self { handle, queue }
  }
}

impl<V> Prefetcher<V> {
  /// Discards pending requests and waits for an in-flight load to finish.
  pub(crate) fn stop(self) {
    self.queue.stop();
    if self.handle.thread().id() != thread::current().id() {
      let _ = self.handle.join();
    }
  }
}
