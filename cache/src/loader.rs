use crate::error::{BoxError, LoadError};

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, Thread};

use parking_lot::Mutex;

/// A value producer: computes the value for a missing key.
pub(crate) type Loader<V> = Arc<dyn Fn(&str) -> Result<V, BoxError> + Send + Sync>;

/// The result every caller waiting on a load receives.
pub(crate) type LoadOutcome<V> = Result<Arc<V>, LoadError>;

/// The internal state of a value being loaded.
pub(crate) enum State<V> {
  Computing,
  Complete(LoadOutcome<V>),
}

/// The internal, mutex-protected core of the LoadFuture.
pub(crate) struct Inner<V> {
  pub(crate) state: State<V>,
  pub(crate) waiters: VecDeque<Thread>,
}

/// A value being computed for one key. The leader runs the producer and
/// completes it; any number of follower threads can block on `wait`.
pub(crate) struct LoadFuture<V> {
  pub(crate) inner: Mutex<Inner<V>>,
}

impl<V> LoadFuture<V> {
  /// Creates a new `LoadFuture` in the "Computing" state.
  pub(crate) fn new() -> Self {
    Self {
      inner: Mutex::new(Inner {
        state: State::Computing,
        waiters: VecDeque::new(),
      }),
    }
  }

  /// Completes the future, waking all waiters.
  pub(crate) fn complete(&self, outcome: LoadOutcome<V>) {
    let mut inner = self.inner.lock();
    inner.state = State::Complete(outcome);
    for waiter in inner.waiters.drain(..) {
      waiter.unpark();
    }
  }

  /// Blocks the current thread until the leader completes the load.
  pub(crate) fn wait(&self) -> LoadOutcome<V> {
    loop {
      {
        let mut inner = self.inner.lock();
        if let State::Complete(outcome) = &inner.state {
          return outcome.clone();
        }
        inner.waiters.push_back(thread::current());
      }
      // An unpark issued between releasing the lock and parking is not lost:
      // it leaves the token set and `park` returns immediately.
      thread::park();
    }
  }
}

/// Completes the load with an error if the leader unwinds before finishing,
/// so followers are never left parked.
pub(crate) struct LeaderGuard<'a, V> {
  future: &'a LoadFuture<V>,
  armed: bool,
}

impl<'a, V> LeaderGuard<'a, V> {
  pub(crate) fn new(future: &'a LoadFuture<V>) -> Self {
    Self {
      future,
      armed: true,
    }
  }

  pub(crate) fn complete(mut self, outcome: LoadOutcome<V>) {
    self.armed = false;
    self.future.complete(outcome);
  }
}

impl<'a, V> Drop for LeaderGuard<'a, V> {
  fn drop(&mut self) {
    if self.armed {
      let err: BoxError = "value producer panicked".into();
      self.future.complete(Err(LoadError::from(err)));
    }
  }
}
