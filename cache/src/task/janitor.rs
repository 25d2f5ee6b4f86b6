use crate::engine::EngineShared;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::debug;

/// The background thread that runs a maintenance pass every tick.
///
/// It only holds a weak reference to the engine, so a dropped engine ends the
/// loop even if `stop` is never called.
pub(crate) struct Janitor {
  handle: JoinHandle<()>,
  stop_flag: Arc<AtomicBool>,
}

impl Janitor {
  /// Spawns a new janitor thread.
  pub(crate) fn spawn<V>(shared: Weak<EngineShared<V>>, tick_interval: Duration) -> Self
  where
    V: Send + Sync + 'static,
  {
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_clone = stop_flag.clone();

    let handle = thread::spawn(move || {
      debug!(?tick_interval, "janitor started");
      loop {
        // Parks until the next tick. `stop` unparks the thread so shutdown
        // does not wait out the interval.
        let deadline = Instant::now() + tick_interval;
        while !stop_clone.load(Ordering::Acquire) {
          let now = Instant::now();
          if now >= deadline {
            break;
          }
          thread::park_timeout(deadline - now);
        }
        if stop_clone.load(Ordering::Acquire) {
          break;
        }

        match shared.upgrade() {
          Some(shared) => {
            if shared.run_maintenance().is_none() {
              debug!("janitor tick skipped, a maintenance pass is already running");
            }
          }
          None => break,
        }
      }
      debug!("janitor stopped");
    });

    Self { handle, stop_flag }
  }

  /// Signals the janitor thread to stop and waits for it to exit.
  pub(crate) fn stop(self) {
    self.stop_flag.store(true, Ordering::Release);
    self.handle.thread().unpark();
    if self.handle.thread().id() != thread::current().id() {
      let _ = self.handle.join();
    }
  }
}
