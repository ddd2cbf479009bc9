//! Trailing-edge debouncer shared by every publish path

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

type Sink<T> = Arc<dyn Fn(T) + Send + Sync>;

struct DebounceState<T> {
    pending: Option<T>,
    timer: Option<JoinHandle<()>>,
    generation: u64,
}

/// Collapses bursts of values into one delivery of the latest value.
///
/// The first trigger after an idle period arms a timer for `window`; later
/// triggers inside the window only replace the pending value. When the timer
/// fires the sink receives the most recent value exactly once. A continuous
/// stream of triggers therefore still delivers once per window.
///
/// The timer is a tokio task. Outside a runtime there is nothing to run it
/// on, so the value is delivered immediately instead.
pub struct Debouncer<T> {
    window: Duration,
    state: Arc<Mutex<DebounceState<T>>>,
    sink: Sink<T>,
}

impl<T: Send + 'static> Debouncer<T> {
    pub fn new(window: Duration, sink: impl Fn(T) + Send + Sync + 'static) -> Self {
        Self {
            window,
            state: Arc::new(Mutex::new(DebounceState { pending: None, timer: None, generation: 0 })),
            sink: Arc::new(sink),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record `value` as the latest, arming the timer if idle
    pub fn trigger(&self, value: T) {
        if self.window.is_zero() {
            (self.sink)(value);
            return;
        }

        let mut state = self.state.lock();
        state.pending = Some(value);
        if state.timer.is_some() {
            return;
        }

        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::warn!("Debounced value triggered outside a tokio runtime, delivering immediately");
                state.generation = state.generation.wrapping_add(1);
                let value = state.pending.take();
                drop(state);
                if let Some(value) = value {
                    (self.sink)(value);
                }
                return;
            }
        };

        let generation = state.generation;
        let window = self.window;
        let shared = Arc::clone(&self.state);
        let sink = Arc::clone(&self.sink);

        state.timer = Some(handle.spawn(async move {
            tokio::time::sleep(window).await;

            let value = {
                let mut state = shared.lock();
                // a flush in the meantime owns this round
                if state.generation != generation {
                    return;
                }
                state.generation = state.generation.wrapping_add(1);
                state.timer = None;
                state.pending.take()
            };

            if let Some(value) = value {
                sink(value);
            }
        }));
    }

    /// Deliver the pending value now, if any
    pub fn flush(&self) {
        if let Some(value) = self.take_pending() {
            (self.sink)(value);
        }
    }

    /// Whether a value is waiting for delivery
    pub fn is_pending(&self) -> bool {
        self.state.lock().pending.is_some()
    }

    fn take_pending(&self) -> Option<T> {
        let mut state = self.state.lock();
        state.generation = state.generation.wrapping_add(1);
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.pending.take()
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        if let Some(timer) = self.state.lock().timer.take() {
            timer.abort();
        }
    }
}
