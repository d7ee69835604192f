//! Cancellable interval timers.
//!
//! Used for the consent freshness check and the ad-state refresh. A task
//! stops and joins its thread on `cancel()` or drop, so remounting a screen
//! never leaks timers.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex, MutexGuard};

struct Signal {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

pub struct PeriodicTask {
    name: String,
    signal: Arc<Signal>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    /// Run `tick` every `period` on a named background thread.
    pub fn spawn<F>(name: &str, period: Duration, mut tick: F) -> std::io::Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let signal = Arc::new(Signal {
            cancelled: Mutex::new(false),
            wake: Condvar::new(),
        });
        let thread_signal = Arc::clone(&signal);

        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let mut cancelled = thread_signal.cancelled.lock();
                while !*cancelled {
                    let result = thread_signal.wake.wait_for(&mut cancelled, period);
                    if *cancelled {
                        break;
                    }
                    if result.timed_out() {
                        MutexGuard::unlocked(&mut cancelled, &mut tick);
                    }
                }
            })?;

        log::debug!("TIMER_STARTED name={} period_ms={}", name, period.as_millis());
        Ok(Self {
            name: name.to_string(),
            signal,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Stop the timer and wait for an in-progress tick to finish.
    pub fn cancel(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        *self.signal.cancelled.lock() = true;
        self.signal.wake.notify_all();
        if handle.join().is_err() {
            log::error!("TIMER_PANICKED name={}", self.name);
        }
        log::debug!("TIMER_CANCELLED name={}", self.name);
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.cancel();
    }
}
