//! Rest countdown between sets.
//!
//! The countdown itself is driven by a [`TimerService`]; [`RestTimer`] only
//! keeps the observable state and the moment the rest ran out, which the
//! runner consumes on its next step.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::debug;

pub type TickFn = Box<dyn FnMut(u32) + Send>;
pub type CompleteFn = Box<dyn FnOnce() + Send>;

/// Handle to one running countdown.
pub trait TimerHandle: Send + Sync {
    fn cancel(&self);
}

/// Scheduling primitive behind the rest timer. `on_tick` receives the
/// remaining seconds after each elapsed second; `on_complete` fires once at
/// zero unless the handle was cancelled first.
pub trait TimerService: Send + Sync {
    fn start(&self, duration_secs: u32, on_tick: TickFn, on_complete: CompleteFn)
        -> Box<dyn TimerHandle>;
}

/// One tick per second on the tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTimerService;

struct TokioTimerHandle(JoinHandle<()>);

impl TimerHandle for TokioTimerHandle {
    fn cancel(&self) {
        self.0.abort();
    }
}

impl TimerService for TokioTimerService {
    fn start(
        &self,
        duration_secs: u32,
        mut on_tick: TickFn,
        on_complete: CompleteFn,
    ) -> Box<dyn TimerHandle> {
        let handle = tokio::spawn(async move {
            let mut interval = time::interval(Duration::from_secs(1));
            // first tick completes immediately
            interval.tick().await;
            let mut remaining = duration_secs;
            while remaining > 0 {
                interval.tick().await;
                remaining -= 1;
                on_tick(remaining);
            }
            on_complete();
        });
        Box::new(TokioTimerHandle(handle))
    }
}

struct ManualEntry {
    remaining: u32,
    on_tick: TickFn,
    on_complete: Option<CompleteFn>,
    cancelled: Arc<AtomicBool>,
}

/// Timer service that only moves when [`advance`](Self::advance) is called.
#[derive(Clone, Default)]
pub struct ManualTimerService {
    entries: Arc<Mutex<Vec<ManualEntry>>>,
}

struct ManualTimerHandle(Arc<AtomicBool>);

impl TimerHandle for ManualTimerHandle {
    fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl ManualTimerService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ticks every live countdown `secs` times.
    pub fn advance(&self, secs: u32) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        for _ in 0..secs {
            entries.retain(|entry| !entry.cancelled.load(Ordering::SeqCst));
            for entry in entries.iter_mut() {
                entry.remaining = entry.remaining.saturating_sub(1);
                (entry.on_tick)(entry.remaining);
                if entry.remaining == 0 {
                    if let Some(on_complete) = entry.on_complete.take() {
                        on_complete();
                    }
                }
            }
            entries.retain(|entry| entry.on_complete.is_some());
        }
    }

    /// Countdowns that have neither fired nor been cancelled.
    pub fn active(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|entry| !entry.cancelled.load(Ordering::SeqCst))
            .count()
    }
}

impl TimerService for ManualTimerService {
    fn start(
        &self,
        duration_secs: u32,
        on_tick: TickFn,
        on_complete: CompleteFn,
    ) -> Box<dyn TimerHandle> {
        let cancelled = Arc::new(AtomicBool::new(false));
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(ManualEntry {
                remaining: duration_secs,
                on_tick,
                on_complete: Some(on_complete),
                cancelled: cancelled.clone(),
            });
        Box::new(ManualTimerHandle(cancelled))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestTimerState {
    pub active: bool,
    pub remaining: u32,
    pub total: u32,
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Shared {
    state: RestTimerState,
    elapsed_at: Option<DateTime<Utc>>,
    // bumped on every start/stop so callbacks of a replaced countdown are ignored
    epoch: u64,
}

pub struct RestTimer {
    service: Arc<dyn TimerService>,
    shared: Arc<Mutex<Shared>>,
    handle: Option<Box<dyn TimerHandle>>,
}

impl RestTimer {
    pub fn new(service: Arc<dyn TimerService>) -> Self {
        Self {
            service,
            shared: Arc::new(Mutex::new(Shared::default())),
            handle: None,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Starts a countdown, cancelling whatever was running.
    pub fn start(&mut self, seconds: u32, now: DateTime<Utc>) {
        self.cancel_handle();

        let epoch = {
            let mut shared = self.lock();
            shared.epoch += 1;
            shared.elapsed_at = (seconds == 0).then_some(now);
            shared.state = RestTimerState {
                active: seconds > 0,
                remaining: seconds,
                total: seconds,
                started_at: (seconds > 0).then_some(now),
            };
            shared.epoch
        };
        debug!(seconds, epoch, "rest_timer: started");

        if seconds == 0 {
            return;
        }

        let tick_shared = self.shared.clone();
        let on_tick: TickFn = Box::new(move |remaining| {
            let mut shared = tick_shared.lock().unwrap_or_else(|e| e.into_inner());
            if shared.epoch == epoch {
                shared.state.remaining = remaining;
            }
        });

        let done_shared = self.shared.clone();
        let ends_at = now + chrono::Duration::seconds(i64::from(seconds));
        let on_complete: CompleteFn = Box::new(move || {
            let mut shared = done_shared.lock().unwrap_or_else(|e| e.into_inner());
            if shared.epoch == epoch {
                shared.state = RestTimerState::default();
                shared.elapsed_at = Some(ends_at);
                debug!(epoch, "rest_timer: elapsed");
            }
        });

        self.handle = Some(self.service.start(seconds, on_tick, on_complete));
    }

    /// Idempotent; always leaves the timer inactive and zeroed.
    pub fn stop(&mut self) {
        self.cancel_handle();
        let mut shared = self.lock();
        shared.epoch += 1;
        shared.elapsed_at = None;
        if shared.state.active {
            debug!("rest_timer: stopped");
        }
        shared.state = RestTimerState::default();
    }

    /// When the last countdown reached zero on its own. Returned once.
    pub fn take_elapsed(&self) -> Option<DateTime<Utc>> {
        self.lock().elapsed_at.take()
    }

    pub fn state(&self) -> RestTimerState {
        self.lock().state.clone()
    }

    pub fn is_active(&self) -> bool {
        self.lock().state.active
    }

    fn cancel_handle(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.cancel();
        }
    }
}

impl Drop for RestTimer {
    fn drop(&mut self) {
        self.cancel_handle();
    }
}
