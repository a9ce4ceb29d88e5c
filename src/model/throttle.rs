//! # Change throttle
//!
//! Per-scope batching of change events on a fixed window. Every model owns
//! one throttle; its fields and arrays report `{old, new}` pairs here and
//! subscribers hear about them once per window.
//!
//! Within a window the last reported `new` wins while the `old` of the first
//! report is kept, so a burst of assignments collapses into one change from
//! the value before the burst to the value after it.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use crate::config::SymeConfig;
use crate::host::{Scheduler, TaskHandle, TokioScheduler};

use super::definition::WILDCARD;
use super::errors::{ModelError, ModelResult};
use super::value::{Change, ChangeSet};

/// Default batching window
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(10);

/// Callback for a single scope
pub type ScopeCallback = Arc<dyn Fn(&Change) + Send + Sync>;

/// Callback for the wildcard scope, receiving every pending scope at once
pub type BatchCallback = Arc<dyn Fn(&ChangeSet) + Send + Sync>;

#[derive(Default)]
struct ThrottleState {
    pending: ChangeSet,
    scope_callbacks: HashMap<String, Vec<ScopeCallback>>,
    batch_callbacks: Vec<BatchCallback>,
    timer: Option<TaskHandle>,
}

struct ThrottleInner {
    window: Duration,
    scheduler: Arc<dyn Scheduler>,
    state: Mutex<ThrottleState>,
}

/// Coalesces change events per scope and delivers them once per window
#[derive(Clone)]
pub struct ChangeThrottle {
    inner: Arc<ThrottleInner>,
}

impl fmt::Debug for ChangeThrottle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeThrottle")
            .field("window", &self.inner.window)
            .field("armed", &self.is_armed())
            .finish()
    }
}

impl Default for ChangeThrottle {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeThrottle {
    /// Throttle on the tokio scheduler with the default window
    pub fn new() -> Self {
        Self::with_scheduler(Arc::new(TokioScheduler))
    }

    pub fn with_scheduler(scheduler: Arc<dyn Scheduler>) -> Self {
        Self::with_window(scheduler, DEFAULT_WINDOW)
    }

    /// Throttle on `scheduler` with the configured window
    pub fn from_config(scheduler: Arc<dyn Scheduler>, config: &SymeConfig) -> Self {
        Self::with_window(scheduler, config.throttle_window())
    }

    pub fn with_window(scheduler: Arc<dyn Scheduler>, window: Duration) -> Self {
        Self {
            inner: Arc::new(ThrottleInner {
                window,
                scheduler,
                state: Mutex::new(ThrottleState::default()),
            }),
        }
    }

    pub fn window(&self) -> Duration {
        self.inner.window
    }

    /// Record `change` as pending for `scope`.
    ///
    /// Dropped when nobody listens to `scope` or to the wildcard. Arms the
    /// window timer if it is not already running.
    pub fn add(&self, scope: &str, change: Change) {
        let Ok(mut state) = self.inner.state.lock() else {
            return;
        };

        if !state.scope_callbacks.contains_key(scope) && state.batch_callbacks.is_empty() {
            return;
        }

        match state.pending.get_mut(scope) {
            Some(pending) => pending.new = change.new,
            None => {
                state.pending.insert(scope.to_string(), change);
            }
        }

        if state.timer.is_some() {
            return;
        }

        let weak: Weak<ThrottleInner> = Arc::downgrade(&self.inner);
        let handle = self.inner.scheduler.schedule(
            self.inner.window,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    ChangeThrottle { inner }.fire();
                }
            }),
        );
        state.timer = Some(handle);
    }

    /// Subscribe to one scope.
    ///
    /// The wildcard scope is refused: a single [`Change`] does not say which
    /// field it belongs to. Use [`ChangeThrottle::on_fire_any`] for it.
    pub fn on_fire<F>(&self, scope: &str, callback: F) -> ModelResult<()>
    where
        F: Fn(&Change) + Send + Sync + 'static,
    {
        if scope == WILDCARD {
            return Err(ModelError::WildcardScope);
        }

        let mut state = self.inner.state.lock().map_err(|_| ModelError::poisoned())?;
        state
            .scope_callbacks
            .entry(scope.to_string())
            .or_default()
            .push(Arc::new(callback));
        Ok(())
    }

    /// Subscribe to the wildcard scope
    pub fn on_fire_any<F>(&self, callback: F)
    where
        F: Fn(&ChangeSet) + Send + Sync + 'static,
    {
        if let Ok(mut state) = self.inner.state.lock() {
            state.batch_callbacks.push(Arc::new(callback));
        }
    }

    /// Deliver everything pending and disarm the timer.
    ///
    /// Wildcard subscribers get the whole batch first, then each scope's
    /// subscribers get their own change. A no-op when nothing is pending.
    pub fn fire(&self) {
        let (pending, scope_callbacks, batch_callbacks) = {
            let Ok(mut state) = self.inner.state.lock() else {
                return;
            };

            if let Some(timer) = state.timer.take() {
                timer.cancel();
            }

            if state.pending.is_empty() {
                return;
            }

            let pending = std::mem::take(&mut state.pending);
            let scope_callbacks: Vec<(String, Vec<ScopeCallback>)> = pending
                .keys()
                .filter_map(|scope| {
                    state
                        .scope_callbacks
                        .get(scope)
                        .map(|callbacks| (scope.clone(), callbacks.clone()))
                })
                .collect();
            (pending, scope_callbacks, state.batch_callbacks.clone())
        };

        for callback in &batch_callbacks {
            callback(&pending);
        }

        for (scope, callbacks) in scope_callbacks {
            if let Some(change) = pending.get(&scope) {
                for callback in &callbacks {
                    callback(change);
                }
            }
        }
    }

    /// Whether a window is currently open
    pub fn is_armed(&self) -> bool {
        self.inner
            .state
            .lock()
            .map(|state| state.timer.is_some())
            .unwrap_or(false)
    }

    /// Scopes waiting for the current window to close
    pub fn pending_scopes(&self) -> Vec<String> {
        self.inner
            .state
            .lock()
            .map(|state| state.pending.keys().cloned().collect())
            .unwrap_or_default()
    }
}
