//! Single-writer holder for the session state.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::codec::SupportedCodecs;
use crate::error::AppError;
use crate::prefs::{PreferenceStore, Preferences};

use super::action::{Action, reduce};
use super::state::SessionState;

pub type Observer = Box<dyn Fn(&SessionState) + Send + Sync>;

pub struct Session {
    state: Mutex<SessionState>,
    observers: Mutex<Vec<Observer>>,
    store: Arc<dyn PreferenceStore>,
}

impl Session {
    /// Start a session with the persisted preferences from `store`.
    pub fn new(store: Arc<dyn PreferenceStore>, supported: SupportedCodecs) -> Self {
        let prefs = Preferences::load(store.as_ref());
        log::debug!(
            target: "squish_vid::session",
            "Loaded preferences: saved={} bytes, show_bitrate={}, use_mbps={}",
            prefs.total_saved_bytes,
            prefs.display.show_bitrate,
            prefs.display.use_mbps
        );
        Self {
            state: Mutex::new(SessionState::new(supported, prefs)),
            observers: Mutex::new(Vec::new()),
            store,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.lock().clone()
    }

    /// Called with the new state after every successful dispatch. Observers
    /// must not dispatch.
    pub fn subscribe(&self, observer: Observer) {
        self.observers.lock().push(observer);
    }

    /// Reduce `action` into the current state and notify observers.
    ///
    /// A failed reduction leaves the state untouched. Preference changes are
    /// persisted before the lock is released; observers run after.
    pub fn dispatch(&self, action: Action) -> Result<SessionState, AppError> {
        let next = {
            let mut guard = self.state.lock();
            let next = reduce(&guard, action)?;
            if next.prefs != guard.prefs
                && let Err(err) = next.prefs.save_changes(&guard.prefs, self.store.as_ref())
            {
                log::warn!(
                    target: "squish_vid::session",
                    "Failed to persist preferences: {}",
                    err
                );
            }
            *guard = next.clone();
            next
        };

        for observer in self.observers.lock().iter() {
            observer(&next);
        }
        Ok(next)
    }
}
