//! Single-holder control arbitration
//!
//! At most one token holds control at a time. A holder that has not been
//! touched within the configured timeout counts as absent. When the
//! holder's event stream drops, release is deferred by a grace period so a
//! quick reconnect keeps control.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio::time::Instant;

use crate::config::ControlConfig;
use crate::error::{ControlError, Result};

/// Control state as seen by one caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlStatus {
    pub enabled: bool,
    pub has_controller: bool,
    pub is_controller: bool,
}

#[derive(Debug)]
struct Holder {
    token: String,
    acquired_at: Instant,
    last_touch: Instant,
}

#[derive(Debug, Default)]
struct ControlState {
    holder: Option<Holder>,

    /// Bumped on every take/touch/release; a deferred release only fires if
    /// the generation it was scheduled with is still current.
    generation: u64,

    pending_release: Option<AbortHandle>,
}

impl ControlState {
    /// Invalidate any scheduled release
    fn supersede(&mut self) {
        self.generation += 1;
        if let Some(pending) = self.pending_release.take() {
            pending.abort();
        }
    }
}

struct Inner {
    config: ControlConfig,
    state: Mutex<ControlState>,
    changes: watch::Sender<bool>,
}

impl Inner {
    fn is_expired(&self, holder: &Holder, now: Instant) -> bool {
        !self.config.timeout.is_zero() && now.duration_since(holder.last_touch) > self.config.timeout
    }

    /// The holder, unless it has expired
    fn active_holder<'a>(&self, state: &'a ControlState, now: Instant) -> Option<&'a Holder> {
        state
            .holder
            .as_ref()
            .filter(|holder| !self.is_expired(holder, now))
    }

    /// Drop a holder that has timed out, publishing the release
    fn expire_stale(&self, state: &mut ControlState, now: Instant) {
        let expired = state
            .holder
            .as_ref()
            .is_some_and(|holder| self.is_expired(holder, now));

        if expired {
            state.supersede();
            state.holder = None;
            self.publish(false);
            tracing::info!("Control expired after {:?} of inactivity", self.config.timeout);
        }
    }

    fn publish(&self, has_controller: bool) {
        self.changes.send_if_modified(|current| {
            if *current != has_controller {
                *current = has_controller;
                true
            } else {
                false
            }
        });
    }
}

/// Arbitrates exclusive write access between operator sessions
///
/// Cheap to clone; clones share the same holder record.
#[derive(Clone)]
pub struct ControlManager {
    inner: Arc<Inner>,
}

impl ControlManager {
    pub fn new(config: ControlConfig) -> Self {
        let (changes, _) = watch::channel(false);

        if config.is_enabled() {
            tracing::info!(
                "Control arbitration enabled ({} token(s), timeout {:?}, grace {:?})",
                config.tokens.len(),
                config.timeout,
                config.grace_period
            );
        } else {
            tracing::info!("Control arbitration disabled, every session may write");
        }

        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(ControlState::default()),
                changes,
            }),
        }
    }

    pub fn config(&self) -> &ControlConfig {
        &self.inner.config
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.config.is_enabled()
    }

    /// Grant control to `token`
    ///
    /// Re-taking by the current holder refreshes its activity. An expired
    /// holder does not block a new taker.
    pub fn take_control(&self, token: &str) -> Result<()> {
        if !self.is_enabled() {
            return Err(ControlError::Disabled);
        }
        if !self.inner.config.tokens.contains(token) {
            tracing::debug!("Rejected control request with unknown token");
            return Err(ControlError::InvalidToken);
        }

        let now = Instant::now();
        let mut state = self.inner.state.lock();

        let current = self
            .inner
            .active_holder(&state, now)
            .map(|holder| holder.token == token);

        match current {
            Some(true) => {
                state.supersede();
                if let Some(holder) = state.holder.as_mut() {
                    holder.last_touch = now;
                }
                Ok(())
            }
            Some(false) => Err(ControlError::ControlTaken),
            None => {
                state.supersede();
                state.holder = Some(Holder {
                    token: token.to_string(),
                    acquired_at: now,
                    last_touch: now,
                });
                self.inner.publish(true);
                tracing::info!("Control taken");
                Ok(())
            }
        }
    }

    /// Refresh the holder's activity; ignored for anyone else
    pub fn touch(&self, token: &str) {
        if !self.is_enabled() {
            return;
        }

        let now = Instant::now();
        let mut state = self.inner.state.lock();
        let is_holder = self
            .inner
            .active_holder(&state, now)
            .is_some_and(|holder| holder.token == token);

        if is_holder {
            state.supersede();
            if let Some(holder) = state.holder.as_mut() {
                holder.last_touch = now;
            }
        }
    }

    /// Give up control immediately
    pub fn release_control(&self, token: &str) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }

        let now = Instant::now();
        let mut state = self.inner.state.lock();
        let is_holder = self
            .inner
            .active_holder(&state, now)
            .is_some_and(|holder| holder.token == token);

        if !is_holder {
            return Err(ControlError::NotController);
        }

        state.supersede();
        if let Some(holder) = state.holder.take() {
            tracing::info!("Control released after {:?}", now.duration_since(holder.acquired_at));
        }
        self.inner.publish(false);
        Ok(())
    }

    /// The holder's event stream disconnected; release after the grace period
    ///
    /// Any take, touch or release before the grace period ends cancels the
    /// scheduled release. A token that is not the holder is ignored.
    pub fn release_by_sse(&self, token: &str) {
        if !self.is_enabled() {
            return;
        }

        let now = Instant::now();
        let mut state = self.inner.state.lock();
        let is_holder = self
            .inner
            .active_holder(&state, now)
            .is_some_and(|holder| holder.token == token);

        if !is_holder {
            return;
        }

        state.supersede();
        let generation = state.generation;
        let grace = self.inner.config.grace_period;
        let deadline = now + grace;
        let weak = Arc::downgrade(&self.inner);
        let token = token.to_string();

        tracing::debug!("Holder stream closed, releasing control in {:?}", grace);

        let task = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            Self::deferred_release(weak, generation, &token);
        });
        state.pending_release = Some(task.abort_handle());
    }

    fn deferred_release(inner: Weak<Inner>, generation: u64, token: &str) {
        let Some(inner) = inner.upgrade() else {
            return;
        };

        let mut state = inner.state.lock();
        let still_holder = state
            .holder
            .as_ref()
            .is_some_and(|holder| holder.token == token);

        if state.generation != generation || !still_holder {
            tracing::debug!("Deferred control release superseded");
            return;
        }

        state.holder = None;
        state.pending_release = None;
        state.generation += 1;
        inner.publish(false);
        tracing::info!("Control released after stream disconnect grace period");
    }

    /// Whether a non-expired holder exists
    pub fn has_controller(&self) -> bool {
        if !self.is_enabled() {
            return false;
        }
        let now = Instant::now();
        let mut state = self.inner.state.lock();
        self.inner.expire_stale(&mut state, now);
        self.inner.active_holder(&state, now).is_some()
    }

    /// Whether `token` may issue writes. Always true when disabled.
    pub fn is_controller(&self, token: &str) -> bool {
        if !self.is_enabled() {
            return true;
        }
        let now = Instant::now();
        let mut state = self.inner.state.lock();
        self.inner.expire_stale(&mut state, now);
        self.inner
            .active_holder(&state, now)
            .is_some_and(|holder| holder.token == token)
    }

    pub fn get_status(&self, token: &str) -> ControlStatus {
        ControlStatus {
            enabled: self.is_enabled(),
            has_controller: self.has_controller(),
            is_controller: self.is_controller(token),
        }
    }

    /// Receiver that changes whenever a holder is granted or released
    ///
    /// Inactivity expiry is noticed lazily: it is published the next time
    /// the holder is queried or a new holder takes over.
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.inner.changes.subscribe()
    }
}

impl std::fmt::Debug for ControlManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlManager")
            .field("enabled", &self.is_enabled())
            .field("has_controller", &self.has_controller())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    fn manager() -> ControlManager {
        ControlManager::new(
            ControlConfig::new()
                .with_tokens(["admin", "operator"])
                .with_timeout(Duration::from_secs(10))
                .with_grace_period(Duration::from_secs(3)),
        )
    }

    #[test]
    fn test_disabled_mode() {
        let manager = ControlManager::new(ControlConfig::default());
        assert!(!manager.is_enabled());
        assert!(manager.is_controller("anyone"));
        assert!(!manager.has_controller());
        assert_eq!(manager.take_control("anyone"), Err(ControlError::Disabled));
        assert_ok!(manager.release_control("anyone"));

        let status = manager.get_status("anyone");
        assert_eq!(
            status,
            ControlStatus {
                enabled: false,
                has_controller: false,
                is_controller: true
            }
        );
    }

    #[rstest]
    #[case("admin", Ok(()))]
    #[case("operator", Ok(()))]
    #[case("intruder", Err(ControlError::InvalidToken))]
    #[case("", Err(ControlError::InvalidToken))]
    #[case("Admin", Err(ControlError::InvalidToken))]
    fn test_take_control_token_check(#[case] token: &str, #[case] expected: Result<()>) {
        let manager = manager();
        let granted = expected.is_ok();
        assert_eq!(manager.take_control(token), expected);
        assert_eq!(manager.has_controller(), granted);
        assert_eq!(manager.is_controller(token), granted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retake_by_holder_refreshes() {
        let manager = manager();
        assert_ok!(manager.take_control("admin"));

        tokio::time::advance(Duration::from_secs(8)).await;
        assert_ok!(manager.take_control("admin"));

        tokio::time::advance(Duration::from_secs(8)).await;
        assert!(manager.is_controller("admin"));
    }

    #[test]
    fn test_release_requires_holder() {
        let manager = manager();
        assert_eq!(manager.release_control("admin"), Err(ControlError::NotController));

        assert_ok!(manager.take_control("admin"));
        assert_err!(manager.release_control("operator"));
        assert_ok!(manager.release_control("admin"));
        assert!(!manager.has_controller());
    }

    #[tokio::test(start_paused = true)]
    async fn test_touch_keeps_holder_alive() {
        let manager = manager();
        assert_ok!(manager.take_control("admin"));

        for _ in 0..3 {
            tokio::time::advance(Duration::from_secs(6)).await;
            manager.touch("admin");
            manager.touch("operator");
        }
        assert!(manager.is_controller("admin"));
        assert_eq!(manager.take_control("operator"), Err(ControlError::ControlTaken));
    }

    #[tokio::test]
    async fn test_watch_tracks_holder() {
        let manager = manager();
        let rx = manager.watch();
        assert!(!*rx.borrow());

        assert_ok!(manager.take_control("admin"));
        assert!(*rx.borrow());

        assert_ok!(manager.release_control("admin"));
        assert!(!*rx.borrow());
    }

    #[test]
    fn test_status_serializes_camel_case() {
        let manager = manager();
        let json = serde_json::to_value(manager.get_status("admin")).unwrap();
        assert_eq!(json["enabled"], true);
        assert_eq!(json["hasController"], false);
        assert_eq!(json["isController"], false);
    }
}
