//! Per-session decision between serving cached results and refreshing them.
//!
//! A session that has never been seen always aggregates, even if the shared cache holds a
//! result. Within the freshness window after its last refresh, a session is served from the
//! cache. Once the window elapsed, or when a refresh is forced, it aggregates again.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::config::FreshnessConfig;

/// When a session last triggered an aggregation.
#[derive(Debug, Clone, Copy)]
struct SessionRecord {
    refreshed: Instant,
    refreshed_at: DateTime<Utc>,
}

/// The freshness of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// The session is unknown, or was logged out or evicted.
    NoRecord,
    /// The session refreshed at the given time, which is within the window.
    Fresh(DateTime<Utc>),
    /// The window elapsed since the last refresh.
    Stale,
}

/// Why a request has to aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshReason {
    FirstRequest,
    Stale,
    Forced,
}

impl RefreshReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FirstRequest => "first_request",
            Self::Stale => "stale",
            Self::Forced => "forced",
        }
    }
}

/// What to do for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Read the cached result. A miss still aggregates.
    ServeCached,
    /// Aggregate, then record the refresh.
    Aggregate(RefreshReason),
}

/// Tracks when each session last refreshed.
///
/// The registry is bounded: records expire after the configured session TTL of inactivity, and
/// the least recently used ones are evicted once the capacity is reached.
///
/// At capacity, moka's admission policy may also reject the record of a new session. That
/// session then keeps deciding [`Decision::Aggregate`] on every request, like one seen
/// for the first time. Sessions that were admitted are unaffected.
pub struct FreshnessPolicy {
    window: Duration,
    sessions: moka::sync::Cache<String, SessionRecord>,
}

impl FreshnessPolicy {
    pub fn new(config: &FreshnessConfig) -> Self {
        let sessions = moka::sync::Cache::builder()
            .name("sessions")
            .max_capacity(config.max_sessions)
            .time_to_idle(config.session_ttl)
            .build();
        Self {
            window: config.session_cache_window,
            sessions,
        }
    }

    /// The current state of `session`.
    pub fn state(&self, session: &str) -> SessionState {
        match self.sessions.get(session) {
            None => SessionState::NoRecord,
            Some(record) if record.refreshed.elapsed() < self.window => {
                SessionState::Fresh(record.refreshed_at)
            }
            Some(_) => SessionState::Stale,
        }
    }

    /// Decides whether `session` may be served from the cache.
    pub fn decide(&self, session: &str, force: bool) -> Decision {
        let decision = match (force, self.state(session)) {
            (true, _) => Decision::Aggregate(RefreshReason::Forced),
            (false, SessionState::NoRecord) => Decision::Aggregate(RefreshReason::FirstRequest),
            (false, SessionState::Stale) => Decision::Aggregate(RefreshReason::Stale),
            (false, SessionState::Fresh(_)) => Decision::ServeCached,
        };

        let outcome = match decision {
            Decision::ServeCached => "cached",
            Decision::Aggregate(reason) => reason.as_str(),
        };
        metric!(counter("freshness.decision") += 1, "outcome" => outcome);
        decision
    }

    /// Records that `session` just refreshed.
    pub fn record_refresh(&self, session: &str) {
        self.sessions.insert(
            session.to_owned(),
            SessionRecord {
                refreshed: Instant::now(),
                refreshed_at: Utc::now(),
            },
        );
    }

    /// Forgets `session`. Returns whether it was known.
    pub fn logout(&self, session: &str) -> bool {
        self.sessions.remove(session).is_some()
    }
}

impl fmt::Debug for FreshnessPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FreshnessPolicy")
            .field("window", &self.window)
            .field("sessions", &self.sessions.entry_count())
            .finish()
    }
}
