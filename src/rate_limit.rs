use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::HeaderMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Extra wait added on top of the advertised reset time, since the reset
/// header only has one-second resolution.
pub const SAFETY_MARGIN: Duration = Duration::from_secs(1);

const FALLBACK_BASE: Duration = Duration::from_secs(2);
const FALLBACK_CAP: Duration = Duration::from_secs(60);

/// The two independently limited request classes GitHub exposes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestClass {
    /// `/search/*` endpoints (small, fast-resetting bucket).
    Search,
    /// Everything else, including content fetches.
    Core,
}

impl RequestClass {
    fn name(self) -> &'static str {
        match self {
            RequestClass::Search => "search",
            RequestClass::Core => "core",
        }
    }
}

/// Last-known quota for one request class, refreshed from the most recent
/// response headers. No history is kept.
#[derive(Clone, Copy, Debug)]
pub struct RateLimitState {
    pub remaining: u32,
    pub reset_at: Option<DateTime<Utc>>,
}

impl Default for RateLimitState {
    fn default() -> Self {
        // Optimistic until the first response is observed.
        RateLimitState {
            remaining: 1,
            reset_at: None,
        }
    }
}

/// Paces outbound requests against GitHub's rate limits.
///
/// The driver is strictly sequential, so this is plain owned state with
/// `&mut self` methods; a concurrent port would need to put it behind a
/// mutex or a single coordinating task.
pub struct RateGovernor {
    search: RateLimitState,
    core: RateLimitState,
    /// Next wait to use when quota is exhausted but no reset hint is known.
    /// Doubles per blind wait, resets once a response shows quota again.
    fallback: Duration,
}

impl RateGovernor {
    pub fn new() -> Self {
        RateGovernor {
            search: RateLimitState::default(),
            core: RateLimitState::default(),
            fallback: FALLBACK_BASE,
        }
    }

    fn state(&self, kind: RequestClass) -> &RateLimitState {
        match kind {
            RequestClass::Search => &self.search,
            RequestClass::Core => &self.core,
        }
    }

    fn state_mut(&mut self, kind: RequestClass) -> &mut RateLimitState {
        match kind {
            RequestClass::Search => &mut self.search,
            RequestClass::Core => &mut self.core,
        }
    }

    /// Seed a class's state, e.g. from a startup `/rate_limit` probe.
    pub fn prime(&mut self, kind: RequestClass, remaining: u32, reset_at: DateTime<Utc>) {
        let state = self.state_mut(kind);
        state.remaining = remaining;
        state.reset_at = Some(reset_at);
    }

    /// Update a class's state from response headers. Called after every
    /// request in that class, regardless of status.
    pub fn observe(&mut self, kind: RequestClass, headers: &HeaderMap) {
        let remaining = headers
            .get("X-RateLimit-Remaining")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u32>().ok());
        let reset_at = headers
            .get("X-RateLimit-Reset")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok())
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single());

        if let Some(remaining) = remaining {
            let state = self.state_mut(kind);
            state.remaining = remaining;
            if reset_at.is_some() {
                state.reset_at = reset_at;
            }
            if remaining > 0 {
                self.fallback = FALLBACK_BASE;
            }
            debug!(
                "{} quota: {} remaining, resets at {:?}",
                kind.name(),
                remaining,
                self.state(kind).reset_at
            );
        }
    }

    /// How long a caller must wait before issuing a request of this class,
    /// or `None` if it may proceed immediately. Pure with respect to `now`.
    pub fn wait_duration(&self, kind: RequestClass, now: DateTime<Utc>) -> Option<Duration> {
        let state = self.state(kind);
        if state.remaining > 0 {
            return None;
        }
        match state.reset_at {
            Some(reset) if reset > now => {
                let until_reset = (reset - now).to_std().unwrap_or_default();
                Some(until_reset + SAFETY_MARGIN)
            }
            // Reset time already passed; the next response will refresh us.
            Some(_) => Some(SAFETY_MARGIN),
            None => Some(self.fallback),
        }
    }

    /// Block until a request of this class is safe to issue.
    pub async fn await_capacity(&mut self, kind: RequestClass) {
        if let Some(wait) = self.wait_duration(kind, Utc::now()) {
            warn!(
                "{} rate limit exhausted. Waiting {:.1}s...",
                kind.name(),
                wait.as_secs_f64()
            );
            let blind = self.state(kind).reset_at.is_none();
            tokio::time::sleep(wait).await;
            if blind {
                self.fallback = (self.fallback * 2).min(FALLBACK_CAP);
            }
            // Assume the window rolled over; the next observe() corrects us.
            let state = self.state_mut(kind);
            state.remaining = 1;
            state.reset_at = None;
        }
    }
}

impl Default for RateGovernor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use reqwest::header::{HeaderMap, HeaderValue};

    fn headers(remaining: &str, reset: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert("X-RateLimit-Remaining", HeaderValue::from_str(remaining).unwrap());
        h.insert("X-RateLimit-Reset", HeaderValue::from_str(reset).unwrap());
        h
    }

    #[test]
    fn proceeds_while_quota_remains() {
        let mut gov = RateGovernor::new();
        gov.observe(RequestClass::Search, &headers("7", "1700000000"));
        assert_eq!(gov.wait_duration(RequestClass::Search, Utc::now()), None);
    }

    #[test]
    fn waits_until_advertised_reset_plus_margin() {
        let mut gov = RateGovernor::new();
        let now = Utc::now();
        let reset = now + TimeDelta::seconds(5);
        gov.observe(
            RequestClass::Core,
            &headers("0", &reset.timestamp().to_string()),
        );
        let wait = gov.wait_duration(RequestClass::Core, now).unwrap();
        // Reset header truncates to whole seconds, so allow one second of slop.
        assert!(wait >= Duration::from_secs(5), "waited only {wait:?}");
        assert!(wait <= Duration::from_secs(6) + SAFETY_MARGIN);
    }

    #[test]
    fn stale_reset_only_costs_the_margin() {
        let mut gov = RateGovernor::new();
        let past = Utc::now() - TimeDelta::seconds(30);
        gov.observe(
            RequestClass::Core,
            &headers("0", &past.timestamp().to_string()),
        );
        assert_eq!(
            gov.wait_duration(RequestClass::Core, Utc::now()),
            Some(SAFETY_MARGIN)
        );
    }

    #[test]
    fn classes_are_tracked_independently() {
        let mut gov = RateGovernor::new();
        gov.observe(RequestClass::Search, &headers("0", "1700000000"));
        gov.observe(RequestClass::Core, &headers("42", "1700000000"));
        let now = Utc::now();
        assert!(gov.wait_duration(RequestClass::Search, now).is_some());
        assert_eq!(gov.wait_duration(RequestClass::Core, now), None);
    }

    #[test]
    fn falls_back_to_backoff_without_reset_hint() {
        let mut gov = RateGovernor::new();
        let mut h = HeaderMap::new();
        h.insert("X-RateLimit-Remaining", HeaderValue::from_static("0"));
        gov.observe(RequestClass::Search, &h);
        assert_eq!(
            gov.wait_duration(RequestClass::Search, Utc::now()),
            Some(FALLBACK_BASE)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn blind_waits_back_off_exponentially() {
        let mut gov = RateGovernor::new();
        let mut h = HeaderMap::new();
        h.insert("X-RateLimit-Remaining", HeaderValue::from_static("0"));

        gov.observe(RequestClass::Core, &h);
        gov.await_capacity(RequestClass::Core).await;
        gov.observe(RequestClass::Core, &h);
        assert_eq!(
            gov.wait_duration(RequestClass::Core, Utc::now()),
            Some(FALLBACK_BASE * 2)
        );

        // Seeing quota again resets the backoff.
        gov.observe(RequestClass::Core, &headers("3", "1700000000"));
        gov.observe(RequestClass::Core, &h);
        assert_eq!(
            gov.wait_duration(RequestClass::Core, Utc::now()),
            Some(FALLBACK_BASE)
        );
    }

    #[test]
    fn garbage_headers_are_ignored() {
        let mut gov = RateGovernor::new();
        gov.observe(RequestClass::Search, &headers("lots", "soon"));
        assert_eq!(gov.wait_duration(RequestClass::Search, Utc::now()), None);
    }
}
