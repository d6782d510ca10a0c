//! Per-account trade-events stream state machine (§4.6):
//! `Idle -> Connecting -> Subscribed -> (ReconnectWait -> Connecting)* -> Stopped`.

use rand::Rng;
use std::time::Duration;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Connecting,
    Subscribed,
    ReconnectWait,
    Stopped,
}

/// Why the stream asked to stop or reconnect, surfaced for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    AuthError,
    ConnectionLimitExceeded,
}

/// Drives the state transitions and owns the backoff counter. Pure state;
/// the actual reconnect sleep/dispatch lives in the adapter's stream task.
#[derive(Debug)]
pub struct StreamStateMachine {
    state: StreamState,
    backoff: Duration,
    stop_reason: Option<StopReason>,
}

impl Default for StreamStateMachine {
    fn default() -> Self {
        Self {
            state: StreamState::Idle,
            backoff: INITIAL_BACKOFF,
            stop_reason: None,
        }
    }
}

impl StreamStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    pub fn start_connecting(&mut self) {
        self.state = StreamState::Connecting;
    }

    /// `SubscribeSuccess` (§4.6): log only, move to `Subscribed`, and reset
    /// the backoff counter since the stream is healthy again.
    pub fn on_subscribe_success(&mut self) {
        self.state = StreamState::Subscribed;
        self.backoff = INITIAL_BACKOFF;
    }

    /// `AuthError`: terminal, no retry.
    pub fn on_auth_error(&mut self) {
        self.state = StreamState::Stopped;
        self.stop_reason = Some(StopReason::AuthError);
    }

    /// `NumOfConnExceed`: terminal, no retry (an operator must free a slot).
    pub fn on_conn_limit_exceeded(&mut self) {
        self.state = StreamState::Stopped;
        self.stop_reason = Some(StopReason::ConnectionLimitExceeded);
    }

    /// `SubscribeExpired`: move to `ReconnectWait` and return how long to
    /// sleep before the next `Connecting` attempt. Backoff doubles each time,
    /// capped at [`MAX_BACKOFF`], with up to 20% jitter to avoid a reconnect
    /// thundering herd across accounts.
    pub fn on_subscribe_expired(&mut self) -> Duration {
        self.state = StreamState::ReconnectWait;
        let wait = self.backoff;
        self.backoff = (self.backoff * 2).min(MAX_BACKOFF);
        jittered(wait)
    }

    /// Any other transport-level stream failure (e.g. the gRPC call itself
    /// erroring, not a structured stream-level notice): same backoff path as
    /// `SubscribeExpired`.
    pub fn on_stream_error(&mut self) -> Duration {
        self.on_subscribe_expired()
    }

    pub fn is_stopped(&self) -> bool {
        self.state == StreamState::Stopped
    }
}

fn jittered(base: Duration) -> Duration {
    let jitter_frac: f64 = rand::rng().random_range(0.0..0.2);
    base + Duration::from_secs_f64(base.as_secs_f64() * jitter_frac)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_reaches_subscribed() {
        let mut m = StreamStateMachine::new();
        m.start_connecting();
        assert_eq!(m.state(), StreamState::Connecting);
        m.on_subscribe_success();
        assert_eq!(m.state(), StreamState::Subscribed);
    }

    #[test]
    fn auth_error_is_terminal() {
        let mut m = StreamStateMachine::new();
        m.start_connecting();
        m.on_auth_error();
        assert_eq!(m.state(), StreamState::Stopped);
        assert_eq!(m.stop_reason(), Some(StopReason::AuthError));
        assert!(m.is_stopped());
    }

    #[test]
    fn conn_limit_exceeded_is_terminal() {
        let mut m = StreamStateMachine::new();
        m.start_connecting();
        m.on_conn_limit_exceeded();
        assert!(m.is_stopped());
        assert_eq!(m.stop_reason(), Some(StopReason::ConnectionLimitExceeded));
    }

    #[test]
    fn subscribe_expired_backs_off_and_doubles() {
        let mut m = StreamStateMachine::new();
        m.start_connecting();
        m.on_subscribe_success();

        let first = m.on_subscribe_expired();
        assert_eq!(m.state(), StreamState::ReconnectWait);
        assert!(first >= INITIAL_BACKOFF);

        m.start_connecting();
        m.on_subscribe_success();
        let second = m.on_subscribe_expired();
        assert!(second >= first);
    }

    #[test]
    fn backoff_is_capped() {
        let mut m = StreamStateMachine::new();
        for _ in 0..20 {
            m.start_connecting();
            m.on_subscribe_success();
            let wait = m.on_subscribe_expired();
            assert!(wait <= MAX_BACKOFF + Duration::from_secs_f64(MAX_BACKOFF.as_secs_f64() * 0.2));
        }
    }
}
