//! Waiter polling
//!
//! [`evaluate`] picks the first acceptor matching one poll result and
//! [`Poller`] turns the matched state into the next step of the loop. The
//! async loop itself lives on [`Resource`](super::runtime::Resource).

use super::operation::{Acceptor, AcceptorState, Matcher, Waiter};
use super::path::Resolved;
use crate::client::ServiceError;
use serde_json::Value;
use std::time::Duration;

/// Overrides for a single wait
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WaiterOptions {
    pub max_attempts: Option<u32>,
    pub delay: Option<Duration>,
}

impl WaiterOptions {
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaiterState {
    Polling,
    Success,
    Failure,
    TimedOut,
}

/// Attempt bookkeeping for one wait
#[derive(Debug)]
pub struct Poller {
    max_attempts: u32,
    delay: Duration,
    attempts: u32,
    state: WaiterState,
}

impl Poller {
    pub fn new(waiter: &Waiter, options: WaiterOptions) -> Self {
        Self {
            max_attempts: options.max_attempts.unwrap_or(waiter.max_attempts).max(1),
            delay: options.delay.unwrap_or(waiter.delay),
            attempts: 0,
            state: WaiterState::Polling,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn state(&self) -> WaiterState {
        self.state
    }

    /// Record one poll. No match counts as retry.
    pub fn advance(&mut self, matched: Option<AcceptorState>) -> WaiterState {
        if self.state != WaiterState::Polling {
            return self.state;
        }
        self.attempts += 1;
        self.state = match matched {
            Some(AcceptorState::Success) => WaiterState::Success,
            Some(AcceptorState::Failure) => WaiterState::Failure,
            Some(AcceptorState::Retry) | None if self.attempts >= self.max_attempts => {
                WaiterState::TimedOut
            }
            Some(AcceptorState::Retry) | None => WaiterState::Polling,
        };
        self.state
    }
}

/// State of the first acceptor matching `result`, in declaration order
pub fn evaluate(acceptors: &[Acceptor], result: &anyhow::Result<Value>) -> Option<AcceptorState> {
    acceptors
        .iter()
        .find(|acceptor| matches(acceptor, result))
        .map(|acceptor| acceptor.state)
}

fn matches(acceptor: &Acceptor, result: &anyhow::Result<Value>) -> bool {
    let response = match (acceptor.matcher, result) {
        (Matcher::Error, Err(err)) => {
            return ServiceError::find(err)
                .map(|e| acceptor.expected.as_str() == Some(e.code.as_str()))
                .unwrap_or(false)
        }
        (Matcher::Error, Ok(_)) | (_, Err(_)) => return false,
        (_, Ok(response)) => response,
    };
    let Some(path) = &acceptor.path else {
        return false;
    };

    match (acceptor.matcher, path.get(response)) {
        (_, Resolved::One(value)) => value == acceptor.expected,
        (Matcher::PathAll, Resolved::Many(values)) => {
            !values.is_empty() && values.iter().all(|v| *v == acceptor.expected)
        }
        (Matcher::PathAny, Resolved::Many(values)) => {
            values.iter().any(|v| *v == acceptor.expected)
        }
        (_, Resolved::Many(values)) => Value::Array(values) == acceptor.expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::builder::{Builder, Request};
    use crate::resource::path::Path;
    use serde_json::json;

    fn acceptor(matcher: Matcher, path: Option<&str>, expected: Value, state: AcceptorState) -> Acceptor {
        Acceptor {
            matcher,
            path: path.map(|p| Path::parse(p).unwrap()),
            expected,
            state,
        }
    }

    fn waiter(max_attempts: u32) -> Waiter {
        Waiter {
            request: Request::new("DescribeInstances", Builder::default()),
            acceptors: vec![],
            max_attempts,
            delay: Duration::from_secs(15),
        }
    }

    #[test]
    fn test_path_matcher() {
        let acceptors = vec![
            acceptor(Matcher::Path, Some("State.Name"), json!("running"), AcceptorState::Success),
            acceptor(Matcher::Path, Some("State.Name"), json!("terminated"), AcceptorState::Failure),
        ];
        assert_eq!(
            evaluate(&acceptors, &Ok(json!({"State": {"Name": "running"}}))),
            Some(AcceptorState::Success)
        );
        assert_eq!(
            evaluate(&acceptors, &Ok(json!({"State": {"Name": "terminated"}}))),
            Some(AcceptorState::Failure)
        );
        assert_eq!(evaluate(&acceptors, &Ok(json!({"State": {"Name": "pending"}}))), None);
    }

    #[test]
    fn test_path_all_and_any() {
        let all = vec![acceptor(
            Matcher::PathAll,
            Some("Reservations[].State"),
            json!("ok"),
            AcceptorState::Success,
        )];
        let any = vec![acceptor(
            Matcher::PathAny,
            Some("Reservations[].State"),
            json!("failed"),
            AcceptorState::Failure,
        )];
        let mixed = Ok(json!({"Reservations": [{"State": "ok"}, {"State": "failed"}]}));
        let done = Ok(json!({"Reservations": [{"State": "ok"}, {"State": "ok"}]}));
        let empty = Ok(json!({"Reservations": []}));

        assert_eq!(evaluate(&all, &mixed), None);
        assert_eq!(evaluate(&all, &done), Some(AcceptorState::Success));
        assert_eq!(evaluate(&all, &empty), None);
        assert_eq!(evaluate(&any, &mixed), Some(AcceptorState::Failure));
        assert_eq!(evaluate(&any, &done), None);
    }

    #[test]
    fn test_error_matcher() {
        let acceptors = vec![acceptor(
            Matcher::Error,
            None,
            json!("NotFound"),
            AcceptorState::Retry,
        )];
        let not_found = Err(anyhow::Error::new(ServiceError::new("NotFound", "no such bucket")));
        let denied = Err(anyhow::Error::new(ServiceError::new("AccessDenied", "nope")));

        assert_eq!(evaluate(&acceptors, &not_found), Some(AcceptorState::Retry));
        assert_eq!(evaluate(&acceptors, &denied), None);
        assert_eq!(evaluate(&acceptors, &Ok(json!({}))), None);
    }

    #[test]
    fn test_poller_times_out_after_max_attempts() {
        let mut poller = Poller::new(&waiter(3), WaiterOptions::default());
        assert_eq!(poller.advance(None), WaiterState::Polling);
        assert_eq!(poller.advance(Some(AcceptorState::Retry)), WaiterState::Polling);
        assert_eq!(poller.advance(None), WaiterState::TimedOut);
        assert_eq!(poller.attempts(), 3);
        assert_eq!(poller.advance(Some(AcceptorState::Success)), WaiterState::TimedOut);
    }

    #[test]
    fn test_poller_stops_on_terminal_state() {
        let mut poller = Poller::new(&waiter(40), WaiterOptions::default());
        assert_eq!(poller.advance(None), WaiterState::Polling);
        assert_eq!(poller.advance(Some(AcceptorState::Failure)), WaiterState::Failure);
        assert_eq!(poller.attempts(), 2);
        assert_eq!(poller.state(), WaiterState::Failure);
    }

    #[test]
    fn test_options_override_declared_values() {
        let options = WaiterOptions::default()
            .max_attempts(1)
            .delay(Duration::ZERO);
        let mut poller = Poller::new(&waiter(40), options);
        assert_eq!(poller.delay(), Duration::ZERO);
        assert_eq!(poller.advance(None), WaiterState::TimedOut);
    }
}
