//! Stubbed client
//!
//! Responses are queued per operation and handed out in order; the last
//! queued response keeps repeating. Every invocation is recorded.

use super::{Client, ServiceError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone)]
enum Stubbed {
    Data(Value),
    Error(ServiceError),
}

/// A recorded call
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub operation: String,
    pub params: Value,
}

/// In-memory [`Client`] returning canned responses
#[derive(Debug, Default)]
pub struct StubClient {
    responses: Mutex<HashMap<String, VecDeque<Stubbed>>>,
    calls: Mutex<Vec<Invocation>>,
}

impl StubClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for `operation`
    pub fn stub(&self, operation: &str, response: Value) -> &Self {
        self.push(operation, Stubbed::Data(response));
        self
    }

    /// Queue several responses for `operation`, returned in order
    pub fn stub_sequence<I>(&self, operation: &str, responses: I) -> &Self
    where
        I: IntoIterator<Item = Value>,
    {
        for response in responses {
            self.push(operation, Stubbed::Data(response));
        }
        self
    }

    /// Queue a service error for `operation`
    pub fn stub_error(&self, operation: &str, error: ServiceError) -> &Self {
        self.push(operation, Stubbed::Error(error));
        self
    }

    /// All calls made so far
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of calls made to `operation`
    pub fn call_count(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn push(&self, operation: &str, stubbed: Stubbed) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(operation.to_string())
            .or_default()
            .push_back(stubbed);
    }

    fn next(&self, operation: &str) -> Option<Stubbed> {
        let mut responses = self.responses.lock().unwrap_or_else(PoisonError::into_inner);
        let queue = responses.get_mut(operation)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl Client for StubClient {
    async fn invoke(&self, operation: &str, params: Value) -> anyhow::Result<Value> {
        tracing::debug!("stub invoke: operation={}", operation);

        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Invocation {
                operation: operation.to_string(),
                params,
            });

        match self.next(operation) {
            Some(Stubbed::Data(value)) => Ok(value),
            Some(Stubbed::Error(err)) => Err(err.into()),
            // Unstubbed operations answer with an empty structure
            None => Ok(Value::Object(serde_json::Map::new())),
        }
    }
}
