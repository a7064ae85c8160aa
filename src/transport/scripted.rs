//! In-process transport double.
//!
//! Replies are scripted per action: queued one-shot replies are consumed
//! first, then the sticky reply set with [`ScriptedTransport::always`].
//! Every call is recorded in issue order, before any scripted delay, so
//! tests can assert on the exact request sequence a controller produced.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::TransportError;
use crate::transport::{Envelope, Transport};

type Reply = Result<Envelope, TransportError>;

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub action: String,
    pub data: Value,
}

#[derive(Default)]
pub struct ScriptedTransport {
    queued: Mutex<HashMap<String, VecDeque<Reply>>>,
    sticky: Mutex<HashMap<String, Reply>>,
    delays: Mutex<HashMap<String, VecDeque<Duration>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for the next call of `action`.
    pub fn reply(&self, action: &str, envelope: Envelope) -> &Self {
        self.push(action, Ok(envelope))
    }

    /// Queue a transport failure for the next call of `action`.
    pub fn fail(&self, action: &str, err: TransportError) -> &Self {
        self.push(action, Err(err))
    }

    /// Reply used for `action` whenever its queue is empty.
    pub fn always(&self, action: &str, envelope: Envelope) -> &Self {
        if let Ok(mut sticky) = self.sticky.lock() {
            sticky.insert(action.to_string(), Ok(envelope));
        }
        self
    }

    /// Hold the next reply for `action` back by `delay`.
    pub fn delay_next(&self, action: &str, delay: Duration) -> &Self {
        if let Ok(mut delays) = self.delays.lock() {
            delays.entry(action.to_string()).or_default().push_back(delay);
        }
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn actions(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.action).collect()
    }

    pub fn count(&self, action: &str) -> usize {
        self.calls().iter().filter(|c| c.action == action).count()
    }

    pub fn clear_calls(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }

    fn push(&self, action: &str, reply: Reply) -> &Self {
        if let Ok(mut queued) = self.queued.lock() {
            queued.entry(action.to_string()).or_default().push_back(reply);
        }
        self
    }

    fn next_reply(&self, action: &str) -> Reply {
        let queued = self
            .queued
            .lock()
            .ok()
            .and_then(|mut q| q.get_mut(action).and_then(|replies| replies.pop_front()));
        if let Some(reply) = queued {
            return reply;
        }
        self.sticky
            .lock()
            .ok()
            .and_then(|s| s.get(action).cloned())
            .unwrap_or_else(|| {
                Err(TransportError::Network(format!("no scripted reply for {}", action)))
            })
    }

    fn next_delay(&self, action: &str) -> Option<Duration> {
        self.delays
            .lock()
            .ok()
            .and_then(|mut d| d.get_mut(action).and_then(|q| q.pop_front()))
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn call(&self, action: &str, data: Value) -> Result<Envelope, TransportError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall { action: action.to_string(), data });
        }
        // Take the reply at issue time so a delayed call keeps its place.
        let reply = self.next_reply(action);
        if let Some(delay) = self.next_delay(action) {
            tokio::time::sleep(delay).await;
        }
        reply
    }
}
