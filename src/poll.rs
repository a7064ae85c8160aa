//! Fixed-interval refresh of independent views.
//!
//! Each tick spawns one task per view and does not wait for them.
//! Ticks may overlap: under [`OverlapPolicy::FireAndForget`] a slow
//! request from an earlier tick keeps running next to the new one, and
//! under [`OverlapPolicy::CancelPrevious`] it is aborted first.
//!
//! Which of several overlapping completions ends up on screen is decided
//! by [`ViewSlot::apply`] and the configured [`FreshnessPolicy`].

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::MissedTickBehavior;

use crate::config::{FreshnessPolicy, OverlapPolicy};
use crate::error::ClientResult;
use crate::logging::{log, log_stale, obj, v_str, Domain, Level};

/// The snapshot one view currently shows, plus request bookkeeping.
#[derive(Debug)]
pub struct ViewSlot<T> {
    name: &'static str,
    issued: u64,
    applied: u64,
    value: Option<ClientResult<Vec<T>>>,
}

impl<T> ViewSlot<T> {
    pub fn new(name: &'static str) -> Self {
        Self { name, issued: 0, applied: 0, value: None }
    }

    /// Sequence number for a request about to be sent.
    pub fn issue(&mut self) -> u64 {
        self.issued += 1;
        self.issued
    }

    /// Replace the snapshot with a completed request's result. Returns
    /// false when the freshness policy drops it.
    pub fn apply(
        &mut self,
        seq: u64,
        result: ClientResult<Vec<T>>,
        policy: FreshnessPolicy,
    ) -> bool {
        if policy == FreshnessPolicy::NewestIssued && seq < self.applied {
            log_stale(self.name, seq, self.applied);
            return false;
        }
        let rows = match &result {
            Ok(rows) => json!(rows.len()),
            Err(_) => Value::Null,
        };
        log(
            Level::Trace,
            Domain::View,
            "applied",
            obj(&[("view", v_str(self.name)), ("seq", json!(seq)), ("rows", rows)]),
        );
        self.applied = seq;
        self.value = Some(result);
        true
    }

    pub fn value(&self) -> Option<&ClientResult<Vec<T>>> {
        self.value.as_ref()
    }

    pub fn rows(&self) -> &[T] {
        match &self.value {
            Some(Ok(rows)) => rows.as_slice(),
            _ => &[],
        }
    }

    pub fn applied_seq(&self) -> u64 {
        self.applied
    }
}

/// Something with several views that can each be refreshed on its own.
#[async_trait]
pub trait PollTarget: Clone + Send + Sync + 'static {
    type View: Copy + Eq + Hash + Debug + Send + Sync + 'static;

    fn views(&self) -> Vec<Self::View>;

    /// Fetch and apply one view. Failures are surfaced by the target,
    /// never propagated to the scheduler.
    async fn refresh(&self, view: Self::View);
}

pub struct PollScheduler<P: PollTarget> {
    target: P,
    interval: Duration,
    overlap: OverlapPolicy,
    in_flight: HashMap<P::View, AbortHandle>,
    ticks: u64,
}

impl<P: PollTarget> PollScheduler<P> {
    pub fn new(target: P, interval: Duration, overlap: OverlapPolicy) -> Self {
        Self { target, interval, overlap, in_flight: HashMap::new(), ticks: 0 }
    }

    /// Issue one bundle of refreshes without awaiting them.
    pub fn fire(&mut self) -> Vec<JoinHandle<()>> {
        self.ticks += 1;
        let views = self.target.views();
        log(
            Level::Trace,
            Domain::Poll,
            "tick",
            obj(&[("tick", json!(self.ticks)), ("views", json!(views.len()))]),
        );

        let mut spawned = Vec::with_capacity(views.len());
        for view in views {
            if self.overlap == OverlapPolicy::CancelPrevious {
                if let Some(prev) = self.in_flight.remove(&view) {
                    if !prev.is_finished() {
                        prev.abort();
                        log(
                            Level::Debug,
                            Domain::Poll,
                            "cancelled",
                            obj(&[("view", v_str(&format!("{:?}", view)))]),
                        );
                    }
                }
            }
            let target = self.target.clone();
            let handle = tokio::spawn(async move { target.refresh(view).await });
            if self.overlap == OverlapPolicy::CancelPrevious {
                self.in_flight.insert(view, handle.abort_handle());
            }
            spawned.push(handle);
        }
        spawned
    }

    /// Run until the returned handle is stopped. The first bundle fires
    /// immediately.
    pub fn start(mut self) -> PollHandle {
        let interval = self.interval;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                self.fire();
            }
        });
        PollHandle { task: Some(task) }
    }
}

/// Stops the poll loop when stopped or dropped. Requests already in
/// flight still run to completion.
pub struct PollHandle {
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            log(Level::Info, Domain::Poll, "stopped", obj(&[]));
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
