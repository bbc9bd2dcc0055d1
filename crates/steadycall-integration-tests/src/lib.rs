//! Integration tests and utilities for the steadycall workspace
//!
//! Provides a scripted in-memory transport so the scenario tests under
//! `tests/` can drive the full client (engine, interceptor and connection
//! manager together) without a network.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use steadycall_core::observe::{RetryEvent, RetrySink, TerminalEvent};
use steadycall_core::{CallOutcome, Deadline, Failure, SocketErrorKind, TransportFault};
use steadycall_transport::{Connector, UnaryResponse};

/// What the fake server does with one physical call.
#[derive(Debug, Clone)]
pub enum Step {
    /// Answer with this outcome.
    Reply(CallOutcome<String>),
    /// Never answer.
    Hang,
}

/// One physical call as the fake server saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    /// Connection the stub was built on.
    pub connection_id: u32,
    /// Stub that issued the call.
    pub stub_id: u32,
    /// Request payload.
    pub request: String,
    /// Time left on the attempt's deadline when the call started.
    pub deadline_remaining: Duration,
}

/// Ordered replies shared by every stub, plus a log of the calls made.
#[derive(Debug, Default)]
pub struct Script {
    steps: Mutex<VecDeque<Step>>,
    calls: Mutex<Vec<CallRecord>>,
}

impl Script {
    /// Script that plays `steps` in order, then echoes the request.
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Calls made so far.
    pub fn calls(&self) -> Vec<CallRecord> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn next(&self) -> Option<Step> {
        self.steps.lock().unwrap_or_else(PoisonError::into_inner).pop_front()
    }
}

/// Connection handle of the fake transport.
#[derive(Debug)]
pub struct FakeConnection {
    /// 1-based connection number.
    pub id: u32,
}

/// Stub of the fake transport.
#[derive(Debug, Clone)]
pub struct FakeStub {
    /// 1-based stub number, unique across connections.
    pub id: u32,
    /// Connection the stub was built on.
    pub connection_id: u32,
    script: Arc<Script>,
}

impl FakeStub {
    /// Issue one physical call.
    pub async fn call(&self, request: String, deadline: Deadline) -> UnaryResponse<String> {
        self.script.calls.lock().unwrap_or_else(PoisonError::into_inner).push(CallRecord {
            connection_id: self.connection_id,
            stub_id: self.id,
            request: request.clone(),
            deadline_remaining: deadline.remaining(),
        });
        match self.script.next() {
            Some(Step::Reply(outcome)) => UnaryResponse::new(outcome),
            Some(Step::Hang) => std::future::pending().await,
            None => UnaryResponse::new(Ok(request)),
        }
    }
}

/// Connector of the fake transport. Counts connects and stub builds and
/// can be told to refuse the next few connects.
#[derive(Debug)]
pub struct FakeConnector {
    script: Arc<Script>,
    connects: AtomicU32,
    stubs: AtomicU32,
    refuse: AtomicU32,
}

impl FakeConnector {
    /// Connector whose stubs play `script`.
    pub fn new(script: Arc<Script>) -> Self {
        Self {
            script,
            connects: AtomicU32::new(0),
            stubs: AtomicU32::new(0),
            refuse: AtomicU32::new(0),
        }
    }

    /// Refuse the next `count` connects.
    pub fn refuse_next(&self, count: u32) {
        self.refuse.store(count, Ordering::SeqCst);
    }

    /// Successful connects so far.
    pub fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    /// Stubs built so far.
    pub fn stubs(&self) -> u32 {
        self.stubs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    type Connection = FakeConnection;
    type Stub = FakeStub;

    async fn connect(&self) -> Result<FakeConnection, TransportFault> {
        let refused = self
            .refuse
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if refused.is_ok() {
            return Err(TransportFault::new(
                SocketErrorKind::ConnectionRefused,
                "connection refused",
            ));
        }
        Ok(FakeConnection {
            id: self.connects.fetch_add(1, Ordering::SeqCst) + 1,
        })
    }

    fn stub(&self, connection: &Arc<FakeConnection>) -> FakeStub {
        FakeStub {
            id: self.stubs.fetch_add(1, Ordering::SeqCst) + 1,
            connection_id: connection.id,
            script: Arc::clone(&self.script),
        }
    }
}

/// Sink that keeps every event it sees.
#[derive(Debug, Default)]
pub struct Recorder {
    retries: Mutex<Vec<RetryEvent>>,
    terminal: Mutex<Vec<TerminalEvent>>,
}

impl Recorder {
    /// Retry events so far.
    pub fn retries(&self) -> Vec<RetryEvent> {
        self.retries.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Terminal events so far.
    pub fn terminal(&self) -> Vec<TerminalEvent> {
        self.terminal.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl RetrySink for Recorder {
    fn on_retry(&self, event: &RetryEvent) {
        self.retries.lock().unwrap_or_else(PoisonError::into_inner).push(event.clone());
    }

    fn on_terminal(&self, event: &TerminalEvent) {
        self.terminal.lock().unwrap_or_else(PoisonError::into_inner).push(event.clone());
    }
}

/// Shorthand for a scripted failure.
pub fn fail(failure: Failure) -> Step {
    Step::Reply(Err(failure))
}
