//! Test Utilities Module
//!
//! Provides a scripted in-memory connector and session for exercising the
//! factory, batch builder and schedulers without a network.
//! This module is only compiled when running tests.

#![cfg(test)]

use crate::session::{Connector, Session};
use crate::transport::TransportError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Shared counters observed by tests
#[derive(Debug, Default)]
pub struct MockState {
    attempts: AtomicU64,
    operations: AtomicU64,
    closed: Mutex<Vec<u64>>,
}

/// Connector whose behaviour is fixed at construction
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    state: Arc<MockState>,
    /// Fail this many connect attempts before succeeding
    failing_connects: u64,
    always_failing: bool,
    /// Sessions whose id is a multiple of this fail every operation
    failing_op_every: Option<u64>,
    /// Fail connect for these attempt numbers only
    failing_attempts: Vec<u64>,
    operation_delay: Duration,
    connect_delay: Duration,
    failing_close: bool,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_connects(mut self, count: u64) -> Self {
        self.failing_connects = count;
        self
    }

    pub fn always_failing(mut self) -> Self {
        self.always_failing = true;
        self
    }

    pub fn failing_attempts(mut self, attempts: &[u64]) -> Self {
        self.failing_attempts = attempts.to_vec();
        self
    }

    pub fn failing_operations_every(mut self, n: u64) -> Self {
        self.failing_op_every = Some(n);
        self
    }

    pub fn with_operation_delay(mut self, delay: Duration) -> Self {
        self.operation_delay = delay;
        self
    }

    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    pub fn failing_close(mut self) -> Self {
        self.failing_close = true;
        self
    }

    pub fn attempts(&self) -> u64 {
        self.state.attempts.load(Ordering::SeqCst)
    }

    /// Operations issued (including ones that later failed or were aborted)
    pub fn operations(&self) -> u64 {
        self.state.operations.load(Ordering::SeqCst)
    }

    /// Ids of closed sessions, in close order
    pub fn closed(&self) -> Vec<u64> {
        self.state.closed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Session = MockSession;

    async fn connect(&self) -> Result<MockSession, TransportError> {
        let attempt = self.state.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.connect_delay.is_zero() {
            tokio::time::sleep(self.connect_delay).await;
        }
        if self.always_failing
            || attempt < self.failing_connects
            || self.failing_attempts.contains(&attempt)
        {
            return Err(TransportError::Protocol(format!(
                "scripted connect failure on attempt {attempt}"
            )));
        }
        Ok(MockSession {
            id: attempt,
            state: self.state.clone(),
            fail_operations: self.failing_op_every.is_some_and(|n| attempt % n == 0),
            operation_delay: self.operation_delay,
            fail_close: self.failing_close,
        })
    }
}

#[derive(Debug)]
pub struct MockSession {
    id: u64,
    state: Arc<MockState>,
    fail_operations: bool,
    operation_delay: Duration,
    fail_close: bool,
}

impl MockSession {
    /// Connect attempt number that produced this session
    pub fn id(&self) -> u64 {
        self.id
    }
}

#[async_trait]
impl Session for MockSession {
    async fn list_tools(&self) -> Result<(), TransportError> {
        self.state.operations.fetch_add(1, Ordering::SeqCst);
        if !self.operation_delay.is_zero() {
            tokio::time::sleep(self.operation_delay).await;
        }
        if self.fail_operations {
            return Err(TransportError::Rpc {
                code: -32603,
                message: "scripted operation failure".into(),
            });
        }
        Ok(())
    }

    async fn close(self) -> Result<(), TransportError> {
        self.state.closed.lock().unwrap().push(self.id);
        if self.fail_close {
            return Err(TransportError::Closed);
        }
        Ok(())
    }
}
