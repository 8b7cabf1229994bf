// Shared test fixtures: a scripted transport and a small catalog.
#![allow(dead_code, clippy::unwrap_used)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use quirkmesh_api::{
    AttributeValue, ClusterCommand, ClusterId, ClusterRequest, Error, OperationKind, OperationSet,
    ReportingConfig, StrategyKind, Transport,
};

/// Canned reply for one call.
#[derive(Debug, Clone)]
pub enum Reply {
    Value(AttributeValue),
    Ack,
    Fail(Error),
}

/// What the transport was asked to do.
#[derive(Debug, Clone)]
pub struct Call {
    pub operation: OperationKind,
    pub cluster: ClusterId,
    pub attribute: u16,
    pub endpoint: u8,
    pub strategy: StrategyKind,
    pub command: Option<ClusterCommand>,
    /// Value carried by a write.
    pub value: Option<AttributeValue>,
    pub at: tokio::time::Instant,
}

type Key = (OperationKind, StrategyKind);

/// Transport double answering from a script.
///
/// Replies are looked up by (operation, strategy kind): queued one-shot
/// replies first, then a sticky reply, then success (reads return
/// `Bool(true)`).
pub struct ScriptedTransport {
    supported: OperationSet,
    queued: Mutex<HashMap<Key, VecDeque<Reply>>>,
    sticky: Mutex<HashMap<Key, Reply>>,
    delays: Mutex<HashMap<OperationKind, Duration>>,
    calls: Mutex<Vec<Call>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            supported: OperationSet::all(),
            queued: Mutex::new(HashMap::new()),
            sticky: Mutex::new(HashMap::new()),
            delays: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_supported(mut self, supported: OperationSet) -> Self {
        self.supported = supported;
        self
    }

    /// Answer every matching call with `reply` until changed.
    pub fn always(&self, op: OperationKind, strategy: StrategyKind, reply: Reply) {
        self.sticky.lock().unwrap().insert((op, strategy), reply);
    }

    /// Answer the next matching calls with `replies`, in order.
    pub fn queue(&self, op: OperationKind, strategy: StrategyKind, replies: Vec<Reply>) {
        self.queued
            .lock()
            .unwrap()
            .entry((op, strategy))
            .or_default()
            .extend(replies);
    }

    /// Make every call of `op` take `delay` before answering.
    pub fn delay(&self, op: OperationKind, delay: Duration) {
        self.delays.lock().unwrap().insert(op, delay);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_of(&self, op: OperationKind) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.operation == op)
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn answer(
        &self,
        op: OperationKind,
        request: &ClusterRequest,
        command: Option<&ClusterCommand>,
        value: Option<&AttributeValue>,
    ) -> Reply {
        self.calls.lock().unwrap().push(Call {
            operation: op,
            cluster: request.cluster,
            attribute: request.attribute,
            endpoint: request.endpoint,
            strategy: request.strategy.kind,
            command: command.cloned(),
            value: value.cloned(),
            at: tokio::time::Instant::now(),
        });

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = self.delays.lock().unwrap().get(&op).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let key = (op, request.strategy.kind);
        let queued = self
            .queued
            .lock()
            .unwrap()
            .get_mut(&key)
            .and_then(VecDeque::pop_front);
        let reply = queued
            .or_else(|| self.sticky.lock().unwrap().get(&key).cloned())
            .unwrap_or(match op {
                OperationKind::Read => Reply::Value(AttributeValue::Bool(true)),
                _ => Reply::Ack,
            });

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        reply
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn supported_operations(&self) -> OperationSet {
        self.supported
    }

    async fn read_attribute(&self, request: &ClusterRequest) -> Result<AttributeValue, Error> {
        match self.answer(OperationKind::Read, request, None, None).await {
            Reply::Value(v) => Ok(v),
            Reply::Ack => Ok(AttributeValue::Bool(true)),
            Reply::Fail(e) => Err(e),
        }
    }

    async fn write_attribute(
        &self,
        request: &ClusterRequest,
        value: &AttributeValue,
    ) -> Result<(), Error> {
        ack(self.answer(OperationKind::Write, request, None, Some(value)).await)
    }

    async fn configure_reporting(
        &self,
        request: &ClusterRequest,
        _config: &ReportingConfig,
    ) -> Result<(), Error> {
        ack(self.answer(OperationKind::ConfigureReport, request, None, None).await)
    }

    async fn invoke_command(
        &self,
        request: &ClusterRequest,
        command: &ClusterCommand,
    ) -> Result<(), Error> {
        ack(self.answer(OperationKind::Command, request, Some(command), None).await)
    }
}

fn ack(reply: Reply) -> Result<(), Error> {
    match reply {
        Reply::Fail(e) => Err(e),
        Reply::Value(_) | Reply::Ack => Ok(()),
    }
}

// ── Error shorthands ────────────────────────────────────────────────

pub fn unsupported() -> Reply {
    Reply::Fail(Error::Unsupported {
        cluster: ClusterId::Basic,
        detail: "unsupported attribute".into(),
    })
}

pub fn transient() -> Reply {
    Reply::Fail(Error::TransientNetwork("no mac ack".into()))
}

pub fn malformed() -> Reply {
    Reply::Fail(Error::Malformed {
        message: "short frame".into(),
    })
}

/// Poll `cond` until it holds, advancing (paused) time in small steps.
pub async fn eventually<F: FnMut() -> bool>(mut cond: F) {
    for _ in 0..2000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}
