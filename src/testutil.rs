//! Test doubles for the broker channel and client sinks

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Notify;

use crate::broker::{BrokerChannel, BrokerError, ConsumerTag, DeliveryCallback, QueueOptions};
use crate::subscription::{ClientSink, SinkError};

/// A broker operation as observed by [`MockBroker`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerCall {
    AssertQueue(String, QueueOptions),
    Bind(String, String, String),
    Unbind(String, String, String),
    DeleteQueue(String),
    Consume(String),
    Cancel(String),
}

/// In-memory broker recording every call, with failure injection
#[derive(Default)]
pub struct MockBroker {
    calls: Mutex<Vec<BrokerCall>>,
    consumers: Mutex<HashMap<String, (ConsumerTag, DeliveryCallback)>>,
    bindings: Mutex<HashMap<String, HashSet<String>>>,
    fail_assert: AtomicBool,
    fail_consume: AtomicBool,
    fail_bind: AtomicBool,
    fail_unbind: Mutex<HashSet<String>>,
    fail_delete: AtomicBool,
    gate: Mutex<Option<Arc<Notify>>>,
    next_tag: AtomicU64,
}

impl MockBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<BrokerCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&BrokerCall) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    pub fn set_fail_assert(&self, fail: bool) {
        self.fail_assert.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_consume(&self, fail: bool) {
        self.fail_consume.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_bind(&self, fail: bool) {
        self.fail_bind.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    /// Make unbinding this routing key fail
    pub fn fail_unbind(&self, routing_key: &str) {
        self.fail_unbind
            .lock()
            .unwrap()
            .insert(routing_key.to_string());
    }

    /// Hold the next `bind_queue` or `consume` call after it is recorded,
    /// until the returned gate is notified
    pub fn hold_next_call(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    async fn pass_gate(&self) {
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
    }

    /// Publish to the exchange; delivers to every consumed queue with a
    /// matching binding. Returns the number of queues reached.
    pub fn publish(&self, routing_key: &str, payload: &'static [u8]) -> usize {
        let targets: Vec<String> = self
            .bindings
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, patterns)| patterns.iter().any(|p| topic_matches(p, routing_key)))
            .map(|(queue, _)| queue.clone())
            .collect();

        let callbacks: Vec<DeliveryCallback> = {
            let consumers = self.consumers.lock().unwrap();
            targets
                .iter()
                .filter_map(|q| consumers.get(q).map(|(_, cb)| Arc::clone(cb)))
                .collect()
        };

        for callback in &callbacks {
            callback(Bytes::from_static(payload));
        }
        callbacks.len()
    }

    fn record(&self, call: BrokerCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl BrokerChannel for MockBroker {
    async fn assert_queue(&self, queue: &str, options: QueueOptions) -> Result<(), BrokerError> {
        self.record(BrokerCall::AssertQueue(queue.into(), options));
        if self.fail_assert.load(Ordering::SeqCst) {
            return Err(BrokerError::operation("queue_declare", queue, "injected"));
        }
        Ok(())
    }

    async fn bind_queue(&self, queue: &str, exchange: &str, key: &str) -> Result<(), BrokerError> {
        self.record(BrokerCall::Bind(queue.into(), exchange.into(), key.into()));
        self.pass_gate().await;
        if self.fail_bind.load(Ordering::SeqCst) {
            return Err(BrokerError::operation("queue_bind", queue, "injected"));
        }
        self.bindings
            .lock()
            .unwrap()
            .entry(queue.to_string())
            .or_default()
            .insert(key.to_string());
        Ok(())
    }

    async fn unbind_queue(&self, queue: &str, exchange: &str, key: &str) -> Result<(), BrokerError> {
        self.record(BrokerCall::Unbind(queue.into(), exchange.into(), key.into()));
        if self.fail_unbind.lock().unwrap().contains(key) {
            return Err(BrokerError::operation("queue_unbind", queue, "injected"));
        }
        if let Some(keys) = self.bindings.lock().unwrap().get_mut(queue) {
            keys.remove(key);
        }
        Ok(())
    }

    async fn delete_queue(&self, queue: &str) -> Result<(), BrokerError> {
        self.record(BrokerCall::DeleteQueue(queue.into()));
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(BrokerError::operation("queue_delete", queue, "injected"));
        }
        self.bindings.lock().unwrap().remove(queue);
        self.consumers.lock().unwrap().remove(queue);
        Ok(())
    }

    async fn consume(
        &self,
        queue: &str,
        on_delivery: DeliveryCallback,
    ) -> Result<ConsumerTag, BrokerError> {
        self.record(BrokerCall::Consume(queue.into()));
        self.pass_gate().await;
        if self.fail_consume.load(Ordering::SeqCst) {
            return Err(BrokerError::operation("basic_consume", queue, "injected"));
        }
        let n = self.next_tag.fetch_add(1, Ordering::SeqCst);
        let tag = ConsumerTag::new(format!("ctag-{}", n));
        self.consumers
            .lock()
            .unwrap()
            .insert(queue.to_string(), (tag.clone(), on_delivery));
        Ok(tag)
    }

    async fn cancel_consume(&self, tag: &ConsumerTag) -> Result<(), BrokerError> {
        self.record(BrokerCall::Cancel(tag.to_string()));
        self.consumers.lock().unwrap().retain(|_, (t, _)| t != tag);
        Ok(())
    }
}

/// AMQP topic matching: `*` is exactly one word, `#` zero or more
fn topic_matches(pattern: &str, key: &str) -> bool {
    fn walk(p: &[&str], k: &[&str]) -> bool {
        match (p.first(), k.first()) {
            (None, None) => true,
            (Some(&"#"), _) => walk(&p[1..], k) || (!k.is_empty() && walk(p, &k[1..])),
            (Some(&"*"), Some(_)) => walk(&p[1..], &k[1..]),
            (Some(a), Some(b)) if a == b => walk(&p[1..], &k[1..]),
            _ => false,
        }
    }
    let p: Vec<&str> = pattern.split('.').collect();
    let k: Vec<&str> = key.split('.').collect();
    walk(&p, &k)
}

/// Sink that records everything written to it
pub struct RecordingSink {
    writable: AtomicBool,
    fail_send: AtomicBool,
    sent: Mutex<Vec<Bytes>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            writable: AtomicBool::new(true),
            fail_send: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn set_writable(&self, writable: bool) {
        self.writable.store(writable, Ordering::SeqCst);
    }

    /// Make writes fail while the sink still reports writable
    pub fn set_fail_send(&self, fail: bool) {
        self.fail_send.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Bytes> {
        self.sent.lock().unwrap().clone()
    }
}

impl ClientSink for RecordingSink {
    fn is_writable(&self) -> bool {
        self.writable.load(Ordering::SeqCst)
    }

    fn send(&self, payload: Bytes) -> Result<(), SinkError> {
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(SinkError::Full);
        }
        self.sent.lock().unwrap().push(payload);
        Ok(())
    }
}

/// Poll `cond` until it holds or two seconds pass
pub async fn wait_until(cond: impl Fn() -> bool) -> bool {
    for _ in 0..400 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}

/// Log output collected by [`capture_logs`]
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run `f` with a DEBUG level subscriber on this thread and return its output
pub fn capture_logs(f: impl FnOnce()) -> String {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();

    tracing::subscriber::with_default(subscriber, f);

    let bytes = buffer.0.lock().unwrap().clone();
    String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_matches() {
        assert!(topic_matches("*.order.1.*.*", "create.order.1.user.7"));
        assert!(topic_matches("#", "a.b.c"));
        assert!(topic_matches("a.#", "a"));
        assert!(!topic_matches("*.order.1.*.*", "create.order.2.user.7"));
        assert!(!topic_matches("*.*", "a"));
    }
}
