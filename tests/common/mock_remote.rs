//! Mock RemoteAuthority for testing.
//!
//! Records every probe and POST for assertions. Replies are scripted per
//! endpoint; anything unscripted gets the default reply. The "ingested"
//! log is what the authority itself has stored, which differs from what
//! the engine believes when an acknowledgement is lost.

use pos_replication::remote::BoxFuture;
use pos_replication::{ProbeTarget, RemoteAuthority, ReplicationError};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// What the authority does with one POST.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockReply {
    /// Store the batch and answer 2xx.
    Accept,
    /// Answer with this status without storing.
    Status(u16),
    /// Connection refused before anything reached the authority.
    Refused,
    /// Store the batch, but the response never reaches the engine.
    LoseAck,
}

/// A recorded post_batch() call.
#[derive(Debug, Clone)]
pub struct PostCall {
    pub endpoint: String,
    pub body: Value,
}

impl PostCall {
    /// Ids of the records in the body, in wire order.
    pub fn ids(&self) -> Vec<String> {
        self.body
            .as_array()
            .map(|records| {
                records
                    .iter()
                    .filter_map(|r| r["id"].as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Mock implementation of RemoteAuthority that records all calls.
///
/// # Example
/// ```rust,ignore
/// let remote = MockRemote::new();
/// remote.script("/api/sync/sales", &[MockReply::Status(503), MockReply::Accept]);
///
/// // Use in tests...
///
/// assert_eq!(remote.posts_to("/api/sync/sales").len(), 2);
/// ```
pub struct MockRemote {
    reachable: AtomicBool,
    probes: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    post_delay: Mutex<Duration>,
    default_reply: Mutex<MockReply>,
    scripts: Mutex<HashMap<String, VecDeque<MockReply>>>,
    posts: Mutex<Vec<PostCall>>,
    ingested: Mutex<HashMap<String, Vec<String>>>,
}

impl MockRemote {
    /// Reachable authority that accepts everything.
    pub fn new() -> Self {
        Self {
            reachable: AtomicBool::new(true),
            probes: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            post_delay: Mutex::new(Duration::ZERO),
            default_reply: Mutex::new(MockReply::Accept),
            scripts: Mutex::new(HashMap::new()),
            posts: Mutex::new(Vec::new()),
            ingested: Mutex::new(HashMap::new()),
        }
    }

    pub fn offline() -> Self {
        let remote = Self::new();
        remote.set_reachable(false);
        remote
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Queue replies for the next POSTs to `endpoint`.
    pub fn script(&self, endpoint: &str, replies: &[MockReply]) {
        self.scripts
            .lock()
            .unwrap()
            .entry(endpoint.to_string())
            .or_default()
            .extend(replies.iter().copied());
    }

    pub fn set_default_reply(&self, reply: MockReply) {
        *self.default_reply.lock().unwrap() = reply;
    }

    /// Hold every POST this long before replying.
    pub fn set_post_delay(&self, delay: Duration) {
        *self.post_delay.lock().unwrap() = delay;
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    /// Most POSTs ever outstanding at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn posts(&self) -> Vec<PostCall> {
        self.posts.lock().unwrap().clone()
    }

    pub fn post_count(&self) -> usize {
        self.posts.lock().unwrap().len()
    }

    pub fn posts_to(&self, endpoint: &str) -> Vec<PostCall> {
        self.posts().into_iter().filter(|p| p.endpoint == endpoint).collect()
    }

    pub fn endpoints(&self) -> Vec<String> {
        self.posts().into_iter().map(|p| p.endpoint).collect()
    }

    /// Every id the authority stored for `endpoint`, duplicates included.
    pub fn ingested(&self, endpoint: &str) -> Vec<String> {
        self.ingested.lock().unwrap().get(endpoint).cloned().unwrap_or_default()
    }

    fn next_reply(&self, endpoint: &str) -> MockReply {
        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(endpoint)
            .and_then(VecDeque::pop_front);
        scripted.unwrap_or(*self.default_reply.lock().unwrap())
    }

    fn ingest(&self, call: &PostCall) {
        self.ingested
            .lock()
            .unwrap()
            .entry(call.endpoint.clone())
            .or_default()
            .extend(call.ids());
    }
}

impl Default for MockRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteAuthority for MockRemote {
    fn check_health(&self, _target: ProbeTarget) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.probes.fetch_add(1, Ordering::SeqCst);
            if self.reachable.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(ReplicationError::transport_msg("/health", "connection refused"))
            }
        })
    }

    fn post_batch<'a>(&'a self, endpoint: &'a str, body: Vec<u8>) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let call = PostCall {
                endpoint: endpoint.to_string(),
                body: serde_json::from_slice(&body)?,
            };
            self.posts.lock().unwrap().push(call.clone());

            let outstanding = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(outstanding, Ordering::SeqCst);
            let delay = *self.post_delay.lock().unwrap();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if !self.reachable.load(Ordering::SeqCst) {
                return Err(ReplicationError::transport_msg(endpoint, "connection reset"));
            }

            match self.next_reply(endpoint) {
                MockReply::Accept => {
                    self.ingest(&call);
                    Ok(())
                }
                MockReply::Status(code) => Err(ReplicationError::remote_status(endpoint, code, "")),
                MockReply::Refused => Err(ReplicationError::transport_msg(endpoint, "connection refused")),
                MockReply::LoseAck => {
                    self.ingest(&call);
                    Err(ReplicationError::timeout(format!("transmit {}", endpoint), Duration::from_secs(30)))
                }
            }
        })
    }
}
