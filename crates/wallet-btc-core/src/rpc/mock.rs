//! Test doubles for the backend traits, populated via builders.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bitcoin::Txid;

use crate::error::CoreError;
use crate::notify::NotifyHub;
use crate::types::{DirectoryEntry, PushEvent, RawTransaction};

use super::{BatchResponse, ElectrumRpc, NodeRpc, RpcCall, TxSource};

// ==============================================================================
// Transaction Source
// ==============================================================================

/// Canned transactions keyed by txid. Records every batch request.
pub struct MockTxSource {
    transactions: HashMap<Txid, RawTransaction>,
    failing: HashSet<Txid>,
    batches: Mutex<Vec<Vec<Txid>>>,
}

impl MockTxSource {
    pub fn builder() -> MockTxSourceBuilder {
        MockTxSourceBuilder {
            transactions: HashMap::new(),
            failing: HashSet::new(),
        }
    }

    /// Every `get_transactions` request seen so far, in call order.
    pub fn batches(&self) -> Vec<Vec<Txid>> {
        self.batches.lock().unwrap().clone()
    }
}

pub struct MockTxSourceBuilder {
    transactions: HashMap<Txid, RawTransaction>,
    failing: HashSet<Txid>,
}

impl MockTxSourceBuilder {
    pub fn with_tx(mut self, tx: RawTransaction) -> Self {
        self.transactions.insert(tx.txid, tx);
        self
    }

    /// Any batch that contains `txid` fails as a whole.
    pub fn failing_batch_with(mut self, txid: Txid) -> Self {
        self.failing.insert(txid);
        self
    }

    pub fn build(self) -> MockTxSource {
        MockTxSource {
            transactions: self.transactions,
            failing: self.failing,
            batches: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl TxSource for MockTxSource {
    async fn get_transaction(&self, txid: &Txid) -> Result<RawTransaction, CoreError> {
        self.transactions
            .get(txid)
            .cloned()
            .ok_or(CoreError::TxNotFound(*txid))
    }

    async fn get_transactions(
        &self,
        txids: &[Txid],
    ) -> Result<Vec<Option<RawTransaction>>, CoreError> {
        self.batches.lock().unwrap().push(txids.to_vec());
        if txids.iter().any(|txid| self.failing.contains(txid)) {
            return Err(CoreError::Socket("mock batch failure".into()));
        }
        Ok(txids
            .iter()
            .map(|txid| self.transactions.get(txid).cloned())
            .collect())
    }
}

// ==============================================================================
// ElectrumX
// ==============================================================================

type CannedKey = (String, String);

/// Canned ElectrumX replies keyed by method and first parameter.
///
/// Batch items without a canned reply are omitted from the response, the
/// way a misbehaving server drops items.
pub struct MockElectrum {
    replies: HashMap<CannedKey, Result<serde_json::Value, CoreError>>,
    reverse_batches: bool,
    batch_failure: Option<CoreError>,
    calls: Mutex<Vec<RpcCall>>,
}

impl MockElectrum {
    pub fn builder() -> MockElectrumBuilder {
        MockElectrumBuilder {
            replies: HashMap::new(),
            reverse_batches: false,
            batch_failure: None,
        }
    }

    /// Every call seen so far, batched or not, in order.
    pub fn calls(&self) -> Vec<RpcCall> {
        self.calls.lock().unwrap().clone()
    }

    fn reply(
        &self,
        method: &str,
        params: &[serde_json::Value],
    ) -> Option<Result<serde_json::Value, CoreError>> {
        self.replies.get(&key(method, params.first())).cloned()
    }
}

fn key(method: &str, param: Option<&serde_json::Value>) -> CannedKey {
    let param = match param {
        None => String::new(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };
    (method.to_owned(), param)
}

pub struct MockElectrumBuilder {
    replies: HashMap<CannedKey, Result<serde_json::Value, CoreError>>,
    reverse_batches: bool,
    batch_failure: Option<CoreError>,
}

impl MockElectrumBuilder {
    pub fn with_reply(
        mut self,
        method: &str,
        param: serde_json::Value,
        result: serde_json::Value,
    ) -> Self {
        self.replies.insert(key(method, Some(&param)), Ok(result));
        self
    }

    pub fn with_error(mut self, method: &str, param: serde_json::Value, err: CoreError) -> Self {
        self.replies.insert(key(method, Some(&param)), Err(err));
        self
    }

    /// Return batch items last-to-first.
    pub fn reverse_batches(mut self) -> Self {
        self.reverse_batches = true;
        self
    }

    /// Fail every batch as a whole.
    pub fn failing_batches(mut self, err: CoreError) -> Self {
        self.batch_failure = Some(err);
        self
    }

    pub fn build(self) -> MockElectrum {
        MockElectrum {
            replies: self.replies,
            reverse_batches: self.reverse_batches,
            batch_failure: self.batch_failure,
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ElectrumRpc for MockElectrum {
    async fn call(
        &self,
        method: &str,
        params: Vec<serde_json::Value>,
    ) -> Result<serde_json::Value, CoreError> {
        let reply = self.reply(method, &params);
        self.calls.lock().unwrap().push(RpcCall::new(method, params));
        reply.unwrap_or_else(|| Err(CoreError::Socket(format!("no canned reply for {method}"))))
    }

    async fn call_batch(&self, calls: &[RpcCall]) -> Result<Vec<BatchResponse>, CoreError> {
        self.calls.lock().unwrap().extend_from_slice(calls);
        if let Some(err) = &self.batch_failure {
            return Err(err.clone());
        }
        let mut responses: Vec<BatchResponse> = calls
            .iter()
            .enumerate()
            .filter_map(|(id, call)| {
                self.reply(&call.method, &call.params).map(|outcome| BatchResponse {
                    id: id as u64,
                    outcome,
                })
            })
            .collect();
        if self.reverse_batches {
            responses.reverse();
        }
        Ok(responses)
    }
}

// ==============================================================================
// Node
// ==============================================================================

/// Replays a scripted sequence of `getrawmempool` results, then fails.
pub struct MockNode {
    polls: Mutex<VecDeque<Result<Vec<Txid>, CoreError>>>,
}

impl MockNode {
    pub fn scripted(polls: Vec<Result<Vec<Txid>, CoreError>>) -> Self {
        Self {
            polls: Mutex::new(polls.into()),
        }
    }
}

#[async_trait]
impl NodeRpc for MockNode {
    async fn get_raw_mempool(&self) -> Result<Vec<Txid>, CoreError> {
        self.polls
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(CoreError::Socket("mempool script exhausted".into())))
    }
}

// ==============================================================================
// Notify Hub
// ==============================================================================

pub struct MockHub {
    directory: Result<Vec<DirectoryEntry>, CoreError>,
    push_failure: Option<CoreError>,
    directory_fetches: AtomicUsize,
    pushes: Mutex<Vec<Vec<PushEvent>>>,
}

impl MockHub {
    pub fn with_directory(entries: Vec<DirectoryEntry>) -> Self {
        Self {
            directory: Ok(entries),
            push_failure: None,
            directory_fetches: AtomicUsize::new(0),
            pushes: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_directory(err: CoreError) -> Self {
        Self {
            directory: Err(err),
            ..Self::with_directory(Vec::new())
        }
    }

    pub fn failing_push(mut self, err: CoreError) -> Self {
        self.push_failure = Some(err);
        self
    }

    pub fn directory_fetches(&self) -> usize {
        self.directory_fetches.load(Ordering::SeqCst)
    }

    /// Every push request seen so far, including failed ones.
    pub fn pushes(&self) -> Vec<Vec<PushEvent>> {
        self.pushes.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotifyHub for MockHub {
    async fn fetch_directory(&self) -> Result<Vec<DirectoryEntry>, CoreError> {
        self.directory_fetches.fetch_add(1, Ordering::SeqCst);
        self.directory.clone()
    }

    async fn push(&self, events: &[PushEvent]) -> Result<(), CoreError> {
        self.pushes.lock().unwrap().push(events.to_vec());
        match &self.push_failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}
