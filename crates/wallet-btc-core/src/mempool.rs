//! Mempool watcher.
//!
//! Polls the node's mempool on a fixed interval and diffs it against the
//! previous poll. New transaction ids trigger a notification fan-out,
//! spawned as an independent task so the next poll never waits on it.
//!
//! The first poll after start treats the whole mempool as new unless the
//! watcher was seeded with [`MempoolWatcher::with_snapshot`].

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use bitcoin::Txid;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::notify::{spawn_fanout, NotifyHub};
use crate::rpc::{NodeRpc, TxSource};
use crate::types::DirectoryEntry;

/// The unconfirmed txids seen by the last successful poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MempoolSnapshot(HashSet<Txid>);

impl MempoolSnapshot {
    pub fn new(txids: impl IntoIterator<Item = Txid>) -> Self {
        Self(txids.into_iter().collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, txid: &Txid) -> bool {
        self.0.contains(txid)
    }
}

/// Ids in `current` that `previous` does not hold, in node order, without
/// repeats.
pub fn diff(previous: &MempoolSnapshot, current: &[Txid]) -> Vec<Txid> {
    let mut seen = HashSet::new();
    current
        .iter()
        .filter(|txid| !previous.contains(txid) && seen.insert(**txid))
        .copied()
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// The mempool could not be fetched; the snapshot is unchanged.
    Aborted,
    /// Nothing new.
    Stable,
    /// New ids appeared. `directory` is `None` when it could not be fetched,
    /// in which case nobody is notified.
    Changed {
        added: Vec<Txid>,
        directory: Option<Vec<DirectoryEntry>>,
    },
}

/// One watcher cycle: `previous` in, next snapshot and outcome out.
///
/// The snapshot advances whenever the mempool fetch succeeds, even if the
/// directory fetch then fails.
pub async fn poll_cycle(
    node: &dyn NodeRpc,
    hub: &dyn NotifyHub,
    previous: MempoolSnapshot,
) -> (MempoolSnapshot, CycleOutcome) {
    let current = match node.get_raw_mempool().await {
        Ok(current) => current,
        Err(e) => {
            error!(error = %e, "getrawmempool failed; keeping previous snapshot");
            return (previous, CycleOutcome::Aborted);
        }
    };

    let added = diff(&previous, &current);
    let snapshot = MempoolSnapshot::new(current);
    if added.is_empty() {
        debug!(mempool_size = snapshot.len(), "mempool unchanged");
        return (snapshot, CycleOutcome::Stable);
    }

    debug!(added = added.len(), mempool_size = snapshot.len(), "new mempool transactions");
    let directory = match hub.fetch_directory().await {
        Ok(directory) => Some(directory),
        Err(e) => {
            error!(
                added = added.len(),
                error = %e,
                "subscriber directory unavailable; skipping notification"
            );
            None
        }
    };
    (snapshot, CycleOutcome::Changed { added, directory })
}

pub struct MempoolWatcher {
    node: Arc<dyn NodeRpc>,
    hub: Arc<dyn NotifyHub>,
    source: Arc<dyn TxSource>,
    interval: Duration,
    snapshot: MempoolSnapshot,
}

impl MempoolWatcher {
    pub fn new(
        node: Arc<dyn NodeRpc>,
        hub: Arc<dyn NotifyHub>,
        source: Arc<dyn TxSource>,
        interval: Duration,
    ) -> Self {
        Self {
            node,
            hub,
            source,
            interval,
            snapshot: MempoolSnapshot::default(),
        }
    }

    /// Start from a known mempool instead of an empty one.
    pub fn with_snapshot(mut self, snapshot: MempoolSnapshot) -> Self {
        self.snapshot = snapshot;
        self
    }

    pub fn snapshot(&self) -> &MempoolSnapshot {
        &self.snapshot
    }

    /// Run one cycle. Returns the fan-out task if one was spawned.
    pub async fn tick(&mut self) -> Option<JoinHandle<()>> {
        let previous = std::mem::take(&mut self.snapshot);
        let (snapshot, outcome) = poll_cycle(self.node.as_ref(), self.hub.as_ref(), previous).await;
        self.snapshot = snapshot;

        match outcome {
            CycleOutcome::Changed {
                added,
                directory: Some(directory),
            } if !directory.is_empty() => Some(spawn_fanout(
                self.source.clone(),
                self.hub.clone(),
                added,
                directory,
            )),
            _ => None,
        }
    }

    /// Poll until `shutdown` turns true or its sender is dropped.
    ///
    /// A cycle that outlasts the interval delays the next tick instead of
    /// overlapping it.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = self.interval.as_secs(), "mempool watcher started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("mempool watcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::rpc::mock::{MockHub, MockNode, MockTxSource};
    use crate::test_util::{coinbase_input, make_raw_tx, output_to, txid_from_byte};

    const WATCHED: &str = "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa";

    fn directory() -> Vec<DirectoryEntry> {
        vec![DirectoryEntry {
            name: WATCHED.into(),
            chain_type: "BTC".into(),
            chain_id: "mainnet".into(),
            cid: "c1".into(),
            language: "en".into(),
            platform: "ios".into(),
        }]
    }

    #[test]
    fn diff_keeps_node_order_without_repeats() {
        let previous = MempoolSnapshot::new([txid_from_byte(2)]);
        let current = [txid_from_byte(3), txid_from_byte(2), txid_from_byte(1), txid_from_byte(3)];
        assert_eq!(diff(&previous, &current), vec![txid_from_byte(3), txid_from_byte(1)]);
    }

    #[tokio::test]
    async fn unchanged_mempool_is_stable() {
        let ids = vec![txid_from_byte(1), txid_from_byte(2)];
        let node = MockNode::scripted(vec![Ok(ids.clone())]);
        let hub = MockHub::with_directory(directory());

        let (snapshot, outcome) = poll_cycle(&node, &hub, MempoolSnapshot::new(ids.clone())).await;
        assert_eq!(outcome, CycleOutcome::Stable);
        assert_eq!(snapshot, MempoolSnapshot::new(ids));
        assert_eq!(hub.directory_fetches(), 0);
    }

    #[tokio::test]
    async fn changed_mempool_reports_only_new_ids() {
        let (t1, t2, t3) = (txid_from_byte(1), txid_from_byte(2), txid_from_byte(3));
        let node = MockNode::scripted(vec![Ok(vec![t2, t3])]);
        let hub = MockHub::with_directory(directory());

        let (snapshot, outcome) = poll_cycle(&node, &hub, MempoolSnapshot::new([t1, t2])).await;
        assert_eq!(
            outcome,
            CycleOutcome::Changed {
                added: vec![t3],
                directory: Some(directory()),
            }
        );
        assert_eq!(snapshot, MempoolSnapshot::new([t2, t3]));
    }

    #[tokio::test]
    async fn failed_poll_keeps_snapshot() {
        let node = MockNode::scripted(vec![Err(CoreError::Network { status: 401 })]);
        let hub = MockHub::with_directory(directory());
        let previous = MempoolSnapshot::new([txid_from_byte(1)]);

        let (snapshot, outcome) = poll_cycle(&node, &hub, previous.clone()).await;
        assert_eq!(outcome, CycleOutcome::Aborted);
        assert_eq!(snapshot, previous);
    }

    #[tokio::test]
    async fn directory_failure_still_advances_snapshot() {
        let node = MockNode::scripted(vec![Ok(vec![txid_from_byte(4)])]);
        let hub = MockHub::failing_directory(CoreError::Network { status: 500 });

        let (snapshot, outcome) = poll_cycle(&node, &hub, MempoolSnapshot::default()).await;
        assert_eq!(
            outcome,
            CycleOutcome::Changed {
                added: vec![txid_from_byte(4)],
                directory: None,
            }
        );
        assert!(snapshot.contains(&txid_from_byte(4)));
    }

    fn watcher(node: MockNode, hub: Arc<MockHub>, source: MockTxSource) -> MempoolWatcher {
        MempoolWatcher::new(Arc::new(node), hub, Arc::new(source), Duration::from_millis(10))
    }

    #[tokio::test]
    async fn second_identical_poll_sends_nothing() {
        let tx = txid_from_byte(1);
        let node = MockNode::scripted(vec![Ok(vec![tx]), Ok(vec![tx])]);
        let hub = Arc::new(MockHub::with_directory(directory()));
        let source = MockTxSource::builder()
            .with_tx(make_raw_tx(tx, vec![coinbase_input()], vec![output_to(Some(WATCHED), 50)]))
            .build();
        let mut watcher = watcher(node, hub.clone(), source);

        let fanout = watcher.tick().await.expect("first poll sees the whole mempool");
        fanout.await.unwrap();
        assert!(watcher.tick().await.is_none());

        assert_eq!(hub.pushes().len(), 1);
        assert_eq!(watcher.snapshot(), &MempoolSnapshot::new([tx]));
    }

    #[tokio::test]
    async fn seeded_watcher_skips_cold_start_burst() {
        let tx = txid_from_byte(1);
        let node = MockNode::scripted(vec![Ok(vec![tx])]);
        let hub = Arc::new(MockHub::with_directory(directory()));
        let mut watcher = watcher(node, hub.clone(), MockTxSource::builder().build())
            .with_snapshot(MempoolSnapshot::new([tx]));

        assert!(watcher.tick().await.is_none());
        assert_eq!(hub.directory_fetches(), 0);
    }

    #[tokio::test]
    async fn empty_directory_spawns_no_fanout() {
        let node = MockNode::scripted(vec![Ok(vec![txid_from_byte(1)])]);
        let hub = Arc::new(MockHub::with_directory(Vec::new()));
        let mut watcher = watcher(node, hub.clone(), MockTxSource::builder().build());

        assert!(watcher.tick().await.is_none());
        assert_eq!(hub.directory_fetches(), 1);
        assert_eq!(watcher.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let node = MockNode::scripted(Vec::new());
        let hub = Arc::new(MockHub::with_directory(Vec::new()));
        let watcher = watcher(node, hub, MockTxSource::builder().build());
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(watcher.run(rx));
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("watcher must stop")
            .unwrap();
    }
}
