//! The running Chord node (C8, C9, C10): owns all routing/storage state and
//! composes the lookup engine, join/stabilization protocol, and DHT API.

pub mod dht;
pub mod join;
pub mod lookup;
pub mod stabilize;

pub use lookup::{LookupOutcome, TraceHop};
pub use stabilize::{random_fix_interval as stabilize_interval, UpdatePredecessorOutcome};

use crate::finger_table::FingerTable;
use crate::identifier::Identifier;
use crate::node_ref::NodeRef;
use crate::storage::Storage;
use crate::successor_list::SuccessorList;
use crate::transport::PeerLink;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

/// Mutable Chord routing and storage state. Always accessed through
/// [`Node::state`]'s mutex, and the guard is never held across an `.await` --
/// suspension points are the only interleaving boundaries (§5).
pub struct NodeState {
    pub finger_table: FingerTable,
    pub successor_list: SuccessorList,
    pub predecessor: Option<NodeRef>,
    pub storage: Storage,
}

/// One Chord overlay peer.
pub struct Node {
    pub self_ref: NodeRef,
    pub bits: u32,
    pub network_timeout: Duration,
    pub fix_interval: Duration,
    pub link: PeerLink,
    pub additional_data: HashMap<String, String>,
    state: Mutex<NodeState>,
    fix_finger_next: AtomicUsize,
    booted_tx: watch::Sender<bool>,
    booted_rx: watch::Receiver<bool>,
}

impl Node {
    /// Constructs a node in the "Booting" state (§4.9): its finger table has
    /// no resolved successors yet. Call [`Node::join_standalone`] or
    /// [`Node::join_with_bootstrap`] once to complete startup.
    pub fn new(address: impl Into<String>, bits: u32, network_timeout: Duration, fix_interval: Duration) -> Arc<Node> {
        Self::with_id(address, None, bits, network_timeout, fix_interval)
    }

    /// Like [`Node::new`], but `id_override` (when set) replaces the
    /// address-derived id -- used when a host-key file (§4.12) supplies the
    /// node's identifier instead.
    pub fn with_id(address: impl Into<String>, id_override: Option<Identifier>, bits: u32, network_timeout: Duration, fix_interval: Duration) -> Arc<Node> {
        let mut self_ref = NodeRef::from_address(address, bits);
        if let Some(id) = id_override {
            self_ref.id = id;
        }
        let finger_table = FingerTable::new(self_ref.id, bits, None);
        let successor_list = SuccessorList::new(self_ref.clone());
        let (booted_tx, booted_rx) = watch::channel(false);

        Arc::new(Node {
            self_ref,
            bits,
            network_timeout,
            fix_interval,
            link: PeerLink::new(network_timeout),
            additional_data: HashMap::new(),
            state: Mutex::new(NodeState { finger_table, successor_list, predecessor: None, storage: Storage::new() }),
            fix_finger_next: AtomicUsize::new(0),
            booted_tx,
            booted_rx,
        })
    }

    pub fn id(&self) -> Identifier {
        self.self_ref.id
    }

    pub fn address(&self) -> &str {
        &self.self_ref.address
    }

    pub fn as_node_ref(&self) -> NodeRef {
        self.self_ref.clone()
    }

    pub fn is_booted(&self) -> bool {
        *self.booted_rx.borrow()
    }

    fn mark_booted(&self) {
        let _ = self.booted_tx.send(true);
    }

    /// RPCs that touch routing state suspend here until join has completed
    /// (§4.9) -- this keeps a concurrently-joining peer from observing a
    /// half-built finger table.
    pub async fn wait_until_booted(&self) {
        let mut rx = self.booted_rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    pub fn predecessor(&self) -> Option<NodeRef> {
        self.state.lock().unwrap().predecessor.clone()
    }

    pub fn successor(&self) -> NodeRef {
        self.state.lock().unwrap().successor_list.head().clone()
    }

    pub fn successor_list_snapshot(&self) -> Vec<NodeRef> {
        self.state.lock().unwrap().successor_list.entries().to_vec()
    }

    pub fn finger_table_snapshot(&self) -> Vec<(Identifier, Option<NodeRef>)> {
        self.state
            .lock()
            .unwrap()
            .finger_table
            .fingers
            .iter()
            .map(|f| (f.start, f.successor.clone()))
            .collect()
    }

    pub fn storage_len(&self) -> usize {
        self.state.lock().unwrap().storage.len()
    }

    pub fn expire_storage(&self) {
        self.state.lock().unwrap().storage.expire_tick();
    }

    /// Answers the `get_node_info` RPC. Does not wait for boot completion --
    /// it is the liveness probe other nodes use precisely to find out
    /// whether we are still booting.
    pub fn rpc_get_node_info(&self, with_successor_list: bool, with_additional_data: bool) -> crate::rpc::chord_proto::GetNodeInfoResponse {
        let state = self.state.lock().unwrap();
        crate::rpc::chord_proto::GetNodeInfoResponse {
            self_: Some((&self.self_ref).into()),
            successor: Some(state.successor_list.head().into()),
            predecessor: state.predecessor.as_ref().map(Into::into),
            successor_list: if with_successor_list { state.successor_list.entries().iter().map(Into::into).collect() } else { Vec::new() },
            additional_data: if with_additional_data { self.additional_data.clone() } else { Default::default() },
        }
    }

    fn next_fix_finger_index(&self) -> usize {
        // finger[0] is maintained by update_successor_list; cycle 1..bits.
        let bits = self.bits.max(1) as usize;
        loop {
            let prev = self.fix_finger_next.fetch_add(1, Ordering::Relaxed);
            let next = (prev + 1) % bits;
            if next != 0 {
                return next;
            }
        }
    }
}
