//! Periodic maintenance (part of C8): `update_successor_list`, `fix_finger`,
//! `check_predecessor`, plus the `update_neighbors`/`update_predecessor`
//! exchange shared by join and the periodic loop.

use super::Node;
use crate::error::{ChordError, ChordResult};
use crate::identifier::Identifier;
use crate::node_ref::NodeRef;
use crate::rpc::chord_proto;
use crate::ring::in_interval;
use crate::storage::StoredRecord;
use crate::successor_list::SuccessorList;
use std::sync::Arc;
use std::time::Duration;

/// Result of answering an `update_predecessor` RPC.
pub enum UpdatePredecessorOutcome {
    Accepted { new_predecessor: NodeRef, old_predecessor: NodeRef, handoff: Vec<(Identifier, StoredRecord)> },
    Rejected(NodeRef),
}

fn decode_stored_record(msg: chord_proto::StoredRecordMsg) -> ChordResult<(Identifier, StoredRecord)> {
    let key_bytes: [u8; 32] = msg.key.try_into().map_err(|_| ChordError::Schema("handoff key must be 32 bytes".into()))?;
    Ok((
        Identifier::from_be_bytes(&key_bytes),
        StoredRecord { value: msg.value, inserted_at: msg.inserted_at_unix, ttl_seconds: msg.ttl_seconds as u64 },
    ))
}

fn encode_stored_record(key: Identifier, record: StoredRecord) -> chord_proto::StoredRecordMsg {
    chord_proto::StoredRecordMsg {
        key: key.to_be_bytes().to_vec(),
        value: record.value,
        inserted_at_unix: record.inserted_at,
        ttl_seconds: record.ttl_seconds as u32,
    }
}

impl Node {
    /// Answers an `update_predecessor` RPC: accepts `candidate` if it lies in
    /// `(current_predecessor, self]`, handing off the key range the
    /// candidate now owns; otherwise rejects with the current predecessor so
    /// the caller retries stabilization.
    pub async fn rpc_update_predecessor(self: &Arc<Self>, candidate: NodeRef) -> UpdatePredecessorOutcome {
        self.wait_until_booted().await;
        let me = self.id();
        let mut state = self.state.lock().unwrap();
        let should_accept = match &state.predecessor {
            None => true,
            Some(pred) => in_interval(candidate.id, pred.id, me, false, false, self.bits),
        };
        if !should_accept {
            return UpdatePredecessorOutcome::Rejected(state.predecessor.clone().unwrap());
        }
        let old = state.predecessor.clone().unwrap_or_else(|| self.as_node_ref());
        let handoff = state.storage.extract_range(old.id, candidate.id, self.bits);
        state.storage.delete_range(old.id, candidate.id, self.bits);
        state.predecessor = Some(candidate.clone());
        UpdatePredecessorOutcome::Accepted { new_predecessor: candidate, old_predecessor: old, handoff }
    }

    pub fn update_predecessor_outcome_into_proto(outcome: UpdatePredecessorOutcome) -> chord_proto::UpdatePredecessorResponse {
        use chord_proto::update_predecessor_response::Outcome;
        let outcome = match outcome {
            UpdatePredecessorOutcome::Accepted { new_predecessor, old_predecessor, handoff } => {
                Outcome::Accepted(chord_proto::update_predecessor_response::Accepted {
                    new_predecessor: Some((&new_predecessor).into()),
                    old_predecessor: Some((&old_predecessor).into()),
                    handoff: handoff.into_iter().map(|(k, r)| encode_stored_record(k, r)).collect(),
                })
            }
            UpdatePredecessorOutcome::Rejected(current) => Outcome::Rejected((&current).into()),
        };
        chord_proto::UpdatePredecessorResponse { outcome: Some(outcome) }
    }

    /// Answers an `update_successor` RPC: a hint from a peer that just
    /// inserted itself between us and our old predecessor.
    pub async fn rpc_update_successor(self: &Arc<Self>, hint: NodeRef) {
        self.wait_until_booted().await;
        let mut state = self.state.lock().unwrap();
        state.successor_list.set(hint, &mut state.finger_table, false);
    }

    /// Notifies the current successor that we exist. On `initialization`,
    /// adopts the returned `old_predecessor` as our own, closes the ring in
    /// the reverse direction, and merges the handed-off storage range.
    pub async fn update_neighbors(self: &Arc<Self>, initialization: bool) -> ChordResult<()> {
        let successor = self.successor();
        if successor.id == self.id() {
            return Ok(());
        }
        let resp = self.link.update_predecessor(&successor.address, &self.as_node_ref()).await?;
        match resp.outcome {
            Some(chord_proto::update_predecessor_response::Outcome::Accepted(accepted)) => {
                if !initialization {
                    return Ok(());
                }
                let old_predecessor: NodeRef =
                    accepted.old_predecessor.ok_or_else(|| ChordError::Schema("missing old_predecessor".into()))?.try_into()?;
                {
                    let mut state = self.state.lock().unwrap();
                    state.predecessor = Some(old_predecessor.clone());
                }
                if old_predecessor.id != self.id() {
                    let _ = self.link.update_successor(&old_predecessor.address, &self.as_node_ref()).await;
                }
                let records = accepted.handoff.into_iter().map(decode_stored_record).collect::<ChordResult<Vec<_>>>()?;
                self.state.lock().unwrap().storage.merge(records);
                Ok(())
            }
            Some(chord_proto::update_predecessor_response::Outcome::Rejected(_)) => {
                // A closer node slipped in concurrently; caller retries on the next tick.
                Err(ChordError::NotResponsible)
            }
            None => Err(ChordError::Schema("missing update_predecessor outcome".into())),
        }
    }

    /// Probes the current successor, repairs the successor list (possibly
    /// adopting a closer node the successor reports as its own predecessor),
    /// then re-runs the neighbor handshake.
    pub async fn update_successor_list_round(self: &Arc<Self>) {
        let successor = self.successor();
        if successor.id == self.id() {
            return;
        }

        let info = match self.link.get_node_info(&successor.address, true, true).await {
            Ok(info) => info,
            Err(_) => {
                let mut state = self.state.lock().unwrap();
                state.successor_list.delete_first(&mut state.finger_table);
                if state.successor_list.is_empty() {
                    state.successor_list = SuccessorList::new(self.as_node_ref());
                    state.finger_table.set_all(self.as_node_ref());
                }
                return;
            }
        };

        let mut effective_peers: Vec<NodeRef> = info.successor_list.into_iter().filter_map(|n| n.try_into().ok()).collect();
        let mut switched_to: Option<NodeRef> = None;

        if let Some(candidate) = info.predecessor.and_then(|n| NodeRef::try_from(n).ok()) {
            if candidate.id != self.id() && in_interval(candidate.id, self.id(), successor.id, false, false, self.bits) {
                if let Ok(corroborating) = self.link.get_node_info(&candidate.address, true, false).await {
                    effective_peers = corroborating.successor_list.into_iter().filter_map(|n| n.try_into().ok()).collect();
                    switched_to = Some(candidate);
                }
            }
        }

        {
            let mut state = self.state.lock().unwrap();
            let previous_head = state.successor_list.head().clone();
            if let Some(new_head) = switched_to.clone() {
                state.successor_list.set(new_head, &mut state.finger_table, true);
            }
            state.successor_list.update_from(&effective_peers, self.id());
            if switched_to.is_some() && !state.successor_list.entries().iter().any(|n| n.id == previous_head.id) {
                state.successor_list.revert();
            }
        }

        let _ = self.update_neighbors(false).await;
    }

    /// Re-resolves `finger[next]` where `next` cycles `1..bits` (finger[0]
    /// is maintained by [`Node::update_successor_list_round`]).
    pub async fn fix_finger_round(self: &Arc<Self>) {
        let index = self.next_fix_finger_index();
        let start = { self.state.lock().unwrap().finger_table.fingers[index].start };
        if let Ok(resolved) = self.find_successor(start).await {
            self.state.lock().unwrap().finger_table.set(index, resolved);
        }
    }

    /// Clears the predecessor if it is dead or no longer points back at us.
    pub async fn check_predecessor_round(self: &Arc<Self>) {
        let Some(pred) = self.predecessor() else { return };
        let points_back = match self.link.get_node_info(&pred.address, false, false).await {
            Ok(info) => info.successor.and_then(|s| NodeRef::try_from(s).ok()).map(|s| s.id) == Some(self.id()),
            Err(_) => false,
        };
        if !points_back {
            self.state.lock().unwrap().predecessor = None;
        }
    }

    /// Spawns the background maintenance loop; returns its join handle so the
    /// caller can abort it on shutdown.
    pub fn spawn_background_loop(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let node = Arc::clone(self);
        tokio::spawn(async move {
            node.wait_until_booted().await;
            loop {
                tokio::time::sleep(node.fix_interval).await;
                node.update_successor_list_round().await;
                node.fix_finger_round().await;
                node.check_predecessor_round().await;
                node.expire_storage();
            }
        })
    }
}

/// `4 + uniform(0, 5)` seconds, desynchronizing peers' maintenance ticks.
pub fn random_fix_interval() -> Duration {
    use rand::Rng;
    let jitter: f64 = rand::thread_rng().gen_range(0.0..5.0);
    Duration::from_secs_f64(4.0 + jitter)
}
