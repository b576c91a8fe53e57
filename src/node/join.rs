//! One-shot join protocol (part of C8): bootstrap-less and with-bootstrap
//! paths, and the `update_others` cascade that seeds remote finger tables.

use super::Node;
use crate::error::ChordResult;
use crate::node_ref::NodeRef;
use crate::ring::in_interval;
use std::sync::Arc;
use std::time::Duration;

const BOOTSTRAP_RETRY_INTERVAL: Duration = Duration::from_secs(3);

impl Node {
    /// Single-node ring: every finger points at `self`, no predecessor.
    pub async fn join_standalone(self: &Arc<Self>) {
        {
            let mut state = self.state.lock().unwrap();
            state.finger_table.set_all(self.as_node_ref());
            state.predecessor = None;
        }
        self.mark_booted();
    }

    /// Joins an existing ring through `bootstrap_address` (§4.7).
    pub async fn join_with_bootstrap(self: &Arc<Self>, bootstrap_address: &str) -> ChordResult<()> {
        let bits = self.bits;
        let finger_zero_start = { self.state.lock().unwrap().finger_table.fingers[0].start };

        let successor: NodeRef = loop {
            match self.link.find_successor_rec(bootstrap_address, finger_zero_start, false, false).await {
                Ok(resp) if resp.status == 0 => {
                    if let Some(node) = resp.responsible {
                        if let Ok(node_ref) = NodeRef::try_from(node) {
                            break node_ref;
                        }
                    }
                    tokio::time::sleep(BOOTSTRAP_RETRY_INTERVAL).await;
                }
                _ => tokio::time::sleep(BOOTSTRAP_RETRY_INTERVAL).await,
            }
        };

        let info = self.link.get_node_info(&successor.address, true, false).await?;
        let peers: Vec<NodeRef> = info.successor_list.into_iter().filter_map(|n| n.try_into().ok()).collect();
        {
            let mut state = self.state.lock().unwrap();
            state.successor_list.set(successor.clone(), &mut state.finger_table, true);
            state.successor_list.update_from(&peers, self.id());
        }

        for k in 1..bits {
            let (start_k, prev_successor) = {
                let state = self.state.lock().unwrap();
                (state.finger_table.fingers[k as usize].start, state.finger_table.fingers[(k - 1) as usize].successor.clone())
            };

            let resolved = match &prev_successor {
                Some(prev) if in_interval(start_k, self.id(), prev.id, true, false, bits) => prev.clone(),
                _ => {
                    let resp = self.link.find_successor_rec(bootstrap_address, start_k, false, false).await?;
                    if resp.status != 0 {
                        prev_successor.unwrap_or_else(|| self.as_node_ref())
                    } else {
                        resp.responsible.and_then(|n| n.try_into().ok()).unwrap_or_else(|| self.as_node_ref())
                    }
                }
            };
            self.state.lock().unwrap().finger_table.set(k as usize, resolved);
        }

        // Notify the successor we exist and inherit its predecessor/storage
        // handoff before serving any requests.
        let _ = self.update_neighbors(true).await;

        self.mark_booted();
        self.update_others().await;
        Ok(())
    }

    /// For each `k`, finds the node whose finger[k] should now point at
    /// `self` and asks it to update that entry.
    pub(super) async fn update_others(self: &Arc<Self>) {
        for k in 0..self.bits {
            let target = self.id().sub_offset(k, self.bits);
            let outcome = match self.find_successor_rec(target, true, false).await {
                Ok(o) => o,
                Err(_) => continue,
            };
            let predecessor_of_target = outcome.predecessor.unwrap_or(outcome.responsible);
            if predecessor_of_target.id == self.id() {
                continue;
            }
            let _ = self.link.update_finger_table(&predecessor_of_target.address, &self.as_node_ref(), k).await;
        }
    }

    /// Handles an incoming `update_finger_table` RPC (§4.7): if `origin`
    /// should become `finger[i].successor`, adopt it and forward the
    /// cascade to our predecessor, stopping once it reaches back to `origin`.
    pub async fn rpc_update_finger_table(self: &Arc<Self>, origin: NodeRef, index: u32) {
        self.wait_until_booted().await;
        let (should_adopt, predecessor) = {
            let mut state = self.state.lock().unwrap();
            let idx = index as usize;
            let current = state.finger_table.fingers[idx].successor.clone();
            let should_adopt = match &current {
                None => true,
                Some(curr) => curr.id != origin.id && in_interval(origin.id, self.id(), curr.id, false, false, self.bits),
            };
            if should_adopt {
                state.finger_table.set(idx, origin.clone());
            }
            (should_adopt, state.predecessor.clone())
        };
        if !should_adopt {
            return;
        }
        if let Some(pred) = predecessor {
            if pred.id != origin.id {
                let _ = self.link.update_finger_table(&pred.address, &origin, index).await;
            }
        }
    }
}
