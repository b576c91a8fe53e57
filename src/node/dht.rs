//! Client-facing DHT operations (C9): replica-keyed put/get/trace, and the
//! local responsibility-checked storage RPCs they dispatch to.

use super::lookup::TraceHop;
use super::Node;
use crate::error::{ChordError, ChordResult};
use crate::identifier::Identifier;
use crate::replica::replica_keys;
use crate::ring::in_interval;
use std::sync::Arc;

impl Node {
    /// Responsibility-checked local write, used both for a local replica
    /// destination and to answer the `dht_put` RPC.
    pub fn rpc_dht_put(&self, key: Identifier, value: Vec<u8>, ttl_seconds: u64) -> ChordResult<()> {
        let mut state = self.state.lock().unwrap();
        let predecessor_id = state.predecessor.as_ref().map(|p| p.id).unwrap_or_else(|| self.id());
        if !in_interval(key, predecessor_id, self.id(), false, true, self.bits) {
            return Err(ChordError::NotResponsible);
        }
        state.storage.put(key, value, ttl_seconds)
    }

    /// Responsibility-checked local read.
    pub fn rpc_dht_get(&self, key: Identifier) -> ChordResult<Vec<Vec<u8>>> {
        let state = self.state.lock().unwrap();
        let predecessor_id = state.predecessor.as_ref().map(|p| p.id).unwrap_or_else(|| self.id());
        if !in_interval(key, predecessor_id, self.id(), false, true, self.bits) {
            return Err(ChordError::NotResponsible);
        }
        Ok(state.storage.get(key))
    }

    /// Writes `value` under `count` replica keys derived from `base_key`.
    /// Partial success counts as success: at least one replica must accept.
    pub async fn put(self: &Arc<Self>, base_key: Identifier, value: Vec<u8>, ttl_seconds: u64, replication_count: usize) -> ChordResult<usize> {
        let keys = replica_keys(base_key, replication_count, self.bits);
        let mut successes = 0usize;
        for key in keys {
            let destination = match self.find_successor(key).await {
                Ok(d) => d,
                Err(_) => continue,
            };
            let accepted = if destination.id == self.id() {
                self.rpc_dht_put(key, value.clone(), ttl_seconds).is_ok()
            } else {
                match self.link.dht_put(&destination.address, key, value.clone(), ttl_seconds as u32).await {
                    Ok(resp) => resp.status == 0,
                    Err(_) => false,
                }
            };
            if accepted {
                successes += 1;
            }
        }
        if successes == 0 {
            Err(ChordError::Unavailable("no replica accepted the write".into()))
        } else {
            Ok(successes)
        }
    }

    /// Reads the first non-empty replica, trying replicas in derivation order.
    pub async fn get(self: &Arc<Self>, base_key: Identifier, replication_count: usize) -> Vec<Vec<u8>> {
        let keys = replica_keys(base_key, replication_count, self.bits);
        for key in keys {
            let Ok(destination) = self.find_successor(key).await else { continue };
            let values = if destination.id == self.id() {
                self.rpc_dht_get(key).unwrap_or_default()
            } else {
                match self.link.dht_get(&destination.address, key).await {
                    Ok(resp) if resp.status == 0 => resp.values,
                    _ => Vec::new(),
                }
            };
            if !values.is_empty() {
                return values;
            }
        }
        Vec::new()
    }

    /// Traces the lookup path for `key`: the responsible node is at index 0,
    /// the initiating node is appended last.
    pub async fn trace(self: &Arc<Self>, key: Identifier) -> ChordResult<Vec<TraceHop>> {
        let mut outcome = self.find_successor_rec(key, false, true).await?;
        outcome.trace.push(TraceHop { node: self.as_node_ref(), additional_data: self.additional_data.clone() });
        Ok(outcome.trace)
    }
}
