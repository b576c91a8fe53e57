//! Recursive successor lookup with fallback finger selection and optional
//! hop tracing (C7).

use super::Node;
use crate::error::{ChordError, ChordResult};
use crate::identifier::Identifier;
use crate::node_ref::NodeRef;
use crate::rpc::chord_proto;
use crate::ring::in_interval;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One entry of a traced lookup path.
#[derive(Debug, Clone)]
pub struct TraceHop {
    pub node: NodeRef,
    pub additional_data: HashMap<String, String>,
}

/// Result of a (possibly remote) `find_successor_rec` call.
#[derive(Debug, Clone)]
pub struct LookupOutcome {
    pub responsible: NodeRef,
    pub successor: Option<NodeRef>,
    pub predecessor: Option<NodeRef>,
    pub trace: Vec<TraceHop>,
}

impl LookupOutcome {
    pub fn into_proto(self) -> chord_proto::FindSuccessorResponse {
        chord_proto::FindSuccessorResponse {
            status: 0,
            message: String::new(),
            responsible: Some((&self.responsible).into()),
            successor: self.successor.as_ref().map(Into::into),
            predecessor: self.predecessor.as_ref().map(Into::into),
            trace: self
                .trace
                .into_iter()
                .map(|h| chord_proto::TraceHopMsg { node: Some((&h.node).into()), additional_data: h.additional_data })
                .collect(),
        }
    }

    fn try_from_proto(resp: chord_proto::FindSuccessorResponse) -> ChordResult<Self> {
        if resp.status != 0 {
            return Err(ChordError::Unavailable(resp.message));
        }
        let responsible: NodeRef = resp.responsible.ok_or_else(|| ChordError::Schema("missing responsible".into()))?.try_into()?;
        let successor = resp.successor.map(TryInto::try_into).transpose()?;
        let predecessor = resp.predecessor.map(TryInto::try_into).transpose()?;
        let trace = resp
            .trace
            .into_iter()
            .map(|h| -> ChordResult<TraceHop> {
                let node = h.node.ok_or_else(|| ChordError::Schema("missing trace hop node".into()))?.try_into()?;
                Ok(TraceHop { node, additional_data: h.additional_data })
            })
            .collect::<ChordResult<Vec<_>>>()?;
        Ok(LookupOutcome { responsible, successor, predecessor, trace })
    }
}

impl Node {
    /// Returns the first finger successor (scanning from `m-1` down to `0`)
    /// whose id lies strictly between `self.id` and `target`, skipping the
    /// first `fall_back` distinct addresses already tried.
    pub(super) fn closest_preceding_finger(&self, target: Identifier, fall_back: usize) -> NodeRef {
        let me = self.id();
        let candidates: Vec<NodeRef> = {
            let state = self.state.lock().unwrap();
            state.finger_table.fingers.iter().rev().filter_map(|f| f.successor.clone()).collect()
        };
        let mut seen: Vec<String> = Vec::new();
        for succ in candidates {
            if succ.id == me || !in_interval(succ.id, me, target, false, false, self.bits) {
                continue;
            }
            if seen.contains(&succ.address) {
                continue;
            }
            seen.push(succ.address.clone());
            if seen.len() > fall_back {
                return succ;
            }
        }
        self.as_node_ref()
    }

    /// Convenience wrapper returning only the responsible node.
    pub async fn find_successor(self: &Arc<Self>, target: Identifier) -> ChordResult<NodeRef> {
        self.find_successor_rec(target, false, false).await.map(|o| o.responsible)
    }

    /// The recursive lookup described in §4.6. Used both to answer the
    /// `find_successor_rec` RPC and for purely local lookups issued by the
    /// DHT API and join/stabilization code.
    pub fn find_successor_rec<'a>(self: &'a Arc<Self>, target: Identifier, with_neighbors: bool, tracing: bool) -> BoxFuture<'a, ChordResult<LookupOutcome>> {
        Box::pin(async move {
            let me = self.id();
            let successor = self.successor();

            if in_interval(target, me, successor.id, false, true, self.bits) {
                let info = self.link.get_node_info(&successor.address, with_neighbors, tracing).await.map_err(|_| {
                    ChordError::Unavailable(format!("last hop {} not responding", successor.address))
                })?;

                let mut trace = Vec::new();
                if tracing {
                    trace.push(TraceHop { node: successor.clone(), additional_data: info.additional_data.clone() });
                }
                let successor_of_successor = if with_neighbors { info.successor.map(TryInto::try_into).transpose()? } else { None };
                let predecessor_of_successor = if with_neighbors { info.predecessor.map(TryInto::try_into).transpose()? } else { None };

                return Ok(LookupOutcome {
                    responsible: successor,
                    successor: successor_of_successor,
                    predecessor: predecessor_of_successor,
                    trace,
                });
            }

            let mut fall_back = 0usize;
            loop {
                let next_hop = self.closest_preceding_finger(target, fall_back);
                if next_hop.id == me {
                    return Err(ChordError::Unavailable("no suitable alternatives".into()));
                }
                match self.link.find_successor_rec(&next_hop.address, target, with_neighbors, tracing).await {
                    Ok(resp) => {
                        let mut outcome = LookupOutcome::try_from_proto(resp)?;
                        if tracing {
                            outcome.trace.push(TraceHop { node: next_hop, additional_data: HashMap::new() });
                        }
                        return Ok(outcome);
                    }
                    Err(_) => {
                        fall_back += 1;
                        continue;
                    }
                }
            }
        })
    }

    /// RPC-facing handler: never raises, always answers with a status code.
    pub async fn rpc_find_successor_rec(self: &Arc<Self>, target: Identifier, with_neighbors: bool, tracing: bool) -> chord_proto::FindSuccessorResponse {
        self.wait_until_booted().await;
        match self.find_successor_rec(target, with_neighbors, tracing).await {
            Ok(outcome) => outcome.into_proto(),
            Err(err) => chord_proto::FindSuccessorResponse {
                status: 1,
                message: err.to_string(),
                responsible: None,
                successor: None,
                predecessor: None,
                trace: Vec::new(),
            },
        }
    }
}
