//! Generated protobuf types plus the tonic `Chord` service implementation
//! (C5/C10): thin RPC handlers delegating to [`crate::node::Node`].

use crate::identifier::Identifier;
use crate::node::Node;
use crate::node_ref::NodeRef;
use std::sync::Arc;
use tonic::{Request, Response, Status};

pub mod chord_proto {
    tonic::include_proto!("chord");

    pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("chord_descriptor");
}

use chord_proto::chord_server::{Chord, ChordServer};
use chord_proto::*;

pub struct ChordService {
    node: Arc<Node>,
}

impl ChordService {
    pub fn new(node: Arc<Node>) -> Self {
        ChordService { node }
    }

    pub fn into_server(self) -> ChordServer<Self> {
        ChordServer::new(self)
    }
}

fn decode_id(bytes: Vec<u8>, label: &str) -> Result<Identifier, Status> {
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| crate::error::ChordError::Schema(format!("{label} must be 32 bytes")))
        .map_err(Status::from)?;
    Ok(Identifier::from_be_bytes(&arr))
}

fn decode_node_ref(msg: Option<chord_proto::NodeRef>, label: &str) -> Result<NodeRef, Status> {
    let msg = msg.ok_or_else(|| crate::error::ChordError::Schema(format!("missing {label}")))?;
    NodeRef::try_from(msg).map_err(Status::from)
}

#[tonic::async_trait]
impl Chord for ChordService {
    async fn get_node_id(&self, _request: Request<Empty>) -> Result<Response<chord_proto::NodeRef>, Status> {
        Ok(Response::new((&self.node.as_node_ref()).into()))
    }

    async fn get_node_info(&self, request: Request<GetNodeInfoRequest>) -> Result<Response<GetNodeInfoResponse>, Status> {
        let req = request.into_inner();
        Ok(Response::new(self.node.rpc_get_node_info(req.with_successor_list, req.with_additional_data)))
    }

    async fn update_predecessor(&self, request: Request<UpdatePredecessorRequest>) -> Result<Response<UpdatePredecessorResponse>, Status> {
        let candidate = decode_node_ref(request.into_inner().candidate, "candidate")?;
        let outcome = self.node.rpc_update_predecessor(candidate).await;
        Ok(Response::new(Node::update_predecessor_outcome_into_proto(outcome)))
    }

    async fn update_successor(&self, request: Request<UpdateSuccessorRequest>) -> Result<Response<Empty>, Status> {
        let hint = decode_node_ref(request.into_inner().hint, "hint")?;
        self.node.rpc_update_successor(hint).await;
        Ok(Response::new(Empty {}))
    }

    async fn update_finger_table(&self, request: Request<UpdateFingerTableRequest>) -> Result<Response<UpdateFingerTableResponse>, Status> {
        let req = request.into_inner();
        let origin = decode_node_ref(req.origin, "origin")?;
        self.node.rpc_update_finger_table(origin, req.index).await;
        Ok(Response::new(UpdateFingerTableResponse { status: 0 }))
    }

    async fn find_successor_rec(&self, request: Request<FindSuccessorRequest>) -> Result<Response<FindSuccessorResponse>, Status> {
        let req = request.into_inner();
        let target = decode_id(req.target_id, "target_id")?;
        Ok(Response::new(self.node.rpc_find_successor_rec(target, req.with_neighbors, req.tracing).await))
    }

    async fn dht_put(&self, request: Request<DhtPutRequest>) -> Result<Response<DhtPutResponse>, Status> {
        let req = request.into_inner();
        let key = decode_id(req.key, "key")?;
        let response = match self.node.rpc_dht_put(key, req.value, req.ttl_seconds as u64) {
            Ok(()) => DhtPutResponse { status: 0, message: String::new() },
            Err(err) => DhtPutResponse { status: 1, message: err.to_string() },
        };
        Ok(Response::new(response))
    }

    async fn dht_get(&self, request: Request<DhtGetRequest>) -> Result<Response<DhtGetResponse>, Status> {
        let req = request.into_inner();
        let key = decode_id(req.key, "key")?;
        let response = match self.node.rpc_dht_get(key) {
            Ok(values) => DhtGetResponse { status: 0, values },
            Err(_) => DhtGetResponse { status: 1, values: Vec::new() },
        };
        Ok(Response::new(response))
    }
}
