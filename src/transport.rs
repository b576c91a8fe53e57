//! Peer RPC transport (C5): connect-by-address, invoke-with-timeout,
//! classify-failure, built on a tonic/gRPC client.

use crate::error::{ChordError, ChordResult};
use crate::identifier::Identifier;
use crate::node_ref::NodeRef;
use crate::rpc::chord_proto;
use crate::rpc::chord_proto::chord_client::ChordClient;
use std::time::Duration;
use tonic::transport::Channel;
use tonic::Request;

pub const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(200);
pub const CONNECT_MAX_RETRIES: u32 = 15;

async fn connect(address: &str) -> ChordResult<ChordClient<Channel>> {
    Ok(ChordClient::connect(format!("http://{address}")).await?)
}

/// Retries a connection attempt at a fixed interval -- used while waiting for
/// a just-started bootstrap peer to come up (§4.7 join).
pub async fn connect_with_retry(address: &str) -> ChordResult<ChordClient<Channel>> {
    let mut attempt = 0;
    loop {
        match connect(address).await {
            Ok(client) => return Ok(client),
            Err(err) => {
                attempt += 1;
                if attempt > CONNECT_MAX_RETRIES {
                    return Err(err);
                }
                tokio::time::sleep(CONNECT_RETRY_INTERVAL).await;
            }
        }
    }
}

/// Tries each address in order, returning the first one that accepts a
/// connection. Used by successor-list repair, which has several candidate
/// addresses and only needs one live peer.
pub async fn connect_to_first_reachable(addresses: &[String]) -> Option<(ChordClient<Channel>, String)> {
    for addr in addresses {
        if let Ok(client) = connect(addr).await {
            return Some((client, addr.clone()));
        }
    }
    None
}

async fn with_timeout<T>(
    timeout: Duration,
    address: &str,
    fut: impl std::future::Future<Output = Result<tonic::Response<T>, tonic::Status>>,
) -> ChordResult<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(resp)) => Ok(resp.into_inner()),
        Ok(Err(status)) => Err(status.into()),
        Err(_) => Err(ChordError::Timeout(address.to_string())),
    }
}

/// A thin, stateless helper bound to a fixed per-call deadline. Each method
/// dials fresh rather than pooling connections -- connection setup cost is
/// negligible next to ring lookup latency, and this keeps failure handling
/// local to the call site.
#[derive(Clone)]
pub struct PeerLink {
    timeout: Duration,
}

impl PeerLink {
    pub fn new(timeout: Duration) -> Self {
        PeerLink { timeout }
    }

    pub async fn get_node_id(&self, address: &str) -> ChordResult<NodeRef> {
        let mut client = connect(address).await?;
        let msg = with_timeout(self.timeout, address, client.get_node_id(Request::new(chord_proto::Empty {}))).await?;
        msg.try_into()
    }

    pub async fn get_node_info(
        &self,
        address: &str,
        with_successor_list: bool,
        with_additional_data: bool,
    ) -> ChordResult<chord_proto::GetNodeInfoResponse> {
        let mut client = connect(address).await?;
        let req = Request::new(chord_proto::GetNodeInfoRequest { with_successor_list, with_additional_data });
        with_timeout(self.timeout, address, client.get_node_info(req)).await
    }

    pub async fn update_predecessor(&self, address: &str, candidate: &NodeRef) -> ChordResult<chord_proto::UpdatePredecessorResponse> {
        let mut client = connect(address).await?;
        let req = Request::new(chord_proto::UpdatePredecessorRequest { candidate: Some(candidate.into()) });
        with_timeout(self.timeout, address, client.update_predecessor(req)).await
    }

    pub async fn update_successor(&self, address: &str, hint: &NodeRef) -> ChordResult<()> {
        let mut client = connect(address).await?;
        let req = Request::new(chord_proto::UpdateSuccessorRequest { hint: Some(hint.into()) });
        with_timeout(self.timeout, address, client.update_successor(req)).await.map(|_| ())
    }

    pub async fn update_finger_table(&self, address: &str, origin: &NodeRef, index: u32) -> ChordResult<()> {
        let mut client = connect(address).await?;
        let req = Request::new(chord_proto::UpdateFingerTableRequest { origin: Some(origin.into()), index });
        with_timeout(self.timeout, address, client.update_finger_table(req)).await.map(|_| ())
    }

    pub async fn find_successor_rec(
        &self,
        address: &str,
        target: Identifier,
        with_neighbors: bool,
        tracing: bool,
    ) -> ChordResult<chord_proto::FindSuccessorResponse> {
        let mut client = connect(address).await?;
        let req = Request::new(chord_proto::FindSuccessorRequest {
            target_id: target.to_be_bytes().to_vec(),
            with_neighbors,
            tracing,
        });
        with_timeout(self.timeout, address, client.find_successor_rec(req)).await
    }

    pub async fn dht_put(&self, address: &str, key: Identifier, value: Vec<u8>, ttl_seconds: u32) -> ChordResult<chord_proto::DhtPutResponse> {
        let mut client = connect(address).await?;
        let req = Request::new(chord_proto::DhtPutRequest { key: key.to_be_bytes().to_vec(), value, ttl_seconds });
        with_timeout(self.timeout, address, client.dht_put(req)).await
    }

    pub async fn dht_get(&self, address: &str, key: Identifier) -> ChordResult<chord_proto::DhtGetResponse> {
        let mut client = connect(address).await?;
        let req = Request::new(chord_proto::DhtGetRequest { key: key.to_be_bytes().to_vec() });
        with_timeout(self.timeout, address, client.dht_get(req)).await
    }
}
