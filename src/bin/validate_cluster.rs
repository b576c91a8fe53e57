//! Standalone cluster validator: connects to a set of already-running peer
//! addresses and checks ring invariants externally, the way an operator
//! (or an integration test) would.
//!
//! `GetNodeInfo` intentionally does not expose the raw finger table, so
//! finger correctness is checked indirectly here by asking each node to
//! resolve every finger `start` via `find_successor_rec` and comparing
//! against the expected owner computed from the full membership list.

use std::env;
use std::process::exit;

use chordring::identifier::Identifier;
use chordring::rpc::chord_proto;
use chordring::rpc::chord_proto::chord_client::ChordClient;
use chordring::rpc::chord_proto::{Empty, FindSuccessorRequest, GetNodeInfoRequest};
use tonic::transport::Channel;
use tonic::Request;

const RING_BITS: u32 = 8;

struct NodeSnapshot {
    address: String,
    id: Identifier,
    predecessor: Option<Identifier>,
    successor_list: Vec<Identifier>,
}

async fn fetch_snapshot(address: &str) -> Result<(ChordClient<Channel>, NodeSnapshot), Box<dyn std::error::Error>> {
    let mut client = ChordClient::connect(format!("http://{address}")).await?;
    let id_msg = client.get_node_id(Request::new(Empty {})).await?.into_inner();
    let id = decode_id(&id_msg.id)?;

    let info = client
        .get_node_info(Request::new(GetNodeInfoRequest { with_successor_list: true, with_additional_data: false }))
        .await?
        .into_inner();

    let predecessor = info.predecessor.map(|n| decode_id(&n.id)).transpose()?;
    let successor_list = info.successor_list.iter().map(|n| decode_id(&n.id)).collect::<Result<Vec<_>, _>>()?;

    Ok((client, NodeSnapshot { address: address.to_string(), id, predecessor, successor_list }))
}

fn decode_id(bytes: &[u8]) -> Result<Identifier, Box<dyn std::error::Error>> {
    let arr: [u8; 32] = bytes.to_vec().try_into().map_err(|_| "id field was not 32 bytes")?;
    Ok(Identifier::from_be_bytes(&arr))
}

/// The node responsible for `target`: the first id `>= target` on the ring,
/// wrapping to the smallest id if none is.
fn responsible_for(target: Identifier, sorted_ids: &[Identifier]) -> Identifier {
    *sorted_ids.iter().find(|id| **id >= target).unwrap_or(&sorted_ids[0])
}

#[tokio::main]
async fn main() {
    let addresses: Vec<String> = env::args().skip(1).collect();
    if addresses.is_empty() {
        eprintln!("usage: validate_cluster <peer-address> [<peer-address> ...]");
        exit(2);
    }

    let mut clients = Vec::new();
    let mut snapshots = Vec::new();
    for address in &addresses {
        match fetch_snapshot(address).await {
            Ok((client, snapshot)) => {
                clients.push(client);
                snapshots.push(snapshot);
            }
            Err(err) => {
                eprintln!("failed to query {address}: {err}");
                exit(1);
            }
        }
    }

    let mut order: Vec<usize> = (0..snapshots.len()).collect();
    order.sort_by_key(|&i| snapshots[i].id);
    let sorted_ids: Vec<Identifier> = order.iter().map(|&i| snapshots[i].id).collect();

    let mut ok = true;
    let n = order.len();

    // Predecessor check: node at ring position i's predecessor is the node
    // at position i-1 (mod n).
    for (pos, &idx) in order.iter().enumerate() {
        let expected_pred = sorted_ids[(pos + n - 1) % n];
        match snapshots[idx].predecessor {
            Some(actual) if actual == expected_pred => {}
            Some(actual) => {
                ok = false;
                eprintln!("{} (id {}): predecessor is {} but should be {}", snapshots[idx].address, snapshots[idx].id, actual, expected_pred);
            }
            None => {
                ok = false;
                eprintln!("{} (id {}): predecessor is unset", snapshots[idx].address, snapshots[idx].id);
            }
        }
    }

    // Successor-list check: entry j should be the node j+1 positions ahead.
    for (pos, &idx) in order.iter().enumerate() {
        for (j, actual) in snapshots[idx].successor_list.iter().enumerate() {
            let expected = sorted_ids[(pos + j + 1) % n];
            if *actual != expected {
                ok = false;
                eprintln!(
                    "{} (id {}): successor_list[{}] is {} but should be {}",
                    snapshots[idx].address, snapshots[idx].id, j, actual, expected
                );
            }
        }
    }

    // Finger check: ask each node to resolve every finger start and compare
    // against the externally-computed responsible node.
    for (client_idx, snapshot) in snapshots.iter().enumerate() {
        for k in 0..RING_BITS {
            let start = snapshot.id.add_offset(k, RING_BITS);
            let expected = responsible_for(start, &sorted_ids);
            let req = Request::new(FindSuccessorRequest { target_id: start.to_be_bytes().to_vec(), with_neighbors: false, tracing: false });
            match clients[client_idx].find_successor_rec(req).await {
                Ok(resp) => {
                    let resp: chord_proto::FindSuccessorResponse = resp.into_inner();
                    if resp.status != 0 {
                        ok = false;
                        eprintln!("{} (id {}): finger[{}] lookup failed: {}", snapshot.address, snapshot.id, k, resp.message);
                        continue;
                    }
                    let Some(responsible) = resp.responsible else {
                        ok = false;
                        eprintln!("{} (id {}): finger[{}] lookup returned no responsible node", snapshot.address, snapshot.id, k);
                        continue;
                    };
                    let actual = match decode_id(&responsible.id) {
                        Ok(id) => id,
                        Err(err) => {
                            ok = false;
                            eprintln!("{} (id {}): finger[{}] returned malformed id: {err}", snapshot.address, snapshot.id, k);
                            continue;
                        }
                    };
                    if actual != expected {
                        ok = false;
                        eprintln!(
                            "{} (id {}): finger[{}] (start {}) resolves to {} but {} is responsible",
                            snapshot.address, snapshot.id, k, start, actual, expected
                        );
                    }
                }
                Err(status) => {
                    ok = false;
                    eprintln!("{} (id {}): finger[{}] lookup errored: {status}", snapshot.address, snapshot.id, k);
                }
            }
        }
    }

    if ok {
        eprintln!("cluster looks good: {n} node(s), ring order verified");
        exit(0);
    } else {
        eprintln!("cluster is invalid");
        exit(1);
    }
}
