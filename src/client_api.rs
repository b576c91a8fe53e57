//! Client-facing binary wire protocol and its TCP listener (C11).
//!
//! Bit-exact framing, decoded into a typed [`ClientFrame`] enum with
//! `bytes::{Buf, BufMut}` rather than manual byte-offset slicing.

use crate::error::{ChordError, ChordResult};
use crate::identifier::Identifier;
use crate::node::Node;
use crate::replica::DEFAULT_REPLICATION_COUNT;
use bytes::{Buf, BufMut, BytesMut};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

pub const TYPE_PUT: u16 = 500;
pub const TYPE_GET: u16 = 501;
pub const TYPE_TRACE: u16 = 502;
pub const TYPE_GET_REPLY: u16 = 503;
pub const TYPE_TRACE_REPLY: u16 = 504;
pub const TYPE_ERROR: u16 = 505;

/// `size` is a 2-byte field, so no frame (header included) may exceed this.
pub const MAX_FRAME_SIZE: usize = u16::MAX as usize;

/// One 64-byte hop record within a TRACE_REPLY frame: 32-byte peer id,
/// 2-byte kx-port, 2 reserved, 4-byte IPv4, 16-byte IPv6, then 8 bytes of
/// padding to round the record out to the fixed 64-byte size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceHopRecord {
    pub peer_id: Identifier,
    pub kx_port: u16,
    pub ipv4: [u8; 4],
    pub ipv6: [u8; 16],
}

impl TraceHopRecord {
    pub const LEN: usize = 64;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.peer_id.to_be_bytes());
        buf.put_u16(self.kx_port);
        buf.put_u16(0);
        buf.put_slice(&self.ipv4);
        buf.put_slice(&self.ipv6);
        buf.put_slice(&[0u8; 8]);
    }

    fn decode(buf: &mut impl Buf) -> ChordResult<Self> {
        if buf.remaining() < Self::LEN {
            return Err(ChordError::Schema("truncated trace hop record".into()));
        }
        let mut id_bytes = [0u8; 32];
        buf.copy_to_slice(&mut id_bytes);
        let kx_port = buf.get_u16();
        let _reserved = buf.get_u16();
        let mut ipv4 = [0u8; 4];
        buf.copy_to_slice(&mut ipv4);
        let mut ipv6 = [0u8; 16];
        buf.copy_to_slice(&mut ipv6);
        buf.advance(8);
        Ok(TraceHopRecord { peer_id: Identifier::from_be_bytes(&id_bytes), kx_port, ipv4, ipv6 })
    }
}

/// The decoded form of one client-API message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    Put { key: Identifier, ttl_seconds: u16, replication: u8, content: Vec<u8> },
    Get { key: Identifier },
    Trace { key: Identifier },
    GetReply { key: Identifier, content: Vec<u8> },
    TraceReply { key: Identifier, hops: Vec<TraceHopRecord> },
    Error { requested_type: u16, requested_key: Identifier },
}

fn read_key(buf: &mut impl Buf) -> ChordResult<Identifier> {
    if buf.remaining() < 32 {
        return Err(ChordError::Schema("truncated key field".into()));
    }
    let mut bytes = [0u8; 32];
    buf.copy_to_slice(&mut bytes);
    Ok(Identifier::from_be_bytes(&bytes))
}

impl ClientFrame {
    /// Encodes the full frame, including its 4-byte `size`+`type` header.
    /// Rejects a frame that would not fit in the 2-byte `size` field instead
    /// of truncating it.
    pub fn encode(&self) -> ChordResult<BytesMut> {
        let mut body = BytesMut::new();
        let msg_type = match self {
            ClientFrame::Put { key, ttl_seconds, replication, content } => {
                body.put_slice(&key.to_be_bytes());
                body.put_u16(*ttl_seconds);
                body.put_u8(*replication);
                body.put_slice(&[0u8; 5]);
                body.put_slice(content);
                TYPE_PUT
            }
            ClientFrame::Get { key } => {
                body.put_slice(&key.to_be_bytes());
                TYPE_GET
            }
            ClientFrame::Trace { key } => {
                body.put_slice(&key.to_be_bytes());
                TYPE_TRACE
            }
            ClientFrame::GetReply { key, content } => {
                body.put_slice(&key.to_be_bytes());
                body.put_slice(content);
                TYPE_GET_REPLY
            }
            ClientFrame::TraceReply { key, hops } => {
                body.put_slice(&key.to_be_bytes());
                for hop in hops {
                    hop.encode(&mut body);
                }
                TYPE_TRACE_REPLY
            }
            ClientFrame::Error { requested_type, requested_key } => {
                body.put_slice(&Identifier::ZERO.to_be_bytes());
                body.put_u16(*requested_type);
                body.put_slice(&requested_key.to_be_bytes());
                TYPE_ERROR
            }
        };

        let total_len = 4 + body.len();
        if total_len > MAX_FRAME_SIZE {
            return Err(ChordError::InvalidArgument(format!("frame of {total_len} bytes exceeds the {MAX_FRAME_SIZE}-byte limit")));
        }
        let mut frame = BytesMut::with_capacity(total_len);
        frame.put_u16(total_len as u16);
        frame.put_u16(msg_type);
        frame.extend_from_slice(&body);
        Ok(frame)
    }

    /// Decodes one full frame, including its header, as read off the wire.
    pub fn decode(frame: &[u8]) -> ChordResult<ClientFrame> {
        if frame.len() < 4 {
            return Err(ChordError::Schema("frame shorter than its header".into()));
        }
        let mut buf = frame;
        let declared_size = buf.get_u16() as usize;
        if declared_size != frame.len() {
            return Err(ChordError::Schema(format!("declared size {declared_size} does not match {} received bytes", frame.len())));
        }
        let msg_type = buf.get_u16();
        match msg_type {
            TYPE_PUT => {
                let key = read_key(&mut buf)?;
                if buf.remaining() < 8 {
                    return Err(ChordError::Schema("truncated PUT frame".into()));
                }
                let ttl_seconds = buf.get_u16();
                let replication = buf.get_u8();
                buf.advance(5);
                let content = buf.chunk().to_vec();
                Ok(ClientFrame::Put { key, ttl_seconds, replication, content })
            }
            TYPE_GET => Ok(ClientFrame::Get { key: read_key(&mut buf)? }),
            TYPE_TRACE => Ok(ClientFrame::Trace { key: read_key(&mut buf)? }),
            TYPE_GET_REPLY => {
                let key = read_key(&mut buf)?;
                Ok(ClientFrame::GetReply { key, content: buf.chunk().to_vec() })
            }
            TYPE_TRACE_REPLY => {
                let key = read_key(&mut buf)?;
                let mut hops = Vec::new();
                while buf.remaining() >= TraceHopRecord::LEN {
                    hops.push(TraceHopRecord::decode(&mut buf)?);
                }
                Ok(ClientFrame::TraceReply { key, hops })
            }
            TYPE_ERROR => {
                let _key = read_key(&mut buf)?;
                if buf.remaining() < 34 {
                    return Err(ChordError::Schema("truncated ERROR frame".into()));
                }
                let requested_type = buf.get_u16();
                let requested_key = read_key(&mut buf)?;
                Ok(ClientFrame::Error { requested_type, requested_key })
            }
            other => Err(ChordError::Schema(format!("unknown client frame type {other}"))),
        }
    }
}

fn parse_ipv4_port(address: &str) -> Option<([u8; 4], u16)> {
    let (host, port) = address.rsplit_once(':')?;
    let port: u16 = port.parse().ok()?;
    let ip: std::net::Ipv4Addr = host.parse().ok()?;
    Some((ip.octets(), port))
}

fn node_ref_to_hop(node: &crate::node_ref::NodeRef) -> TraceHopRecord {
    let (ipv4, port) = parse_ipv4_port(&node.address).unwrap_or(([0, 0, 0, 0], 0));
    TraceHopRecord { peer_id: node.id, kx_port: port, ipv4, ipv6: [0u8; 16] }
}

async fn handle_frame(node: &Arc<Node>, frame: ClientFrame) -> Vec<ClientFrame> {
    match frame {
        ClientFrame::Put { key, ttl_seconds, replication, content } => {
            let repl = if replication == 0 { DEFAULT_REPLICATION_COUNT } else { replication as usize };
            match node.put(key, content, ttl_seconds as u64, repl).await {
                Ok(_) => Vec::new(),
                Err(_) => vec![ClientFrame::Error { requested_type: TYPE_PUT, requested_key: key }],
            }
        }
        ClientFrame::Get { key } => {
            let values = node.get(key, DEFAULT_REPLICATION_COUNT).await;
            if values.is_empty() {
                vec![ClientFrame::Error { requested_type: TYPE_GET, requested_key: key }]
            } else {
                values.into_iter().map(|content| ClientFrame::GetReply { key, content }).collect()
            }
        }
        ClientFrame::Trace { key } => match node.trace(key).await {
            Ok(hops) => {
                let records = hops.iter().map(|h| node_ref_to_hop(&h.node)).collect();
                vec![ClientFrame::TraceReply { key, hops: records }]
            }
            Err(_) => vec![ClientFrame::Error { requested_type: TYPE_TRACE, requested_key: key }],
        },
        ClientFrame::GetReply { .. } | ClientFrame::TraceReply { .. } | ClientFrame::Error { .. } => Vec::new(),
    }
}

/// Serves one client connection until it disconnects or sends an unparseable frame.
pub async fn serve_client_connection(mut stream: TcpStream, node: Arc<Node>) -> ChordResult<()> {
    loop {
        let mut size_buf = [0u8; 2];
        if stream.read_exact(&mut size_buf).await.is_err() {
            return Ok(());
        }
        let size = u16::from_be_bytes(size_buf) as usize;
        if size < 4 {
            return Err(ChordError::Schema("frame smaller than its header".into()));
        }
        let mut rest = vec![0u8; size - 2];
        stream.read_exact(&mut rest).await.map_err(|e| ChordError::Connection(e.to_string()))?;

        let mut full = Vec::with_capacity(size);
        full.extend_from_slice(&size_buf);
        full.extend_from_slice(&rest);

        let frame = match ClientFrame::decode(&full) {
            Ok(f) => f,
            Err(_) => continue,
        };

        for response in handle_frame(&node, frame).await {
            let encoded = response.encode()?;
            stream.write_all(&encoded).await.map_err(|e| ChordError::Connection(e.to_string()))?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u64) -> Identifier {
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&n.to_be_bytes());
        Identifier::from_be_bytes(&bytes)
    }

    #[test]
    fn put_frame_round_trips() {
        let frame = ClientFrame::Put { key: id(1), ttl_seconds: 60, replication: 3, content: b"hello".to_vec() };
        let encoded = frame.encode().unwrap();
        let decoded = ClientFrame::decode(&encoded).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn get_reply_frame_round_trips() {
        let frame = ClientFrame::GetReply { key: id(2), content: b"value".to_vec() };
        let encoded = frame.encode().unwrap();
        assert_eq!(ClientFrame::decode(&encoded).unwrap(), frame);
    }

    #[test]
    fn trace_reply_frame_round_trips_with_hops() {
        let frame = ClientFrame::TraceReply {
            key: id(3),
            hops: vec![
                TraceHopRecord { peer_id: id(10), kx_port: 9000, ipv4: [127, 0, 0, 1], ipv6: [0u8; 16] },
                TraceHopRecord { peer_id: id(20), kx_port: 9001, ipv4: [127, 0, 0, 2], ipv6: [0u8; 16] },
            ],
        };
        let encoded = frame.encode().unwrap();
        assert_eq!(ClientFrame::decode(&encoded).unwrap(), frame);
    }

    #[test]
    fn error_frame_round_trips() {
        let frame = ClientFrame::Error { requested_type: TYPE_GET, requested_key: id(5) };
        let encoded = frame.encode().unwrap();
        assert_eq!(ClientFrame::decode(&encoded).unwrap(), frame);
    }

    #[test]
    fn oversized_trace_reply_is_rejected_at_construction() {
        let too_many_hops = (MAX_FRAME_SIZE / TraceHopRecord::LEN) + 10;
        let hops = (0..too_many_hops)
            .map(|i| TraceHopRecord { peer_id: id(i as u64), kx_port: 0, ipv4: [0; 4], ipv6: [0; 16] })
            .collect();
        let frame = ClientFrame::TraceReply { key: id(1), hops };
        assert!(frame.encode().is_err());
    }

    #[test]
    fn declared_size_mismatch_is_rejected() {
        let frame = ClientFrame::Get { key: id(1) }.encode().unwrap();
        let mut corrupted = frame.to_vec();
        corrupted[1] = corrupted[1].wrapping_add(1);
        assert!(ClientFrame::decode(&corrupted).is_err());
    }
}
