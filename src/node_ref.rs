//! Plain, by-value descriptor of a peer on the ring.

use crate::identifier::Identifier;
use crate::rpc::chord_proto;

/// An inert descriptor of a peer: its ring position and dial address.
///
/// Immutable after creation and carried by value over the wire, never a
/// pointer back to a live node -- this keeps RPC handling and the
/// `self`-shortcut path (a node talking to itself while solo) symmetric.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeRef {
    pub id: Identifier,
    pub address: String,
}

impl NodeRef {
    pub fn new(id: Identifier, address: impl Into<String>) -> Self {
        NodeRef { id, address: address.into() }
    }

    pub fn from_address(address: impl Into<String>, bits: u32) -> Self {
        let address = address.into();
        let id = crate::identifier::id_of_address(&address, bits);
        NodeRef { id, address }
    }
}

impl From<NodeRef> for chord_proto::NodeRef {
    fn from(n: NodeRef) -> Self {
        chord_proto::NodeRef { id: n.id.to_be_bytes().to_vec(), address: n.address }
    }
}

impl From<&NodeRef> for chord_proto::NodeRef {
    fn from(n: &NodeRef) -> Self {
        n.clone().into()
    }
}

impl TryFrom<chord_proto::NodeRef> for NodeRef {
    type Error = crate::error::ChordError;

    fn try_from(msg: chord_proto::NodeRef) -> Result<Self, Self::Error> {
        let bytes: [u8; 32] = msg
            .id
            .try_into()
            .map_err(|_| crate::error::ChordError::Schema("NodeRef.id must be 32 bytes".into()))?;
        if msg.address.is_empty() {
            return Err(crate::error::ChordError::Schema("NodeRef.address must not be empty".into()));
        }
        Ok(NodeRef { id: Identifier::from_be_bytes(&bytes), address: msg.address })
    }
}
