//! Finger table: `m` exponentially-spaced routing shortcuts (part of C6).

use crate::identifier::Identifier;
use crate::node_ref::NodeRef;

/// One entry `finger[k]`: `start = (self.id + 2^k) mod R`, and the (possibly
/// not yet resolved) node known to be responsible for `start`.
#[derive(Debug, Clone)]
pub struct FingerEntry {
    pub start: Identifier,
    pub successor: Option<NodeRef>,
}

/// Exactly `m` finger entries, index 0 = immediate successor finger.
#[derive(Debug, Clone)]
pub struct FingerTable {
    pub fingers: Vec<FingerEntry>,
}

impl FingerTable {
    /// Builds the `start` column for a node at `self_id` on a `bits`-wide
    /// ring, each entry initially pointing at `initial_successor` (commonly
    /// `self` for a solo bootstrap, or `None` while still joining).
    pub fn new(self_id: Identifier, bits: u32, initial_successor: Option<NodeRef>) -> Self {
        let fingers = (0..bits)
            .map(|k| FingerEntry {
                start: self_id.add_offset(k, bits),
                successor: initial_successor.clone(),
            })
            .collect();
        FingerTable { fingers }
    }

    pub fn len(&self) -> usize {
        self.fingers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fingers.is_empty()
    }

    pub fn set_all(&mut self, successor: NodeRef) {
        for finger in &mut self.fingers {
            finger.successor = Some(successor.clone());
        }
    }

    pub fn set(&mut self, index: usize, successor: NodeRef) {
        self.fingers[index].successor = Some(successor);
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
    fn starts_are_strictly_increasing_mod_r() {
        let table = FingerTable::new(id(78), 8, None);
        assert_eq!(table.len(), 8);
        let mut prev = id(78);
        for (k, finger) in table.fingers.iter().enumerate() {
            assert_eq!(finger.start, id(78).add_offset(k as u32, 8));
            if k > 0 {
                assert_ne!(finger.start, prev);
            }
            prev = finger.start;
        }
    }

    #[test]
    fn solo_bootstrap_points_every_finger_at_self() {
        let me = NodeRef::new(id(78), "127.0.0.1:9000");
        let table = FingerTable::new(id(78), 8, Some(me.clone()));
        assert!(table.fingers.iter().all(|f| f.successor.as_ref() == Some(&me)));
    }
}
