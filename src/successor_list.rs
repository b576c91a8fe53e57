//! Bounded list of backup successors, kept in lock-step with `finger[0]` (C6).

use crate::finger_table::FingerTable;
use crate::identifier::Identifier;
use crate::node_ref::NodeRef;

pub const DEFAULT_MAX_ENTRIES: usize = 3;

/// `[0..S_max)` backup successors; index 0 is always the current immediate
/// successor and is mirrored into `finger_table.fingers[0]`.
#[derive(Debug, Clone)]
pub struct SuccessorList {
    entries: Vec<NodeRef>,
    backup: Option<Vec<NodeRef>>,
    max_entries: usize,
}

impl SuccessorList {
    pub fn new(initial: NodeRef) -> Self {
        SuccessorList { entries: vec![initial], backup: None, max_entries: DEFAULT_MAX_ENTRIES }
    }

    pub fn head(&self) -> &NodeRef {
        self.entries.first().expect("successor list is never empty while the node is active")
    }

    pub fn entries(&self) -> &[NodeRef] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Updates the head AND `finger_table.fingers[0]`. When `replace_old` is
    /// set, also rewrites any trailing finger whose successor matched the
    /// previous head -- the fingers that were learned "for free" by copying
    /// finger[0] during a fresh join -- stopping at the first finger that
    /// already diverges.
    pub fn set(&mut self, new_successor: NodeRef, finger_table: &mut FingerTable, replace_old: bool) {
        if self.entries.is_empty() {
            self.entries.push(new_successor.clone());
        } else {
            self.entries[0] = new_successor.clone();
        }
        Self::correct_finger_table(finger_table, &new_successor, replace_old);
    }

    fn correct_finger_table(finger_table: &mut FingerTable, new_successor: &NodeRef, replace_old: bool) {
        let old = finger_table.fingers[0].successor.clone();
        finger_table.fingers[0].successor = Some(new_successor.clone());

        let Some(old) = (if replace_old { old } else { None }) else {
            return;
        };
        for entry in finger_table.fingers.iter_mut().skip(1) {
            match &entry.successor {
                Some(s) if s.id == old.id => entry.successor = Some(new_successor.clone()),
                _ => break,
            }
        }
    }

    /// Replaces the tail of the list with `[head] ++ peers.filter(id != ignore_id)`,
    /// truncated to `max_entries`. Keeps the previous list as a one-step
    /// backup so a suspicious response can be [`SuccessorList::revert`]ed.
    pub fn update_from(&mut self, peers: &[NodeRef], ignore_id: Identifier) {
        if peers.is_empty() && self.entries.len() <= 1 {
            return;
        }
        self.backup = Some(self.entries.clone());
        let mut new_entries = vec![self.head().clone()];
        new_entries.extend(peers.iter().filter(|p| p.id != ignore_id).cloned());
        new_entries.truncate(self.max_entries);
        self.entries = new_entries;
    }

    pub fn revert(&mut self) {
        if let Some(backup) = self.backup.take() {
            self.entries = backup;
        }
    }

    /// Pops the dead head and promotes index 1 to be the new head.
    pub fn delete_first(&mut self, finger_table: &mut FingerTable) {
        if !self.entries.is_empty() {
            self.entries.remove(0);
        }
        if let Some(new_head) = self.entries.first().cloned() {
            Self::correct_finger_table(finger_table, &new_head, true);
        }
    }

    pub fn count_occurrence(&self, node: &NodeRef) -> usize {
        self.entries.iter().filter(|n| n.id == node.id).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::Identifier;

    fn id(n: u64) -> Identifier {
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&n.to_be_bytes());
        Identifier::from_be_bytes(&bytes)
    }

    fn node(n: u64) -> NodeRef {
        NodeRef::new(id(n), format!("127.0.0.1:{n}"))
    }

    #[test]
    fn set_mirrors_into_finger_zero() {
        let mut table = FingerTable::new(id(78), 8, Some(node(78)));
        let mut list = SuccessorList::new(node(78));
        list.set(node(116), &mut table, false);
        assert_eq!(list.head(), &node(116));
        assert_eq!(table.fingers[0].successor.as_ref().unwrap(), &node(116));
    }

    #[test]
    fn set_propagates_to_trailing_fingers_pointing_at_old_head() {
        let mut table = FingerTable::new(id(78), 8, Some(node(78)));
        let mut list = SuccessorList::new(node(78));
        // simulate a fresh join: every finger still points at the old successor
        list.set(node(200), &mut table, true);
        assert!(table.fingers.iter().all(|f| f.successor.as_ref().unwrap() == &node(200)));
    }

    #[test]
    fn set_stops_propagation_at_first_diverging_finger() {
        let mut table = FingerTable::new(id(78), 8, Some(node(78)));
        table.fingers[2].successor = Some(node(116)); // already learned independently
        let mut list = SuccessorList::new(node(78));
        list.set(node(200), &mut table, true);
        assert_eq!(table.fingers[0].successor.as_ref().unwrap(), &node(200));
        assert_eq!(table.fingers[1].successor.as_ref().unwrap(), &node(200));
        assert_eq!(table.fingers[2].successor.as_ref().unwrap(), &node(116));
        assert_eq!(table.fingers[3].successor.as_ref().unwrap(), &node(78)); // untouched past the break
    }

    #[test]
    fn update_from_keeps_head_and_truncates() {
        let mut list = SuccessorList::new(node(116));
        list.update_from(&[node(200), node(10), node(20)], id(78));
        assert_eq!(list.entries(), &[node(116), node(200), node(10)]);
    }

    #[test]
    fn update_from_filters_ignored_id() {
        let mut list = SuccessorList::new(node(116));
        list.update_from(&[node(78), node(200)], id(78));
        assert_eq!(list.entries(), &[node(116), node(200)]);
    }

    #[test]
    fn revert_restores_previous_list() {
        let mut list = SuccessorList::new(node(116));
        list.update_from(&[node(200)], id(1));
        list.update_from(&[node(50)], id(1));
        list.revert();
        assert_eq!(list.entries(), &[node(116), node(200)]);
    }

    #[test]
    fn delete_first_promotes_next_and_fixes_finger_zero() {
        let mut table = FingerTable::new(id(78), 8, Some(node(116)));
        let mut list = SuccessorList::new(node(116));
        list.update_from(&[node(200)], id(1));
        list.delete_first(&mut table);
        assert_eq!(list.head(), &node(200));
        assert_eq!(table.fingers[0].successor.as_ref().unwrap(), &node(200));
    }
}
