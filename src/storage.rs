//! Time-bounded, multi-valued local key/value storage (C3).

use crate::error::{ChordError, ChordResult};
use crate::identifier::Identifier;
use crate::ring::in_interval;
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const MAX_TTL_SECONDS: u64 = 43_200;

/// A single stored value with its insertion time and lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub value: Vec<u8>,
    pub inserted_at: u64,
    pub ttl_seconds: u64,
}

impl StoredRecord {
    fn is_expired(&self, now: u64) -> bool {
        now >= self.inserted_at.saturating_add(self.ttl_seconds)
    }
}

pub fn now_unix() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO).as_secs()
}

/// Mapping `Identifier -> [StoredRecord]`, insertion order preserved per key.
#[derive(Debug, Default)]
pub struct Storage {
    data: BTreeMap<Identifier, Vec<StoredRecord>>,
}

impl Storage {
    pub fn new() -> Self {
        Storage::default()
    }

    pub fn put(&mut self, key: Identifier, value: Vec<u8>, ttl_seconds: u64) -> ChordResult<()> {
        if ttl_seconds > MAX_TTL_SECONDS {
            return Err(ChordError::InvalidArgument(format!("ttl {ttl_seconds} exceeds {MAX_TTL_SECONDS}")));
        }
        self.data.entry(key).or_default().push(StoredRecord {
            value,
            inserted_at: now_unix(),
            ttl_seconds,
        });
        Ok(())
    }

    /// All current values for `key`, in insertion order; empty if absent.
    pub fn get(&self, key: Identifier) -> Vec<Vec<u8>> {
        self.data.get(&key).map(|records| records.iter().map(|r| r.value.clone()).collect()).unwrap_or_default()
    }

    /// Records whose key lies in `(a, b]`. Does not remove anything; pair with
    /// [`Storage::delete_range`] once the handoff has been acknowledged.
    pub fn extract_range(&self, a: Identifier, b: Identifier, bits: u32) -> Vec<(Identifier, StoredRecord)> {
        self.data
            .iter()
            .filter(|(key, _)| in_interval(**key, a, b, false, true, bits))
            .flat_map(|(key, records)| records.iter().map(move |r| (*key, r.clone())))
            .collect()
    }

    pub fn delete_range(&mut self, a: Identifier, b: Identifier, bits: u32) {
        self.data.retain(|key, _| !in_interval(*key, a, b, false, true, bits));
    }

    /// Appends incoming records as-is; duplicate values under the same key are kept.
    pub fn merge(&mut self, records: impl IntoIterator<Item = (Identifier, StoredRecord)>) {
        for (key, record) in records {
            self.data.entry(key).or_default().push(record);
        }
    }

    /// Removes every record whose lifetime has elapsed as of now.
    pub fn expire_tick(&mut self) {
        let now = now_unix();
        self.data.retain(|_, records| {
            records.retain(|r| !r.is_expired(now));
            !records.is_empty()
        });
    }

    pub fn len(&self) -> usize {
        self.data.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
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
    fn multi_value_put_and_get() {
        let mut s = Storage::new();
        s.put(id(1), b"a".to_vec(), 60).unwrap();
        s.put(id(1), b"b".to_vec(), 60).unwrap();
        assert_eq!(s.get(id(1)), vec![b"a".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn missing_key_returns_empty() {
        let s = Storage::new();
        assert!(s.get(id(42)).is_empty());
    }

    #[test]
    fn ttl_over_max_is_rejected() {
        let mut s = Storage::new();
        assert!(s.put(id(1), b"v".to_vec(), MAX_TTL_SECONDS + 1).is_err());
    }

    #[test]
    fn extract_range_does_not_delete() {
        let mut s = Storage::new();
        s.put(id(100), b"v".to_vec(), 60).unwrap();
        let extracted = s.extract_range(id(50), id(150), 8);
        assert_eq!(extracted.len(), 1);
        assert_eq!(s.get(id(100)).len(), 1);
    }

    #[test]
    fn delete_range_removes_only_matching_keys() {
        let mut s = Storage::new();
        s.put(id(100), b"v".to_vec(), 60).unwrap();
        s.put(id(200), b"w".to_vec(), 60).unwrap();
        s.delete_range(id(50), id(150), 8);
        assert!(s.get(id(100)).is_empty());
        assert_eq!(s.get(id(200)), vec![b"w".to_vec()]);
    }

    #[test]
    fn expire_tick_removes_only_expired_records() {
        let mut s = Storage::new();
        s.data.entry(id(1)).or_default().push(StoredRecord {
            value: b"stale".to_vec(),
            inserted_at: now_unix().saturating_sub(100),
            ttl_seconds: 1,
        });
        s.put(id(1), b"fresh".to_vec(), 60).unwrap();
        s.expire_tick();
        assert_eq!(s.get(id(1)), vec![b"fresh".to_vec()]);
    }

    #[test]
    fn merge_appends_duplicates() {
        let mut s = Storage::new();
        s.put(id(1), b"a".to_vec(), 60).unwrap();
        s.merge(vec![(
            id(1),
            StoredRecord { value: b"a".to_vec(), inserted_at: now_unix(), ttl_seconds: 60 },
        )]);
        assert_eq!(s.get(id(1)), vec![b"a".to_vec(), b"a".to_vec()]);
    }
}
