//! Purpose: Ordered in-memory key/value map of tuples with scan strategies.
//! Exports: `KvMap`.
//! Role: Stand-in storage collaborator; supplies pull functions for `RowIter`.
//! Invariants: Entries are ordered by decoded key pairs: tag first, then value, pair by pair.
//! Invariants: Integers compare numerically (signed and unsigned together); floats sort after
//! Invariants: integers; keys that fail to decode sort after all valid keys, by raw bytes.
//! Invariants: Scans read a snapshot; writes after a scan starts are not observed by it.
use std::cmp::Ordering as CmpOrdering;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::cursor::TupleCursor;
use crate::core::error::{Error, ErrorKind};
use crate::core::projector::RowProjector;
use crate::core::row_iter::{KvClose, KvPull, RowIter};
use crate::core::tuple::{StoredValue, TupleBuf};
use crate::core::value::RawValue;

/// Map key ordered by decoded contents. Ties on contents fall back to raw bytes, so
/// equality stays byte equality.
#[derive(Clone, Debug)]
struct OrderedKey {
    tuple: TupleBuf,
    decodes: bool,
}

impl OrderedKey {
    fn new(tuple: TupleBuf) -> Self {
        let decodes = decodes_cleanly(tuple.as_slice());
        Self { tuple, decodes }
    }
}

impl PartialEq for OrderedKey {
    fn eq(&self, other: &Self) -> bool {
        self.tuple == other.tuple
    }
}

impl Eq for OrderedKey {}

impl PartialOrd for OrderedKey {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedKey {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        let a = self.tuple.as_slice();
        let b = other.tuple.as_slice();
        match (self.decodes, other.decodes) {
            (true, true) => compare_decoded(a, b)
                .unwrap_or(CmpOrdering::Equal)
                .then_with(|| a.cmp(b)),
            (true, false) => CmpOrdering::Less,
            (false, true) => CmpOrdering::Greater,
            (false, false) => a.cmp(b),
        }
    }
}

fn decodes_cleanly(bytes: &[u8]) -> bool {
    let mut cursor = TupleCursor::new();
    if cursor.init_for(bytes).is_err() {
        return false;
    }
    loop {
        match cursor.next_tag(bytes) {
            Ok(Some(_)) => {
                if cursor.next_value(bytes).is_err() {
                    return false;
                }
            }
            Ok(None) => return true,
            Err(_) => return false,
        }
    }
}

fn compare_decoded(a: &[u8], b: &[u8]) -> Result<CmpOrdering, Error> {
    let mut left = TupleCursor::new();
    let mut right = TupleCursor::new();
    left.init_for(a)?;
    right.init_for(b)?;
    loop {
        let (tag_a, tag_b) = match (left.next_tag(a)?, right.next_tag(b)?) {
            (None, None) => return Ok(CmpOrdering::Equal),
            (None, Some(_)) => return Ok(CmpOrdering::Less),
            (Some(_), None) => return Ok(CmpOrdering::Greater),
            (Some(tag_a), Some(tag_b)) => (tag_a, tag_b),
        };
        let ord = tag_a
            .cmp(&tag_b)
            .then(compare_raw(left.next_value(a)?, right.next_value(b)?));
        if ord != CmpOrdering::Equal {
            return Ok(ord);
        }
    }
}

fn compare_raw(a: RawValue<'_>, b: RawValue<'_>) -> CmpOrdering {
    fn rank(value: &RawValue<'_>) -> u8 {
        match value {
            RawValue::Null => 0,
            RawValue::Bool(_) => 1,
            RawValue::Int(_) | RawValue::Uint(_) => 2,
            RawValue::Float(_) => 3,
            RawValue::Str(_) => 4,
            RawValue::Bytes(_) => 5,
        }
    }
    fn wide(value: &RawValue<'_>) -> i128 {
        match value {
            RawValue::Int(v) => i128::from(*v),
            RawValue::Uint(v) => i128::from(*v),
            _ => 0,
        }
    }
    match (a, b) {
        (RawValue::Bool(x), RawValue::Bool(y)) => x.cmp(&y),
        (RawValue::Float(x), RawValue::Float(y)) => x.total_cmp(&y),
        (RawValue::Str(x), RawValue::Str(y)) => x.cmp(y),
        (RawValue::Bytes(x), RawValue::Bytes(y)) => x.cmp(y),
        (x, y) if rank(&x) == 2 && rank(&y) == 2 => wide(&x).cmp(&wide(&y)),
        (x, y) => rank(&x).cmp(&rank(&y)),
    }
}

fn ordered_bound(bound: Bound<TupleBuf>) -> Bound<OrderedKey> {
    match bound {
        Bound::Included(key) => Bound::Included(OrderedKey::new(key)),
        Bound::Excluded(key) => Bound::Excluded(OrderedKey::new(key)),
        Bound::Unbounded => Bound::Unbounded,
    }
}

#[derive(Clone, Debug, Default)]
pub struct KvMap {
    entries: Arc<BTreeMap<OrderedKey, StoredValue>>,
}

impl KvMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: TupleBuf, value: StoredValue) -> Option<StoredValue> {
        Arc::make_mut(&mut self.entries).insert(OrderedKey::new(key), value)
    }

    pub fn remove(&mut self, key: &TupleBuf) -> Option<StoredValue> {
        Arc::make_mut(&mut self.entries).remove(&OrderedKey::new(key.clone()))
    }

    pub fn get(&self, key: &TupleBuf) -> Option<&StoredValue> {
        self.entries.get(&OrderedKey::new(key.clone()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn full_scan(&self, projector: RowProjector) -> RowIter {
        self.scan_bounds(Bound::Unbounded, Bound::Unbounded, projector)
    }

    /// Scans keys within `start`/`end`, in key order.
    pub fn range_scan(
        &self,
        start: Bound<TupleBuf>,
        end: Bound<TupleBuf>,
        projector: RowProjector,
    ) -> Result<RowIter, Error> {
        let start = ordered_bound(start);
        let end = ordered_bound(end);
        validate_bounds(&start, &end)?;
        Ok(self.scan_bounds(start, end, projector))
    }

    /// Yields at most the single row stored under `key`.
    pub fn lookup(&self, key: &TupleBuf, projector: RowProjector) -> RowIter {
        let hit = self
            .get(key)
            .map(|value| (StoredValue::Tuple(key.clone()), value.clone()));
        let mut hit = Some(hit);
        let pull: KvPull = Box::new(move || Ok(hit.take().flatten()));
        RowIter::new(pull, None, projector)
    }

    fn scan_bounds(
        &self,
        start: Bound<OrderedKey>,
        end: Bound<OrderedKey>,
        projector: RowProjector,
    ) -> RowIter {
        let entries = Arc::clone(&self.entries);
        let pulled = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&pulled);
        let mut lower = start;
        let pull: KvPull = Box::new(move || {
            let next = entries
                .range((lower.clone(), end.clone()))
                .next()
                .map(|(key, value)| (key.clone(), value.clone()));
            let Some((key, value)) = next else {
                return Ok(None);
            };
            let tuple = key.tuple.clone();
            lower = Bound::Excluded(key);
            counter.fetch_add(1, Ordering::Relaxed);
            Ok(Some((StoredValue::Tuple(tuple), value)))
        });
        let close: KvClose = Box::new(move || {
            tracing::debug!(pairs = pulled.load(Ordering::Relaxed), "kv scan closed");
            Ok(())
        });
        RowIter::new(pull, Some(close), projector)
    }
}

fn validate_bounds(start: &Bound<OrderedKey>, end: &Bound<OrderedKey>) -> Result<(), Error> {
    let (lo, hi, both_excluded) = match (start, end) {
        (Bound::Included(lo), Bound::Included(hi)) => (lo, hi, false),
        (Bound::Included(lo), Bound::Excluded(hi)) => (lo, hi, false),
        (Bound::Excluded(lo), Bound::Included(hi)) => (lo, hi, false),
        (Bound::Excluded(lo), Bound::Excluded(hi)) => (lo, hi, true),
        _ => return Ok(()),
    };
    if lo > hi || (both_excluded && lo == hi) {
        return Err(Error::new(ErrorKind::Usage).with_message("scan range start is after its end"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::ops::Bound;

    use super::KvMap;
    use crate::core::error::ErrorKind;
    use crate::core::projector::RowProjector;
    use crate::core::schema::{Column, ColumnType};
    use crate::core::tuple::{StoredValue, TupleBuf};
    use crate::core::value::{RawValue, Value};

    fn key(id: u64) -> TupleBuf {
        TupleBuf::key(&[(1, RawValue::Uint(id))]).expect("key")
    }

    fn table() -> KvMap {
        let mut map = KvMap::new();
        for (id, name) in [(3, "c"), (1, "a"), (2, "b"), (4, "d")] {
            let value = TupleBuf::value(&[(2, RawValue::Str(name))]).expect("value");
            map.insert(key(id), value.into());
        }
        map
    }

    fn projector() -> RowProjector {
        RowProjector::for_columns(vec![
            Column::new(1, "id", ColumnType::Uint).key(),
            Column::new(2, "name", ColumnType::String),
        ])
        .expect("projector")
    }

    fn ids(rows: Vec<crate::core::row::Row>) -> Vec<Value> {
        rows.into_iter().map(|row| row[0].clone()).collect()
    }

    #[test]
    fn full_scan_is_key_ordered() {
        let mut iter = table().full_scan(projector());
        let rows: Vec<_> = iter.by_ref().collect::<Result<_, _>>().expect("rows");
        iter.close().expect("close");
        assert_eq!(
            ids(rows),
            vec![Value::Uint(1), Value::Uint(2), Value::Uint(3), Value::Uint(4)]
        );
    }

    fn signed_table(ids: &[i64]) -> KvMap {
        let mut map = KvMap::new();
        for id in ids {
            let key = TupleBuf::key(&[(1, RawValue::Int(*id))]).expect("key");
            let value = TupleBuf::value(&[(2, RawValue::Str("x"))]).expect("value");
            map.insert(key, value.into());
        }
        map
    }

    fn signed_key(id: i64) -> TupleBuf {
        TupleBuf::key(&[(1, RawValue::Int(id))]).expect("key")
    }

    fn signed_projector() -> RowProjector {
        RowProjector::for_columns(vec![
            Column::new(1, "id", ColumnType::Int).key(),
            Column::new(2, "name", ColumnType::String),
        ])
        .expect("projector")
    }

    #[test]
    fn full_scan_orders_integer_keys_numerically() {
        let rows: Vec<_> = signed_table(&[1, 2, 256, -1])
            .full_scan(signed_projector())
            .collect::<Result<_, _>>()
            .expect("rows");
        assert_eq!(
            ids(rows),
            vec![Value::Int(-1), Value::Int(1), Value::Int(2), Value::Int(256)]
        );
    }

    #[test]
    fn range_scan_over_wide_and_negative_keys() {
        let map = signed_table(&[-300, -1, 0, 255, 256, 70_000]);
        let rows: Vec<_> = map
            .range_scan(
                Bound::Included(signed_key(-1)),
                Bound::Excluded(signed_key(70_000)),
                signed_projector(),
            )
            .expect("range")
            .collect::<Result<_, _>>()
            .expect("rows");
        assert_eq!(
            ids(rows),
            vec![Value::Int(-1), Value::Int(0), Value::Int(255), Value::Int(256)]
        );

        let err = map
            .range_scan(
                Bound::Included(signed_key(256)),
                Bound::Included(signed_key(-1)),
                signed_projector(),
            )
            .expect_err("inverted");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn mixed_signedness_keys_share_one_order() {
        let mut map = KvMap::new();
        map.insert(key(5), StoredValue::Absent);
        map.insert(signed_key(-5), StoredValue::Absent);
        map.insert(signed_key(5), StoredValue::Absent);
        map.insert(key(300), StoredValue::Absent);
        let projector =
            RowProjector::for_columns(vec![Column::new(1, "id", ColumnType::Any).key()])
                .expect("projector");
        let rows: Vec<_> = map
            .full_scan(projector)
            .collect::<Result<_, _>>()
            .expect("rows");
        // Int 5 and Uint 5 are equal numerically and tie-break on bytes; both stay.
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0][0], Value::Int(-5));
        assert_eq!(rows[3][0], Value::Uint(300));
        assert_eq!(map.get(&signed_key(5)), Some(&StoredValue::Absent));
    }

    #[test]
    fn range_scan_respects_bounds() {
        let rows: Vec<_> = table()
            .range_scan(Bound::Excluded(key(1)), Bound::Included(key(3)), projector())
            .expect("range")
            .collect::<Result<_, _>>()
            .expect("rows");
        assert_eq!(ids(rows), vec![Value::Uint(2), Value::Uint(3)]);
    }

    #[test]
    fn inverted_range_is_rejected() {
        let err = table()
            .range_scan(Bound::Included(key(3)), Bound::Included(key(1)), projector())
            .expect_err("inverted");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn scan_reads_a_snapshot() {
        let mut map = table();
        let iter = map.full_scan(projector());
        map.insert(key(0), StoredValue::Absent);
        assert_eq!(iter.count(), 4);
        assert_eq!(map.len(), 5);
    }

    #[test]
    fn lookup_yields_one_row() {
        let rows: Vec<_> = table()
            .lookup(&key(2), projector())
            .collect::<Result<_, _>>()
            .expect("rows");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][1], Value::from("b"));

        assert_eq!(table().lookup(&key(9), projector()).count(), 0);
    }
}
