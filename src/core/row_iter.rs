//! Purpose: Pull-based row iterator over an abstract ordered key/value source.
//! Exports: `RowIter`, `KvPull`, `KvClose`, `KvPair`.
//! Role: Lets full scans, range scans, and point lookups share one projection path
//! Role: by supplying different pull functions.
//! Invariants: `next` forwards decode errors unchanged and adds no error kinds of its own.
//! Invariants: `close` runs the cleanup callback at most once; later calls succeed trivially.
use crate::core::error::Error;
use crate::core::projector::RowProjector;
use crate::core::row::Row;
use crate::core::tuple::StoredValue;

pub type KvPair = (StoredValue, StoredValue);

/// Returns the next pair, or `Ok(None)` at end of sequence.
pub type KvPull = Box<dyn FnMut() -> Result<Option<KvPair>, Error> + Send>;

pub type KvClose = Box<dyn FnOnce() -> Result<(), Error> + Send>;

pub struct RowIter {
    pull: KvPull,
    close: Option<KvClose>,
    projector: RowProjector,
}

impl RowIter {
    pub fn new(pull: KvPull, close: Option<KvClose>, projector: RowProjector) -> Self {
        Self {
            pull,
            close,
            projector,
        }
    }

    /// Adapts any iterator of pairs; exhaustion maps to end of sequence.
    pub fn from_entries<I>(entries: I, projector: RowProjector) -> Self
    where
        I: Iterator<Item = Result<KvPair, Error>> + Send + 'static,
    {
        let mut entries = entries;
        let pull: KvPull = Box::new(move || entries.next().transpose());
        Self::new(pull, None, projector)
    }

    pub fn projector(&self) -> &RowProjector {
        &self.projector
    }

    pub fn next_row(&mut self) -> Result<Option<Row>, Error> {
        let Some((key, value)) = (self.pull)()? else {
            return Ok(None);
        };
        self.projector.convert(&key, &value).map(Some)
    }

    pub fn close(&mut self) -> Result<(), Error> {
        match self.close.take() {
            Some(close) => close(),
            None => Ok(()),
        }
    }
}

impl Iterator for RowIter {
    type Item = Result<Row, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row().transpose()
    }
}

impl std::fmt::Debug for RowIter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowIter")
            .field("projector", &self.projector)
            .field("has_close", &self.close.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::{KvClose, KvPair, RowIter};
    use crate::core::error::{Error, ErrorKind};
    use crate::core::projector::RowProjector;
    use crate::core::schema::{Column, ColumnType};
    use crate::core::tuple::{StoredValue, TupleBuf};
    use crate::core::value::{RawValue, Value};

    fn projector() -> RowProjector {
        RowProjector::for_columns(vec![
            Column::new(1, "id", ColumnType::Int).key(),
            Column::new(2, "name", ColumnType::String),
        ])
        .expect("projector")
    }

    fn pair(id: i64, name: &str) -> KvPair {
        (
            TupleBuf::key(&[(1, RawValue::Int(id))]).expect("key").into(),
            TupleBuf::value(&[(2, RawValue::Str(name))])
                .expect("value")
                .into(),
        )
    }

    #[test]
    fn yields_rows_then_end_of_sequence() {
        let entries = vec![Ok(pair(1, "a")), Ok(pair(2, "b"))];
        let mut iter = RowIter::from_entries(entries.into_iter(), projector());
        let first = iter.next_row().expect("row").expect("some");
        assert_eq!(first.values(), &[Value::Int(1), Value::from("a")]);
        iter.next_row().expect("row").expect("some");
        assert!(iter.next_row().expect("end").is_none());
        assert!(iter.next_row().expect("still end").is_none());
    }

    #[test]
    fn decode_error_leaves_iterator_usable() {
        let entries = vec![
            Ok((StoredValue::Blob(vec![0]), StoredValue::Absent)),
            Ok(pair(2, "b")),
        ];
        let mut iter = RowIter::from_entries(entries.into_iter(), projector());
        let err = iter.next_row().expect_err("blob key");
        assert_eq!(err.kind(), ErrorKind::MalformedInput);
        let row = iter.next_row().expect("row").expect("some");
        assert_eq!(row[0], Value::Int(2));
    }

    #[test]
    fn source_errors_propagate_unchanged() {
        let entries = vec![Err(Error::new(ErrorKind::Io).with_message("disk gone"))];
        let mut iter = RowIter::from_entries(entries.into_iter(), projector());
        let err = iter.next_row().expect_err("io");
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(err.message(), Some("disk gone"));
    }

    #[test]
    fn close_without_callback_is_a_no_op() {
        let mut iter = RowIter::from_entries(std::iter::empty(), projector());
        iter.close().expect("close");
        iter.close().expect("close again");
    }

    #[test]
    fn close_propagates_callback_error_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let close: KvClose = Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(Error::new(ErrorKind::Io).with_message("release failed"))
        });
        let mut entries = vec![pair(1, "a")].into_iter();
        let mut iter = RowIter::new(
            Box::new(move || Ok(entries.next())),
            Some(close),
            projector(),
        );
        let row = iter.next_row().expect("row").expect("some");

        let err = iter.close().expect_err("callback error");
        assert_eq!(err.kind(), ErrorKind::Io);
        iter.close().expect("second close is trivial");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(row[1], Value::from("a"));
    }

    #[test]
    fn iterator_impl_collects_results() {
        let entries = vec![Ok(pair(1, "a")), Ok(pair(2, "b"))];
        let rows: Result<Vec<_>, _> =
            RowIter::from_entries(entries.into_iter(), projector()).collect();
        assert_eq!(rows.expect("rows").len(), 2);
    }
}
