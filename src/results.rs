//! Contains the result of a reconciled write.

use serde::Serialize;

use crate::error::{IndexedWriteConcernError, IndexedWriteError, ReplyError};

/// The aggregate outcome of a write that may have been split across several network batches.
///
/// Every index reported here refers to the caller's original document array. A partially
/// successful write is a normal outcome: its failures are reported as data in `write_errors` and
/// `write_concern_errors` rather than as an [`Error`](crate::error::Error).
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct WriteResult {
    /// Whether the server acknowledged the write. When `false`, nothing else is known about its
    /// outcome.
    pub acknowledged: bool,

    /// The number of documents affected across every batch.
    pub affected_count: u64,

    /// Per-document write errors, ordered by original index.
    pub write_errors: Vec<IndexedWriteError>,

    /// Write concern failures, ordered by original index. Errors reported for a whole batch
    /// come last.
    pub write_concern_errors: Vec<IndexedWriteConcernError>,

    /// Replies whose shape could not be interpreted.
    pub reply_errors: Vec<ReplyError>,
}

impl WriteResult {
    pub(crate) fn unacknowledged() -> Self {
        Self::default()
    }

    /// Whether every document was written and the write concern was satisfied.
    pub fn is_success(&self) -> bool {
        self.write_errors.is_empty()
            && self.write_concern_errors.is_empty()
            && self.reply_errors.is_empty()
    }

    /// The write error reported for the document at `index` in the original array, if any.
    pub fn write_error_at(&self, index: usize) -> Option<&IndexedWriteError> {
        self.write_errors.iter().find(|error| error.index == index)
    }

    /// The original indexes of the documents that failed, in ascending order.
    pub fn failed_indexes(&self) -> Vec<usize> {
        self.write_errors.iter().map(|error| error.index).collect()
    }
}
