//! Requests sent to servers and the raw replies they produce.

mod reconcile;
#[cfg(test)]
mod test;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::{
    bson::{Bson, Document},
    bson_util,
    error::{Error, Result},
    options::{ServerAddress, WriteConcern},
};

pub use self::reconcile::reconcile;

pub(crate) const DEFAULT_MAX_WRITE_BATCH_SIZE: usize = 100_000;
pub(crate) const MAX_BSON_OBJECT_SIZE: usize = 16 * 1024 * 1024;
pub(crate) const MAX_MESSAGE_SIZE_BYTES: usize = 48_000_000;

// Room left in each message for the command fields surrounding the document payload.
const COMMAND_OVERHEAD_SIZE: usize = 16_000;

/// Maps each position within one network batch to the position of the same document in the
/// caller's original document array.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct BatchIndexMap {
    indexes: Vec<usize>,
}

impl BatchIndexMap {
    /// Creates a map where batch position `i` corresponds to original position `indexes[i]`.
    pub fn new(indexes: Vec<usize>) -> Self {
        Self { indexes }
    }

    /// A map for a batch holding the `len` consecutive documents starting at `start`.
    pub fn range(start: usize, len: usize) -> Self {
        Self {
            indexes: (start..start + len).collect(),
        }
    }

    /// The original position of the document at `batch_index` within the batch.
    pub fn get(&self, batch_index: usize) -> Option<usize> {
        self.indexes.get(batch_index).copied()
    }

    /// The number of documents in the batch.
    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    /// Whether the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }

    /// The original positions, in batch order.
    pub fn as_slice(&self) -> &[usize] {
        &self.indexes
    }
}

impl From<Vec<usize>> for BatchIndexMap {
    fn from(indexes: Vec<usize>) -> Self {
        Self::new(indexes)
    }
}

impl FromIterator<usize> for BatchIndexMap {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// A database command. The name of the command is the first key of its body.
#[derive(Clone, Debug, PartialEq)]
pub struct Command {
    pub(crate) name: String,
    pub(crate) target_db: String,
    pub(crate) body: Document,
}

impl Command {
    /// Creates a command to run against `target_db`.
    pub fn new(target_db: impl Into<String>, body: Document) -> Result<Self> {
        let name = bson_util::first_key(&body)
            .ok_or_else(|| Error::invalid_argument("command body cannot be empty"))?
            .to_string();
        let target_db = target_db.into();
        if target_db.is_empty() {
            return Err(Error::invalid_argument("database name cannot be empty"));
        }

        Ok(Self {
            name,
            target_db,
            body,
        })
    }

    /// The name of the command.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The database the command runs against.
    pub fn target_db(&self) -> &str {
        &self.target_db
    }

    /// The body of the command.
    pub fn body(&self) -> &Document {
        &self.body
    }

    /// The document sent to the server: the body with `$db` appended.
    pub(crate) fn to_document(&self) -> Document {
        let mut document = self.body.clone();
        document.insert("$db", self.target_db.as_str());
        document
    }
}

/// The kind of write a batch performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum WriteKind {
    /// Inserts documents.
    Insert,

    /// Applies update statements.
    Update,

    /// Applies delete statements.
    Delete,
}

impl WriteKind {
    pub(crate) fn command_name(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    pub(crate) fn documents_field(self) -> &'static str {
        match self {
            Self::Insert => "documents",
            Self::Update => "updates",
            Self::Delete => "deletes",
        }
    }
}

/// One network batch of a write, along with the positions of its documents in the caller's
/// original array.
#[derive(Clone, Debug, PartialEq)]
pub struct WriteBatch {
    pub(crate) command: Command,
    pub(crate) index_map: BatchIndexMap,
    pub(crate) ordered: bool,
}

impl WriteBatch {
    /// Wraps an already-built write command. The batch is ordered unless the command's `ordered`
    /// field is `false`.
    pub fn new(command: Command, index_map: BatchIndexMap) -> Self {
        let ordered = command.body.get_bool("ordered").unwrap_or(true);
        Self {
            command,
            index_map,
            ordered,
        }
    }

    /// The write command.
    pub fn command(&self) -> &Command {
        &self.command
    }

    /// The positions of this batch's documents in the caller's original array.
    pub fn index_map(&self) -> &BatchIndexMap {
        &self.index_map
    }
}

/// A write of many documents to one collection, split into network batches with
/// [`WriteOperation::into_batches`].
#[derive(Clone, Debug, TypedBuilder)]
#[non_exhaustive]
pub struct WriteOperation {
    /// The database containing the collection.
    #[builder(setter(into))]
    pub target_db: String,

    /// The collection written to.
    #[builder(setter(into))]
    pub collection: String,

    /// The kind of write.
    pub kind: WriteKind,

    /// The documents (for inserts) or statements (for updates and deletes), in caller order.
    pub documents: Vec<Document>,

    /// Whether the server should stop at the first failing document. Defaults to `true`.
    #[builder(default = true)]
    pub ordered: bool,

    /// The write concern sent with every batch. When unset, the cluster's default applies.
    #[builder(default, setter(strip_option))]
    pub write_concern: Option<WriteConcern>,

    /// The maximum number of documents per batch.
    #[builder(default = DEFAULT_MAX_WRITE_BATCH_SIZE)]
    pub max_batch_size: usize,
}

impl WriteOperation {
    /// Whether the server will acknowledge the batches of this write.
    pub fn is_acknowledged(&self) -> bool {
        self.write_concern
            .as_ref()
            .map(WriteConcern::is_acknowledged)
            .unwrap_or(true)
    }

    /// Splits the write into batches that respect both the document count limit and the maximum
    /// message size. Each batch carries the positions of its documents in `documents`.
    pub fn into_batches(mut self) -> Result<Vec<WriteBatch>> {
        if self.documents.is_empty() {
            return Err(Error::invalid_argument("cannot execute a write with no documents"));
        }
        if self.max_batch_size == 0 {
            return Err(Error::invalid_argument("max_batch_size must be positive"));
        }
        let write_concern = match self.write_concern {
            Some(ref write_concern) => {
                write_concern.validate()?;
                write_concern.to_document()?
            }
            None => None,
        };

        let max_payload_size = MAX_MESSAGE_SIZE_BYTES - COMMAND_OVERHEAD_SIZE;
        let mut batches = Vec::new();
        let mut current: Vec<Bson> = Vec::new();
        let mut current_size = 0;
        let mut start = 0;

        let documents = std::mem::take(&mut self.documents);
        for (i, document) in documents.into_iter().enumerate() {
            let size = crate::bson::to_vec(&document)?.len();
            if size > MAX_BSON_OBJECT_SIZE {
                return Err(Error::invalid_argument(format!(
                    "{} document must be within {MAX_BSON_OBJECT_SIZE} bytes, but document {i} \
                     is {size} bytes",
                    self.kind.command_name()
                )));
            }

            if !current.is_empty()
                && (current.len() == self.max_batch_size || current_size + size > max_payload_size)
            {
                let full = std::mem::take(&mut current);
                let index_map = BatchIndexMap::range(start, full.len());
                start = i;
                current_size = 0;
                batches.push(self.build_batch(full, index_map, write_concern.as_ref())?);
            }

            current.push(Bson::Document(document));
            current_size += size;
        }

        let index_map = BatchIndexMap::range(start, current.len());
        batches.push(self.build_batch(current, index_map, write_concern.as_ref())?);

        Ok(batches)
    }

    fn build_batch(
        &self,
        documents: Vec<Bson>,
        index_map: BatchIndexMap,
        write_concern: Option<&Document>,
    ) -> Result<WriteBatch> {
        let mut body = Document::new();
        body.insert(self.kind.command_name(), self.collection.as_str());
        body.insert(self.kind.documents_field(), documents);
        body.insert("ordered", self.ordered);
        if let Some(write_concern) = write_concern {
            body.insert("writeConcern", write_concern.clone());
        }

        Ok(WriteBatch {
            command: Command::new(self.target_db.as_str(), body)?,
            index_map,
            ordered: self.ordered,
        })
    }
}

/// A request dispatched to a single server.
#[derive(Clone, Debug, PartialEq, derive_more::From)]
#[non_exhaustive]
pub enum Request {
    /// A command whose reply is validated: a reply reporting failure becomes an error.
    Command(Command),

    /// A write batch whose reply is returned as-is, to be folded into a write result.
    WriteBatch(WriteBatch),
}

impl Request {
    pub(crate) fn command(&self) -> &Command {
        match self {
            Self::Command(command) => command,
            Self::WriteBatch(batch) => &batch.command,
        }
    }

    pub(crate) fn validates_reply(&self) -> bool {
        matches!(self, Self::Command(_))
    }
}

/// A decoded reply, along with the address of the server that sent it.
#[derive(Clone, Debug, PartialEq)]
pub struct RawReply {
    pub(crate) address: ServerAddress,
    pub(crate) document: Document,
}

impl RawReply {
    /// Creates a reply received from the server at `address`.
    pub fn new(address: ServerAddress, document: Document) -> Self {
        Self { address, document }
    }

    /// The server that sent the reply.
    pub fn address(&self) -> &ServerAddress {
        &self.address
    }

    /// The reply document.
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Consumes the reply, returning the reply document.
    pub fn into_document(self) -> Document {
        self.document
    }
}

/// The format of write replies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ReplyVariant {
    /// Write command replies, reporting a count, per-document `writeErrors` and a
    /// `writeConcernError`.
    #[default]
    Modern,

    /// Replies to the acknowledgement commands that followed legacy write opcodes, reporting a
    /// count and at most one error through `err`/`errmsg`.
    Legacy,
}

impl ReplyVariant {
    /// Whether the reply reports that its batch did not fully succeed.
    pub(crate) fn reports_failure(self, reply: &Document, fields: &ReplyFieldNames) -> bool {
        let present = |field: &str| !matches!(reply.get(field), None | Some(Bson::Null));
        // Legacy servers may report "no error" as `err: false`.
        let reported = |field: &str| {
            !matches!(reply.get(field), None | Some(Bson::Null) | Some(Bson::Boolean(false)))
        };
        match self {
            Self::Modern => {
                present(&fields.write_errors)
                    || reply.get(&fields.ok).map(|ok| !bson_util::is_ok(ok)).unwrap_or(false)
            }
            Self::Legacy => reported(&fields.err) || reported(&fields.errmsg),
        }
    }
}

/// The names of the reply fields read while reconciling write results.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
#[non_exhaustive]
pub struct ReplyFieldNames {
    /// The number of documents affected by the batch. Defaults to `n`.
    pub count: String,

    /// The per-document write errors. Defaults to `writeErrors`.
    pub write_errors: String,

    /// The write concern error, either a single document or an array. Defaults to
    /// `writeConcernError`.
    pub write_concern_error: String,

    /// The generic error field of legacy replies. Defaults to `err`.
    pub err: String,

    /// The error message field. Defaults to `errmsg`.
    pub errmsg: String,

    /// The error code field. Defaults to `code`.
    pub code: String,

    /// The error code name field. Defaults to `codeName`.
    pub code_name: String,

    /// The error details field. Defaults to `errInfo`.
    pub err_info: String,

    /// The legacy write concern note. Defaults to `wnote`.
    pub wnote: String,

    /// The legacy journaling note. Defaults to `jnote`.
    pub jnote: String,

    /// The batch-local index of an error. Defaults to `index`.
    pub index: String,

    /// The command status field. Defaults to `ok`.
    pub ok: String,
}

impl Default for ReplyFieldNames {
    fn default() -> Self {
        Self {
            count: "n".to_string(),
            write_errors: "writeErrors".to_string(),
            write_concern_error: "writeConcernError".to_string(),
            err: "err".to_string(),
            errmsg: "errmsg".to_string(),
            code: "code".to_string(),
            code_name: "codeName".to_string(),
            err_info: "errInfo".to_string(),
            wnote: "wnote".to_string(),
            jnote: "jnote".to_string(),
            index: "index".to_string(),
            ok: "ok".to_string(),
        }
    }
}
