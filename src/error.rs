//! Contains the `Error` and `Result` types that `mongodb-core` uses.


use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    bson::{Bson, Document},
    bson_util,
    operation::ReplyFieldNames,
    options::ServerAddress,
};

/// Server error code reported for a legacy write concern note that carried no explicit code.
pub const BAD_VALUE_CODE: i32 = 2;

/// Server error code used when a legacy reply reports an error without a code.
pub const UNKNOWN_ERROR_CODE: i32 = 8;

/// The result type for all methods that can return an error in the `mongodb-core` crate.
pub type Result<T> = std::result::Result<T, Error>;

/// An error that can occur in the `mongodb-core` crate. The inner
/// [`ErrorKind`](enum.ErrorKind.html) is boxed to keep `Result`s small.
#[derive(Clone, Debug, Error)]
#[error("Kind: {kind}, source: {source:?}")]
#[non_exhaustive]
pub struct Error {
    /// The type of error that occurred.
    pub kind: Box<ErrorKind>,

    #[source]
    pub(crate) source: Option<Box<Error>>,
}

impl Error {
    pub(crate) fn new(kind: ErrorKind) -> Self {
        Self {
            kind: Box::new(kind),
            source: None,
        }
    }

    pub(crate) fn with_source(mut self, source: impl Into<Option<Error>>) -> Self {
        self.source = source.into().map(Box::new);
        self
    }

    pub(crate) fn internal(message: impl Into<String>) -> Error {
        ErrorKind::Internal {
            message: message.into(),
        }
        .into()
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Error {
        ErrorKind::InvalidArgument {
            message: message.into(),
        }
        .into()
    }

    pub(crate) fn invalid_response(message: impl Into<String>) -> Error {
        ErrorKind::InvalidResponse {
            message: message.into(),
        }
        .into()
    }

    pub(crate) fn topology_conflict(message: impl Into<String>) -> Error {
        ErrorKind::TopologyConflict {
            message: message.into(),
        }
        .into()
    }

    pub(crate) fn server_selection(message: impl Into<String>) -> Error {
        ErrorKind::ServerSelection {
            message: message.into(),
        }
        .into()
    }

    /// Wraps `cause` in a dispatch error attributed to the server at `address`. Errors that already
    /// identify the server are returned untouched.
    pub(crate) fn dispatch(address: &ServerAddress, cause: Error) -> Error {
        if cause.address().is_some() {
            return cause;
        }
        Error::new(ErrorKind::Dispatch {
            address: address.clone(),
        })
        .with_source(cause)
    }

    /// Whether this error is a network-level failure: an I/O error or a dispatch failure caused
    /// by one.
    pub fn is_network_error(&self) -> bool {
        match self.kind.as_ref() {
            ErrorKind::Io(..) => true,
            ErrorKind::Dispatch { .. } => self
                .source
                .as_ref()
                .map(|source| source.is_network_error())
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Whether this error was caused by a timeout, either while waiting for a pooled connection or
    /// while waiting for a network reply.
    pub fn is_timeout(&self) -> bool {
        match self.kind.as_ref() {
            ErrorKind::ConnectionCheckoutTimeout { .. } => true,
            ErrorKind::Io(io_err) => io_err.kind() == std::io::ErrorKind::TimedOut,
            ErrorKind::Dispatch { .. } => self
                .source
                .as_ref()
                .map(|source| source.is_timeout())
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Whether this error was caused by the caller cancelling an in-flight dispatch.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind.as_ref(), ErrorKind::Cancelled { .. })
    }

    /// Whether this error was caused by an inconsistent set of observed servers.
    pub fn is_topology_conflict(&self) -> bool {
        matches!(self.kind.as_ref(), ErrorKind::TopologyConflict { .. })
    }

    /// Whether this error was caused by no server matching the selection criteria.
    pub fn is_server_selection_error(&self) -> bool {
        matches!(self.kind.as_ref(), ErrorKind::ServerSelection { .. })
    }

    /// The address of the server this error is attributed to, if any.
    pub fn address(&self) -> Option<&ServerAddress> {
        match self.kind.as_ref() {
            ErrorKind::Dispatch { address }
            | ErrorKind::ConnectionCheckoutTimeout { address }
            | ErrorKind::Cancelled { address } => Some(address),
            _ => None,
        }
    }

    /// The underlying cause of this error, if any.
    pub fn cause(&self) -> Option<&Error> {
        self.source.as_deref()
    }

    /// The server error code, if this error originated from a server reply.
    pub fn code(&self) -> Option<i32> {
        match self.kind.as_ref() {
            ErrorKind::Command(command_error) => Some(command_error.code),
            ErrorKind::Dispatch { .. } => self.source.as_ref().and_then(|source| source.code()),
            _ => None,
        }
    }
}

impl<E> From<E> for Error
where
    ErrorKind: From<E>,
{
    fn from(err: E) -> Self {
        Self::new(err.into())
    }
}

impl From<std::io::Error> for ErrorKind {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

impl From<std::io::ErrorKind> for ErrorKind {
    fn from(err: std::io::ErrorKind) -> Self {
        Self::Io(Arc::new(err.into()))
    }
}

impl From<crate::bson::ser::Error> for ErrorKind {
    fn from(err: crate::bson::ser::Error) -> Self {
        Self::BsonSerialization(err)
    }
}

impl From<crate::bson::de::Error> for ErrorKind {
    fn from(err: crate::bson::de::Error) -> Self {
        Self::BsonDeserialization(err)
    }
}

impl std::ops::Deref for Error {
    type Target = ErrorKind;

    fn deref(&self) -> &Self::Target {
        &self.kind
    }
}

/// The types of errors that can occur.
#[allow(missing_docs)]
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum ErrorKind {
    /// An invalid argument was provided.
    #[error("An invalid argument was provided: {message}")]
    #[non_exhaustive]
    InvalidArgument { message: String },

    /// The observed servers do not form a consistent topology. The observation that produced
    /// this error should be discarded; the previous topology remains in effect.
    #[error("Topology conflict: {message}")]
    #[non_exhaustive]
    TopologyConflict { message: String },

    /// No server was suitable for the operation.
    #[error("{message}")]
    #[non_exhaustive]
    ServerSelection { message: String },

    /// Sending a request to, or receiving a reply from, the server at `address` failed. The
    /// underlying cause is available from [`Error::cause`].
    #[error("Failed to dispatch a request to {address}")]
    #[non_exhaustive]
    Dispatch { address: ServerAddress },

    /// The pool did not provide a connection to `address` before the checkout timeout expired.
    #[error("Timed out while checking out a connection from the pool for {address}")]
    #[non_exhaustive]
    ConnectionCheckoutTimeout { address: ServerAddress },

    /// The caller cancelled the request to `address` before it completed.
    #[error("The request to {address} was cancelled")]
    #[non_exhaustive]
    Cancelled { address: ServerAddress },

    /// Wrapper around [`std::io::Error`](https://doc.rust-lang.org/std/io/struct.Error.html).
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    /// The server returned an error to an attempted command.
    #[error("Command failed: {0}")]
    Command(CommandError),

    /// The server returned an invalid reply.
    #[error("The server returned an invalid reply to a database operation: {message}")]
    #[non_exhaustive]
    InvalidResponse { message: String },

    /// Wrapper around `bson::ser::Error`.
    #[error("{0}")]
    BsonSerialization(crate::bson::ser::Error),

    /// Wrapper around `bson::de::Error`.
    #[error("{0}")]
    BsonDeserialization(crate::bson::de::Error),

    #[error("Internal error: {message}")]
    #[non_exhaustive]
    Internal { message: String },
}

/// An error that occurred due to a database command failing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct CommandError {
    /// Identifies the type of error.
    #[serde(default)]
    pub code: i32,

    /// The name associated with the error code.
    #[serde(rename = "codeName", default)]
    pub code_name: String,

    /// A description of the error that occurred.
    #[serde(rename = "errmsg", default = "String::new")]
    pub message: String,
}

impl CommandError {
    pub(crate) fn from_reply(reply: &Document, fields: &ReplyFieldNames) -> Self {
        Self {
            code: reply
                .get(&fields.code)
                .and_then(bson_util::get_int)
                .and_then(|code| i32::try_from(code).ok())
                .unwrap_or(UNKNOWN_ERROR_CODE),
            code_name: reply.get_str(&fields.code_name).unwrap_or_default().to_string(),
            message: parse_error_message(reply, fields).unwrap_or_default(),
        }
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(
            fmt,
            "Error code {} ({}): {}",
            self.code, self.code_name, self.message
        )
    }
}

/// A write error attributed to one document of the caller's original request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct IndexedWriteError {
    /// Index into the caller's original document array.
    pub index: usize,

    /// Identifies the type of write error.
    pub code: i32,

    /// The name associated with the error code, when the server reported one.
    #[serde(rename = "codeName", default)]
    pub code_name: Option<String>,

    /// A description of the error that occurred.
    #[serde(rename = "errmsg", default = "String::new")]
    pub message: String,

    /// A document providing more information about the write error.
    #[serde(rename = "errInfo")]
    pub details: Option<Document>,
}

/// A failure to satisfy the requested write concern.
///
/// `index` is expressed in terms of the caller's original document array. Servers usually
/// report write concern errors for a whole batch, in which case `index` is `None`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct IndexedWriteConcernError {
    /// Index into the caller's original document array, if the server attributed the error to a
    /// single document.
    pub index: Option<usize>,

    /// Identifies the type of write concern error.
    pub code: i32,

    /// The name associated with the error code.
    #[serde(rename = "codeName", default)]
    pub code_name: Option<String>,

    /// A description of the error that occurred.
    #[serde(rename = "errmsg", default = "String::new")]
    pub message: String,

    /// A document identifying the write concern setting related to the error.
    #[serde(rename = "errInfo")]
    pub details: Option<Document>,
}

/// A reply that could not be interpreted while reconciling a write. These are never write
/// errors: they indicate that the server's reply did not have the expected shape.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct ReplyError {
    /// The position of the offending reply among the replies passed to
    /// [`reconcile`](crate::reconcile).
    pub batch: usize,

    /// A description of what was wrong with the reply.
    pub message: String,
}

impl ReplyError {
    pub(crate) fn new(batch: usize, message: impl Into<String>) -> Self {
        Self {
            batch,
            message: message.into(),
        }
    }
}

/// Extracts a human-readable error message from a server reply whose fields are named by
/// `fields`.
///
/// A top-level error message takes precedence; otherwise the first write error entry is used.
/// When a code is present it is appended in parentheses, e.g. `no such command: foo (59)`.
pub fn parse_error_message(reply: &Document, fields: &ReplyFieldNames) -> Option<String> {
    if let Ok(message) = reply.get_str(&fields.errmsg) {
        return Some(with_code(message, reply.get(&fields.code)));
    }

    let first = reply
        .get_array(&fields.write_errors)
        .ok()?
        .iter()
        .find_map(Bson::as_document)?;
    let message = first.get_str(&fields.errmsg).unwrap_or_default();
    Some(with_code(message, first.get(&fields.code)))
}

fn with_code(message: &str, code: Option<&Bson>) -> String {
    match code.and_then(bson_util::get_int) {
        Some(code) => format!("{message} ({code})"),
        None => message.to_string(),
    }
}
