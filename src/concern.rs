//! Contains the types for write concerns.

#[cfg(test)]
mod test;

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_with::skip_serializing_none;
use typed_builder::TypedBuilder;

use crate::{
    bson::Document,
    error::{Error, Result},
    serde_util,
};

/// Specifies the level of acknowledgement requested from the server for write operations.
///
/// See the documentation [here](https://www.mongodb.com/docs/manual/reference/write-concern/) for more
/// information about write concerns.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, PartialEq, TypedBuilder, Serialize, Deserialize)]
#[builder(field_defaults(default, setter(into)))]
#[non_exhaustive]
pub struct WriteConcern {
    /// Requests acknowledgement that the operation has propagated to a specific number or variety
    /// of servers.
    pub w: Option<Acknowledgment>,

    /// Specifies a time limit for the write concern. If an operation has not propagated to the
    /// requested level within the time limit, the server reports a write concern error.
    #[serde(
        rename = "wtimeout",
        alias = "wtimeoutMS",
        default,
        with = "serde_util::duration_option_as_int_millis"
    )]
    pub w_timeout: Option<Duration>,

    /// Requests acknowledgement that the operation has propagated to the on-disk journal.
    #[serde(rename = "j", alias = "journal")]
    pub journal: Option<bool>,
}

/// The type of the `w` field in a [`WriteConcern`](struct.WriteConcern.html).
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum Acknowledgment {
    /// Requires acknowledgement that the write has reached the specified number of nodes.
    ///
    /// Specifying 0 makes the write unacknowledged: the reconciled result reports no count and
    /// no errors.
    Nodes(u32),

    /// Requires acknowledgement that the write has reached the majority of nodes.
    Majority,

    /// Requires acknowledgement according to the given custom write concern. See [here](https://www.mongodb.com/docs/manual/tutorial/configure-replica-set-tag-sets/#tag-sets-and-custom-write-concern-behavior)
    /// for more information.
    Custom(String),
}

impl Serialize for Acknowledgment {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Nodes(n) => serde_util::serialize_u64_as_int(u64::from(*n), serializer),
            Self::Majority => serializer.serialize_str(MAJORITY),
            Self::Custom(tag) => serializer.serialize_str(tag),
        }
    }
}

impl<'de> Deserialize<'de> for Acknowledgment {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Nodes(u32),
            Tag(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Nodes(n) => Self::Nodes(n),
            Raw::Tag(tag) => tag.into(),
        })
    }
}

const MAJORITY: &str = "majority";

impl From<u32> for Acknowledgment {
    fn from(n: u32) -> Self {
        Self::Nodes(n)
    }
}

impl From<String> for Acknowledgment {
    fn from(tag: String) -> Self {
        if tag == MAJORITY {
            Self::Majority
        } else {
            Self::Custom(tag)
        }
    }
}

impl From<&str> for Acknowledgment {
    fn from(tag: &str) -> Self {
        tag.to_string().into()
    }
}

impl WriteConcern {
    /// A `WriteConcern` requesting [`Acknowledgment::Nodes`].
    pub fn nodes(v: u32) -> Self {
        Acknowledgment::Nodes(v).into()
    }

    /// A `WriteConcern` requesting [`Acknowledgment::Majority`].
    pub fn majority() -> Self {
        Acknowledgment::Majority.into()
    }

    /// A `WriteConcern` with a custom acknowledgment.
    pub fn custom(s: impl AsRef<str>) -> Self {
        Acknowledgment::from(s.as_ref()).into()
    }

    /// A `WriteConcern` that requests no acknowledgement at all.
    pub fn unacknowledged() -> Self {
        Self::nodes(0)
    }

    fn requests_no_nodes(&self) -> bool {
        matches!(self.w, Some(Acknowledgment::Nodes(0)))
    }

    /// Whether the server will acknowledge writes issued with this write concern. Journaling
    /// implies acknowledgement even when `w` is 0.
    pub fn is_acknowledged(&self) -> bool {
        !self.requests_no_nodes() || self.journal == Some(true)
    }

    /// Whether nothing was specified, so the server's default applies.
    pub(crate) fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Rejects the contradictory combination of `w: 0` with `j: true`.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.requests_no_nodes() && self.journal == Some(true) {
            Err(Error::invalid_argument(
                "write concern cannot have w=0 and j=true",
            ))
        } else {
            Ok(())
        }
    }

    /// The `writeConcern` field appended to outgoing write batches, or `None` when the server
    /// default applies.
    pub(crate) fn to_document(&self) -> Result<Option<Document>> {
        if self.is_empty() {
            Ok(None)
        } else {
            Ok(Some(crate::bson::to_document(self)?))
        }
    }
}

impl From<Acknowledgment> for WriteConcern {
    fn from(w: Acknowledgment) -> Self {
        Self {
            w: Some(w),
            ..Default::default()
        }
    }
}

