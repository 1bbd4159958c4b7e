//! Contains the read preference used to choose among the members of a replica set.


use std::{collections::HashMap, time::Duration};

use serde::{de::Error as _, Deserialize, Deserializer, Serialize};
use typed_builder::TypedBuilder;

use crate::{
    error::{Error, Result},
    serde_util,
};

/// Specifies how the driver should route a read operation to members of a replica set.
///
/// If applicable, `tag_sets` can be used to target specific nodes in a replica set, and
/// `max_staleness` specifies the maximum lag behind the primary that a secondary can be to remain
/// eligible for the operation. The max staleness value maps to the `maxStalenessSeconds` MongoDB
/// option.
///
/// The mode only applies to replica sets. Standalone servers and routers are selected regardless
/// of the read preference.
///
/// See the [MongoDB docs](https://www.mongodb.com/docs/manual/core/read-preference) for more details.
#[allow(missing_docs)]
#[derive(Clone, Debug, Default, PartialEq)]
#[non_exhaustive]
pub enum ReadPreference {
    /// Only route this operation to the primary.
    #[default]
    Primary,

    /// Only route this operation to a secondary.
    Secondary {
        options: Option<ReadPreferenceOptions>,
    },

    /// Route this operation to the primary if it's available, but fall back to the secondaries if
    /// not.
    PrimaryPreferred {
        options: Option<ReadPreferenceOptions>,
    },

    /// Route this operation to a secondary if one is available, but fall back to the primary if
    /// not.
    SecondaryPreferred {
        options: Option<ReadPreferenceOptions>,
    },

    /// Route this operation to the node with the least network latency regardless of whether it's
    /// the primary or a secondary.
    Nearest {
        options: Option<ReadPreferenceOptions>,
    },
}

impl std::fmt::Display for ReadPreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = self.mode();
        let (first, rest) = mode.split_at(1);
        write!(f, "{{ Mode: {}{rest}", first.to_ascii_uppercase())?;

        if let Some(tag_sets) = self.tag_sets() {
            write!(f, ", Tag Sets: {tag_sets:?}")?;
        }
        if let Some(max_staleness) = self.max_staleness() {
            write!(f, ", Max Staleness: {max_staleness:?}")?;
        }

        f.write_str(" }")
    }
}

/// The document form of a read preference: `{ mode, tagSets?, maxStalenessSeconds? }`.
#[derive(Deserialize)]
struct ReadPreferenceDocument {
    mode: String,
    #[serde(flatten)]
    options: ReadPreferenceOptions,
}

impl<'de> Deserialize<'de> for ReadPreference {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let document = ReadPreferenceDocument::deserialize(deserializer)?;
        let mut read_pref =
            Self::from_mode(&document.mode).map_err(|e| D::Error::custom(e.kind.to_string()))?;

        if !document.options.is_empty() {
            *read_pref
                .options_mut()
                .map_err(|e| D::Error::custom(e.kind.to_string()))? = document.options;
        }
        Ok(read_pref)
    }
}

impl Serialize for ReadPreference {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        #[serde_with::skip_serializing_none]
        #[derive(Serialize)]
        struct Borrowed<'a> {
            mode: &'static str,
            #[serde(flatten)]
            options: Option<&'a ReadPreferenceOptions>,
        }

        Borrowed {
            mode: self.mode(),
            options: self.options(),
        }
        .serialize(serializer)
    }
}

/// Specifies read preference options for non-primary read preferences.
#[serde_with::skip_serializing_none]
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct ReadPreferenceOptions {
    /// Specifies which replica set members should be considered for operations. A server is
    /// eligible if its tags include every tag of at least one of the sets. An empty list, or a
    /// list containing an empty set, makes every server eligible.
    #[serde(alias = "tag_sets")]
    pub tag_sets: Option<Vec<TagSet>>,

    /// Specifies the maximum amount of lag behind the primary that a secondary can be to be
    /// considered for the given operation. Any secondaries lagging behind more than
    /// `max_staleness`, or whose lag is unknown, will not be considered for the operation.
    ///
    /// `max_staleness` must be at least 90 seconds, and at least the heartbeat frequency plus 10
    /// seconds. Selection with a smaller value returns an error.
    #[serde(
        rename = "maxStalenessSeconds",
        default,
        with = "serde_util::duration_option_as_int_seconds"
    )]
    pub max_staleness: Option<Duration>,
}

impl ReadPreferenceOptions {
    /// Whether these options leave every server eligible.
    pub(crate) fn is_empty(&self) -> bool {
        let no_tags = match self.tag_sets.as_deref() {
            None | Some([]) => true,
            Some([only]) => only.is_empty(),
            Some(_) => false,
        };
        no_tags && self.max_staleness.is_none()
    }
}

impl ReadPreference {
    /// Creates a read preference without options from the name of its mode, matched
    /// case-insensitively (e.g. `"secondaryPreferred"`).
    pub fn from_mode(mode: &str) -> Result<Self> {
        [
            Self::Primary,
            Self::Secondary { options: None },
            Self::PrimaryPreferred { options: None },
            Self::SecondaryPreferred { options: None },
            Self::Nearest { options: None },
        ]
        .into_iter()
        .find(|candidate| candidate.mode().eq_ignore_ascii_case(mode))
        .ok_or_else(|| {
            Error::invalid_argument(format!("'{mode}' is not a valid read preference mode"))
        })
    }

    /// The name of this read preference's mode.
    pub fn mode(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary { .. } => "secondary",
            Self::PrimaryPreferred { .. } => "primaryPreferred",
            Self::SecondaryPreferred { .. } => "secondaryPreferred",
            Self::Nearest { .. } => "nearest",
        }
    }

    pub(crate) fn options(&self) -> Option<&ReadPreferenceOptions> {
        match self {
            Self::Primary => None,
            Self::Secondary { options }
            | Self::PrimaryPreferred { options }
            | Self::SecondaryPreferred { options }
            | Self::Nearest { options } => options.as_ref(),
        }
    }

    /// The options of a non-primary mode, created empty if unset. Errors for `Primary`, which
    /// takes no options.
    fn options_mut(&mut self) -> Result<&mut ReadPreferenceOptions> {
        match self {
            Self::Primary => Err(Error::invalid_argument(
                "read preference options can only be specified for a non-primary mode",
            )),
            Self::Secondary { options }
            | Self::PrimaryPreferred { options }
            | Self::SecondaryPreferred { options }
            | Self::Nearest { options } => Ok(options.get_or_insert_with(Default::default)),
        }
    }

    /// The maximum replication lag allowed for eligible secondaries, if any.
    pub fn max_staleness(&self) -> Option<Duration> {
        self.options().and_then(|options| options.max_staleness)
    }

    /// The tag sets used to filter eligible servers, if any.
    pub fn tag_sets(&self) -> Option<&Vec<TagSet>> {
        self.options().and_then(|options| options.tag_sets.as_ref())
    }

    pub(crate) fn with_tags(mut self, tag_sets: Vec<TagSet>) -> Result<Self> {
        self.options_mut()?.tag_sets = Some(tag_sets);
        Ok(self)
    }

    pub(crate) fn with_max_staleness(mut self, max_staleness: Duration) -> Result<Self> {
        self.options_mut()?.max_staleness = Some(max_staleness);
        Ok(self)
    }
}

/// A read preference tag set. See the documentation [here](https://www.mongodb.com/docs/manual/tutorial/configure-replica-set-tag-sets/) for more details.
pub type TagSet = HashMap<String, String>;
