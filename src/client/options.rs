
use std::{
    fmt::{self, Display, Formatter},
    hash::{Hash, Hasher},
    str::FromStr,
    time::Duration,
};

use serde::{de::Error as SerdeError, Deserialize, Deserializer, Serialize, Serializer};
use typed_builder::TypedBuilder;

use crate::{
    concern::{Acknowledgment, WriteConcern},
    error::{Error, Result},
    operation::ReplyFieldNames,
    sdam::MIN_HEARTBEAT_FREQUENCY,
    selection_criteria::{ReadPreference, TagSet},
    serde_util,
};

pub(crate) const DEFAULT_PORT: u16 = 27017;

const URI_SCHEME: &str = "mongodb://";

/// An enum representing the address of a MongoDB server.
#[derive(Clone, Debug, Eq)]
#[non_exhaustive]
pub enum ServerAddress {
    /// A TCP/IP host and port combination.
    Tcp {
        /// The hostname or IP address where the MongoDB server can be found.
        host: String,

        /// The TCP port that the MongoDB server is listening on.
        ///
        /// The default is 27017.
        port: Option<u16>,
    },
}

impl<'de> Deserialize<'de> for ServerAddress {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = Deserialize::deserialize(deserializer)?;
        Self::parse(s.as_str()).map_err(|e| D::Error::custom(format!("{e}")))
    }
}

impl Serialize for ServerAddress {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl Default for ServerAddress {
    fn default() -> Self {
        Self::Tcp {
            host: "localhost".into(),
            port: None,
        }
    }
}

impl PartialEq for ServerAddress {
    fn eq(&self, other: &Self) -> bool {
        self.host() == other.host() && self.port_or_default() == other.port_or_default()
    }
}

impl Hash for ServerAddress {
    fn hash<H>(&self, state: &mut H)
    where
        H: Hasher,
    {
        self.host().hash(state);
        self.port_or_default().hash(state);
    }
}

impl FromStr for ServerAddress {
    type Err = Error;

    fn from_str(address: &str) -> Result<Self> {
        ServerAddress::parse(address)
    }
}

impl ServerAddress {
    /// Parses an address string into a `ServerAddress`. Hostnames are normalized to lowercase.
    pub fn parse(address: impl AsRef<str>) -> Result<Self> {
        let address = address.as_ref();
        let invalid = |reason: &str| {
            Error::invalid_argument(format!("invalid server address \"{address}\": {reason}"))
        };

        let (host, port) = match address.split_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (address, None),
        };
        if host.is_empty() {
            return Err(invalid("hostname cannot be empty"));
        }

        let port = port
            .map(|port| match port.parse::<u16>() {
                Ok(0) => Err(invalid("port must be non-zero")),
                Ok(port) => Ok(port),
                Err(_) => Err(invalid("port must be a 16-bit unsigned integer")),
            })
            .transpose()?;

        Ok(Self::Tcp {
            host: host.to_lowercase(),
            port,
        })
    }

    /// The hostname or IP address of the server.
    pub fn host(&self) -> &str {
        match self {
            Self::Tcp { host, .. } => host.as_str(),
        }
    }

    /// The port of the server, if one was specified.
    pub fn port(&self) -> Option<u16> {
        match self {
            Self::Tcp { port, .. } => *port,
        }
    }

    fn port_or_default(&self) -> u16 {
        self.port().unwrap_or(DEFAULT_PORT)
    }
}

impl Display for ServerAddress {
    fn fmt(&self, fmt: &mut Formatter) -> fmt::Result {
        write!(fmt, "{}:{}", self.host(), self.port_or_default())
    }
}

/// Contains the options that can be used to configure topology classification, server selection,
/// dispatch and write reconciliation.
#[derive(Clone, Debug, Deserialize, PartialEq, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct ClientOptions {
    /// The initial list of seeds that the driver should monitor.
    ///
    /// The default value is a single seed at `localhost:27017`.
    #[builder(default = vec![ServerAddress::default()])]
    #[serde(default = "default_hosts")]
    pub hosts: Vec<ServerAddress>,

    /// The name of the replica set the servers are expected to belong to. Servers reporting a
    /// different name cause a topology conflict.
    #[serde(alias = "replicaSet")]
    pub repl_set_name: Option<String>,

    /// The amount of latency beyond the fastest suitable server within which other suitable
    /// servers are considered equally near.
    ///
    /// The default value is 15 milliseconds.
    #[serde(
        rename = "localThresholdMS",
        default,
        with = "serde_util::duration_option_as_int_millis"
    )]
    pub local_threshold: Option<Duration>,

    /// Whether to choose uniformly at random among the suitable servers within the latency
    /// window rather than always taking the first one. Selection is deterministic by default.
    pub randomize_within_latency_window: Option<bool>,

    /// The amount of time between heartbeats delivered to the topology by the monitor.
    ///
    /// The default value is 10 seconds. The minimum value is 500 milliseconds.
    #[serde(
        rename = "heartbeatFrequencyMS",
        default,
        with = "serde_util::duration_option_as_int_millis"
    )]
    pub heartbeat_freq: Option<Duration>,

    /// The amount of time a dispatch waits for a connection from the pool before failing.
    ///
    /// The default value is 5 seconds.
    #[serde(
        rename = "waitQueueTimeoutMS",
        default,
        with = "serde_util::duration_option_as_int_millis"
    )]
    pub connection_checkout_timeout: Option<Duration>,

    /// The default read preference for operations that do not specify one.
    ///
    /// The default value is [`ReadPreference::Primary`].
    pub read_preference: Option<ReadPreference>,

    /// The default write concern for write operations.
    pub write_concern: Option<WriteConcern>,

    /// The names of the reply fields read when validating and reconciling replies.
    #[serde(default)]
    pub reply_fields: ReplyFieldNames,
}

fn default_hosts() -> Vec<ServerAddress> {
    vec![ServerAddress::default()]
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

pub(crate) const DEFAULT_LOCAL_THRESHOLD: Duration = Duration::from_millis(15);
pub(crate) const DEFAULT_HEARTBEAT_FREQUENCY: Duration = Duration::from_secs(10);
pub(crate) const DEFAULT_CONNECTION_CHECKOUT_TIMEOUT: Duration = Duration::from_secs(5);

impl ClientOptions {
    /// Parses a MongoDB connection string into a `ClientOptions` struct.
    ///
    /// The format of a connection string is `mongodb://host1[:port1][,host2[:port2]...]
    /// [/[database][?options]]`. The supported options are `replicaSet`, `readPreference`,
    /// `readPreferenceTags`, `maxStalenessSeconds`, `localThresholdMS`, `heartbeatFrequencyMS`,
    /// `waitQueueTimeoutMS`, `w`, `wTimeoutMS` and `journal`.
    pub fn parse(uri: impl AsRef<str>) -> Result<Self> {
        let uri = uri.as_ref();
        let rest = uri.strip_prefix(URI_SCHEME).ok_or_else(|| {
            Error::invalid_argument(format!("connection string must start with {URI_SCHEME}"))
        })?;

        let (hosts, query) = match rest.split_once('/') {
            Some((hosts, path)) => (hosts, path.split_once('?').map(|(_, query)| query)),
            None if rest.contains('?') => {
                return Err(Error::invalid_argument(
                    "missing delimiting slash between hosts and options",
                ))
            }
            None => (rest, None),
        };
        if hosts.contains('@') {
            return Err(Error::invalid_argument(
                "credentials are not supported in the connection string",
            ));
        }

        let mut options = Self {
            hosts: hosts
                .split(',')
                .map(ServerAddress::parse)
                .collect::<Result<_>>()?,
            ..Default::default()
        };
        if let Some(query) = query {
            UriOptions::default().apply(query, &mut options)?;
        }

        options.validate()?;
        Ok(options)
    }

    pub(crate) fn local_threshold(&self) -> Duration {
        self.local_threshold.unwrap_or(DEFAULT_LOCAL_THRESHOLD)
    }

    pub(crate) fn heartbeat_frequency(&self) -> Duration {
        self.heartbeat_freq.unwrap_or(DEFAULT_HEARTBEAT_FREQUENCY)
    }

    pub(crate) fn connection_checkout_timeout(&self) -> Duration {
        self.connection_checkout_timeout
            .unwrap_or(DEFAULT_CONNECTION_CHECKOUT_TIMEOUT)
    }

    pub(crate) fn randomize_within_latency_window(&self) -> bool {
        self.randomize_within_latency_window.unwrap_or(false)
    }

    /// Ensures the options are internally consistent.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.hosts.is_empty() {
            return Err(Error::invalid_argument("at least one host must be specified"));
        }

        if let Some(heartbeat_freq) = self.heartbeat_freq {
            if heartbeat_freq < MIN_HEARTBEAT_FREQUENCY {
                return Err(Error::invalid_argument(format!(
                    "'heartbeat_freq' must be at least {}ms, but {}ms was given",
                    MIN_HEARTBEAT_FREQUENCY.as_millis(),
                    heartbeat_freq.as_millis()
                )));
            }
        }

        if let Some(ref write_concern) = self.write_concern {
            write_concern.validate()?;
        }

        Ok(())
    }
}

/// Options of a connection string that modify the read preference and can therefore only be
/// applied once every option has been seen.
#[derive(Debug, Default)]
struct UriOptions {
    seen: Vec<String>,
    tag_sets: Option<Vec<TagSet>>,
    max_staleness: Option<Duration>,
}

impl UriOptions {
    fn apply(mut self, query: &str, options: &mut ClientOptions) -> Result<()> {
        for pair in query.split('&').filter(|pair| !pair.is_empty()) {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                Error::invalid_argument(format!(
                    "connection string option is not a `key=value` pair: {pair}"
                ))
            })?;

            let key = key.to_ascii_lowercase();
            if key != "readpreferencetags" && self.seen.contains(&key) {
                return Err(Error::invalid_argument(format!(
                    "connection string option `{key}` is repeated"
                )));
            }

            let value = percent_encoding::percent_decode(value.as_bytes()).decode_utf8_lossy();
            self.apply_pair(&key, &value, options)?;
            self.seen.push(key);
        }

        let modifies_read_preference = self.tag_sets.is_some() || self.max_staleness.is_some();
        match options.read_preference.take() {
            Some(mut read_pref) => {
                if let Some(tag_sets) = self.tag_sets {
                    read_pref = read_pref.with_tags(tag_sets)?;
                }
                if let Some(max_staleness) = self.max_staleness {
                    read_pref = read_pref.with_max_staleness(max_staleness)?;
                }
                options.read_preference = Some(read_pref);
            }
            None if modifies_read_preference => {
                return Err(Error::invalid_argument(
                    "`readPreferenceTags` and `maxStalenessSeconds` require `readPreference`",
                ))
            }
            None => {}
        }

        Ok(())
    }

    fn apply_pair(&mut self, key: &str, value: &str, options: &mut ClientOptions) -> Result<()> {
        match key {
            "heartbeatfrequencyms" => {
                let frequency = Duration::from_millis(parse_u64(key, value)?);
                if frequency < MIN_HEARTBEAT_FREQUENCY {
                    return Err(Error::invalid_argument(format!(
                        "`heartbeatFrequencyMS` must be at least {}",
                        MIN_HEARTBEAT_FREQUENCY.as_millis()
                    )));
                }
                options.heartbeat_freq = Some(frequency);
            }
            "localthresholdms" => {
                options.local_threshold = Some(Duration::from_millis(parse_u64(key, value)?));
            }
            "waitqueuetimeoutms" => {
                options.connection_checkout_timeout =
                    Some(Duration::from_millis(parse_u64(key, value)?));
            }
            "replicaset" => options.repl_set_name = Some(value.to_string()),
            "readpreference" => options.read_preference = Some(ReadPreference::from_mode(value)?),
            "readpreferencetags" => {
                let tag_set = value
                    .split(',')
                    .filter(|tag| !tag.is_empty())
                    .map(|tag| {
                        tag.split_once(':')
                            .map(|(name, value)| (name.to_string(), value.to_string()))
                            .ok_or_else(|| {
                                Error::invalid_argument(format!(
                                    "read preference tag `{tag}` is not of the form `name:value`"
                                ))
                            })
                    })
                    .collect::<Result<TagSet>>()?;
                self.tag_sets.get_or_insert_with(Vec::new).push(tag_set);
            }
            // -1 explicitly requests no staleness bound.
            "maxstalenessseconds" if value == "-1" => self.max_staleness = None,
            "maxstalenessseconds" => {
                let max_staleness = Duration::from_secs(parse_u64(key, value)?);
                if max_staleness > Duration::ZERO && max_staleness < Duration::from_secs(90) {
                    return Err(Error::invalid_argument(
                        "`maxStalenessSeconds` cannot be both positive and below 90",
                    ));
                }
                self.max_staleness = Some(max_staleness);
            }
            "w" => {
                write_concern(options).w = Some(match value.parse::<u32>() {
                    Ok(nodes) => Acknowledgment::Nodes(nodes),
                    Err(_) => Acknowledgment::from(value),
                });
            }
            "wtimeoutms" => {
                write_concern(options).w_timeout =
                    Some(Duration::from_millis(parse_u64(key, value)?));
            }
            "journal" => write_concern(options).journal = Some(parse_bool(key, value)?),
            other => {
                tracing::warn!(option = other, "ignoring unsupported connection string option");
            }
        }

        Ok(())
    }
}

fn write_concern(options: &mut ClientOptions) -> &mut WriteConcern {
    options.write_concern.get_or_insert_with(Default::default)
}

fn parse_u64(key: &str, value: &str) -> Result<u64> {
    value.parse().map_err(|_| {
        Error::invalid_argument(format!(
            "connection string option `{key}` must be a non-negative integer, got `{value}`"
        ))
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(Error::invalid_argument(format!(
            "connection string option `{key}` must be `true` or `false`, got `{value}`"
        ))),
    }
}
