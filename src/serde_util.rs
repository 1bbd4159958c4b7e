use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

/// Writes `value` as an `i32` when it fits and as an `i64` otherwise, so that small values keep
/// the width the server sends them with.
pub(crate) fn serialize_u64_as_int<S: Serializer>(
    value: u64,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match i32::try_from(value) {
        Ok(small) => serializer.serialize_i32(small),
        Err(_) => serializer.serialize_i64(i64::try_from(value).unwrap_or(i64::MAX)),
    }
}

fn serialize_duration<S: Serializer>(
    value: Option<u128>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match value {
        Some(units) => {
            serialize_u64_as_int(u64::try_from(units).unwrap_or(u64::MAX), serializer)
        }
        None => serializer.serialize_none(),
    }
}

/// (De)serializes an optional [`Duration`] as a whole number of seconds.
pub(crate) mod duration_option_as_int_seconds {
    use super::*;

    pub(crate) fn serialize<S: Serializer>(
        val: &Option<Duration>,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serialize_duration(val.map(|d| u128::from(d.as_secs())), serializer)
    }

    pub(crate) fn deserialize<'de, D>(
        deserializer: D,
    ) -> std::result::Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_secs))
    }
}

/// (De)serializes an optional [`Duration`] as a whole number of milliseconds.
pub(crate) mod duration_option_as_int_millis {
    use super::*;

    pub(crate) fn serialize<S: Serializer>(
        val: &Option<Duration>,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serialize_duration(val.map(|d| d.as_millis()), serializer)
    }

    pub(crate) fn deserialize<'de, D>(
        deserializer: D,
    ) -> std::result::Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
