use crate::bson::{Bson, Document};

/// Coerce numeric types into an `i64` if it would be lossless to do so. If this Bson is not numeric
/// or the conversion would be lossy (e.g. 1.5 -> 1), this returns `None`.
pub(crate) fn get_int(val: &Bson) -> Option<i64> {
    match *val {
        Bson::Int32(i) => Some(i64::from(i)),
        Bson::Int64(i) => Some(i),
        Bson::Double(f) if (f - (f as i64 as f64)).abs() <= f64::EPSILON => Some(f as i64),
        _ => None,
    }
}

/// Coerce numeric types into a `u64` if it would be lossless to do so. If this Bson is not numeric
/// or the conversion would be lossy (e.g. 1.5 -> 1, -1 -> ?), this returns `None`.
pub(crate) fn get_u64(val: &Bson) -> Option<u64> {
    get_int(val).and_then(|i| u64::try_from(i).ok())
}

/// Returns the name of the first key in the document, which for commands is the command name.
pub(crate) fn first_key(document: &Document) -> Option<&str> {
    document.keys().next().map(String::as_str)
}

/// Whether the value is "truthy" in the sense the server uses for `ok` fields.
pub(crate) fn is_ok(val: &Bson) -> bool {
    match val {
        Bson::Boolean(b) => *b,
        other => get_int(other) == Some(1),
    }
}
