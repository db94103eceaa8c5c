use serde_json::{Map, Value};

/// Ordered item metadata. Keys are unique and keep their insertion order.
pub type Kwdict = Map<String, Value>;

/// Reserved key holding the POSIX timestamp to apply to the finished file.
pub const MTIME_KEY: &str = "_mtime";

/// Convert a JSON value into a kwdict; anything but an object yields `None`.
pub fn kwdict_from_value(value: Value) -> Option<Kwdict> {
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}
