//! JSON sidecar read / merge / write.
//!
//! Sidecars are edited by merging keys into the existing object, never by
//! replacing the file wholesale.  `serde_json` is built with
//! `preserve_order`, so untouched keys keep their position and new keys are
//! appended.  Output uses a 4-space indent.
use std::path::Path;

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

pub type JsonObject = Map<String, Value>;

/// Read `path` as a JSON object.
pub fn read_object(path: &Path) -> Result<JsonObject> {
    let text = std::fs::read_to_string(path)?;
    match serde_json::from_str::<Value>(&text)? {
        Value::Object(map) => Ok(map),
        other => Err(Error::Validation(format!(
            "{} holds a JSON {}, expected an object",
            path.display(),
            json_kind(&other)
        ))),
    }
}

/// Like [`read_object`], but a missing file yields an empty object.
pub fn read_object_or_empty(path: &Path) -> Result<JsonObject> {
    if path.exists() {
        read_object(path)
    } else {
        Ok(JsonObject::new())
    }
}

/// Serialize `value` with a 4-space indent.
pub fn to_pretty_string<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    value.serialize(&mut ser)?;
    String::from_utf8(buf).map_err(|e| Error::Validation(e.to_string()))
}

pub fn write_object(path: &Path, object: &JsonObject) -> Result<()> {
    std::fs::write(path, to_pretty_string(object)?)?;
    Ok(())
}

/// Overwrite `updates` keys in the object stored at `path`; all other keys
/// are kept.  The file must exist.
pub fn merge_keys<I>(path: &Path, updates: I) -> Result<()>
where
    I: IntoIterator<Item = (String, Value)>,
{
    write_object(path, &merged(path, updates)?)
}

/// The object at `path` with `updates` applied, without writing it back.
pub fn merged<I>(path: &Path, updates: I) -> Result<JsonObject>
where
    I: IntoIterator<Item = (String, Value)>,
{
    let mut object = read_object(path)?;
    for (key, value) in updates {
        object.insert(key, value);
    }
    Ok(object)
}

/// Insert `key` only when it is absent.  Returns whether it was inserted.
pub fn set_if_absent(object: &mut JsonObject, key: &str, value: Value) -> bool {
    if object.contains_key(key) {
        return false;
    }
    object.insert(key.to_string(), value);
    true
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
