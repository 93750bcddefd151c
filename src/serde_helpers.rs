//! Frame decoding helpers.
//!
//! When the `tracing` feature is enabled, decoding also logs every field the
//! target type does not capture, plus the JSON path of a decode failure, which
//! helps spot changes to the certstream message schema.

use serde::de::DeserializeOwned;
#[cfg(feature = "tracing")]
use serde_json::Value;

/// Decode one frame payload, logging unknown fields.
///
/// Unknown fields never cause decoding to fail; they are reported at `warn`
/// level and otherwise ignored.
#[cfg(feature = "tracing")]
pub fn decode_with_warnings<T: DeserializeOwned>(bytes: &[u8]) -> serde_json::Result<T> {
    use std::any::type_name;

    let value: Value = serde_json::from_slice(bytes).inspect_err(|e| {
        tracing::error!(
            type_name = %type_name::<T>(),
            error = %e,
            "frame is not valid JSON"
        );
    })?;

    // Kept around to look up unknown field values later
    let original = value.clone();

    let mut unknown_paths: Vec<String> = Vec::new();

    let result: T = serde_ignored::deserialize(value, |path| {
        unknown_paths.push(path.to_string());
    })
    .inspect_err(|_| {
        let path_result: Result<T, _> = serde_path_to_error::deserialize(&original);
        if let Err(path_err) = path_result {
            let path = path_err.path().to_string();
            let value_display = format_value(lookup_value(&original, &path));

            tracing::error!(
                type_name = %type_name::<T>(),
                path = %path,
                value = %value_display,
                error = %path_err.inner(),
                "deserialization failed"
            );
        }
    })?;

    if !unknown_paths.is_empty() {
        let type_name = type_name::<T>();
        for path in unknown_paths {
            let value_display = format_value(lookup_value(&original, &path));

            tracing::warn!(
                type_name = %type_name,
                field = %path,
                value = %value_display,
                "unknown field in certstream message"
            );
        }
    }

    Ok(result)
}

/// Pass-through decoding when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub fn decode_with_warnings<T: DeserializeOwned>(bytes: &[u8]) -> serde_json::Result<T> {
    serde_json::from_slice(bytes)
}

/// Look up a value in a JSON structure by a `serde_ignored` or
/// `serde_path_to_error` path such as `data.leaf_cert.all_domains[0]`.
///
/// `?` segments (Option wrappers) are skipped. Returns `None` if the path
/// doesn't exist or traverses a non-container value.
#[cfg(feature = "tracing")]
fn lookup_value<'value>(value: &'value Value, path: &str) -> Option<&'value Value> {
    let mut current = value;

    for segment in path
        .split(['.', '[', ']'])
        .filter(|segment| !segment.is_empty() && *segment != "?")
    {
        match current {
            Value::Object(map) => {
                current = map.get(segment)?;
            }
            Value::Array(arr) => {
                let index: usize = segment.parse().ok()?;
                current = arr.get(index)?;
            }
            _ => return None,
        }
    }

    Some(current)
}

#[cfg(feature = "tracing")]
fn format_value(value: Option<&Value>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "<unable to retrieve>".to_owned(),
    }
}
