//! `application/x-www-form-urlencoded` bodies.

use anyhow::{bail, Result};
use serde::Serialize;
use serde_json::Value as Json;
use url::form_urlencoded;

/// Encode a serializable object as a form body.
///
/// Top-level fields become `name=value` pairs. Sequences are repeated as one
/// pair per element; nested objects are sent as their JSON text. `null`
/// fields are omitted.
/// ```
/// # use openid4vci::core::form::encode;
/// # use serde_json::json;
/// let body = encode(&json!({ "scope": ["a", "b"] })).unwrap();
///
/// assert_eq!(body, "scope=a&scope=b");
/// ```
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let Json::Object(fields) = serde_json::to_value(value)? else {
        bail!("form bodies can only be encoded from objects")
    };

    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (name, value) in &fields {
        match value {
            Json::Null => {}
            Json::Array(items) => {
                for item in items {
                    serializer.append_pair(name, &scalar(item)?);
                }
            }
            other => {
                serializer.append_pair(name, &scalar(other)?);
            }
        }
    }
    Ok(serializer.finish())
}

fn scalar(value: &Json) -> Result<String> {
    Ok(match value {
        Json::String(s) => s.clone(),
        Json::Bool(_) | Json::Number(_) => value.to_string(),
        Json::Object(_) | Json::Array(_) => serde_json::to_string(value)?,
        Json::Null => bail!("null is not allowed inside a form sequence"),
    })
}
