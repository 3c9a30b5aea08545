//! Plumbing between Rust values and the host's JavaScript objects

use courier::SenderMetadata;
use js_sys::{Function, JSON, Reflect};
use serde_json::Value;
use wasm_bindgen::{JsCast, JsValue};

use crate::WebTransportError;

/// Follows `path` from `root`, stopping at the first missing property
pub fn lookup(root: &JsValue, path: &[&str]) -> Option<JsValue> {
    path.iter().try_fold(root.clone(), |object, key| {
        Reflect::get(&object, &JsValue::from_str(key))
            .ok()
            .filter(|value| !value.is_undefined() && !value.is_null())
    })
}

/// The function at `path` under `root`
pub fn function(root: &JsValue, path: &[&str]) -> Result<Function, WebTransportError> {
    lookup(root, path)
        .and_then(|value| value.dyn_into::<Function>().ok())
        .ok_or_else(|| WebTransportError::MissingApi(path.join(".")))
}

pub fn to_js(value: &Value) -> Result<JsValue, WebTransportError> {
    let text = serde_json::to_string(value)
        .map_err(|error| WebTransportError::Conversion(error.to_string()))?;
    JSON::parse(&text).map_err(|error| WebTransportError::Conversion(error_message(&error)))
}

/// Converts a host value to JSON. `undefined` (no reply at all) is `None`.
pub fn from_js(value: &JsValue) -> Result<Option<Value>, WebTransportError> {
    if value.is_undefined() {
        return Ok(None);
    }

    let text = JSON::stringify(value)
        .map_err(|error| WebTransportError::Conversion(error_message(&error)))?
        .as_string()
        .ok_or_else(|| WebTransportError::Conversion("value has no JSON form".into()))?;

    serde_json::from_str(&text)
        .map(Some)
        .map_err(|error| WebTransportError::Conversion(error.to_string()))
}

/// The text of a thrown or rejected host value
pub fn error_message(error: &JsValue) -> String {
    lookup(error, &["message"])
        .and_then(|message| message.as_string())
        .or_else(|| error.as_string())
        .unwrap_or_else(|| format!("{error:?}"))
}

/// `runtime.lastError.message`, set while a callback-style call's callback
/// runs if the call failed
pub fn last_error(api: &JsValue) -> Option<String> {
    lookup(api, &["runtime", "lastError"]).map(|error| error_message(&error))
}

pub fn sender_metadata(sender: &JsValue) -> SenderMetadata {
    let number = |path: &[&str]| lookup(sender, path).and_then(|value| value.as_f64());
    let text = |path: &[&str]| lookup(sender, path).and_then(|value| value.as_string());

    SenderMetadata {
        process_id: number(&["tab", "id"]).map(|id| id as i64),
        frame_id: number(&["frameId"]).map(|id| id as i64),
        extension_id: text(&["id"]),
        url: text(&["url"]),
        origin: text(&["origin"]),
    }
}
