//! The completed HTTP exchange a script inspects.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Response headers: case-sensitive, in the order received.
pub type Headers = IndexMap<String, String>;

/// A finished HTTP exchange. Read-only for the duration of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exchange {
    pub status_code: u16,
    #[serde(default)]
    pub status_text: String,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub body: ResponseBody,
}

/// A response body, either decoded JSON or raw text.
///
/// On the wire a JSON string deserializes as [`ResponseBody::Text`]; any other
/// JSON value is a structured body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseBody {
    Text(String),
    Json(serde_json::Value),
}

impl Default for ResponseBody {
    fn default() -> Self {
        ResponseBody::Text(String::new())
    }
}

impl ResponseBody {
    /// Decode a raw body using its `Content-Type`.
    ///
    /// JSON content types are parsed; a body that fails to parse, or any other
    /// content type, is kept as text.
    pub fn from_raw(text: &str, content_type: Option<&str>) -> Self {
        let is_json = content_type
            .map(|ct| ct.to_ascii_lowercase().contains("application/json"))
            .unwrap_or(false);
        if is_json {
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(text) {
                return ResponseBody::Json(json);
            }
        }
        ResponseBody::Text(text.to_string())
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            ResponseBody::Json(json) => Some(json),
            ResponseBody::Text(_) => None,
        }
    }

    /// The body as `pm.response.text()` reports it.
    pub fn to_text(&self) -> String {
        match self {
            ResponseBody::Text(text) => text.clone(),
            ResponseBody::Json(json) => json.to_string(),
        }
    }
}

impl Exchange {
    pub fn new(status_code: u16, status_text: impl Into<String>, body: ResponseBody) -> Self {
        Self {
            status_code,
            status_text: status_text.into(),
            headers: Headers::new(),
            body,
        }
    }

    /// An exchange with a structured JSON body.
    pub fn json(status_code: u16, status_text: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(status_code, status_text, ResponseBody::Json(body))
    }

    /// An exchange with a plain-text body.
    pub fn text(status_code: u16, status_text: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(status_code, status_text, ResponseBody::Text(body.into()))
    }

    /// Builder-style header insertion.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Look up a header by its exact name.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    /// Build an exchange from a raw body, choosing the body kind from the
    /// `Content-Type` header.
    pub fn from_raw(
        status_code: u16,
        status_text: impl Into<String>,
        headers: Headers,
        raw_body: &str,
    ) -> Self {
        let content_type = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("content-type"))
            .map(|(_, v)| v.as_str());
        let body = ResponseBody::from_raw(raw_body, content_type);
        Self {
            status_code,
            status_text: status_text.into(),
            headers,
            body,
        }
    }
}
