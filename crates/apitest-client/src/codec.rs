//! Content-type aware body encoding and decoding.
//!
//! JSON and urlencoded forms are built in. Additional content types are
//! handled by registering a serializer (request side) or parser (response
//! side) on the client.

use crate::error::ApiError;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Mime types used throughout the crate.
pub mod mime {
    pub const JSON: &str = "application/json";
    pub const FORM: &str = "application/x-www-form-urlencoded";
    pub const MULTIPART: &str = "multipart/form-data";
    pub const TEXT: &str = "text/plain";
    pub const HTML: &str = "text/html";
    pub const XML: &str = "application/xml";
    pub const OCTET_STREAM: &str = "application/octet-stream";
}

/// Request body serializer for one content type.
pub type SerializerFn = Arc<dyn Fn(&Value) -> anyhow::Result<Vec<u8>> + Send + Sync>;

/// Response body parser for one content type.
pub type ParserFn = Arc<dyn Fn(&[u8]) -> anyhow::Result<Value> + Send + Sync>;

/// Expand shorthands such as `json` or `form` into a full mime type.
pub fn expand_shorthand(value: &str) -> String {
    match value.trim().to_ascii_lowercase().as_str() {
        "json" => mime::JSON.to_string(),
        "form" | "urlencoded" | "form-data" => mime::FORM.to_string(),
        "multipart" => mime::MULTIPART.to_string(),
        "text" => mime::TEXT.to_string(),
        "html" => mime::HTML.to_string(),
        "xml" => mime::XML.to_string(),
        _ => value.trim().to_string(),
    }
}

/// The `type/subtype` part of a content type, lowercased.
pub fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// The `charset` parameter of a content type.
pub fn charset(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("charset") {
            Some(value.trim().trim_matches('"').to_string())
        } else {
            None
        }
    })
}

fn is_json(essence: &str) -> bool {
    essence == mime::JSON || essence.ends_with("+json")
}

/// Bodies delivered as raw bytes rather than text.
pub fn is_binary(essence: &str) -> bool {
    essence.starts_with("image/")
        || essence.starts_with("audio/")
        || essence.starts_with("video/")
        || essence == mime::OCTET_STREAM
        || essence == "application/pdf"
        || essence == "application/zip"
}

/// Flatten a JSON object into form/query pairs.
///
/// Arrays repeat their key; nested objects use `parent[child]` keys.
pub fn flatten_pairs(value: &Value) -> Result<Vec<(String, String)>, String> {
    let object = value
        .as_object()
        .ok_or_else(|| format!("expected an object, got {}", kind_of(value)))?;

    let mut pairs = Vec::new();
    for (key, value) in object {
        push_pairs(&mut pairs, key.clone(), value);
    }
    Ok(pairs)
}

fn push_pairs(pairs: &mut Vec<(String, String)>, key: String, value: &Value) {
    match value {
        Value::Null => pairs.push((key, String::new())),
        Value::String(s) => pairs.push((key, s.clone())),
        Value::Bool(_) | Value::Number(_) => pairs.push((key, value.to_string())),
        Value::Array(items) => {
            for item in items {
                push_pairs(pairs, key.clone(), item);
            }
        }
        Value::Object(map) => {
            for (child, value) in map {
                push_pairs(pairs, format!("{}[{}]", key, child), value);
            }
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Decode an urlencoded body into a JSON object; repeated keys become arrays.
pub fn parse_form(bytes: &[u8]) -> Value {
    let mut map = Map::new();
    for (key, value) in url::form_urlencoded::parse(bytes) {
        let value = Value::String(value.into_owned());
        match map.get_mut(key.as_ref()) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                map.insert(key.into_owned(), value);
            }
        }
    }
    Value::Object(map)
}

/// Registry of custom serializers and parsers keyed by mime essence.
#[derive(Clone, Default)]
pub struct Codecs {
    serializers: HashMap<String, SerializerFn>,
    parsers: HashMap<String, ParserFn>,
}

impl fmt::Debug for Codecs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Codecs")
            .field("serializers", &self.serializers.keys().collect::<Vec<_>>())
            .field("parsers", &self.parsers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Codecs {
    /// Register a serializer, replacing any previous one for the type.
    pub fn add_serializer<F>(&mut self, content_type: &str, serializer: F)
    where
        F: Fn(&Value) -> anyhow::Result<Vec<u8>> + Send + Sync + 'static,
    {
        self.serializers
            .insert(essence(&expand_shorthand(content_type)), Arc::new(serializer));
    }

    /// Remove a serializer.
    pub fn remove_serializer(&mut self, content_type: &str) {
        self.serializers.remove(&essence(&expand_shorthand(content_type)));
    }

    /// Register a parser, replacing any previous one for the type.
    pub fn add_parser<F>(&mut self, content_type: &str, parser: F)
    where
        F: Fn(&[u8]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.parsers
            .insert(essence(&expand_shorthand(content_type)), Arc::new(parser));
    }

    /// Remove a parser.
    pub fn remove_parser(&mut self, content_type: &str) {
        self.parsers.remove(&essence(&expand_shorthand(content_type)));
    }

    /// Whether a custom parser handles the type.
    pub fn has_parser(&self, content_type: &str) -> bool {
        self.parsers.contains_key(&essence(content_type))
    }

    /// Serialize a structured body for the given content type.
    ///
    /// Custom serializers take precedence over the built-in ones. Strings
    /// are sent as-is when nothing else applies.
    pub fn encode(&self, content_type: &str, value: &Value) -> Result<Vec<u8>, ApiError> {
        let essence = essence(content_type);
        let failed = |message: String| ApiError::Serialize {
            content_type: essence.clone(),
            message,
        };

        if let Some(serializer) = self.serializers.get(&essence) {
            return serializer(value).map_err(|e| failed(e.to_string()));
        }

        if is_json(&essence) {
            return serde_json::to_vec(value).map_err(|e| failed(e.to_string()));
        }

        if essence == mime::FORM {
            if let Value::String(raw) = value {
                return Ok(raw.clone().into_bytes());
            }
            let pairs = flatten_pairs(value).map_err(failed)?;
            return Ok(url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(pairs)
                .finish()
                .into_bytes());
        }

        match value {
            Value::String(raw) => Ok(raw.clone().into_bytes()),
            other => Err(failed(format!(
                "no serializer registered for {}",
                kind_of(other)
            ))),
        }
    }

    /// Parse a response body.
    ///
    /// Returns the parsed value and whether a parser handled it. Empty
    /// bodies parse to `Null`.
    pub fn decode(
        &self,
        content_type: Option<&str>,
        bytes: &[u8],
        status: u16,
    ) -> Result<(Value, bool), ApiError> {
        let Some(essence) = content_type.map(essence) else {
            return Ok((Value::Null, false));
        };
        let failed = |message: String| ApiError::Parse {
            status,
            content_type: essence.clone(),
            message,
        };

        if let Some(parser) = self.parsers.get(&essence) {
            return parser(bytes).map(|v| (v, true)).map_err(|e| failed(e.to_string()));
        }

        if is_json(&essence) {
            if bytes.iter().all(u8::is_ascii_whitespace) {
                return Ok((Value::Null, true));
            }
            return serde_json::from_slice(bytes)
                .map(|v| (v, true))
                .map_err(|e| failed(e.to_string()));
        }

        if essence == mime::FORM {
            return Ok((parse_form(bytes), true));
        }

        Ok((Value::Null, false))
    }
}
