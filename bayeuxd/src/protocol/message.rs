//! Bayeux protocol messages.
//!
//! A [`Message`] is a JSON object. The well-known fields (`id`, `channel`,
//! `successful`, `ext`) get typed accessors; everything else is carried
//! untouched so a message survives a serialize/deserialize cycle with the same
//! body, field order included.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const ID_FIELD: &str = "id";
pub const CHANNEL_FIELD: &str = "channel";
pub const SUCCESSFUL_FIELD: &str = "successful";
pub const EXT_FIELD: &str = "ext";
pub const CLIENT_ID_FIELD: &str = "clientId";
pub const DATA_FIELD: &str = "data";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Message {
    fields: Map<String, Value>,
}

impl Message {
    pub fn new(channel: &str) -> Self {
        let mut fields = Map::new();
        fields.insert(CHANNEL_FIELD.to_string(), Value::String(channel.to_string()));
        Message { fields }
    }

    pub fn from_map(fields: Map<String, Value>) -> Self {
        Message { fields }
    }

    /// Builder-style setter for the message id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.fields
            .insert(ID_FIELD.to_string(), Value::String(id.into()));
        self
    }

    /// Builder-style setter for the `successful` flag carried by replies.
    pub fn with_successful(mut self, successful: bool) -> Self {
        self.fields
            .insert(SUCCESSFUL_FIELD.to_string(), Value::Bool(successful));
        self
    }

    /// Builder-style setter for one `ext` entry.
    pub fn with_ext(mut self, key: &str, value: Value) -> Self {
        self.ext_mut().insert(key.to_string(), value);
        self
    }

    pub fn with_field(mut self, key: &str, value: Value) -> Self {
        self.fields.insert(key.to_string(), value);
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.fields.get(ID_FIELD).and_then(Value::as_str)
    }

    pub fn channel(&self) -> Option<&str> {
        self.fields.get(CHANNEL_FIELD).and_then(Value::as_str)
    }

    pub fn client_id(&self) -> Option<&str> {
        self.fields.get(CLIENT_ID_FIELD).and_then(Value::as_str)
    }

    /// A missing or non-boolean `successful` field reads as `false`.
    pub fn is_successful(&self) -> bool {
        self.fields
            .get(SUCCESSFUL_FIELD)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// The `ext` object, if present and actually an object.
    pub fn ext(&self) -> Option<&Map<String, Value>> {
        self.fields.get(EXT_FIELD).and_then(Value::as_object)
    }

    /// The `ext` object, created (or replaced, when not an object) on demand.
    pub fn ext_mut(&mut self) -> &mut Map<String, Value> {
        let ext = self
            .fields
            .entry(EXT_FIELD.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !ext.is_object() {
            *ext = Value::Object(Map::new());
        }
        match ext {
            Value::Object(map) => map,
            _ => unreachable!("ext was just normalized to an object"),
        }
    }

    /// Looks up one entry of the `ext` object.
    pub fn ext_value(&self, key: &str) -> Option<&Value> {
        self.ext().and_then(|ext| ext.get(key))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn insert(&mut self, key: &str, value: Value) -> Option<Value> {
        self.fields.insert(key.to_string(), value)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Permissive numeric read: integers and floats are accepted, anything else is absent.
pub fn as_long(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_u64().map(|n| n.min(i64::MAX as u64) as i64))
            .or_else(|| number.as_f64().map(|f| f as i64)),
        _ => None,
    }
}
