// events/message.rs
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

/// Context key used to pair a reply with the request that caused it.
pub const REQUEST_ID_KEY: &str = "request_id";

const RESPONSE_SUFFIX: &str = ".response";

/// A single bus message: `{"type": ..., "data": ..., "context": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Message {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default = "empty_object")]
    pub context: Value,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl Message {
    pub fn new(msg_type: impl Into<String>, data: Value) -> Self {
        Self {
            msg_type: msg_type.into(),
            data,
            context: empty_object(),
        }
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    /// Payload field by name. An explicit `null` counts as absent.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.get(name).filter(|value| !value.is_null())
    }

    /// Builds the reply to this message. Source and destination are swapped
    /// so the reply is routed back to whoever asked.
    pub fn response(&self, data: Value) -> Message {
        let mut context = match &self.context {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };

        let source = context.remove("source");
        let destination = context.remove("destination");
        if let Some(destination) = destination {
            context.insert("source".to_string(), destination);
        }
        if let Some(source) = source {
            context.insert("destination".to_string(), source);
        }

        Message {
            msg_type: format!("{}{}", self.msg_type, RESPONSE_SUFFIX),
            data,
            context: Value::Object(context),
        }
    }

    pub fn is_response_to(&self, request: &Message) -> bool {
        self.msg_type.strip_suffix(RESPONSE_SUFFIX) == Some(request.msg_type.as_str())
            && self.request_id() == request.request_id()
    }

    pub fn request_id(&self) -> Option<&str> {
        self.context.get(REQUEST_ID_KEY).and_then(Value::as_str)
    }

    pub fn set_request_id(&mut self, id: &str) {
        if !self.context.is_object() {
            self.context = empty_object();
        }
        if let Value::Object(map) = &mut self.context {
            map.insert(REQUEST_ID_KEY.to_string(), Value::String(id.to_string()));
        }
    }
}
