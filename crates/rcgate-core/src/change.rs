//! Externally visible state changes and their downstream envelope.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// A change in the external view of one data manager.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    /// The whole view changed.
    ViewUpdated { source: String, view: Value },
    /// One key of a keyed view changed. `None` means the key was removed.
    KeyUpdated {
        source: String,
        key: String,
        view: Option<Value>,
    },
}

impl ChangeEvent {
    /// Id of the manager that produced the change.
    pub fn source(&self) -> &str {
        match self {
            Self::ViewUpdated { source, .. } | Self::KeyUpdated { source, .. } => source,
        }
    }

    /// The envelope sent downstream.
    pub fn into_message(self) -> PublishedMessage {
        match self {
            Self::ViewUpdated { source, view } => PublishedMessage {
                source,
                data_type: "StateUpdate".to_string(),
                data: json!({ "state": view }),
            },
            Self::KeyUpdated { source, key, view } => PublishedMessage {
                source,
                data_type: "KeyUpdate".to_string(),
                data: json!({ "key": key, "value": view }),
            },
        }
    }
}

/// One message on the downstream channel: `{source, dataType, data}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedMessage {
    pub source: String,
    pub data_type: String,
    pub data: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_shape() {
        let msg = ChangeEvent::KeyUpdated {
            source: "sessions".into(),
            key: "abc".into(),
            view: None,
        }
        .into_message();
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"source": "sessions", "dataType": "KeyUpdate", "data": {"key": "abc", "value": null}})
        );
    }
}
