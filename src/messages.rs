//! Message payload contracts.
//!
//! These are the only things the external transport carries: an entity id
//! and a small parameter map. The transport itself (queueing, redelivery)
//! lives outside this crate.

use serde::{Deserialize, Serialize};

use crate::models::Parameters;

/// Triggers the source preparation handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepareMessage {
    pub source_id: String,
    #[serde(default)]
    pub parameters: Parameters,
}

impl PrepareMessage {
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            parameters: Parameters::new(),
        }
    }
}

/// Triggers the suite serialization handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializeSuiteMessage {
    pub serialized_suite_id: String,
    #[serde(default)]
    pub parameters: Parameters,
}

impl SerializeSuiteMessage {
    pub fn new(serialized_suite_id: impl Into<String>) -> Self {
        Self {
            serialized_suite_id: serialized_suite_id.into(),
            parameters: Parameters::new(),
        }
    }
}
