//! FHIR bundle model
//!
//! A bundle is parsed once into typed [`Entry`] values. Identity
//! assignment and reference rewriting then mutate the entries in place
//! before they are handed to the document store.

pub mod reference;
pub mod resource;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use reference::{OneOrMany, Participant, Reference, VisitReferences};
pub use resource::{collection_name, Resource};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    /// Bundle-scoped temporary identifier, usually a `urn:uuid:`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<Resource>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub bundle_type: Option<String>,

    #[serde(default)]
    pub entry: Vec<Entry>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Bundle {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Consumes the bundle, keeping only the entries that carry a resource
    pub fn into_resources(self) -> Vec<Resource> {
        self.entry.into_iter().filter_map(|e| e.resource).collect()
    }
}
