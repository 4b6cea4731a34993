//! Permanent identity assignment
//!
//! Every resource in a bundle gets a fresh permanent id. The fullUrl of
//! its entry is recorded against that id so references can be rewritten
//! afterwards.

use std::collections::HashMap;

use tracing::warn;
use uuid::Uuid;

use crate::fhir::Entry;

/// Resolved target of a bundle-local reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub resource_type: String,
    pub id: String,
}

/// Bundle-scoped map from fullUrl to the permanent identity of its resource
#[derive(Debug, Default)]
pub struct IdentifierMap {
    targets: HashMap<String, ResolvedTarget>,
}

impl IdentifierMap {
    pub fn get(&self, full_url: &str) -> Option<&ResolvedTarget> {
        self.targets.get(full_url)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Records a mapping. The first mapping for a fullUrl wins.
    fn insert(&mut self, full_url: &str, target: ResolvedTarget) -> bool {
        if self.targets.contains_key(full_url) {
            return false;
        }
        self.targets.insert(full_url.to_string(), target);
        true
    }
}

/// Type recorded for entries whose kind cannot be determined
const UNTYPED_RESOURCE: &str = "Resource";

/// Fresh permanent identifier
pub fn new_permanent_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Resource type named by a RESTful fullUrl such as `http://host/fhir/Patient/1`
fn type_from_full_url(full_url: &str) -> Option<&str> {
    let mut segments = full_url.rsplit('/');
    segments.next()?;
    segments
        .next()
        .filter(|kind| kind.starts_with(|c: char| c.is_ascii_uppercase()))
}

/// Gives every resource a permanent id and maps entry fullUrls to it.
///
/// An entry without a resource payload still gets an id and a mapping so
/// references to it resolve; its type is taken from the fullUrl when it
/// has a RESTful shape. A fullUrl seen twice keeps its first mapping.
pub fn assign_identifiers(entries: &mut [Entry]) -> IdentifierMap {
    let mut map = IdentifierMap::default();

    for (index, entry) in entries.iter_mut().enumerate() {
        let id = new_permanent_id();

        let resource_type = match entry.resource.as_mut() {
            Some(resource) => {
                resource.set_id(id.clone());
                resource.resource_type().to_string()
            }
            None => {
                warn!(
                    entry = index,
                    full_url = entry.full_url.as_deref().unwrap_or(""),
                    "Bundle entry has no resource, id cannot be stamped"
                );
                entry
                    .full_url
                    .as_deref()
                    .and_then(type_from_full_url)
                    .unwrap_or(UNTYPED_RESOURCE)
                    .to_string()
            }
        };

        let Some(full_url) = entry.full_url.as_deref() else {
            continue;
        };
        if !map.insert(full_url, ResolvedTarget { resource_type, id }) {
            warn!(full_url, "Duplicate fullUrl in bundle, keeping first mapping");
        }
    }

    map
}
