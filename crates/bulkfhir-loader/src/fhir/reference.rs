//! FHIR references and the reference-slot visitor
//!
//! Every resource kind declares which of its fields can hold a
//! [`Reference`] by implementing [`VisitReferences`]. The rewriter only
//! ever sees references through this visitor, so adding a new kind means
//! listing its reference-bearing fields in one place.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Scheme prefixes that mark a reference as pointing inside the same bundle
const BUNDLE_LOCAL_SCHEMES: [&str; 2] = ["urn:uuid:", "urn:oid:"];

/// Legacy content-id prefix. The remainder is the bundle-local key.
const CONTENT_ID_PREFIX: &str = "cid:";

/// A FHIR Reference, extended with the resolved-target fields written by
/// the rewriter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,

    /// Resource type of the target once resolved
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub target_type: Option<String>,

    /// Permanent identifier of the target once resolved
    #[serde(rename = "referenceid", default, skip_serializing_if = "Option::is_none")]
    pub referenced_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external: Option<bool>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Reference {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: Some(reference.into()),
            ..Default::default()
        }
    }

    /// Key to look up in the bundle's identifier map, if this reference
    /// uses one of the bundle-local schemes.
    pub fn bundle_local_key(&self) -> Option<&str> {
        let reference = self.reference.as_deref()?;
        bundle_local_key(reference)
    }

    /// Point this reference at a stored resource
    pub fn resolve_to(&mut self, resource_type: &str, id: &str) {
        self.reference = Some(format!("{}/{}", resource_type, id));
        self.target_type = Some(resource_type.to_string());
        self.referenced_id = Some(id.to_string());
        self.external = Some(false);
    }

    /// True once the rewriter has pointed this reference at a stored resource
    pub fn is_resolved(&self) -> bool {
        self.referenced_id.is_some() && self.external == Some(false)
    }
}

/// Bundle-local key for a raw reference string.
///
/// `urn:uuid:` and `urn:oid:` references are looked up verbatim, since
/// entries carry the same string as their fullUrl. `cid:` references are
/// looked up by the text after the prefix.
pub fn bundle_local_key(reference: &str) -> Option<&str> {
    if let Some(key) = reference.strip_prefix(CONTENT_ID_PREFIX) {
        return Some(key);
    }
    BUNDLE_LOCAL_SCHEMES
        .iter()
        .any(|scheme| reference.starts_with(scheme))
        .then_some(reference)
}

/// Exposes every mutable reference slot of a value.
pub trait VisitReferences {
    fn visit_references(&mut self, visit: &mut dyn FnMut(&mut Reference));
}

impl VisitReferences for Reference {
    fn visit_references(&mut self, visit: &mut dyn FnMut(&mut Reference)) {
        visit(self);
    }
}

impl<T: VisitReferences> VisitReferences for Option<T> {
    fn visit_references(&mut self, visit: &mut dyn FnMut(&mut Reference)) {
        if let Some(inner) = self {
            inner.visit_references(visit);
        }
    }
}

impl<T: VisitReferences> VisitReferences for Vec<T> {
    fn visit_references(&mut self, visit: &mut dyn FnMut(&mut Reference)) {
        for item in self.iter_mut() {
            item.visit_references(visit);
        }
    }
}

/// Field that is a single value in one FHIR release and a list in another
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T: VisitReferences> VisitReferences for OneOrMany<T> {
    fn visit_references(&mut self, visit: &mut dyn FnMut(&mut Reference)) {
        match self {
            OneOrMany::One(item) => item.visit_references(visit),
            OneOrMany::Many(items) => items.visit_references(visit),
        }
    }
}

/// A participant slot: either a bare reference or a backbone element
/// wrapping one under `actor` or `agent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Participant {
    Actor {
        actor: Reference,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    Agent {
        agent: Reference,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    Direct(Reference),
}

impl VisitReferences for Participant {
    fn visit_references(&mut self, visit: &mut dyn FnMut(&mut Reference)) {
        match self {
            Participant::Actor { actor, extra } => {
                visit(actor);
                visit_map_references(extra, visit);
            }
            Participant::Agent { agent, extra } => {
                visit(agent);
                visit_map_references(extra, visit);
            }
            Participant::Direct(reference) => visit(reference),
        }
    }
}

/// Implements [`VisitReferences`] for a struct by listing its
/// reference-bearing fields. The struct's flattened `extra` map is
/// scanned as JSON afterwards, so undeclared fields are covered too.
macro_rules! reference_fields {
    ($ty:ty { $($field:ident),* $(,)? }) => {
        impl $crate::fhir::reference::VisitReferences for $ty {
            fn visit_references(
                &mut self,
                visit: &mut dyn FnMut(&mut $crate::fhir::reference::Reference),
            ) {
                $( $crate::fhir::reference::VisitReferences::visit_references(&mut self.$field, visit); )*
                $crate::fhir::reference::visit_map_references(&mut self.extra, visit);
            }
        }
    };
}

pub(crate) use reference_fields;

/// Runs [`visit_json_references`] over every value of a JSON object
pub fn visit_map_references(map: &mut Map<String, Value>, visit: &mut dyn FnMut(&mut Reference)) {
    for value in map.values_mut() {
        visit_json_references(value, visit);
    }
}

/// Visits every JSON object carrying a string `reference` key.
///
/// Used for resource kinds without a typed model and for the unmodelled
/// fields of typed ones. Each object is round-tripped through
/// [`Reference`] so the same rewrite applies.
pub fn visit_json_references(value: &mut Value, visit: &mut dyn FnMut(&mut Reference)) {
    match value {
        Value::Object(map) => {
            if matches!(map.get("reference"), Some(Value::String(_))) {
                if let Ok(mut reference) =
                    serde_json::from_value::<Reference>(Value::Object(map.clone()))
                {
                    visit(&mut reference);
                    if let Ok(Value::Object(updated)) = serde_json::to_value(&reference) {
                        *map = updated;
                    }
                }
                return;
            }
            for child in map.values_mut() {
                visit_json_references(child, visit);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                visit_json_references(item, visit);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bundle_local_key() {
        assert_eq!(
            bundle_local_key("urn:uuid:4f1c"),
            Some("urn:uuid:4f1c")
        );
        assert_eq!(
            bundle_local_key("urn:oid:1.2.3"),
            Some("urn:oid:1.2.3")
        );
        assert_eq!(bundle_local_key("cid:abc"), Some("abc"));
        assert_eq!(bundle_local_key("Patient/123"), None);
        assert_eq!(bundle_local_key("http://example.org/fhir/Patient/1"), None);
        assert_eq!(bundle_local_key("#contained"), None);
    }

    #[test]
    fn test_resolve_to_sets_all_fields() {
        let mut reference = Reference::new("urn:uuid:abc");
        assert!(!reference.is_resolved());

        reference.resolve_to("Patient", "p1");

        assert_eq!(reference.reference.as_deref(), Some("Patient/p1"));
        assert_eq!(reference.target_type.as_deref(), Some("Patient"));
        assert_eq!(reference.referenced_id.as_deref(), Some("p1"));
        assert_eq!(reference.external, Some(false));
        assert!(reference.is_resolved());
        assert_eq!(reference.bundle_local_key(), None);
    }

    #[test]
    fn test_reference_serializes_resolved_field_names() {
        let mut reference = Reference::new("urn:uuid:abc");
        reference.display = Some("Jane".to_string());
        reference.resolve_to("Patient", "p1");

        let value = serde_json::to_value(&reference).unwrap();
        assert_eq!(
            value,
            json!({
                "reference": "Patient/p1",
                "display": "Jane",
                "type": "Patient",
                "referenceid": "p1",
                "external": false
            })
        );
    }

    #[test]
    fn test_participant_variants() {
        let actor: Participant =
            serde_json::from_value(json!({"role": {"text": "x"}, "actor": {"reference": "a"}}))
                .unwrap();
        assert!(matches!(actor, Participant::Actor { .. }));

        let agent: Participant =
            serde_json::from_value(json!({"agent": {"reference": "b"}})).unwrap();
        assert!(matches!(agent, Participant::Agent { .. }));

        let direct: Participant = serde_json::from_value(json!({"reference": "c"})).unwrap();
        assert!(matches!(direct, Participant::Direct(_)));
    }

    #[test]
    fn test_participant_visits_sibling_references() {
        let mut requester: Participant = serde_json::from_value(json!({
            "agent": {"reference": "urn:uuid:dr"},
            "onBehalfOf": {"reference": "urn:uuid:org"}
        }))
        .unwrap();

        let mut seen = Vec::new();
        requester.visit_references(&mut |r| seen.push(r.reference.clone().unwrap()));

        assert_eq!(seen, vec!["urn:uuid:dr", "urn:uuid:org"]);
    }

    #[test]
    fn test_visit_json_references_rewrites_nested_objects() {
        let mut value = json!({
            "beneficiary": {"reference": "urn:uuid:p"},
            "item": [
                {"encounter": [{"reference": "urn:uuid:e", "display": "visit"}]},
                {"sequence": 1}
            ]
        });

        let mut seen = Vec::new();
        visit_json_references(&mut value, &mut |r| {
            seen.push(r.reference.clone().unwrap());
            r.resolve_to("Thing", "t");
        });

        assert_eq!(seen, vec!["urn:uuid:p", "urn:uuid:e"]);
        assert_eq!(value["beneficiary"]["referenceid"], "t");
        assert_eq!(value["item"][0]["encounter"][0]["display"], "visit");
        assert_eq!(value["item"][0]["encounter"][0]["reference"], "Thing/t");
        assert_eq!(value["item"][1]["sequence"], 1);
    }
}
