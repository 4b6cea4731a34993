//! Bundle-local reference rewriting
//!
//! Walks every reference slot of every resource. Same-bundle references
//! are pointed at the permanent identity of their target; references that
//! look same-bundle but have no target are collected so the caller can
//! reject the bundle. Anything else is left untouched.

use serde::Serialize;

use crate::fhir::{Entry, Reference, VisitReferences};
use crate::ingest::identity::IdentifierMap;

/// A same-bundle reference whose target is not in the bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedReference {
    /// fullUrl of the entry holding the reference
    pub entry: Option<String>,
    pub reference: String,
}

#[derive(Debug, Default)]
pub struct RewriteReport {
    pub rewritten: usize,
    pub unresolved: Vec<UnresolvedReference>,
}

impl RewriteReport {
    pub fn is_clean(&self) -> bool {
        self.unresolved.is_empty()
    }
}

enum Slot<'a> {
    Resolved(&'a crate::ingest::identity::ResolvedTarget),
    Dangling,
    Untouched,
}

fn classify<'a>(reference: &Reference, map: &'a IdentifierMap) -> Slot<'a> {
    let Some(raw) = reference.reference.as_deref() else {
        return Slot::Untouched;
    };
    if let Some(target) = map.get(raw) {
        return Slot::Resolved(target);
    }
    match reference.bundle_local_key() {
        Some(key) => match map.get(key) {
            Some(target) => Slot::Resolved(target),
            None => Slot::Dangling,
        },
        None => Slot::Untouched,
    }
}

/// Rewrites every same-bundle reference in `entries`.
///
/// Safe to run more than once: a rewritten reference reads `Type/id`,
/// which is neither a fullUrl nor a bundle-local scheme.
pub fn rewrite_references(entries: &mut [Entry], map: &IdentifierMap) -> RewriteReport {
    let mut report = RewriteReport::default();

    for entry in entries.iter_mut() {
        let Some(resource) = entry.resource.as_mut() else {
            continue;
        };
        let full_url = entry.full_url.as_deref();

        resource.visit_references(&mut |reference| match classify(reference, map) {
            Slot::Resolved(target) => {
                reference.resolve_to(&target.resource_type, &target.id);
                report.rewritten += 1;
            }
            Slot::Dangling => report.unresolved.push(UnresolvedReference {
                entry: full_url.map(str::to_string),
                reference: reference.reference.clone().unwrap_or_default(),
            }),
            Slot::Untouched => {}
        });
    }

    report
}
