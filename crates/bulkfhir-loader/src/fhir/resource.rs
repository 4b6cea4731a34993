//! Typed FHIR resources
//!
//! Only the fields the loader reads or rewrites are modelled. Everything
//! else is kept verbatim in each struct's `extra` map so stored documents
//! lose nothing. Kinds without a model travel as [`Resource::Other`].
//!
//! Field sets cover the DSTU2 and STU3 shapes that synthetic population
//! generators emit; where the two releases disagree on cardinality the
//! field is a [`OneOrMany`].

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use super::reference::{
    reference_fields, visit_map_references, OneOrMany, Participant, Reference, VisitReferences,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Coding {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeableConcept {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub coding: Vec<Coding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deceased_boolean: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deceased_date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub address: Vec<Address>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub care_provider: Vec<Reference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub general_practitioner: Vec<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub managing_organization: Option<Reference>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Patient {
    /// Deceased if a death date is present or the deceased flag is set
    pub fn is_deceased(&self) -> bool {
        self.deceased_date_time.is_some() || self.deceased_boolean == Some(true)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encounter: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asserter: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<CodeableConcept>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Condition {
    /// First coding of the condition code, the one used for disease lookup
    pub fn primary_coding(&self) -> Option<&Coding> {
        self.code.as_ref()?.coding.first()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EncounterParticipant {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub individual: Option<Reference>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EncounterLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Reference>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Encounter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Reference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub participant: Vec<EncounterParticipant>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub location: Vec<EncounterLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_provider: Option<Reference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indication: Vec<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_of: Option<Reference>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservationRelated {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Reference>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encounter: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Reference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub performer: Vec<Reference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related: Vec<ObservationRelated>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub has_member: Vec<Reference>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Procedure {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encounter: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Reference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub performer: Vec<Participant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_reference: Option<OneOrMany<Reference>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Immunization {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encounter: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performer: Option<OneOrMany<Participant>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub practitioner: Vec<Participant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requester: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Reference>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicationOrder {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encounter: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prescriber: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_reference: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medication_reference: Option<Reference>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicationRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encounter: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requester: Option<Participant>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reason_reference: Vec<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medication_reference: Option<Reference>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarePlanActivityDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Reference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub performer: Vec<Reference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reason_reference: Vec<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_reference: Option<Reference>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CarePlanActivity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<CarePlanActivityDetail>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarePlan {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Reference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<Reference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub care_team: Vec<Reference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub goal: Vec<Reference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub activity: Vec<CarePlanActivity>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllergyIntolerance {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorder: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reporter: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asserter: Option<Reference>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encounter: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performer: Option<OneOrMany<Participant>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub result: Vec<Reference>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

reference_fields!(Coding {});
reference_fields!(CodeableConcept { coding });
reference_fields!(Address {});
reference_fields!(Patient {
    address,
    care_provider,
    general_practitioner,
    managing_organization,
});
reference_fields!(Condition {
    patient,
    subject,
    encounter,
    context,
    asserter,
    code,
});
reference_fields!(EncounterParticipant { individual });
reference_fields!(EncounterLocation { location });
reference_fields!(Encounter {
    patient,
    subject,
    participant,
    location,
    service_provider,
    indication,
    part_of,
});
reference_fields!(ObservationRelated { target });
reference_fields!(Observation {
    subject,
    encounter,
    context,
    performer,
    related,
    has_member,
});
reference_fields!(Procedure {
    subject,
    encounter,
    context,
    location,
    performer,
    reason_reference,
});
reference_fields!(Immunization {
    patient,
    encounter,
    performer,
    practitioner,
    requester,
    location,
});
reference_fields!(MedicationOrder {
    patient,
    encounter,
    prescriber,
    reason_reference,
    medication_reference,
});
reference_fields!(MedicationRequest {
    subject,
    encounter,
    context,
    requester,
    reason_reference,
    medication_reference,
});
reference_fields!(CarePlanActivityDetail {
    location,
    performer,
    reason_reference,
    product_reference,
});
reference_fields!(CarePlanActivity { reference, detail });
reference_fields!(CarePlan {
    patient,
    subject,
    context,
    addresses,
    care_team,
    goal,
    activity,
});
reference_fields!(AllergyIntolerance {
    patient,
    recorder,
    reporter,
    asserter,
});
reference_fields!(DiagnosticReport {
    subject,
    encounter,
    context,
    performer,
    result,
});

/// A resource of a kind without a typed model
#[derive(Debug, Clone, PartialEq)]
pub struct OtherResource {
    pub resource_type: String,
    pub body: Map<String, Value>,
}

/// Any resource found in a bundle entry, tagged by `resourceType`
#[derive(Debug, Clone, PartialEq)]
pub enum Resource {
    Patient(Patient),
    Condition(Condition),
    Encounter(Encounter),
    Observation(Observation),
    Procedure(Procedure),
    Immunization(Immunization),
    MedicationOrder(MedicationOrder),
    MedicationRequest(MedicationRequest),
    CarePlan(CarePlan),
    AllergyIntolerance(AllergyIntolerance),
    DiagnosticReport(DiagnosticReport),
    Other(OtherResource),
}

/// Dispatches a body over every typed variant
macro_rules! each_typed {
    ($resource:expr, $inner:ident => $body:expr, $other:ident => $fallback:expr) => {
        match $resource {
            Resource::Patient($inner) => $body,
            Resource::Condition($inner) => $body,
            Resource::Encounter($inner) => $body,
            Resource::Observation($inner) => $body,
            Resource::Procedure($inner) => $body,
            Resource::Immunization($inner) => $body,
            Resource::MedicationOrder($inner) => $body,
            Resource::MedicationRequest($inner) => $body,
            Resource::CarePlan($inner) => $body,
            Resource::AllergyIntolerance($inner) => $body,
            Resource::DiagnosticReport($inner) => $body,
            Resource::Other($other) => $fallback,
        }
    };
}

impl Resource {
    /// FHIR `resourceType` of this resource
    pub fn resource_type(&self) -> &str {
        match self {
            Resource::Patient(_) => "Patient",
            Resource::Condition(_) => "Condition",
            Resource::Encounter(_) => "Encounter",
            Resource::Observation(_) => "Observation",
            Resource::Procedure(_) => "Procedure",
            Resource::Immunization(_) => "Immunization",
            Resource::MedicationOrder(_) => "MedicationOrder",
            Resource::MedicationRequest(_) => "MedicationRequest",
            Resource::CarePlan(_) => "CarePlan",
            Resource::AllergyIntolerance(_) => "AllergyIntolerance",
            Resource::DiagnosticReport(_) => "DiagnosticReport",
            Resource::Other(other) => &other.resource_type,
        }
    }

    /// Document collection this resource is stored in
    pub fn collection(&self) -> String {
        collection_name(self.resource_type())
    }

    pub fn id(&self) -> Option<&str> {
        each_typed!(self, r => r.id.as_deref(), o => o.body.get("id").and_then(Value::as_str))
    }

    /// Overwrites the resource id. Always succeeds for every kind.
    pub fn set_id(&mut self, id: String) {
        each_typed!(self, r => r.id = Some(id), o => {
            o.body.insert("id".to_string(), Value::String(id));
        })
    }

    fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let Value::Object(mut body) = value else {
            return Err(serde_json::Error::custom("resource must be a JSON object"));
        };
        let resource_type = match body.remove("resourceType") {
            Some(Value::String(kind)) => kind,
            _ => return Err(serde_json::Error::custom("resource has no resourceType")),
        };

        fn typed<T: serde::de::DeserializeOwned>(
            body: Map<String, Value>,
        ) -> Result<T, serde_json::Error> {
            serde_json::from_value(Value::Object(body))
        }

        Ok(match resource_type.as_str() {
            "Patient" => Resource::Patient(typed(body)?),
            "Condition" => Resource::Condition(typed(body)?),
            "Encounter" => Resource::Encounter(typed(body)?),
            "Observation" => Resource::Observation(typed(body)?),
            "Procedure" => Resource::Procedure(typed(body)?),
            "Immunization" => Resource::Immunization(typed(body)?),
            "MedicationOrder" => Resource::MedicationOrder(typed(body)?),
            "MedicationRequest" => Resource::MedicationRequest(typed(body)?),
            "CarePlan" => Resource::CarePlan(typed(body)?),
            "AllergyIntolerance" => Resource::AllergyIntolerance(typed(body)?),
            "DiagnosticReport" => Resource::DiagnosticReport(typed(body)?),
            _ => Resource::Other(OtherResource {
                resource_type,
                body,
            }),
        })
    }

    /// JSON document for this resource, `resourceType` included
    pub fn to_document(&self) -> Result<Value, serde_json::Error> {
        let mut body = each_typed!(self, r => match serde_json::to_value(r)? {
            Value::Object(map) => map,
            _ => Map::new(),
        }, o => o.body.clone());
        body.insert(
            "resourceType".to_string(),
            Value::String(self.resource_type().to_string()),
        );
        Ok(Value::Object(body))
    }
}

impl VisitReferences for Resource {
    fn visit_references(&mut self, visit: &mut dyn FnMut(&mut Reference)) {
        each_typed!(self, r => r.visit_references(visit), o => visit_map_references(&mut o.body, visit))
    }
}

impl<'de> Deserialize<'de> for Resource {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Resource::from_value(value).map_err(D::Error::custom)
    }
}

impl Serialize for Resource {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::Error as _;
        self.to_document()
            .map_err(S::Error::custom)?
            .serialize(serializer)
    }
}

/// Pluralised, lower-cased collection name for a resource type
pub fn collection_name(resource_type: &str) -> String {
    let lower = resource_type.to_ascii_lowercase();
    if let Some(stem) = lower.strip_suffix('y') {
        format!("{stem}ies")
    } else if lower.ends_with('s') {
        format!("{lower}es")
    } else {
        format!("{lower}s")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collection_name() {
        assert_eq!(collection_name("Patient"), "patients");
        assert_eq!(collection_name("MedicationOrder"), "medicationorders");
        assert_eq!(collection_name("AllergyIntolerance"), "allergyintolerances");
        assert_eq!(collection_name("Library"), "libraries");
        assert_eq!(collection_name("ImagingStatus"), "imagingstatuses");
    }

    #[test]
    fn test_patient_round_trip_keeps_unknown_fields() {
        let value = json!({
            "resourceType": "Patient",
            "id": "p1",
            "gender": "female",
            "birthDate": "1980-05-01",
            "name": [{"family": "Doe", "given": ["Jane"]}],
            "address": [{"city": "Boston", "postalCode": "02108", "state": "MA"}]
        });

        let resource: Resource = serde_json::from_value(value.clone()).unwrap();
        let Resource::Patient(patient) = &resource else {
            panic!("expected a patient, got {resource:?}");
        };
        assert_eq!(patient.birth_date.as_deref(), Some("1980-05-01"));
        assert_eq!(patient.address[0].city.as_deref(), Some("Boston"));
        assert!(!patient.is_deceased());

        assert_eq!(resource.to_document().unwrap(), value);
    }

    #[test]
    fn test_unknown_kind_is_other() {
        let value = json!({
            "resourceType": "Claim",
            "id": "c1",
            "patient": {"reference": "urn:uuid:p"}
        });
        let mut resource: Resource = serde_json::from_value(value).unwrap();

        assert_eq!(resource.resource_type(), "Claim");
        assert_eq!(resource.collection(), "claims");
        assert_eq!(resource.id(), Some("c1"));

        resource.set_id("new".to_string());
        assert_eq!(resource.id(), Some("new"));

        let mut count = 0;
        resource.visit_references(&mut |_| count += 1);
        assert_eq!(count, 1);
    }

    #[test]
    fn test_missing_resource_type_is_an_error() {
        let result: Result<Resource, _> = serde_json::from_value(json!({"id": "x"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_set_id_on_typed_resource_without_id() {
        let mut resource: Resource =
            serde_json::from_value(json!({"resourceType": "Encounter"})).unwrap();
        assert_eq!(resource.id(), None);
        resource.set_id("e1".to_string());
        assert_eq!(resource.id(), Some("e1"));
    }

    #[test]
    fn test_encounter_reference_slots() {
        let mut resource: Resource = serde_json::from_value(json!({
            "resourceType": "Encounter",
            "patient": {"reference": "urn:uuid:p"},
            "participant": [{"individual": {"reference": "urn:uuid:dr"}}],
            "location": [{"location": {"reference": "urn:uuid:loc"}}],
            "serviceProvider": {"reference": "urn:uuid:org"},
            "class": "outpatient"
        }))
        .unwrap();

        let mut seen = Vec::new();
        resource.visit_references(&mut |r| seen.push(r.reference.clone().unwrap()));
        assert_eq!(
            seen,
            vec!["urn:uuid:p", "urn:uuid:dr", "urn:uuid:loc", "urn:uuid:org"]
        );
    }

    #[test]
    fn test_deceased_patient() {
        let by_date: Patient =
            serde_json::from_value(json!({"deceasedDateTime": "2010-01-01T00:00:00Z"})).unwrap();
        assert!(by_date.is_deceased());

        let by_flag: Patient = serde_json::from_value(json!({"deceasedBoolean": true})).unwrap();
        assert!(by_flag.is_deceased());

        let alive: Patient = serde_json::from_value(json!({"deceasedBoolean": false})).unwrap();
        assert!(!alive.is_deceased());
    }

    #[test]
    fn test_condition_primary_coding() {
        let condition: Condition = serde_json::from_value(json!({
            "code": {"coding": [
                {"system": "http://snomed.info/sct", "code": "44054006"},
                {"system": "http://hl7.org/fhir/sid/icd-10", "code": "E11"}
            ]}
        }))
        .unwrap();

        let coding = condition.primary_coding().unwrap();
        assert_eq!(coding.code.as_deref(), Some("44054006"));
    }
}
