//! Raw ClinicalTrials.gov v2 response structures.
//!
//! Every nested module is optional: the API omits groups freely (and the
//! `fields=` projection strips everything but the requested ones), so the
//! mapper has to cope with any subset being present.

use serde::{Deserialize, Serialize};

/// Response envelope for `GET /studies`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StudiesResponse {
    #[serde(default)]
    pub studies: Vec<Study>,
    #[serde(rename = "nextPageToken", default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Study {
    #[serde(rename = "protocolSection", default)]
    pub protocol_section: Option<ProtocolSection>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProtocolSection {
    #[serde(rename = "identificationModule", default)]
    pub identification: Option<IdentificationModule>,
    #[serde(rename = "statusModule", default)]
    pub status: Option<StatusModule>,
    #[serde(rename = "designModule", default)]
    pub design: Option<DesignModule>,
    #[serde(rename = "conditionsModule", default)]
    pub conditions: Option<ConditionsModule>,
    #[serde(rename = "descriptionModule", default)]
    pub description: Option<DescriptionModule>,
    #[serde(rename = "armsInterventionsModule", default)]
    pub interventions: Option<ArmsInterventionsModule>,
    #[serde(rename = "contactsLocationsModule", default)]
    pub locations: Option<ContactsLocationsModule>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentificationModule {
    #[serde(rename = "nctId")]
    pub nct_id: Option<String>,
    #[serde(rename = "briefTitle")]
    pub brief_title: Option<String>,
    #[serde(rename = "officialTitle")]
    pub official_title: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusModule {
    #[serde(rename = "overallStatus")]
    pub overall_status: Option<String>,
    // Older payloads carry a flat string, current ones a `{ date }` struct
    #[serde(rename = "lastUpdatePostDate")]
    pub last_update_post_date: Option<String>,
    #[serde(rename = "lastUpdatePostDateStruct")]
    pub last_update_post_date_struct: Option<DateStruct>,
}

impl StatusModule {
    pub fn last_update(&self) -> Option<&str> {
        self.last_update_post_date
            .as_deref()
            .or_else(|| {
                self.last_update_post_date_struct
                    .as_ref()
                    .and_then(|d| d.date.as_deref())
            })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DateStruct {
    pub date: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DesignModule {
    #[serde(default)]
    pub phases: Vec<String>,
    #[serde(rename = "studyType")]
    pub study_type: Option<String>,
    #[serde(rename = "enrollmentInfo")]
    pub enrollment_info: Option<EnrollmentInfo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnrollmentInfo {
    pub count: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConditionsModule {
    #[serde(default)]
    pub conditions: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DescriptionModule {
    #[serde(rename = "briefSummary")]
    pub brief_summary: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArmsInterventionsModule {
    #[serde(default)]
    pub interventions: Vec<Intervention>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Intervention {
    #[serde(rename = "type", alias = "interventionType")]
    pub kind: Option<String>,
    #[serde(alias = "interventionName")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactsLocationsModule {
    #[serde(default)]
    pub locations: Vec<Location>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Location {
    pub facility: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
}

impl Study {
    /// The NCT id, if the identification module made it into the payload.
    pub fn nct_id(&self) -> Option<&str> {
        self.protocol_section
            .as_ref()
            .and_then(|p| p.identification.as_ref())
            .and_then(|i| i.nct_id.as_deref())
            .filter(|id| !id.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id_projection() {
        let json = r#"{
            "studies": [
                {"protocolSection": {"identificationModule": {"nctId": "NCT001"}}},
                {"protocolSection": {"identificationModule": {"nctId": "NCT002"}}},
                {}
            ],
            "nextPageToken": "abc"
        }"#;
        let parsed: StudiesResponse = serde_json::from_str(json).unwrap();
        let ids: Vec<_> = parsed.studies.iter().filter_map(|s| s.nct_id()).collect();
        assert_eq!(ids, vec!["NCT001", "NCT002"]);
        assert_eq!(parsed.next_page_token.as_deref(), Some("abc"));
    }

    #[test]
    fn test_parse_empty_envelope() {
        let parsed: StudiesResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.studies.is_empty());
    }

    #[test]
    fn test_last_update_prefers_flat_string() {
        let json = r#"{"overallStatus": "RECRUITING",
                       "lastUpdatePostDateStruct": {"date": "2024-05-01"}}"#;
        let status: StatusModule = serde_json::from_str(json).unwrap();
        assert_eq!(status.last_update(), Some("2024-05-01"));

        let json = r#"{"lastUpdatePostDate": "2023-01-01",
                       "lastUpdatePostDateStruct": {"date": "2024-05-01"}}"#;
        let status: StatusModule = serde_json::from_str(json).unwrap();
        assert_eq!(status.last_update(), Some("2023-01-01"));
    }

    #[test]
    fn test_intervention_aliases() {
        let current: Intervention =
            serde_json::from_str(r#"{"type": "DRUG", "name": "Aspirin"}"#).unwrap();
        let legacy: Intervention = serde_json::from_str(
            r#"{"interventionType": "DRUG", "interventionName": "Aspirin"}"#,
        )
        .unwrap();
        assert_eq!(current.kind, legacy.kind);
        assert_eq!(current.name, legacy.name);
    }
}
