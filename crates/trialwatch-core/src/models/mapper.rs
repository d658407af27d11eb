//! Translation from raw catalog studies to [`Record`]s.
//!
//! Pure functions: no I/O, no logging of their own. Each protocol module is
//! treated as independently absent. A study without an NCT id cannot be keyed
//! and yields `None`.

use super::record::Record;
use super::study::{Intervention, Location, Study};

/// Fallback when neither a brief nor an official title is present.
pub const UNTITLED: &str = "Untitled study";

/// Fallback when the status module or its overall status is missing.
pub const UNKNOWN_STATUS: &str = "UNKNOWN";

/// Map one study. Returns `None` when the study has no usable id.
pub fn map_study(study: &Study) -> Option<Record> {
    let id = study.nct_id()?.trim().to_string();
    let section = study.protocol_section.as_ref()?;

    let identification = section.identification.as_ref();
    let official_title = identification
        .and_then(|i| i.official_title.clone())
        .and_then(non_empty);
    let title = identification
        .and_then(|i| i.brief_title.clone())
        .and_then(non_empty)
        .or_else(|| official_title.clone())
        .unwrap_or_else(|| UNTITLED.to_string());

    let status_module = section.status.as_ref();
    let status = status_module
        .and_then(|s| s.overall_status.clone())
        .and_then(non_empty)
        .unwrap_or_else(|| UNKNOWN_STATUS.to_string());
    let last_updated = status_module
        .and_then(|s| s.last_update())
        .map(str::to_string);

    let design = section.design.as_ref();

    Some(Record {
        id,
        title,
        official_title,
        status,
        phase: design.and_then(|d| d.phases.first().cloned()),
        study_type: design.and_then(|d| d.study_type.clone()),
        condition: section
            .conditions
            .as_ref()
            .and_then(|c| c.conditions.first().cloned()),
        last_updated,
        description: section
            .description
            .as_ref()
            .and_then(|d| d.brief_summary.clone())
            .and_then(non_empty),
        enrollment_count: design
            .and_then(|d| d.enrollment_info.as_ref())
            .and_then(|e| e.count),
        interventions: section
            .interventions
            .as_ref()
            .map(|m| m.interventions.iter().filter_map(format_intervention).collect()),
        locations: section
            .locations
            .as_ref()
            .map(|m| m.locations.iter().filter_map(format_location).collect()),
        is_favorite: false,
    })
}

/// Map a page of studies, dropping the ones that cannot be keyed.
pub fn map_studies(studies: &[Study]) -> Vec<Record> {
    studies.iter().filter_map(map_study).collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

/// "DRUG: Aspirin", or just the name when the type is missing.
fn format_intervention(intervention: &Intervention) -> Option<String> {
    let name = intervention.name.as_deref().filter(|n| !n.is_empty())?;
    match intervention.kind.as_deref().filter(|k| !k.is_empty()) {
        Some(kind) => Some(format!("{}: {}", kind, name)),
        None => Some(name.to_string()),
    }
}

/// "Facility, City, Country" skipping missing parts.
fn format_location(location: &Location) -> Option<String> {
    let parts: Vec<&str> = [&location.facility, &location.city, &location.country]
        .into_iter()
        .filter_map(|p| p.as_deref())
        .filter(|p| !p.is_empty())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}
