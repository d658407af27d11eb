//! Domain model for a single catalog entry.
//!
//! `Record` is decoupled from the API response structures; see
//! [`super::mapper`] for the translation.

use serde::{Deserialize, Serialize};

use crate::persistent_set::Keyed;

/// One study as surfaced to the front end.
///
/// `is_favorite` is derived state: the favorites store is the authority and
/// the flag is recomputed whenever it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub official_title: Option<String>,
    pub status: String,
    #[serde(default)]
    pub phase: Option<String>,
    #[serde(default)]
    pub study_type: Option<String>,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub enrollment_count: Option<u32>,
    #[serde(default)]
    pub interventions: Option<Vec<String>>,
    #[serde(default)]
    pub locations: Option<Vec<String>>,
    #[serde(default)]
    pub is_favorite: bool,
}

impl Record {
    /// Minimal record, mostly useful for tests and placeholders.
    pub fn new(id: impl Into<String>, title: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            official_title: None,
            status: status.into(),
            phase: None,
            study_type: None,
            condition: None,
            last_updated: None,
            description: None,
            enrollment_count: None,
            interventions: None,
            locations: None,
            is_favorite: false,
        }
    }

    /// Copy of this record with the favorite flag set to `flag`.
    pub fn with_favorite(&self, flag: bool) -> Self {
        Self {
            is_favorite: flag,
            ..self.clone()
        }
    }

    /// Single-line summary used by list views.
    pub fn summary_line(&self) -> String {
        let star = if self.is_favorite { "*" } else { " " };
        match &self.phase {
            Some(phase) => format!("{} {} [{}] {} ({})", star, self.id, self.status, self.title, phase),
            None => format!("{} {} [{}] {}", star, self.id, self.status, self.title),
        }
    }
}

impl Keyed for Record {
    fn key(&self) -> &str {
        &self.id
    }
}
