//! Data models for catalog entries.
//!
//! - `Record`: the domain entity held by the window and the favorites store
//! - `Study` and friends: the raw ClinicalTrials.gov response shape
//! - `mapper`: translation between the two

pub mod mapper;
pub mod record;
pub mod study;

pub use mapper::{map_studies, map_study};
pub use record::Record;
pub use study::{StudiesResponse, Study};
