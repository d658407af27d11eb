//! Catalog access for the ClinicalTrials.gov studies API.
//!
//! This module provides the `CatalogGateway` port the core depends on, the
//! shared retry policy, and `ApiClient`, the HTTP implementation.
//!
//! The public API needs no authentication.

pub mod client;
pub mod error;
pub mod gateway;

pub use client::{ApiClient, DEFAULT_API_BASE_URL};
pub use error::ApiError;
pub use gateway::{with_retry, CatalogGateway, DEFAULT_RETRY_ATTEMPTS};
