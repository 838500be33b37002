//! Forcelink Client - Read-only Salesforce REST access.
//!
//! Wraps the query and search endpoints of the Salesforce REST API behind a
//! validated, read-only surface. DML never leaves the process and expired
//! sessions surface as a dedicated, retryable error.

mod client;
mod error;
pub mod query_validator;

pub use client::{API_VERSION, SalesforceClient};
pub use error::ClientError;
