//! # air2neo Airtable
//!
//! Source client for the Airtable REST API: paginated record listing with a
//! modification-window formula, and record-id validation for link cells.

pub mod client;
pub mod formula;
pub mod links;
pub mod record;

pub use client::{AirtableClient, AirtableConfig, DEFAULT_API_URL};
pub use links::is_record_id;
pub use record::AirtableRecord;
