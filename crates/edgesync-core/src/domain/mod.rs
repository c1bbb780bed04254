//! Domain entities and value types
//!
//! This module contains the core domain types for edgesync:
//! - Newtypes for object keys, key prefixes and content hashes
//! - Local scan records and remote listing records
//! - The metadata ledger document and its entries
//! - Domain-specific error types

pub mod errors;
pub mod ledger;
pub mod newtypes;
pub mod records;

// Re-export commonly used types
pub use errors::DomainError;
pub use ledger::{Ledger, LedgerEntry};
pub use newtypes::*;
pub use records::{LocalFileRecord, RemoteObject};
