//! Port definitions (hexagonal architecture interfaces)
//!
//! Ports are interfaces that the sync engine depends on, but whose
//! implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IObjectStore`] - Remote object storage (list, get, put, delete)
//! - [`ICdnPurger`] - CDN cache invalidation

pub mod cdn;
pub mod object_store;

pub use cdn::{ICdnPurger, PurgeKind, PurgeReceipt};
pub use object_store::{IObjectStore, ListPage, ListRequest, PutBody, PutOptions, PutReceipt};
