//! edgesync Core - Domain types, ports and configuration
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `LocalFileRecord`, `LedgerEntry`, `Ledger`, `RemoteObject`
//! - **Newtypes** - `ObjectKey`, `KeyPrefix`, `ContentHash`
//! - **Port definitions** - Traits for adapters: `IObjectStore`, `ICdnPurger`
//! - **Configuration** - YAML-backed `Config` with validation and a builder
//!
//! # Architecture
//!
//! The domain module contains pure data and invariants with no I/O.
//! Ports define trait interfaces that adapter crates implement
//! (`edgesync-cloud`), and the engine (`edgesync-sync`) drives the
//! domain through those ports.

pub mod config;
pub mod domain;
pub mod ports;
