//! Integration tests for edgesync-sync
//!
//! Drive the full engine against an in-memory object store and verify
//! uploads, ledger maintenance, pagination and reconciliation end to end.

mod common;

mod test_listing;
mod test_reconcile;
mod test_sync;
