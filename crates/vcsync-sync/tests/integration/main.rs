//! Integration tests for vcsync-sync
//!
//! Run the coordinator against an in-memory store, an in-memory working
//! copy and a scripted repository connection, and verify transactions,
//! dirty tracking, remote tree building and reconciliation end to end.

mod common;

mod test_coordinator;
mod test_dirty;
mod test_reconcile;
mod test_tree_builder;
