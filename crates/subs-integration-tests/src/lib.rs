//! Integration tests for the subscription ledger.
//!
//! This crate has no library code. The tests under `tests/` drive the
//! lifecycle engine, the epoch ledger and the vault together.
//!
//! ```sh
//! cargo test -p subs-integration-tests
//! ```
