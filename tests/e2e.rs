//! E2E tests for the bridge engine
//!
//! These drive the dispatcher directly, without the upstream MCP transport.
//! Tests that need a real downstream MCP server are in `live_downstream`
//! and are ignored by default.
//!
//! Run with: cargo test --test e2e
//! Include the live tests with: cargo test --test e2e -- --include-ignored

#[path = "e2e/lazy_discovery.rs"]
mod lazy_discovery;

#[path = "e2e/compaction.rs"]
mod compaction;

#[path = "e2e/failures.rs"]
mod failures;

#[path = "e2e/live_downstream.rs"]
mod live_downstream;
