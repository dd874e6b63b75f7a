//! End-to-end engine tests
//!
//! Each module drives the public `Terrace` API against a temporary
//! database directory with an injected manual clock, so time-dependent
//! behavior (tier aging, compaction triggers, cache TTLs) is
//! deterministic.

mod support;

mod basic;
mod planner;
mod recovery;
mod snapshots;
mod tiering;
mod time_travel;
mod transactions;
mod views;
