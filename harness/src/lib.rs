//! Test-and-orchestration harness for a survey-data cleaning pipeline.
//!
//! The cleaning itself runs inside an external statistical engine and is
//! treated as a black box. This crate drives checks against it and turns their
//! textual output into a report:
//!
//! - **[`core`]**: Pure, deterministic logic (data model, marker extraction,
//!   aggregation). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (process spawning, temp scripts,
//!   configuration, discovery, report files). Isolated behind traits where
//!   tests need fakes.
//!
//! [`session`] composes the stages: Runner → Extractor → Aggregator.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
