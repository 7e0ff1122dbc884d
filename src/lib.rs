//! `pip-prune`: greedy, trace-driven discovery of files that can be safely
//! deleted from a Python package install without breaking a smoke test.
//!
//! The pruning engine is the only thing this crate specifies in depth: a
//! [`view`] presenting a mutable overlay over an immutable reference
//! install, an [`oracle`] that runs the smoke test and traces its file
//! opens via a pluggable [`trace::Tracer`], and a [`prune`] loop that
//! drives the greedy verification algorithm. Everything else ([`cli`],
//! [`fingerprint`], [`provision`], [`logging`]) is the ambient
//! infrastructure a complete binary needs around that core.

pub mod cli;
pub mod error;
pub mod fingerprint;
pub mod ignore;
pub mod logging;
pub mod mountbackend;
pub mod oracle;
pub mod prune;
pub mod provision;
pub mod trace;
pub mod view;
