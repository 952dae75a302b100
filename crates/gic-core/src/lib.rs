//! gic-core — shared library for the Galaxy Information Center.
//!
//! Provides:
//! - `geometry` — 3-D points and the `Sol` origin
//! - `histogram` — fixed-capacity, time-bucketed visit counters
//! - `reference` — bulk reference catalog: entities, snapshot builder, freshness manager
//! - `collector` — live visit collector actor and event relay transport
//! - `remote` — bounded-concurrency remote system lookup with expiring cache
//! - `parser` — location qualifier parsing ("in the bubble", "near Colonia", ...)
//! - `query` — RPC-facing composition of the above, plus the domain error wording
//! - `config` — recognized Supervisor configuration keys

pub mod collector;
pub mod config;
pub mod geometry;
pub mod histogram;
pub mod parser;
pub mod query;
pub mod reference;
pub mod remote;

pub use geometry::{Point3D, Sol};

/// Short git SHA this build was compiled from, embedded by `build.rs`.
pub const GIT_SHA: &str = env!("GIT_SHA");
