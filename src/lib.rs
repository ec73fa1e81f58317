//! # fleet-monitor
//!
//! Reconciliation core for a CI host fleet.
//!
//! A monitoring run flags hosts and tasks that have drifted from policy
//! (idle, over capacity, stuck provisioning, expired, lost heartbeat),
//! cleans them up with per-item failure isolation, probes running hosts,
//! and warns the people who need to know. Every host transition lands in
//! an append-only audit log.

pub mod config;
pub mod db;
pub mod error;
pub mod event;
pub mod model;
pub mod monitor;
pub mod services;
pub mod store;
pub mod telemetry;

pub use error::{Error, Result};
