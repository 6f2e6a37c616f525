//! Booking lifecycle, availability, pricing, and review aggregation for a
//! workspace-rental marketplace.
//!
//! The embedding server (HTTP handlers, auth, search UI) is expected to hand
//! this crate well-formed requests; everything here is keyed by property and
//! serialized per property, so admission for different properties never
//! contends. State is rebuilt from an append-only event log on startup.

pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod sweeper;
pub mod wal;
