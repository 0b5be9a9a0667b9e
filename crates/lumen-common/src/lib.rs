//! Shared types for the Lumen optical control plane.
//!
//! This crate contains:
//! - **Protocol messages** — Kafka message types between controllers and agents
//! - **Data models** — topology, virtual operator, and connection types
//! - **ID generation** — prefixed UUIDv7 helpers (`con_`, `cmd_`)
//! - **Configuration** — typed per-service config records built from the environment
//! - **Retry policy** — bounded exponential backoff for infrastructure calls
//! - **LinkDB client** — the HTTP client every service uses to reach LinkDB
//! - **Topology graph** — shortest-path computation shared by LinkDB and the controllers

pub mod config;
pub mod graph;
pub mod ids;
pub mod linkdb;
pub mod models;
pub mod protocol;
pub mod retry;
