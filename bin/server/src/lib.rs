//! threadline HTTP server.
//!
//! This crate wires the messaging service to its backends (PostgreSQL or
//! in-memory stores, filesystem attachments, NATS or stored notifications)
//! and exposes it as a JSON API.

pub mod attachments;
pub mod config;
pub mod db;
pub mod error;
pub mod notify;
pub mod routes;
pub mod state;
