//! Shared types for the spark workspace: domain models, realtime events and
//! HTTP API payloads.

pub mod api;
pub mod events;
pub mod models;
