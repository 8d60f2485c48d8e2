//! Realtime fan-out: the in-process event dispatcher and the WebSocket
//! gateway that relays it to connected clients.

pub mod connection;
pub mod dispatcher;
pub mod tokens;
