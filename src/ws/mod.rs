//! WebSocket layer: connection handling, message routing, subscriptions.
//!
//! The WebSocket endpoint at `/ws` lets scoreboards and controller screens
//! follow the signals of the events they subscribe to, and lets timing
//! stations submit lane times without going through REST.

pub mod connection;
pub mod handler;
pub mod messages;
pub mod subscription;
