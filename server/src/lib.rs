//! # Presence Board Server Library
//!
//! This library provides the authoritative server implementation for the
//! shared grid presence board. It owns the canonical participant state,
//! validates movement and appearance changes, and fans consistent state
//! snapshots out to every connected client.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Session State
//! The server holds the single source of truth for who is present, how
//! they appear, and where they stand on the grid. Clients only ever
//! receive snapshots; they never mutate state directly.
//!
//! ### Validation Under Concurrency
//! Movement requests are checked against a fixed per-request range budget,
//! square occupancy, and the current grid bounds, with a per-connection
//! debounce dropping bursts. Simultaneous requests from different
//! connections are serialized by the dispatch loop, so validation always
//! runs against a consistent view.
//!
//! ### State Broadcasting
//! Every accepted mutation re-broadcasts the affected state slice to all
//! connected channels as a single compressed message per channel, so no
//! client can observe a half-applied transition.
//!
//! ## Architecture Design
//!
//! The server uses a single-threaded, event-driven dispatch loop: each
//! inbound event is handled to completion, including its broadcast,
//! before the next one is processed. Connection tasks only parse frames
//! and forward typed events over channels; they never touch shared state.
//!
//! ## Module Organization
//!
//! - [`registry`]: participant records, join validation, movement
//!   application, disconnect cleanup
//! - [`movement`]: the stateless movement validation policy
//! - [`board`]: grid dimensions and background image configuration
//! - [`broadcast`]: snapshot encoding and fan-out to connected channels
//! - [`network`]: WebSocket accept loop, connection tasks, and the
//!   dispatch loop tying everything together

pub mod board;
pub mod broadcast;
pub mod movement;
pub mod network;
pub mod registry;
