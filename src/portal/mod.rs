//! Captive portal detection and authentication.
//!
//! - `core`: HTTP transport, client, response model.
//! - `engine`: tasks, providers and the per-run session.
//! - `detectors`: ordered provider dispatch.
//! - `providers`: the supported portal backends.
//! - `user_agents`: browser identity and random tokens.

pub mod core;
pub mod detectors;
pub mod engine;
pub mod providers;
pub mod user_agents;
