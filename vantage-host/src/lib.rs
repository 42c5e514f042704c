//! # vantage-host — Desktop Session Worker
//!
//! Per-session worker process spawned by the Vantage broker. It attaches
//! to the channel endpoint the broker names, identifies itself with the
//! correlation token carried over that channel, and then runs one
//! [`vantage_core::DesktopSession`] until the channel closes.
//!
//! ## Modes
//!
//! - **Worker**: attach to a broker channel (`--channel <endpoint>`).
//! - **Bootstrap**: print the default configuration (`--gen-config`).

pub mod config;
pub mod service;
