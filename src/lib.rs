#![cfg_attr(docsrs, feature(doc_cfg))]
//! # orionbms_lib
//!
//! This crate provides a client library for Orion 1000 series battery
//! management systems reachable over a serial-to-TCP bridge.
//!
//! The layers build on each other:
//!
//! - [`protocol`]: the byte-level frame codec (start/end bytes, length field,
//!   XOR checksum).
//! - [`commands`]: the command registry with typed request and response
//!   structures and their payload parsers.
//! - [`transport`]: a blocking TCP transport with connection lifecycle
//!   management and retries.
//! - [`client`]: the [`client::BmsClient`] dispatcher tying the above
//!   together, one typed method per device command.
//!
//! ## Features
//!
//! - `default`: Enables `bin-dependencies`, which is intended for compiling
//!   the `orionbms` command-line tool.
//! - `serde`: Enables `serde` serialization of response structures.
//! - `bin-dependencies`: Enables everything the `orionbms` binary needs.

/// Contains error types for the library.
mod error;
/// Defines the frame format of the Orion 1000 protocol.
pub mod protocol;

/// Command registry, request types and response parsers.
pub mod commands;

/// Blocking TCP transport to the device bridge.
pub mod transport;

/// High-level request dispatcher.
pub mod client;

pub use client::BmsClient;
pub use error::Error;
