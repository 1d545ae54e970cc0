//! BACnet snapshot replay.
//!
//! Rebuilds device models from a snapshot database and serves them as a
//! router device on a BACnet/IP network plus peer devices on a virtual
//! segment behind it.
//!
//! # Modules
//!
//! - `store`: snapshot database of `(devid, objid, propid) -> value` records
//! - `model`: device and object models rebuilt from the store
//! - `network`: addressing, transport, virtual segment and topology
//! - `service`: requests, completion handles and the event loop
//! - `console`: operator command parsing and printing
//! - `dump`: snapshot printing
//! - `config`, `logging`, `cli`, `error`: ambient plumbing
#![forbid(unsafe_code)]

pub mod cli;
pub mod config;
pub mod console;
pub mod dump;
pub mod error;
pub mod logging;
pub mod model;
pub mod network;
pub mod object;
pub mod service;
pub mod store;
pub mod value;
