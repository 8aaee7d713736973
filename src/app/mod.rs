//! Application core — pure domain logic, zero I/O.
//!
//! This module wires the provisioning building blocks together: boot-time
//! mode decision, join supervision, and the portal exchange protocol.
//! All interaction with storage, radio and clock happens through **port
//! traits** defined in [`ports`], keeping this layer fully testable without
//! real peripherals.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
