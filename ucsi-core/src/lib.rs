#![no_std]

// Integration core between a MOST network stack and a host event loop.
//
// This crate stays portable across MCU firmware and host tooling by avoiding the
// Rust standard library. Hosts plug in through `host::IntegrationHost`, stacks
// through `stack::NetworkStack`.

pub mod command;
pub mod console;
pub mod host;
pub mod integration;
pub mod queue;
pub mod sim;
pub mod stack;
pub mod telemetry;

pub use integration::{ProtocolViolation, Ucsi, UcsiOptions};
