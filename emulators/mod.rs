//! Device emulators
//!
//! In-memory stand-ins for the hardware and kernel services the driver
//! runs against, for tests and for embedders without the real IP core.

pub mod irqgen;
