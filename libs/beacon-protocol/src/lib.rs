//! Beacon protocol
//!
//! Request and response models spoken with the beacon agent that runs on
//! deployment targets.

pub mod models;

pub use models::*;
