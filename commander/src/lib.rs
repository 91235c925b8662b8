//! Deploy Commander Library
//!
//! Deploys a fleet of CMS servers over SSH, webhooks or the beacon agent and
//! keeps an audit log of every attempt.

pub mod commands;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod models;
pub mod storage;
pub mod transport;
pub mod utils;
