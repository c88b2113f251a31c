//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the session core:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the core runtime utilities that other modules depend on.
//! It establishes the logging conventions, configuration validation, and event
//! broadcasting mechanisms used throughout the system.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
