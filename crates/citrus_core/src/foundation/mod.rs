//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the runtime:
//! - Math types and the transform value carried by every entity
//! - Logging utilities

pub mod math;
pub mod logging;
