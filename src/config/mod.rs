//! Configuration management for window-keeper
//!
//! - **profile**: the JSON settings file with global settings and named profiles
//!   of window rules. The engine only ever sees the active profile.

pub mod profile;

pub use profile::{Config, Profile, WindowConfig};
