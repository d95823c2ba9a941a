//! CLI support module
//!
//! Configuration shared by the `tributary-server` binary.

pub mod config;
