//! HTTP handlers.

pub mod envs;
pub mod files;
pub mod health;
pub mod metrics;
pub mod refresh;
