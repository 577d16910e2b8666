//! Test helpers for gitfs-server.

#![allow(dead_code, unused_imports)]

pub mod client;
pub mod source;

pub use client::{TestClient, TestResponse, client, client_with};
pub use source::MockSource;
