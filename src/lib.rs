//! Feed fan-out with a consistent per-viewer feed cache.
//!
//! Publishing persists a post, indexes it, and pushes a preview into the
//! cached feed of every follower. Reads prefer the cache and rebuild from the
//! post store when it is cold or unreachable.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod util;
