// src/exec/mod.rs

//! Container engine layer.
//!
//! - [`backend`] provides the `ContainerEngine` trait the coordinator talks
//!   to, which tests can replace with a fake implementation.
//! - [`compose`] is the production engine, driving `docker compose` with
//!   `tokio::process::Command`.

pub mod backend;
pub mod compose;

pub use backend::{ContainerEngine, EngineFuture};
pub use compose::ComposeEngine;
