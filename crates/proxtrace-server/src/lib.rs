//! # proxtrace-server
//!
//! HTTP server library for the proxtrace proximity tracer.
//!
//! This library provides the API handlers and the composition root that wires
//! the trace coordinator to its radio and settings collaborators.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod api;
pub mod lifecycle;
pub mod logging;
pub mod state;
