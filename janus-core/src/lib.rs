#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    clippy::unused_self,
    missing_debug_implementations,
    rust_2018_idioms
)]
#![allow(clippy::too_many_arguments)]

//! # Janus Core
//!
//! Shared domain model, error hierarchy, logging setup, shutdown traits and
//! configuration structs used by every other crate in the Janus multi-broker
//! execution middleware.
//!
//! Nothing in this crate talks to a broker or a network socket: it only
//! defines the shapes that the rest of the workspace agrees on. See
//! [`data`] for the entities from the data model, [`error`] for the domain
//! error kinds, and [`config`] for what a deployment feeds into a running
//! server.

pub mod config;
pub mod data;
pub mod error;
pub mod ids;
pub mod logging;
pub mod shutdown;
