//! feedrun API server library.
//!
//! Exposes config, state, error handling, routes and catalog seeding so
//! integration tests and the binary entrypoint can both access them.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;
pub mod seed;
pub mod state;
