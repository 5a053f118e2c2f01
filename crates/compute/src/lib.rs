//! Compute backends for plugin containers.
//!
//! [`ComputeBackend`] is the submit/poll/cancel contract the orchestrator
//! drives. [`PfconClient`] implements it over HTTP and [`ComputeRegistry`]
//! maps compute resource names to backends.

pub mod backend;
pub mod command;
pub mod error;
pub mod pfcon;
pub mod registry;

pub use backend::{ComputeBackend, RemoteStatus, SubmitRequest};
pub use error::ComputeError;
pub use pfcon::PfconClient;
pub use registry::{ComputeRegistry, ComputeResourceConfig};
