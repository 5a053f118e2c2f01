//! Domain core for the feedrun plugin-instance orchestrator.
//!
//! Pure types and decision logic with zero internal dependencies so the
//! repository adapters, the compute adapters and the orchestrator can all
//! share one definition of the lifecycle.

pub mod error;
pub mod parameters;
pub mod paths;
pub mod plugin;
pub mod resolver;
pub mod scheduling;
pub mod status;
pub mod types;
