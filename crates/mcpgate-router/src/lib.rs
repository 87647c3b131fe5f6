//! Child process supervision, downstream abstraction, request/response
//! routing, and lock-free routing metrics.

pub mod child_supervisor;
pub mod downstream;
pub mod metrics;
pub mod router;

pub use child_supervisor::{ChildState, ChildSupervisor, ChildSupervisorConfig};
pub use downstream::{Downstream, RemoteDownstream};
pub use metrics::{RouterMetrics, RouterMetricsSnapshot};
pub use router::Router;
