//! Domain model (ids, statuses, records, snapshots, metric derivation, errors).

pub mod errors;
pub mod ids;
pub mod metrics;
pub mod record;
pub mod snapshot;
pub mod status;

pub use self::errors::{ErrorKind, FetchError, TrackerError};
pub use self::ids::{CorrelationId, JobId, PollerToken};
pub use self::metrics::DerivedMetrics;
pub use self::record::{LatestMetrics, MetricPoint, TaskPatch, TaskRecord};
pub use self::snapshot::{MetricsSnapshot, StatusSnapshot};
pub use self::status::{DeploymentStatus, JobStatus, TrainingStatus};
