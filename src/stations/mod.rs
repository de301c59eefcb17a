mod fingerprint;
pub mod identity;
mod models;

pub use fingerprint::build_stations_fingerprint;
pub use identity::{
    canonicalize, derive_id, generate_id, legacy_id, resolve, resolve_mut, IdAlgorithm,
};
pub use models::{
    CheckResult, EnrichmentFeature, EnrichmentState, EnrichmentStatus, HealthStatus,
    ProtocolChecks, QualityCheck, Station, StationLocation,
};
