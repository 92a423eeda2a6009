//! Scan, anomaly-detection, and direction-finding core for the sweep platform.
//!
//! The modules follow the receive chain: the resource manager leases
//! physical receivers to the parallel scan engine, scored anomalies from the
//! detection engine drive the mode controller, and the direction-finding
//! engine turns coherent array captures into bearings. Persistence, the
//! dashboards, and demodulation live outside this crate and consume the
//! [`events::Event`] stream.

pub mod config;
pub mod detection;
pub mod df;
pub mod events;
pub mod hardware;
pub mod math;
pub mod mode;
pub mod prelude;
pub mod scanning;
pub mod telemetry;

/// Common error type for the core.
///
/// Hardware faults are recovered locally (the unit is marked faulted and the
/// system continues with reduced capacity); only configuration errors are
/// fatal, and only at startup.
#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    #[error("hardware enumeration failed: {0}")]
    Enumeration(String),
    #[error("no idle receiver available for role {0}")]
    ResourceBusy(String),
    #[error("only faulted receivers remain for role {0}")]
    ResourceFaulted(String),
    #[error("tune failed on unit {unit}: {reason}")]
    Tune { unit: usize, reason: String },
    #[error("i/o failed on unit {unit}: {reason}")]
    Io { unit: usize, reason: String },
    #[error("array synchronization failed: {0}")]
    Sync(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
