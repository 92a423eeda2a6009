//! Common imports for embedders.

pub use crate::config::{
    AnomalyConfig, ControllerConfig, DfConfig, EngineConfig, PriorityWeights, ScanConfig,
};
pub use crate::detection::{Anomaly, AnomalyCategory, AnomalyEngine};
pub use crate::df::{ArrayGeometry, Bearing, CalibrationReport, DfEngine};
pub use crate::events::{Event, EventSink, FanoutSink, RecordingSink};
pub use crate::hardware::{
    HealthState, LeaseHandle, ReceiverBackend, ReceiverDescriptor, ReceiverUnit, ResourceManager,
    Role, SampleBlock,
};
pub use crate::mode::{ModeController, ModeState};
pub use crate::scanning::{BandAssignment, ScanEngine, SpectrumSample};
pub use crate::telemetry::{LogSink, MetricsRecorder, MetricsSnapshot};
pub use crate::{CoreError, CoreResult};
