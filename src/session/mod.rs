//! Session module root – re-exports public API surface.

pub mod types;
pub mod stage;
pub mod status;
pub mod config;
pub mod transport;
pub mod monitor;

pub use types::*;
pub use stage::parse_stage;
pub use status::{
    format_duration, sample_status, AndroidStatusDecoder, DecodedCounters, IosStatusDecoder,
    StatusDecoder,
};
pub use config::{count_remotes, randomize_remote};
pub use transport::{ControlTransport, StageEventFeed};
pub use monitor::{MonitorOptions, SessionCallbacks, SessionMonitor, StageCallback, StatusCallback};
