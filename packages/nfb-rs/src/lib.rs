pub mod acquisition;
pub mod config;
pub mod error;
pub mod gate;
pub mod logging;
pub mod pacer;
pub mod session;
pub mod stream;

pub use acquisition::{AcquisitionLoop, LoopReport, LoopSettings, Phase, Termination, WindowProcessor};
pub use config::{RawSessionConfig, SessionConfig};
pub use error::{NfbError, Result};
pub use gate::{ControlGate, GateState};
pub use logging::{LogEntry, QueueLogger};
pub use pacer::Pacer;
pub use session::{Session, SessionOutcome};
pub use stream::{
    create_backend, operator_channel, SourceConfig, StreamBackend, StreamDescriptor, StreamInfo,
    StreamLocator, StreamReceiver, Window, WindowSource,
};
