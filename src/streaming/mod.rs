// Real-time CTG streaming pipeline
//
// Samples from the device producers flow through a session's coordinator
// into two buffers (live window and full trace) and a bounded durability
// queue. Three periodic tasks read those buffers: the broadcaster pushes
// cleaned payloads to viewers, the persistence flusher writes the full
// trace to the store, and the external flusher calls the classifier.
//
// Architecture:
// - `types`: samples, channels, snapshots and the streaming error type
// - `buffer`: lock-guarded sample buffers with pluggable retention
// - `export`: `time,value` CSV encoding
// - `ingest_queue`: lock-free drop-newest durability queue
// - `analytics`: capped classifier event log
// - `viewers`: registry of connected live viewers
// - `payload`: viewer message shapes
// - `coordinator`: per-session owner of all of the above
// - `tasks`: broadcaster, persistence and external flush loops
// - `source`: line-oriented serial producers
// - `emulator`: external replay process
// - `session`: start/stop choreography and the single-session manager

pub mod analytics;
pub mod buffer;
pub mod coordinator;
pub mod emulator;
pub mod export;
pub mod ingest_queue;
pub mod payload;
pub mod session;
pub mod source;
pub mod tasks;
pub mod types;
pub mod viewers;

pub use analytics::{AnalyticsEvent, AnalyticsLog, DEFAULT_ANALYTICS_CAPACITY};
pub use buffer::{RetainAll, RetentionPolicy, SampleBuffer, SessionBuffers, Windowed};
pub use coordinator::{PipelineConfig, PipelineCoordinator};
pub use export::{read_series_csv, write_series_csv, CsvExport};
pub use ingest_queue::{IngestPoint, IngestQueue, QueueMetrics, DEFAULT_INGEST_CAPACITY};
pub use payload::{InitialSnapshot, ViewerPayload};
pub use session::{
    Session, SessionDeps, SessionHandle, SessionManager, SessionSettings, StartRequest,
    DEFAULT_BAUD_RATE,
};
pub use tasks::PersistenceFlusher;
pub use types::{Channel, Sample, Snapshot, StreamError, StreamResult};
pub use viewers::{ViewerReceiver, ViewerRegistry};
