pub mod classifier;
pub mod cli;
pub mod config;
pub mod handlers;
pub mod router;
pub mod signal_processing;
pub mod state;
pub mod storage;
pub mod streaming;

pub use config::ServerConfig;
pub use router::{build_router, cors_layer};
pub use state::ServerState;
pub use streaming::{PipelineConfig, PipelineCoordinator, SessionManager};
