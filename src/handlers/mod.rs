mod error;
mod health;
mod ingest;
mod session;
mod ws;

pub use error::*;
pub use health::*;
pub use ingest::*;
pub use session::*;
pub use ws::*;
