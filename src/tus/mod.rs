mod backend;
mod client;
mod errors;
mod metadata;
mod progress_stream;

pub use backend::TusBackend;
pub use client::{RequestHook, TusClient, DEFAULT_BUFFER_SIZE, TUS_RESUMABLE};
pub use errors::{Result, TusError};
pub use metadata::Metadata;
pub use progress_stream::ProgressStream;
