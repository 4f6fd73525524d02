pub mod config;
pub mod core;
pub mod tus;
pub mod utils;

pub use crate::core::{
    AcceptFilter,
    SessionSnapshot,
    SourceFile,
    StorageBackend,
    TransferHandle,
    UploadError,
    UploadOutcome,
    UploadState,
    UploadView,
    Uploader,
    UploaderHandle,
    UploaderOptions,
    ValidationError,
    Result,
};

pub use crate::tus::{TusBackend, TusClient, RequestHook};
