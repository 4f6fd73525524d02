mod errors;
mod manager;
mod progress;
mod session;
mod traits;
mod types;
mod validation;
mod view;
mod worker;

pub use errors::{Result, UploadError, ValidationError};
pub use manager::{Uploader, UploaderHandle};
pub use progress::{estimate, percent_complete, ProgressEstimator};
pub use session::TransferSession;
pub use traits::{
    BackendNotice,
    StorageBackend,
    TransferEvent,
    TransferEvents,
    TransferHandle,
    TransferRequest,
};
pub use types::{
    DerivedMetrics,
    DestinationBuilder,
    ErrorCallback,
    FileBody,
    FileInfo,
    ProgressSample,
    SessionId,
    SessionSnapshot,
    SourceFile,
    UploadOutcome,
    UploadState,
    UploadedCallback,
    UploaderOptions,
};
pub use validation::{guess_content_type, validate, AcceptFilter};
pub use view::UploadView;
