pub mod loaders;
pub mod processed;
pub mod reference;
pub mod report;
pub mod session;
pub mod upload;
pub mod user;

pub use loaders::{load_capture_file, load_capture_folder};
pub use processed::{CountItem, CountRequest, CountResponse, ProcessedItem};
pub use reference::{AccessUrl, CorrelationId, SignedUrl, StorageReference};
pub use report::{
    normalize_reports, Page, PageCursor, ReportBatch, ReportFilters, ReportPayload, ReportQuery,
    ReportRecord, SubmissionResult, SubmissionStatus,
};
pub use session::{DayGroup, ReportSession, SessionSummary};
pub use upload::{
    TransferProgress, TransferReceipt, UploadEvent, UploadFile, UploadState, UploadTask,
    UploadedFile,
};
pub use user::KnownUser;
