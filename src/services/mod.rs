pub mod processing;
pub mod resolver_cache;
pub mod session_aggregator;
pub mod submission;
pub mod upload_orchestrator;
pub mod validation;

pub use processing::ProcessingCoordinator;
pub use resolver_cache::ResolverCache;
pub use session_aggregator::{
    compute_totals, default_date_range, group_into_sessions, group_sessions_by_day, paginate,
    preset_range, LoadOutcome, ReportFeed,
};
pub use submission::{ReportSubmissionGateway, SubmissionReport};
pub use upload_orchestrator::{UploadOrchestrator, UploadOutcome, UploadReport, UploadRun};
pub use validation::FileValidator;
