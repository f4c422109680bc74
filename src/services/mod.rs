mod execution_service;
mod language_service;
mod session_service;

pub use execution_service::ExecutionService;
pub use language_service::LanguageService;
pub use session_service::{MAX_SOURCE_BYTES, SessionService};
