pub mod execution;
pub mod language;
pub mod session;

pub use execution::{Execution, ExecutionStatus};
pub use language::{Language, RuntimeKey};
pub use session::{Session, SessionStatus};
