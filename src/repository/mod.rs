mod connection;
mod execution_repository;
mod language_repository;
mod session_repository;

pub use connection::{establish_connection, seed_languages};
pub use execution_repository::ExecutionRepository;
pub use language_repository::LanguageRepository;
pub use session_repository::SessionRepository;

pub type DbPool = sqlx::SqlitePool;
