//! Generic data-access layer: typed repositories and units of work over a
//! pluggable persistence session, with a SQLite engine.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod session;
pub mod uow;

pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::entity::{Entity, EntityKey, EntityValidationError, KeyValue};
pub use model::paged::PagedResult;
pub use repo::{
    BelongsTo, HasMany, IncludeSpec, Navigation, Query, QueryRepository, RepoError, RepoResult,
    Repository, RepositoryOptions, WriteRepository,
};
pub use session::{share, EngineError, Session, SharedSession, SqliteSession};
pub use uow::{TransactionStrictness, UnitOfWork, UnitOfWorkOptions};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
