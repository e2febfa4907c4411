//! Typed data-access layer over the session port.
//!
//! # Responsibility
//! - Offer generic read/write repositories for any `Entity`.
//! - Compose queries and explicit eager loads without implicit I/O.
//!
//! # Invariants
//! - Repository writes call `Entity::validate()` before staging.
//! - Not-found is an absent value (`None` / `0`), never an error.
//! - Engine failures propagate unchanged inside `RepoError::Engine`.
//!
//! # See also
//! - `uow` for the transactional boundary around a repository.

mod codec;
pub mod error;
pub mod include;
pub mod query;
pub mod repository;

pub use error::{RepoError, RepoResult};
pub use include::{BelongsTo, HasMany, IncludeSpec, Navigation};
pub use query::Query;
pub use repository::{QueryRepository, Repository, RepositoryOptions, WriteRepository};
