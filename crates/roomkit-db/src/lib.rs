//! # roomkit-db
//!
//! Database layer implementing the `roomkit-core` repository traits with PostgreSQL via SQLx.
//!
//! - Connection pool management and embedded-directory migrations
//! - Database models with SQLx `FromRow` derives
//! - Model to entity mappers
//!
//! ```rust,ignore
//! use roomkit_db::{create_pool, run_migrations, DatabaseConfig, PgProfileRepository};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! run_migrations(&pool).await?;
//! let profiles = PgProfileRepository::new(pool);
//! ```

pub mod mappers;
pub mod models;
pub mod pool;
pub mod repositories;

// Re-export commonly used types
pub use pool::{create_pool, migrations_dir, run_migrations, DatabaseConfig, PgPool};
pub use repositories::{PgLlmResultRepository, PgProfileRepository};
