//! Common library for the identity platform
//!
//! Shared infrastructure used by the service binaries: PostgreSQL pool
//! configuration and health checks, the database error type, and tracing
//! setup.
//!
//! ```rust,no_run
//! use common::database::{DatabaseConfig, health_check, init_pool};
//!
//! # async fn connect() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DatabaseConfig::from_env()?;
//! let pool = init_pool(&config).await?;
//! assert!(health_check(&pool).await?);
//! # Ok(())
//! # }
//! ```

pub mod database;
pub mod error;
pub mod telemetry;
