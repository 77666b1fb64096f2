//! Backend driver implementations.
//!
//! Each driver implements [`Driver`](crate::core::traits::Driver) and its
//! companion traits, and is gated behind a Cargo feature:
//!
//! - [`postgres`]: PostgreSQL via tokio-postgres (feature `postgres`)
//!
//! Drivers are registered by name in [`DriverCatalog`](crate::core::DriverCatalog).

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "postgres")]
pub use postgres::PostgresDriver;
