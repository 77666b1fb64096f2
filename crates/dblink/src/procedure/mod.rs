//! Stored procedure invoker.
//!
//! Procedures are described with [`Procedure::builder`](crate::core::procedure::Procedure::builder)
//! (or read from the catalog by the introspector) and invoked through
//! [`DataLink::call`](crate::link::DataLink::call), which delegates to [`invoke`].

mod invoker;

pub use invoker::{invoke, CallResult};
