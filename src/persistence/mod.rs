//! Reference persistence adapter: a `sqlx`/Postgres implementation of the
//! narrow service-bundle traits declared in [`crate::audit`].
//!
//! Callers are never required to use this adapter — `ServiceBundle` is a
//! trait for a reason — but it's the one this crate ships.

pub mod postgres;

pub use postgres::{init_pool, PostgresPool, PostgresServiceBundle};
