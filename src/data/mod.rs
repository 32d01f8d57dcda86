//! Data layer module
//!
//! Handles all remote data access and caching:
//! - Backend connection (PostgREST)
//! - Query cache (volatile)
//! - Chainable table queries

mod backend;
mod cache;
mod query;

pub use backend::{Backend, BackendError, PostgrestBackend, Row};
pub use cache::QueryCache;
pub use query::{Direction, Filter, Order, Query, QueryState, Table};
