//! # soniq-backend
//!
//! Distributed backend interface for the soniq JSONiq engine, with an
//! in-process reference implementation.
//!
//! The engine core programs against three surfaces:
//! - [`Rdd`]: a partitioned collection (`map`/`filter`/`collect`/`count`/
//!   `cache`/`take`)
//! - [`Frame`]: a typed tabular collection (named typed columns, projection,
//!   distinct, order-by, row callbacks with a declared return schema)
//! - [`Session`]: the handle that distributes local data and manages temp
//!   views
//!
//! A cluster-backed implementation substitutes these types without touching
//! the engine; the reference implementation executes everything in process
//! and is what the engine's equivalence tests run against.

pub mod error;
pub mod frame;
pub mod rdd;
pub mod session;

pub use error::{BackendError, Result, UdfError};
pub use frame::{compare_cells, Cell, ColumnType, Field, Frame, Row, Schema, SortKey};
pub use rdd::Rdd;
pub use session::{Session, DEFAULT_PARTITIONS};
