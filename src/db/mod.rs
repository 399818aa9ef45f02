//! PostgreSQL persistence: per-worker DAO, retry policy, schema bootstrap.

pub mod dao;
pub mod retry;
pub mod setup;

pub use dao::{Dao, ExecutionRecord, NewPackage, NewSample, PackageRow};
pub use retry::RetryPolicy;
