//! Mock cloud for keel
//!
//! An in-memory `CloudAdapter` with the observable behavior of a real
//! provider: sequential identifiers, name-tag lookup, dependency
//! violations on out-of-order deletes, and deterministic instance
//! addresses. Tests script transient failures per operation and read
//! the call log back to assert what the reconciler actually did.
//!
//! # Example
//!
//! ```ignore
//! use keel_cloud_mock::MockCloud;
//! use keel_cloud::{NoScripts, Reconciler, Session};
//! use std::sync::Arc;
//!
//! let mock = Arc::new(MockCloud::new());
//! let session = Session::new(mock.clone(), Arc::new(NoScripts));
//! let reconciler = Reconciler::new(session);
//! ```

pub mod adapter;

pub use adapter::MockCloud;
