//! Keel Cloud Reconciliation
//!
//! This crate turns a declared cluster into cloud infrastructure by
//! diffing desired state against observed state, one resource at a
//! time, in dependency order.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                    Keel CLI                      │
//! │                  (keel up/down)                  │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                keel-cloud                        │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │   Model (ordered resource list)           │   │
//! │  │   Reconciler (expected / actual / apply)  │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────┐            │
//! │  │ State Mgmt   │  │ Retry / Wait │            │
//! │  └──────────────┘  └──────────────┘            │
//! └───────┬─────────────────────────────────────────┘
//!         │
//! ┌───────▼───────┐
//! │ CloudAdapter  │
//! │ (per cloud)   │
//! └───────────────┘
//! ```
//!
//! The model is a flat list whose order IS the dependency encoding:
//! reconcile walks it forward, destroy walks it backward. Every
//! resource implements the same four-operation contract (actual,
//! expected, apply, delete), each operation returning a refined
//! immutable snapshot of the cluster alongside its resource state.

pub mod adapter;
pub mod compare;
pub mod error;
pub mod model;
pub mod plan;
pub mod reconciler;
pub mod resource;
pub mod resources;
pub mod retry;
pub mod script;
pub mod state;

// Re-exports
pub use adapter::{CloudAdapter, CreatePoolRequest};
pub use error::{CloudError, Result};
pub use model::Model;
pub use plan::{Action, ActionType, Plan, PlanSummary};
pub use reconciler::{InterruptFlag, Reconciler};
pub use resource::{Resource, ResourceKind, ResourceState, Session};
pub use retry::{RetryPolicy, WaitPolicy, is_retryable, wait_until};
pub use script::{NoScripts, ScriptBuilder, encode_user_data};
pub use state::{StateFile, StateLock, StateStore};
