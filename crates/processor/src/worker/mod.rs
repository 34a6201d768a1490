//! Pollers and worker pools
//!
//! This module provides:
//! - [`LinearBackoff`] - Retry delay for failed fetches
//! - [`Invocation`] / [`invoke`] - Fault-capturing handler invocation
//! - [`TaskHandler`] - Boxed handler function type
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                 One handler registration                  │
//! │                                                           │
//! │  ┌─────────────┐   mpsc(1)   ┌─────────────────────────┐  │
//! │  │   Poller    │────────────►│ Worker 1 .. Worker N    │  │
//! │  │ fetchAndLock│             │ (shared receiver)       │  │
//! │  │ + backoff   │             │ invoke → report outcome │  │
//! │  └─────────────┘             └─────────────────────────┘  │
//! └──────────────────────────────────────────────────────────┘
//! ```

mod poller;
mod pool;

pub use poller::LinearBackoff;
pub use pool::{invoke, HandlerFuture, Invocation, TaskHandler};

pub(crate) use poller::Poller;
pub(crate) use pool::{boxed_handler, spawn_workers, TaskReceiver};
