//! # opskit
//!
//! **Opskit** is a small toolbox of operational primitives for building
//! reliable async clients and pipelines.
//!
//! It provides three independent, composable components. None of them depends
//! on the others; use one or all three.
//!
//! | Area              | Description                                                      | Key types / functions                    |
//! |-------------------|------------------------------------------------------------------|------------------------------------------|
//! | **Retries**       | Exponential backoff with jitter, permanent-error classification. | [`Backoff`], [`Policy`], [`Record`]      |
//! | **State machine** | Routing state machine: each state picks its successor.           | [`machine::run`], [`Request`], [`State`] |
//! | **Signalling**    | Bilateral hand-off: send a value, get an acknowledgement back.   | [`Signaler`], [`Acker`]                  |
//! | **Cancellation**  | Context-like cancellation handle with an optional deadline.      | [`Context`], [`CancelError`]             |
//!
//! ## Optional features
//! - `http`: exports an HTTP transient-error classifier built on `reqwest`.
//! - `grpc`: exports a gRPC status-code classifier built on `tonic`.
//!
//! ## Retrying an operation
//!
//! ```no_run
//! use opskit::{Backoff, Context};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let backoff = Backoff::new();
//! let ctx = Context::with_timeout(std::time::Duration::from_secs(30));
//!
//! let body = backoff
//!     .retry(&ctx, |_ctx, _record| async move { fetch().await })
//!     .await?;
//! # Ok(())
//! # }
//! # async fn fetch() -> Result<String, opskit::BoxError> { Ok(String::new()) }
//! ```
//!
//! ## Routing state machine
//!
//! ```
//! use opskit::{machine, state, Context, Request};
//! use serde::Serialize;
//!
//! #[derive(Default, Serialize)]
//! struct Order {
//!     total: u64,
//!     discounted: bool,
//! }
//!
//! fn price(mut req: Request<Order>) -> Request<Order> {
//!     req.data.total = 100;
//!     req.next = Some(state!(discount));
//!     req
//! }
//!
//! fn discount(mut req: Request<Order>) -> Request<Order> {
//!     req.data.total -= 10;
//!     req.data.discounted = true;
//!     req.next = None; // done
//!     req
//! }
//!
//! let req = Request::new(Context::new(), Order::default(), state!(price));
//! let out = machine::run("pricing", req).unwrap();
//! assert_eq!(out.data.total, 90);
//! ```

pub mod context;
pub mod machine;
pub mod retry;
pub mod signal;

pub use context::{CancelError, Context};
pub use machine::{Request, RunError, RunOptions, State};
pub use retry::{Backoff, Policy, Record, TimeTable};
pub use signal::{Acker, SignalError, Signaler};

/// A type-erased error owned by the caller.
///
/// Operation callbacks and state functions report failures through this type
/// so arbitrary error types can flow through transformer chains and cause
/// chains without the crate imposing its own error enum on callers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
