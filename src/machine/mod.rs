//! # Routing state machine.
//!
//! A state machine where each state picks its own successor. A state is a
//! plain function from [`Request`] to [`Request`]: it mutates the request's
//! `data`, sets `err` to stop with a failure, and sets `next` to route to
//! the next state (or leaves it `None` to finish). The runner owns the loop;
//! states never call each other.
//!
//! ```text
//! run(name, req)
//!   ├─► validate (name, next, err)
//!   └─► loop while next is set:
//!         ├─► cycle check (opt-in)
//!         ├─► clear next, invoke state
//!         ├─► err set  → stop with the error
//!         └─► next unset → done
//! ```
//!
//! Machines of this design keep routing decisions next to the work they
//! route, which makes each state testable in isolation: build a request,
//! call the state function, assert on the returned request.
//!
//! ## Naming states
//!
//! States carry an explicit name used in traces and cycle reports. The
//! [`state!`](crate::state) macro derives it from the function path:
//!
//! ```
//! use opskit::{machine, state, Context, Request};
//!
//! #[derive(serde::Serialize)]
//! struct Counter(u32);
//!
//! fn bump(mut req: Request<Counter>) -> Request<Counter> {
//!     req.data.0 += 1;
//!     req.next = None;
//!     req
//! }
//!
//! let req = Request::new(Context::new(), Counter(0), state!(bump));
//! let out = machine::run("bump", req).unwrap();
//! assert_eq!(out.data.0, 1);
//! ```
//!
//! ## Tracing
//!
//! When a `tracing` subscriber is active the runner opens a `statemachine`
//! span for the whole run and a `state` span per state, and records JSON
//! snapshots of `data` at the run boundaries. With no subscriber nothing is
//! serialized.

use std::fmt;

use serde::Serialize;
use smallvec::SmallVec;
use thiserror::Error;

use crate::context::Context;
use crate::BoxError;

/// Visited-state names for cycle detection. Routing depth is expected to be
/// small, so the list lives inline and lookups are linear scans.
type Seen = SmallVec<[&'static str; 8]>;

/// A named state function.
///
/// Prefer the [`state!`](crate::state) macro over [`State::new`]; it keeps
/// the name in sync with the function.
pub struct State<T> {
    name: &'static str,
    f: fn(Request<T>) -> Request<T>,
}

impl<T> State<T> {
    /// Pairs a state function with its display name.
    pub fn new(name: &'static str, f: fn(Request<T>) -> Request<T>) -> Self {
        Self { name, f }
    }

    /// The name used in traces and cycle reports.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for State<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for State<T> {}

impl<T> fmt::Debug for State<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("State").field(&self.name).finish()
    }
}

/// Derives a [`State`](crate::machine::State) from a function path, using
/// the path itself as the state's name.
#[macro_export]
macro_rules! state {
    ($f:path) => {
        $crate::machine::State::new(stringify!($f), $f)
    };
}

/// The request threaded through every state.
///
/// `data` is the caller-owned payload; the runner only carries it. On entry
/// to [`run`], `next` must point at the initial state and `err` must be
/// unset. On exit exactly one holds: the run failed with an error, or `next`
/// is `None` and the returned request carries the final `data`.
#[derive(Debug)]
pub struct Request<T> {
    /// Cancellation handle, available to every state.
    pub ctx: Context,

    /// Caller-owned payload, mutated by states.
    pub data: T,

    /// Set by a state to stop the machine with a failure.
    pub err: Option<BoxError>,

    /// The state to execute next; `None` stops the machine.
    pub next: Option<State<T>>,

    seen: Option<Seen>,
}

impl<T> Request<T> {
    /// A request positioned at its initial state.
    pub fn new(ctx: Context, data: T, start: State<T>) -> Self {
        Self {
            ctx,
            data,
            err: None,
            next: Some(start),
            seen: None,
        }
    }
}

/// Options for [`run_with`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Abort with [`RunError::Cycle`] when a state is entered twice.
    pub detect_cycles: bool,
}

/// Failures surfaced by [`run`].
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RunError {
    /// The machine name was empty.
    #[error("name is empty")]
    NameEmpty,

    /// `request.next` was unset on entry.
    #[error("request.next is unset, must be set to the initial state")]
    NextMissing,

    /// `request.err` was already set on entry.
    #[error("request.err is already set")]
    ErrPreset,

    /// A state stopped the machine with an error.
    #[error("state '{state}' failed: {source}")]
    State {
        /// Name of the failing state.
        state: &'static str,
        /// The error the state set.
        #[source]
        source: BoxError,
    },

    /// Cycle detection saw a state twice; the trace lists every state
    /// entered, arrow-joined, ending with the repeat.
    #[error("cycle detected: {trace}")]
    Cycle {
        /// Arrow-joined list of entered states, e.g. `A -> B -> A`.
        trace: String,
    },

    /// The executor dispatched with no state recorded. Never produced by
    /// valid inputs.
    #[error("bug: state executed with request.next unset")]
    Internal,
}

/// Runs the machine with default options.
pub fn run<T: Serialize>(name: &str, req: Request<T>) -> Result<Request<T>, RunError> {
    run_with(name, req, RunOptions::default())
}

/// Runs the machine until a state leaves `next` unset (success), a state
/// sets `err`, or — with cycle detection on — a state repeats.
///
/// `name` labels the run in traces. Preconditions are checked before any
/// state executes; a violation returns its specific error immediately.
pub fn run_with<T: Serialize>(
    name: &str,
    mut req: Request<T>,
    options: RunOptions,
) -> Result<Request<T>, RunError> {
    if name.trim().is_empty() {
        return Err(RunError::NameEmpty);
    }
    if req.next.is_none() {
        return Err(RunError::NextMissing);
    }
    if req.err.is_some() {
        return Err(RunError::ErrPreset);
    }

    if options.detect_cycles {
        req.seen = Some(Seen::new());
    }

    let span = tracing::info_span!("statemachine", machine = %name);
    let recording = !span.is_disabled();
    let _guard = span.enter();

    if recording {
        tracing::debug!(data = %snapshot(&req.data), "run start");
    }
    let result = drive(req, recording);
    if recording {
        match &result {
            Ok(req) => tracing::debug!(data = %snapshot(&req.data), "run end"),
            Err(err) => tracing::error!(error = %err, "run failed"),
        }
    }
    result
}

fn drive<T>(mut req: Request<T>, recording: bool) -> Result<Request<T>, RunError> {
    while let Some(next) = req.next {
        if let Some(seen) = req.seen.as_mut() {
            let name = next.name;
            if seen.contains(&name) {
                let mut trace = seen.join(" -> ");
                trace.push_str(" -> ");
                trace.push_str(name);
                return Err(RunError::Cycle { trace });
            }
            seen.push(name);
        }

        let (state_name, returned) = exec_state(req, recording);
        req = returned;

        if let Some(source) = req.err.take() {
            req.next = None;
            // The executor reports its own invariant violations through the
            // same channel states use; let them through un-wrapped.
            return Err(match source.downcast::<RunError>() {
                Ok(internal) => *internal,
                Err(source) => RunError::State {
                    state: state_name.unwrap_or("<unknown>"),
                    source,
                },
            });
        }
    }
    Ok(req)
}

/// Dispatches the state recorded in `req.next`, clearing it first: the state
/// must explicitly set its successor or leave the machine done.
fn exec_state<T>(mut req: Request<T>, recording: bool) -> (Option<&'static str>, Request<T>) {
    let Some(state) = req.next.take() else {
        req.err = Some(Box::new(RunError::Internal));
        return (None, req);
    };

    if recording {
        let span = tracing::info_span!("state", state = state.name);
        let _guard = span.enter();
        req = (state.f)(req);
    } else {
        req = (state.f)(req);
    }
    (Some(state.name), req)
}

fn snapshot<T: Serialize>(data: &T) -> String {
    serde_json::to_string(data).unwrap_or_else(|err| format!("error serializing data: {err}"))
}
