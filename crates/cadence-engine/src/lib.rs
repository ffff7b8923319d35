//! Cadence Workflow Engine
//!
//! Turns a stored workflow definition plus a trigger into a sequence of module
//! invocations, streams progress and records the run.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ProgressStream                         │
//! │  - spawns the run, owns the event channel                   │
//! │  - yields framed events, cancels the run on drop            │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     ExecutionEngine                         │
//! │  - execute(request, notifier, cancel) → RunResult           │
//! │  - sequential steps, run record lifecycle                   │
//! └─────────────────────────────────────────────────────────────┘
//!                │                              │
//!                ▼                              ▼
//! ┌───────────────────────────┐  ┌──────────────────────────────┐
//! │    ExecutionContext       │  │       ModuleRegistry         │
//! │  - bindings, templates    │  │  - category.module.function  │
//! └───────────────────────────┘  └──────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use futures::StreamExt;
//!
//! let engine = Arc::new(ExecutionEngine::new(registry, store));
//! let request = RunRequest::new("wf-1", "user-1");
//!
//! let mut feed = ProgressStream::start(engine, request);
//! while let Some(frame) = feed.next().await {
//!     print!("{}", frame.encode());
//! }
//! ```

mod context;
mod engine;
mod error;
mod events;
mod stream;

pub use context::{CALLER_BINDING, ExecutionContext, ResolveError, TRIGGER_BINDING};
pub use engine::{EngineConfig, ExecutionEngine, RunRequest, RunResult};
pub use error::{EngineError, ErrorCategory};
pub use events::{ChannelNotifier, ExecutionNotifier, NoopNotifier, ProgressEvent};
pub use stream::{ERROR_EVENT, Frame, ProgressStream};
