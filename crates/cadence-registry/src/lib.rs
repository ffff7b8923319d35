//! Cadence Module Registry
//!
//! An immutable catalog of module functions, organized as
//! categories → modules → functions and addressed by a three-part path:
//!
//! ```text
//! ai.ai-sdk.chat
//! │  │      └── function (exact match)
//! │  └───────── module   (canonical or normalized name)
//! └──────────── category (canonical or normalized name)
//! ```
//!
//! The registry is assembled once with a [`RegistryBuilder`] and then shared
//! read-only (usually behind an `Arc`) by every run.

mod builtin;
mod error;
mod handler;
mod registry;

pub use builtin::register_builtins;
pub use error::{ModuleError, RegistryError};
pub use handler::{InvocationContext, ModuleHandler, handler_fn};
pub use registry::{
  Category, FunctionRef, Module, ModuleFunction, ModuleRegistry, RegistryBuilder, normalize,
};
