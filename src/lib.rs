//! lunabind - native bindings for an embedded Lua 5.4 runtime
//!
//! Design: marshaling and dispatch are selected at compile time from Rust
//! signatures; the runtime only ever sees a handful of fixed entry points.
//!
//! Architecture:
//! - `stack` - stack accessor over the raw C API
//! - `marshal` - native ↔ stack conversions
//! - `binder` - Rust callables as runtime functions
//! - `function` - handles to script functions
//! - `variadic` - trailing argument windows
//! - `class` - native types as script classes
//! - `context` - runtime ownership, execution, registration
//! - `config`, `error`, `logging` - ambient infrastructure

// Core modules
pub mod binder;
pub mod class;
pub mod context;
pub mod function;
pub mod marshal;
pub mod stack;
pub mod variadic;

// Infrastructure
pub mod config;
pub mod error;
pub mod logging;

// Re-export commonly used items
pub use binder::{FromArg, FromArgs, LastArg, NativeFn};
pub use class::{Class, ClassBuilder, ClassInfo, Constructor, Method, PropertyInfo};
pub use config::{Config, ConfigError, DispatchConfig, ErrorHandlers, ErrorPolicy};
pub use context::Context;
pub use error::{Error, ErrorKind, Location, Result};
pub use function::Function;
pub use marshal::{Bytes, FromLua, FromLuaMulti, IntoLua, IntoLuaMulti};
pub use stack::{Kind, Stack, StackGuard};
pub use variadic::Variadic;
