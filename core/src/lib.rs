//! Root of the `macos-use-core` library: the service-side coordination
//! fabric behind the desktop automation gRPC surface. Registries, the
//! long-running operation store, the observation subsystem, the macro
//! interpreter, and the session/transaction manager all live here; the
//! host itself is only reachable through [`platform::SystemOperations`].

// Library code must not write to stdout/stderr directly; everything
// user-visible goes through tracing.
#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod app_state;
pub mod clipboard;
pub mod convert;
pub mod element_registry;
pub mod error;
pub mod field_mask;
pub mod file_dialog;
pub mod input;
pub mod macro_executor;
pub mod macro_registry;
pub mod observation;
pub mod operation_store;
pub mod page_token;
pub mod platform;
pub mod resource_name;
pub mod screenshot;
pub mod script;
pub mod selector;
pub mod session;
pub mod util;
pub mod validation;
pub mod window_registry;
pub mod window_service;

pub use error::AutomationError;
pub use error::Result;
