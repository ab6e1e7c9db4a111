//! # Shared Types Crate
//!
//! The capability contract collaborating modules implement, and the registry
//! that drives their lifecycle.
//!
//! ## Design Principles
//!
//! - **Explicit capabilities**: optional operations are declared up front.
//! - **Name-addressed modules**: a module's name is its registry key and its
//!   bus address.

pub mod errors;
pub mod module_registry;
pub mod module_trait;

pub use errors::{ModuleError, ModuleErrorKind};
pub use module_registry::{ModuleRegistry, ModuleState};
pub use module_trait::{Capabilities, DynModule, Module, ModuleHealth};
