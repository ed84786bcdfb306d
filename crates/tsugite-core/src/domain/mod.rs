//! Domain model (identifiers, definition requests, dependency values, errors).

pub mod errors;
pub mod id;
pub mod request;
pub mod value;

pub use errors::{BoxError, DefineError, InferenceError, LoadError};
pub use id::ModuleId;
pub use request::{DefineRequest, ModuleFactory, ModuleSource};
pub use value::{DependencyValue, EXPORTS, MODULE, ModuleDescriptor, REQUIRE, Require};
