//! Convenient re-exports for common usage.
//!
//! ## Usage
//!
//! ```rust
//! use errstack::prelude::*;
//!
//! fn inner() -> Result<(), Traced> {
//!     Err(annotate("not found"))
//! }
//!
//! fn outer() -> Result<(), Traced> {
//!     inner().wrap_err("looking up user")?;
//!     Ok(())
//! }
//!
//! let err = outer().unwrap_err();
//! assert!(render(&err, false).contains("Caused by: looking up user"));
//! ```

pub use crate::render::render;
pub use crate::{ErrorTraceExt, ResultTraceExt, Traced, annotate, wrap};
