//! # errstack - call-stack traces for error chains
//!
//! Annotate an error where it happens, wrap it with a cause wherever it
//! passes through, and render one deduplicated trace of every call site
//! involved:
//!
//! ```text
//! Error: connection refused
//!     Origin is:
//!         at db::connect (in src/db.rs:12)
//!     Caused by: loading user 7
//!         at users::load (in src/users.rs:40)
//!     Ends here:
//!         at main::run (in src/main.rs:9)
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use errstack::{annotate, render, ResultTraceExt, Traced};
//!
//! fn connect() -> Result<(), Traced> {
//!     Err(annotate("connection refused"))
//! }
//!
//! fn load_user(id: u32) -> Result<(), Traced> {
//!     connect().wrap_err_with(|| format!("loading user {id}"))
//! }
//!
//! let err = load_user(7).unwrap_err();
//! let text = render(&err, false);
//! assert!(text.starts_with("Error: connection refused"));
//! assert!(text.contains("Caused by: loading user 7"));
//! ```
//!
//! ## How It Works
//!
//! Every [`annotate`] or [`wrap`] call builds an immutable [`Traced`] node
//! holding the previous error, a bounded [`StackSnapshot`] of raw instruction
//! pointers, and an optional cause. Nothing is symbolized until the trace is
//! rendered. At render time the chain is walked newest first; each node
//! contributes only the frames no newer node already covered, so the shared
//! caller context of nested wrap sites appears once.
//!
//! A snapshot holds at most [`MAX_DEPTH`] frames. When a wrap happens deeper
//! than a saturated capture can see, the new node becomes a [`Exposure::Leaf`]
//! with a fresh capture window.
//!
//! ## Output
//!
//! | Function | Output |
//! |----------|--------|
//! | [`render(&err, false)`](render()) | Text, origin first |
//! | [`render(&err, true)`](render()) | Text, most recent caller first |
//! | [`frames(&err)`](frames()) | `Vec<TraceFrame>`, serializable with serde |
//! | [`resolve(&err)`](resolve()) | [`Resolved`]: raw frames and cause map |
//! | `format!("{err:?}")` | Same as `render(&err, false)` |
//! | `format!("{err}")` | The wrapped error's message only |
//!
//! All of these accept any `&dyn Error`, so a `Traced` buried inside a
//! `thiserror` enum or an `anyhow::Error` is still found through `source()`.
//!
//! ## Logging
//!
//! Chain construction and resolution emit `log` records at `trace` level, and
//! opening a leaf capture window is logged at `debug`. Nothing is logged
//! unless the application installs a logger.
//!
//! ## Features
//!
//! - `smallvec` / `tinyvec`: store snapshots inline instead of in a `Vec`.

#![deny(unsafe_code)]

mod chain;
mod ext;
pub mod frame;
pub mod prelude;
mod render;
pub mod snapshot;
mod traced;

pub use chain::{Chain, Resolved, find, resolve};
pub use ext::{ErrorTraceExt, ResultTraceExt};
pub use frame::Frame;
pub use render::{Label, TraceDisplay, TraceFrame, frames, render};
pub use snapshot::{MAX_DEPTH, StackSnapshot};
pub use traced::{Exposure, Traced, annotate, wrap};

/// Boxed, thread-safe error accepted by [`annotate`] and [`wrap`].
///
/// Anything convertible into it works: concrete error types, `String`,
/// `&'static str`, and `Box<dyn Error + Send + Sync>` itself.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
