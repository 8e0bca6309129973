//! Text and structured output for resolved traces.
//!
//! ## Text layout
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
//! Labels belong to positions in the resolved trace, not to display order:
//! the origin keeps `Origin is:` and the most recent caller keeps `Ends here:`
//! whether the blocks are printed forward or reversed. There is no trailing
//! newline.

use std::error::Error;
use std::fmt;
use std::path::Path;

use serde::Serialize;

use crate::chain::{Resolved, resolve};

/// Indent unit: labels get one, frame lines two.
const INDENT: &str = "    ";

// ============================================================================
// Labels
// ============================================================================

/// Positional label printed above a frame block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    /// The first frame: where the error was annotated.
    Origin,
    /// An interior frame that carries a cause.
    CausedBy,
    /// The last frame: the most recent caller.
    EndsHere,
}

impl Label {
    /// The label text, including its trailing colon.
    pub fn as_str(self) -> &'static str {
        match self {
            Label::Origin => "Origin is:",
            Label::CausedBy => "Caused by:",
            Label::EndsHere => "Ends here:",
        }
    }

    /// Label for the frame at `index` of a trace of `len` frames.
    ///
    /// A single-frame trace is labeled as its origin.
    pub fn for_position(index: usize, len: usize, has_cause: bool) -> Option<Label> {
        if index == 0 {
            Some(Label::Origin)
        } else if index + 1 == len {
            Some(Label::EndsHere)
        } else if has_cause {
            Some(Label::CausedBy)
        } else {
            None
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Text rendering
// ============================================================================

/// Display adapter that resolves and renders an error chain.
///
/// Resolution happens each time the adapter is formatted.
pub struct TraceDisplay<'a> {
    error: &'a (dyn Error + 'static),
    reversed: bool,
}

impl<'a> TraceDisplay<'a> {
    /// Render `error`'s chain, most recent caller first when `reversed`.
    pub fn new(error: &'a (dyn Error + 'static), reversed: bool) -> Self {
        Self { error, reversed }
    }
}

impl fmt::Display for TraceDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error: {}", self.error)?;

        let resolved = resolve(self.error);
        if resolved.is_empty() {
            return Ok(());
        }

        let wd = std::env::current_dir().ok();
        let wd = wd.as_deref().map(Path::to_string_lossy);
        let wd = wd.as_deref();
        if self.reversed {
            for index in (0..resolved.len()).rev() {
                write_block(f, &resolved, index, wd)?;
            }
        } else {
            for index in 0..resolved.len() {
                write_block(f, &resolved, index, wd)?;
            }
        }
        Ok(())
    }
}

fn write_block(
    f: &mut fmt::Formatter<'_>,
    resolved: &Resolved,
    index: usize,
    wd: Option<&str>,
) -> fmt::Result {
    let frame = &resolved.frames()[index];
    let cause = resolved.cause_of(frame);
    match (Label::for_position(index, resolved.len(), cause.is_some()), cause) {
        (Some(label), Some(cause)) => write!(f, "\n{INDENT}{label} {cause}")?,
        (Some(label), None) => write!(f, "\n{INDENT}{label}")?,
        (None, _) => {}
    }
    write!(f, "\n{INDENT}{INDENT}{}", frame.relative_to(wd))
}

/// Render `err`'s chain as text.
///
/// The first line is `Error: ` followed by `err`'s message. Errors without any
/// [`Traced`](crate::Traced) node render as that line alone.
///
/// ## Example
///
/// ```rust
/// use errstack::{annotate, render};
///
/// let err = annotate("boom");
/// let text = render(&err, false);
/// assert!(text.starts_with("Error: boom"));
/// assert!(text.contains("Origin is:"));
/// assert!(!text.ends_with('\n'));
/// ```
pub fn render(err: &(dyn Error + 'static), reversed: bool) -> String {
    TraceDisplay::new(err, reversed).to_string()
}

// ============================================================================
// Structured output
// ============================================================================

/// One frame of a resolved trace, for machine consumption.
///
/// `file` and `function` are the raw resolved values, not the trimmed forms
/// used in text output. `cause` is empty when the frame has none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceFrame {
    /// 1-based position in the trace, origin first.
    pub id: usize,
    pub cause: String,
    pub file: String,
    pub line: u32,
    pub function: String,
}

/// The resolved trace of `err` as numbered frames, origin first.
///
/// Serializes to JSON as a list of
/// `{"id", "cause", "file", "line", "function"}` objects.
pub fn frames(err: &(dyn Error + 'static)) -> Vec<TraceFrame> {
    let resolved = resolve(err);
    resolved
        .frames()
        .iter()
        .enumerate()
        .map(|(i, frame)| TraceFrame {
            id: i + 1,
            cause: resolved.cause_of(frame).unwrap_or_default().to_owned(),
            file: frame.file().to_owned(),
            line: frame.line(),
            function: frame.function().to_owned(),
        })
        .collect()
}
