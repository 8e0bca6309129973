//! Walking an error chain and merging its captures into one trace.
//!
//! Each node of a chain holds its own snapshot. Snapshots of nested wrap
//! sites overlap heavily (the outer caller's frames appear in every inner
//! capture), so [`resolve`] merges them into one deduplicated frame list that
//! runs from the origin out to the most recent caller, and pins each node's
//! cause message onto the frame it belongs to.

use std::collections::{HashMap, HashSet};
use std::error::Error;

use crate::frame::{Frame, frames_of};
use crate::traced::Traced;

// ============================================================================
// Chain iteration
// ============================================================================

/// Iterator over the [`Traced`] nodes of an error chain, newest first.
///
/// Foreign errors between nodes (a `thiserror` enum wrapping a `Traced`, say)
/// are stepped over through [`Error::source`]; nodes are stepped through via
/// [`Traced::previous`].
#[derive(Clone)]
pub struct Chain<'a> {
    next: Option<&'a (dyn Error + 'static)>,
}

impl<'a> Chain<'a> {
    /// Start walking at `err`.
    pub fn new(err: &'a (dyn Error + 'static)) -> Self {
        Self { next: Some(err) }
    }
}

impl<'a> Iterator for Chain<'a> {
    type Item = &'a Traced;

    fn next(&mut self) -> Option<&'a Traced> {
        while let Some(err) = self.next {
            if let Some(node) = err.downcast_ref::<Traced>() {
                let previous: &'a (dyn Error + 'static) = node.previous();
                self.next = Some(previous);
                return Some(node);
            }
            self.next = err.source();
        }
        None
    }
}

/// The newest [`Traced`] node in `err`'s chain, if any.
///
/// ## Example
///
/// ```rust
/// use std::io;
/// use errstack::{annotate, find};
///
/// let plain = io::Error::other("plain");
/// assert!(find(&plain).is_none());
///
/// let traced = annotate(plain);
/// assert!(find(&traced).is_some());
/// ```
pub fn find<'a>(err: &'a (dyn Error + 'static)) -> Option<&'a Traced> {
    Chain::new(err).next()
}

// ============================================================================
// Resolved
// ============================================================================

/// The merged trace of a chain: unique frames from the origin (the deepest
/// frame of the oldest capture) to the most recent caller, plus the cause
/// message attached to each frame that has one.
#[derive(Debug, Clone, Default)]
pub struct Resolved {
    frames: Vec<Frame>,
    causes: HashMap<Frame, String>,
}

impl Resolved {
    /// All frames, origin first. No frame appears twice.
    #[inline]
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Cause messages keyed by the frame they are attached to.
    #[inline]
    pub fn causes(&self) -> &HashMap<Frame, String> {
        &self.causes
    }

    /// The cause attached to `frame`, if any.
    pub fn cause_of(&self, frame: &Frame) -> Option<&str> {
        self.causes.get(frame).map(String::as_str)
    }

    /// Number of unique frames.
    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// True when no node in the chain had a resolvable frame.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// The origin: where the error was first annotated.
    #[inline]
    pub fn first(&self) -> Option<&Frame> {
        self.frames.first()
    }

    /// The most recent caller.
    #[inline]
    pub fn last(&self) -> Option<&Frame> {
        self.frames.last()
    }

    /// Split into the frame list and the cause map, without cloning.
    ///
    /// ```rust
    /// use errstack::{resolve, wrap};
    ///
    /// let err = wrap("timeout", "fetching page");
    /// let resolved = resolve(&err);
    /// let len = resolved.len();
    /// let (frames, causes) = resolved.into_parts();
    /// assert_eq!(frames.len(), len);
    /// assert_eq!(causes.values().next().map(String::as_str), Some("fetching page"));
    /// ```
    pub fn into_parts(self) -> (Vec<Frame>, HashMap<Frame, String>) {
        (self.frames, self.causes)
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// Merge every capture in `err`'s chain into one deduplicated trace.
///
/// Nodes are visited newest first. Each node contributes its frames, innermost
/// first, up to (not including) the first frame an earlier-visited node
/// already contributed; everything past that point is shared caller context.
/// A node's cause goes on the first frame it contributed. A node that
/// contributes nothing (a wrap repeated inside an already covered frame) puts
/// its cause on the most recently emitted frame instead.
///
/// Two causes landing on one frame are joined oldest first with `"; "`.
///
/// Errors without any [`Traced`] node resolve to an empty trace.
pub fn resolve(err: &(dyn Error + 'static)) -> Resolved {
    let mut seen: HashSet<Frame> = HashSet::new();
    let mut frames: Vec<Frame> = Vec::new();
    let mut causes: HashMap<Frame, String> = HashMap::new();
    let mut homeless: Vec<&str> = Vec::new();

    for node in Chain::new(err) {
        let mut contributed = Vec::new();
        for frame in frames_of(node.snapshot()) {
            if !seen.insert(frame.clone()) {
                break;
            }
            contributed.push(frame);
        }
        log::trace!(
            "chain node ({:?}) contributed {} frame(s)",
            node.exposure(),
            contributed.len()
        );

        if let Some(cause) = node.cause() {
            match contributed.first().or(frames.last()) {
                Some(home) => attach_older(&mut causes, home, cause),
                None => homeless.push(cause),
            }
        }

        contributed.reverse();
        frames.extend(contributed);
    }
    frames.reverse();

    // Causes seen before any frame was emitted are the newest ones; they go on
    // the most recent caller, after whatever is already there.
    if let Some(last) = frames.last() {
        for cause in homeless.into_iter().rev() {
            attach_newer(&mut causes, last, cause);
        }
    }

    Resolved { frames, causes }
}

/// Attach a cause older than any already on `frame`.
fn attach_older(causes: &mut HashMap<Frame, String>, frame: &Frame, cause: &str) {
    causes
        .entry(frame.clone())
        .and_modify(|existing| *existing = format!("{cause}; {existing}"))
        .or_insert_with(|| cause.to_owned());
}

/// Attach a cause newer than any already on `frame`.
fn attach_newer(causes: &mut HashMap<Frame, String>, frame: &Frame, cause: &str) {
    causes
        .entry(frame.clone())
        .and_modify(|existing| {
            existing.push_str("; ");
            existing.push_str(cause);
        })
        .or_insert_with(|| cause.to_owned());
}
