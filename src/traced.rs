//! The [`Traced`] error node and the constructors that build chains of them.
//!
//! Every [`annotate`] or [`wrap`] call allocates a new node that owns the
//! previous error, one stack capture, and an optional cause message. Nodes are
//! never modified after construction, so an error value and everything it
//! wraps can be shared and rendered from several threads at once.

use std::borrow::Cow;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

use crate::BoxError;
use crate::chain::{Chain, Resolved, resolve};
use crate::render::{TraceDisplay, TraceFrame, frames};
use crate::snapshot::{StackSnapshot, capture};

// ============================================================================
// Exposure
// ============================================================================

/// The role a node plays in its chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Exposure {
    /// Records a cause on top of an existing capture window. Its raw stack is
    /// not exposed through [`Traced::stack_trace`].
    Suppressed,
    /// The first annotation of a chain. A chain has at most one.
    Root,
    /// A fresh capture window, opened because the previous window was
    /// saturated (its snapshot hit [`MAX_DEPTH`](crate::MAX_DEPTH)).
    Leaf,
}

impl Exposure {
    /// True for nodes that expose their full snapshot (`Root` and `Leaf`).
    #[inline]
    pub fn exposes_stack(self) -> bool {
        !matches!(self, Exposure::Suppressed)
    }
}

// ============================================================================
// Traced - the error node
// ============================================================================

/// An error annotated with the call stack where it was annotated or wrapped.
///
/// `Traced` is one link of a chain: it owns the previous error (which may be
/// another `Traced`), the stack captured at construction, and an optional
/// cause message.
///
/// ## Display, Debug and source
///
/// - `Display` shows only the wrapped error's message, like the error itself.
/// - `Debug` shows the full rendered trace (see [`render`](crate::render())).
/// - [`Error::source`] is transparent: it returns the wrapped error's source,
///   so reporters that walk `source()` do not repeat the message per layer.
///   Use [`previous`](Self::previous) or [`chain`](Self::chain) to step
///   through the annotation layers.
///
/// ## Example
///
/// ```rust
/// use errstack::{annotate, wrap, Traced};
///
/// fn load() -> Result<(), Traced> {
///     Err(annotate("config missing"))
/// }
///
/// fn start() -> Result<(), Traced> {
///     load().map_err(|e| wrap(e, "starting service"))
/// }
///
/// let err = start().unwrap_err();
/// assert_eq!(err.to_string(), "config missing");
/// assert_eq!(err.cause(), Some("starting service"));
/// assert_eq!(err.chain().count(), 2);
/// ```
#[derive(Clone)]
pub struct Traced {
    inner: Arc<dyn Error + Send + Sync + 'static>,
    snapshot: StackSnapshot,
    cause: Option<Cow<'static, str>>,
    exposure: Exposure,
}

/// Attach a stack capture to an error.
///
/// If `err` already is a [`Traced`] node it is returned unchanged, so
/// annotating twice never stacks a second root. A foreign wrapper whose source
/// chain already holds a node gets a cause-less layer on top instead of a new
/// root.
///
/// ## Example
///
/// ```rust
/// use errstack::{annotate, Exposure};
///
/// let err = annotate("disk full");
/// assert_eq!(err.exposure(), Exposure::Root);
///
/// let again = annotate(err.clone());
/// assert_eq!(again.snapshot(), err.snapshot());
/// assert_eq!(again.chain().count(), 1);
/// ```
#[inline(never)]
pub fn annotate(err: impl Into<BoxError>) -> Traced {
    Traced::annotate_boxed(err.into())
}

/// Wrap an error in a new node carrying `cause`, captured at the caller.
///
/// An empty `cause` behaves as a plain re-capture. Wrapping with the same
/// cause at the same call site again (a retry loop, say) returns the existing
/// node instead of growing the chain.
///
/// ## Example
///
/// ```rust
/// use errstack::{wrap, Traced};
///
/// fn fetch(id: u32) -> Result<(), Traced> {
///     Err(wrap("timeout", format!("fetching {id}")))
/// }
///
/// let err = fetch(7).unwrap_err();
/// assert_eq!(err.cause(), Some("fetching 7"));
/// ```
#[inline(never)]
pub fn wrap(err: impl Into<BoxError>, cause: impl Into<Cow<'static, str>>) -> Traced {
    Traced::wrap_boxed(err.into(), cause.into())
}

impl Traced {
    fn annotate_boxed(err: BoxError) -> Self {
        match err.downcast::<Traced>() {
            Ok(node) => *node,
            Err(err) => {
                let snapshot = capture(0);
                if Chain::new(&*err).next().is_some() {
                    log::trace!("annotating a wrapper around an existing chain");
                    Self::layer(err, None, snapshot)
                } else {
                    Self::node(err, Exposure::Root, None, snapshot)
                }
            }
        }
    }

    fn wrap_boxed(err: BoxError, cause: Cow<'static, str>) -> Self {
        let cause = Some(cause).filter(|c| !c.is_empty());
        let snapshot = capture(0);

        let err: BoxError = match err.downcast::<Traced>() {
            Ok(node) => {
                if node.cause == cause && node.snapshot == snapshot {
                    log::trace!("repeated wrap at the same call site, keeping existing node");
                    return *node;
                }
                node
            }
            Err(err) => err,
        };

        if Chain::new(&*err).next().is_none() {
            let root = Self::node(err, Exposure::Root, None, snapshot.clone());
            return Self::layer(Box::new(root), cause, snapshot);
        }
        Self::layer(err, cause, snapshot)
    }

    /// Stack a new node on an error that already carries a chain.
    fn layer(err: BoxError, cause: Option<Cow<'static, str>>, snapshot: StackSnapshot) -> Self {
        let exposure = if last_window(&*err).snapshot.is_saturated() {
            log::debug!(
                "capture window saturated at {} frames, opening a leaf node",
                crate::MAX_DEPTH
            );
            Exposure::Leaf
        } else {
            Exposure::Suppressed
        };
        Self::node(err, exposure, cause, snapshot)
    }

    fn node(
        err: BoxError,
        exposure: Exposure,
        cause: Option<Cow<'static, str>>,
        snapshot: StackSnapshot,
    ) -> Self {
        Self {
            inner: Arc::from(err),
            snapshot,
            cause,
            exposure,
        }
    }

    #[cfg(test)]
    pub(crate) fn from_parts_for_test(
        err: BoxError,
        exposure: Exposure,
        cause: Option<&'static str>,
        snapshot: StackSnapshot,
    ) -> Self {
        Self::node(err, exposure, cause.map(Cow::Borrowed), snapshot)
    }

    /// The cause message given to [`wrap`], if any.
    #[inline]
    pub fn cause(&self) -> Option<&str> {
        self.cause.as_deref()
    }

    /// The stack captured when this node was built.
    #[inline]
    pub fn snapshot(&self) -> &StackSnapshot {
        &self.snapshot
    }

    /// Raw, unfiltered instruction pointers of this node's capture.
    ///
    /// Only `Root` and `Leaf` nodes expose their capture; `Suppressed` nodes
    /// return an empty slice. Use [`resolve`](Self::resolve) for the merged,
    /// deduplicated trace of the whole chain.
    pub fn stack_trace(&self) -> &[usize] {
        if self.exposure.exposes_stack() {
            self.snapshot.as_slice()
        } else {
            &[]
        }
    }

    /// The role of this node in its chain.
    #[inline]
    pub fn exposure(&self) -> Exposure {
        self.exposure
    }

    /// The error this node wraps.
    #[inline]
    pub fn previous(&self) -> &(dyn Error + Send + Sync + 'static) {
        &*self.inner
    }

    /// Iterate over this node and every node below it, newest first.
    pub fn chain(&self) -> Chain<'_> {
        Chain::new(self)
    }

    /// Deduplicated frames and causes of the whole chain.
    pub fn resolve(&self) -> Resolved {
        resolve(self)
    }

    /// Render the chain as text. See [`render`](crate::render()).
    pub fn render(&self, reversed: bool) -> String {
        self.display(reversed).to_string()
    }

    /// A `Display` adapter that renders the chain when formatted.
    pub fn display(&self, reversed: bool) -> TraceDisplay<'_> {
        TraceDisplay::new(self, reversed)
    }

    /// The chain as structured, numbered frames. See [`frames`](crate::frames()).
    pub fn frames(&self) -> Vec<TraceFrame> {
        frames(self)
    }
}

/// The most recent node that owns a capture window.
///
/// Every chain starts with a `Root`, so finding none means a chain was built
/// outside the constructors in this module.
fn last_window<'a>(err: &'a (dyn Error + 'static)) -> &'a Traced {
    match Chain::new(err).find(|node| node.exposure.exposes_stack()) {
        Some(node) => node,
        None => panic!("error chain has no root or leaf node"),
    }
}

// ============================================================================
// Trait impls
// ============================================================================

impl fmt::Display for Traced {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.inner, f)
    }
}

impl fmt::Debug for Traced {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.display(false), f)
    }
}

impl Error for Traced {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.inner.source()
    }
}
