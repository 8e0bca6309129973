//! Raw call-stack capture.
//!
//! A [`StackSnapshot`] is a bounded list of instruction pointers, innermost
//! first. Capturing is cheap: nothing is symbolized until the snapshot is
//! handed to the [resolver](crate::frame).

use core::fmt;

/// Maximum number of frames recorded by a single capture.
///
/// A snapshot holding exactly this many frames is *saturated*: the real stack
/// was at least as deep, and a new capture window is opened by the next wrap.
pub const MAX_DEPTH: usize = 32;

/// Frames reserved for the unwinder's own frames before the anchor is found.
const PREAMBLE_FRAMES: usize = 16;

// ============================================================================
// IpVec - configurable storage for captured instruction pointers
// ============================================================================
//
// Snapshots never exceed MAX_DEPTH, so the inline variants never spill.

/// Inline snapshot storage using smallvec.
#[cfg(feature = "smallvec")]
type IpVec = smallvec::SmallVec<[usize; MAX_DEPTH]>;

/// Inline snapshot storage using tinyvec.
#[cfg(all(feature = "tinyvec", not(feature = "smallvec")))]
type IpVec = tinyvec::TinyVec<[usize; MAX_DEPTH]>;

/// Heap-allocated snapshot storage (default, no smallvec/tinyvec feature).
#[cfg(not(any(feature = "smallvec", feature = "tinyvec")))]
type IpVec = Vec<usize>;

// ============================================================================
// StackSnapshot
// ============================================================================

/// An immutable, bounded sequence of captured program locations.
///
/// Locations are opaque instruction pointers ordered innermost-first: the
/// frame nearest the capture call site comes first. Use
/// [`resolve_snapshot`](crate::frame::resolve_snapshot) to turn them into
/// [`Frame`](crate::Frame)s.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct StackSnapshot {
    ips: IpVec,
}

impl StackSnapshot {
    /// An empty snapshot ("no stack available").
    #[inline]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a snapshot from raw instruction pointers, innermost first.
    ///
    /// Anything past [`MAX_DEPTH`] is dropped.
    pub fn from_ips(ips: impl IntoIterator<Item = usize>) -> Self {
        Self {
            ips: ips.into_iter().take(MAX_DEPTH).collect(),
        }
    }

    /// Number of captured locations.
    #[inline]
    pub fn len(&self) -> usize {
        self.ips.len()
    }

    /// True when nothing was captured.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ips.is_empty()
    }

    /// True when the capture window filled up, meaning frames beyond it exist.
    #[inline]
    pub fn is_saturated(&self) -> bool {
        self.ips.len() == MAX_DEPTH
    }

    /// The raw instruction pointers, innermost first.
    #[inline]
    pub fn as_slice(&self) -> &[usize] {
        &self.ips
    }

    /// Iterate over the raw instruction pointers, innermost first.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.ips.iter().copied()
    }
}

impl fmt::Debug for StackSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.ips.iter().map(|ip| format!("{ip:#x}")))
            .finish()
    }
}

// ============================================================================
// Capture
// ============================================================================

/// Capture the current call stack.
///
/// Frames up to and including this function are never recorded; `skip`
/// further caller frames are dropped on top of that, so `capture(0)` starts at
/// the function that called `capture`. At most [`MAX_DEPTH`] frames are kept.
///
/// Never fails: if the platform cannot unwind, the snapshot is empty.
///
/// ## Example
///
/// ```rust
/// use errstack::snapshot::{capture, MAX_DEPTH};
///
/// let snapshot = capture(0);
/// assert!(snapshot.len() <= MAX_DEPTH);
/// ```
#[inline(never)]
pub fn capture(skip: usize) -> StackSnapshot {
    let anchor = (capture as fn(usize) -> StackSnapshot) as usize;
    let limit = MAX_DEPTH
        .saturating_add(skip)
        .saturating_add(PREAMBLE_FRAMES);

    let mut raw: Vec<usize> = Vec::with_capacity(MAX_DEPTH + PREAMBLE_FRAMES);
    let mut anchored_at: Option<usize> = None;
    backtrace::trace(|frame| {
        if anchored_at.is_none() && frame.symbol_address() as usize == anchor {
            anchored_at = Some(raw.len());
        }
        raw.push(frame.ip() as usize);
        raw.len() < limit
    });

    // Without an anchor (no symbol addresses on this platform) everything is
    // kept and the resolver filters the unwinder's frames by name.
    let start = anchored_at.map_or(0, |i| i + 1).saturating_add(skip);
    let snapshot = StackSnapshot::from_ips(raw.into_iter().skip(start));
    if snapshot.is_empty() {
        log::trace!("stack capture returned no frames (skip = {skip})");
    }
    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_ips_truncates_to_max_depth() {
        let snapshot = StackSnapshot::from_ips(0..MAX_DEPTH + 10);
        assert_eq!(snapshot.len(), MAX_DEPTH);
        assert!(snapshot.is_saturated());
        assert_eq!(snapshot.as_slice()[0], 0);
    }

    #[test]
    fn empty_snapshot_is_not_saturated() {
        let snapshot = StackSnapshot::empty();
        assert!(snapshot.is_empty());
        assert!(!snapshot.is_saturated());
        assert_eq!(snapshot.iter().count(), 0);
    }

    #[test]
    fn capture_records_something_bounded() {
        let snapshot = capture(0);
        assert!(!snapshot.is_empty());
        assert!(snapshot.len() <= MAX_DEPTH);
    }

    #[test]
    fn skipping_more_than_the_stack_yields_empty() {
        let snapshot = capture(10_000);
        assert!(snapshot.is_empty());
    }

    #[test]
    fn same_site_captures_are_equal() {
        #[inline(never)]
        fn site() -> StackSnapshot {
            capture(0)
        }

        let mut snapshots = Vec::new();
        for _ in 0..2 {
            snapshots.push(site());
        }
        assert_eq!(snapshots[0], snapshots[1]);
    }
}
