//! Frame resolution, display trimming and infrastructure filtering.
//!
//! Turns the opaque instruction pointers of a [`StackSnapshot`] into
//! [`Frame`]s. Frames that belong to the runtime, the test harness, the
//! unwinder or this crate's own construction machinery are dropped here, so
//! every consumer sees the same filtered sequence.

use std::borrow::Cow;
use std::ffi::c_void;
use std::fmt;

use serde::Serialize;

use crate::snapshot::StackSnapshot;

// ============================================================================
// Frame
// ============================================================================

/// A resolved `(file, function, line)` location.
///
/// The three fields together are the frame's identity: two frames are equal
/// (and hash equal) exactly when all three match. Accessors return the raw
/// symbolized values; [`display_function`](Self::display_function) and
/// [`display_file`](Self::display_file) return the trimmed forms used by the
/// text renderer.
///
/// ## Example
///
/// ```rust
/// use errstack::Frame;
///
/// let frame = Frame::new("myapp::db::find_user", "src/db.rs", 42);
/// assert_eq!(frame.display_function(), "db::find_user");
/// assert_eq!(frame.to_string(), "at db::find_user (in src/db.rs:42)");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Frame {
    function: String,
    file: String,
    line: u32,
}

impl Frame {
    /// Create a frame from already-resolved parts.
    pub fn new(function: impl Into<String>, file: impl Into<String>, line: u32) -> Self {
        Self {
            function: function.into(),
            file: file.into(),
            line,
        }
    }

    /// Fully qualified, demangled function name (without the symbol hash).
    #[inline]
    pub fn function(&self) -> &str {
        &self.function
    }

    /// Source file as recorded in debug info; empty if unknown.
    #[inline]
    pub fn file(&self) -> &str {
        &self.file
    }

    /// Source line; `0` if unknown.
    #[inline]
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Function name trimmed to `module::function`.
    #[inline]
    pub fn display_function(&self) -> &str {
        pretty_function(&self.function)
    }

    /// File path relative to the current working directory when possible.
    #[inline]
    pub fn display_file(&self) -> Cow<'_, str> {
        pretty_file(&self.file)
    }

    /// Display adapter that trims the file against `wd` rather than reading
    /// the working directory itself. `None` leaves the file as recorded.
    ///
    /// ```rust
    /// use errstack::Frame;
    ///
    /// let frame = Frame::new("myapp::db::find_user", "/srv/app/src/db.rs", 42);
    /// assert_eq!(
    ///     frame.relative_to(Some("/srv/app")).to_string(),
    ///     "at db::find_user (in src/db.rs:42)"
    /// );
    /// ```
    #[inline]
    pub fn relative_to<'a>(&'a self, wd: Option<&'a str>) -> RelativeFrame<'a> {
        RelativeFrame { frame: self, wd }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let wd = std::env::current_dir().ok();
        let wd = wd.as_deref().map(|wd| wd.to_string_lossy());
        fmt::Display::fmt(&self.relative_to(wd.as_deref()), f)
    }
}

/// A [`Frame`] displayed against a fixed working directory.
///
/// Built by [`Frame::relative_to`]. Renderers that print many frames read the
/// working directory once and share it through this adapter.
#[derive(Debug, Clone, Copy)]
pub struct RelativeFrame<'a> {
    frame: &'a Frame,
    wd: Option<&'a str>,
}

impl fmt::Display for RelativeFrame<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let file = match self.wd {
            Some(wd) => strip_working_dir(&self.frame.file, wd),
            None => self.frame.file.as_str(),
        };
        write!(
            f,
            "at {} (in {}:{})",
            self.frame.display_function(),
            file,
            self.frame.line
        )
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// Resolve one captured instruction pointer.
///
/// Inlined calls expand into several frames, innermost first. Infrastructure
/// frames are filtered out, so the result may be empty.
pub fn resolve_ip(ip: usize) -> Vec<Frame> {
    let mut frames = Vec::new();
    // Captured pointers are return addresses; step back into the call instruction.
    let addr = ip.saturating_sub(1);
    backtrace::resolve(addr as *mut c_void, |symbol| {
        let Some(name) = symbol.name() else {
            return;
        };
        let function = format!("{name:#}");
        let file = symbol
            .filename()
            .map(|path| path.to_string_lossy().into_owned())
            .unwrap_or_default();
        if is_infrastructure(&function, &file) {
            return;
        }
        frames.push(Frame {
            function,
            file,
            line: symbol.lineno().unwrap_or(0),
        });
    });
    frames
}

/// Lazily resolve a snapshot, innermost first.
pub fn frames_of(snapshot: &StackSnapshot) -> impl Iterator<Item = Frame> + '_ {
    snapshot.iter().flat_map(resolve_ip)
}

/// Resolve a whole snapshot, innermost first, infrastructure filtered.
pub fn resolve_snapshot(snapshot: &StackSnapshot) -> Vec<Frame> {
    frames_of(snapshot).collect()
}

// ============================================================================
// Filtering
// ============================================================================

/// Qualified paths owned by the runtime, the test harness and the unwinder.
const RUNTIME_PATHS: &[&str] = &["std::", "core::", "alloc::", "test::", "backtrace::"];

/// Prefixes of unqualified C-level symbols (unwinder, libc entry points).
const RUNTIME_SYMBOL_PREFIXES: &[&str] = &[
    "_Unwind_",
    "__libc_start",
    "__GI_",
    "__pthread",
    "__rust",
    "rust_begin_unwind",
];

/// Unqualified C-level symbols that are never application code.
const RUNTIME_SYMBOLS: &[&str] = &[
    "main",
    "_start",
    "start_thread",
    "thread_start",
    "clone",
    "clone3",
    "__clone",
    "__clone3",
    "BaseThreadInitThunk",
    "RtlUserThreadStart",
];

const CRATE_PATH: &str = concat!(env!("CARGO_CRATE_NAME"), "::");
const EXT_IMPL: &str = concat!(" as ", env!("CARGO_CRATE_NAME"), "::ext::");

/// True for frames that never belong in a rendered trace.
///
/// Covers unknown symbols, the standard library and test harness, unwinder and
/// libc entry points, standard library sources, and the frames this crate adds
/// while building a node.
pub fn is_infrastructure(function: &str, file: &str) -> bool {
    function.is_empty()
        || RUNTIME_PATHS.iter().any(|p| owning_path(function).starts_with(p))
        || RUNTIME_SYMBOL_PREFIXES.iter().any(|p| function.starts_with(p))
        || RUNTIME_SYMBOLS.contains(&function)
        || file.starts_with("/rustc/")
        || is_construction_frame(function)
}

/// The path that decides who owns a function.
///
/// `<Type as Trait>::f` belongs to the trait's crate, so an application trait
/// implemented for `Vec<T>` stays visible while std's `FnOnce` shims do not.
/// An inherent `<Type>::f` belongs to the type. Plain paths are returned as is.
fn owning_path(function: &str) -> &str {
    let Some(qualified) = function.strip_prefix('<') else {
        return function;
    };
    let bytes = qualified.as_bytes();
    let mut depth = 1usize;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'<' => depth += 1,
            b'>' if i == 0 || bytes[i - 1] != b'-' => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            b' ' if depth == 1 && qualified[i..].starts_with(" as ") => {
                return &qualified[i + 4..];
            }
            _ => {}
        }
    }
    qualified
}

/// Frames of this crate's own annotate/wrap/capture machinery.
fn is_construction_frame(function: &str) -> bool {
    if function.contains(EXT_IMPL) {
        return true;
    }
    function
        .strip_prefix(CRATE_PATH)
        .is_some_and(|rest| rest.starts_with("traced::") || rest.starts_with("snapshot::"))
}

// ============================================================================
// Display trimming
// ============================================================================

/// Trim a function path to its last two segments (`module::function`).
///
/// Trailing `{{closure}}` segments are kept on top of those two, and `<...>`
/// groups count as part of the segment they appear in.
pub fn pretty_function(function: &str) -> &str {
    let bytes = function.as_bytes();
    let mut starts = vec![0];
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'<' => depth += 1,
            b'>' if i == 0 || bytes[i - 1] != b'-' => depth = depth.saturating_sub(1),
            b':' if depth == 0 && bytes.get(i + 1) == Some(&b':') => {
                starts.push(i + 2);
                i += 2;
                continue;
            }
            _ => {}
        }
        i += 1;
    }

    let closures = starts
        .iter()
        .rev()
        .take_while(|&&s| function[s..].starts_with("{{closure}}"))
        .count();
    let keep = (closures + 2).min(starts.len());
    &function[starts[starts.len() - keep]..]
}

/// Make a file path relative to the current working directory.
///
/// Paths outside the working directory (or when it cannot be read) are
/// returned unchanged.
pub fn pretty_file(file: &str) -> Cow<'_, str> {
    let Ok(wd) = std::env::current_dir() else {
        return Cow::Borrowed(file);
    };
    Cow::Borrowed(strip_working_dir(file, &wd.to_string_lossy()))
}

/// Make `file` relative to `wd` if it lies inside it.
pub fn strip_working_dir<'f>(file: &'f str, wd: &str) -> &'f str {
    match file.strip_prefix(wd) {
        Some(rest) if rest.starts_with(['/', '\\']) => rest.trim_start_matches(['/', '\\']),
        _ => file,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pretty_function_keeps_module_and_name() {
        assert_eq!(pretty_function("myapp::db::find_user"), "db::find_user");
        assert_eq!(pretty_function("find_user"), "find_user");
        assert_eq!(pretty_function("db::find_user"), "db::find_user");
    }

    #[test]
    fn pretty_function_keeps_closure_owner() {
        assert_eq!(
            pretty_function("myapp::handler::run::{{closure}}"),
            "handler::run::{{closure}}"
        );
        assert_eq!(
            pretty_function("a::b::c::{{closure}}::{{closure}}"),
            "b::c::{{closure}}::{{closure}}"
        );
    }

    #[test]
    fn pretty_function_respects_angle_brackets() {
        assert_eq!(
            pretty_function("<myapp::store::Db as myapp::store::Store>::get"),
            "<myapp::store::Db as myapp::store::Store>::get"
        );
        assert_eq!(
            pretty_function("myapp::x::<impl myapp::x::Foo>::bar"),
            "<impl myapp::x::Foo>::bar"
        );
        assert_eq!(
            pretty_function("myapp::x::<fn() -> u8 as myapp::T>::call"),
            "<fn() -> u8 as myapp::T>::call"
        );
    }

    #[test]
    fn pretty_file_strips_working_directory() {
        let wd = std::env::current_dir().unwrap();
        let inside = wd.join("src").join("lib.rs");
        let inside = inside.to_string_lossy();
        assert_eq!(pretty_file(&inside), format!("src{}lib.rs", std::path::MAIN_SEPARATOR));

        let sibling = format!("{}2/src/lib.rs", wd.to_string_lossy());
        assert_eq!(pretty_file(&sibling), sibling);
        assert_eq!(pretty_file("relative/file.rs"), "relative/file.rs");
    }

    #[test]
    fn strip_working_dir_uses_given_directory() {
        assert_eq!(strip_working_dir("/srv/app/src/db.rs", "/srv/app"), "src/db.rs");
        assert_eq!(strip_working_dir("/srv/app2/src/db.rs", "/srv/app"), "/srv/app2/src/db.rs");
        assert_eq!(strip_working_dir("src/db.rs", "/srv/app"), "src/db.rs");
    }

    #[test]
    fn relative_frame_formats_against_fixed_directory() {
        let frame = Frame::new("myapp::db::find_user", "/srv/app/src/db.rs", 42);
        assert_eq!(
            frame.relative_to(Some("/srv/app")).to_string(),
            "at db::find_user (in src/db.rs:42)"
        );
        assert_eq!(
            frame.relative_to(None).to_string(),
            "at db::find_user (in /srv/app/src/db.rs:42)"
        );
    }

    #[test]
    fn owning_path_follows_trait_of_qualified_impl() {
        assert_eq!(
            owning_path("<alloc::vec::Vec<T> as myapp::Repo>::load"),
            "myapp::Repo>::load"
        );
        assert_eq!(
            owning_path("<alloc::boxed::Box<F,A> as core::ops::function::FnOnce<Args>>::call_once"),
            "core::ops::function::FnOnce<Args>>::call_once"
        );
        assert_eq!(owning_path("<core::fmt::Arguments>::new"), "core::fmt::Arguments>::new");
        assert_eq!(
            owning_path("<fn() -> u8 as myapp::Task>::run"),
            "myapp::Task>::run"
        );
        assert_eq!(owning_path("myapp::db::find_user"), "myapp::db::find_user");
    }

    #[test]
    fn application_impls_on_std_types_are_kept() {
        assert!(!is_infrastructure(
            "<alloc::vec::Vec<T> as myapp::Repo>::load",
            "src/repo.rs"
        ));
        assert!(!is_infrastructure(
            "<std::collections::hash::map::HashMap<K,V> as myapp::cache::Cache>::fetch",
            "src/cache.rs"
        ));
        assert!(is_infrastructure("<core::fmt::Arguments>::new", ""));
        assert!(is_infrastructure(
            "<std::thread::Builder as test::Spawn<F>>::spawn",
            ""
        ));
    }

    #[test]
    fn runtime_frames_are_infrastructure() {
        assert!(is_infrastructure("", "src/main.rs"));
        assert!(is_infrastructure("std::rt::lang_start_internal", ""));
        assert!(is_infrastructure(
            "<alloc::boxed::Box<F,A> as core::ops::function::FnOnce<Args>>::call_once",
            ""
        ));
        assert!(is_infrastructure("test::run_test::{{closure}}", ""));
        assert!(is_infrastructure("main", ""));
        assert!(is_infrastructure("__libc_start_main", ""));
        assert!(is_infrastructure("_Unwind_Backtrace", ""));
        assert!(is_infrastructure(
            "myapp::helper",
            "/rustc/abc123/library/core/src/ops/function.rs"
        ));
    }

    #[test]
    fn application_frames_are_kept() {
        assert!(!is_infrastructure("myapp::main", "src/main.rs"));
        assert!(!is_infrastructure("myapp::db::find_user", "src/db.rs"));
        assert!(!is_infrastructure("mainframe::boot", "src/lib.rs"));
    }

    #[test]
    fn construction_frames_are_infrastructure() {
        assert!(is_infrastructure(&format!("{CRATE_PATH}traced::wrap"), "src/traced.rs"));
        assert!(is_infrastructure(&format!("{CRATE_PATH}snapshot::capture"), "src/snapshot.rs"));
        assert!(is_infrastructure(
            &format!("<myapp::Error{EXT_IMPL}ErrorTraceExt>::wrap"),
            "src/ext.rs"
        ));
        assert!(!is_infrastructure(&format!("{CRATE_PATH}tests::helper"), "src/tests.rs"));
    }
}
