//! Extension traits for annotating and wrapping without `map_err` boilerplate.
//!
//! - [`ErrorTraceExt`]: call `.traced()` or `.wrap(cause)` on an error value
//! - [`ResultTraceExt`]: call `.traced()`, `.wrap_err(cause)` or
//!   `.wrap_err_with(|| cause)` on a `Result`
//!
//! Both capture the stack at the method's caller, exactly like calling
//! [`annotate`] or [`wrap`](crate::wrap) there directly.

use std::borrow::Cow;
use std::error::Error;

use crate::BoxError;
use crate::traced::{Traced, annotate};

// ============================================================================
// ErrorTraceExt - for error values
// ============================================================================

/// Extension trait for annotating error values directly.
///
/// Implemented for every `Error + Send + Sync + 'static` type, including
/// [`Traced`] itself, so an existing node can be wrapped again with `.wrap()`.
///
/// ```rust
/// use std::io;
/// use errstack::{ErrorTraceExt, Traced};
///
/// fn open() -> Result<(), Traced> {
///     Err(io::Error::other("permission denied").traced())
/// }
///
/// fn setup() -> Result<(), Traced> {
///     open().map_err(|e| e.wrap("opening the data directory"))
/// }
///
/// let err = setup().unwrap_err();
/// assert_eq!(err.to_string(), "permission denied");
/// assert_eq!(err.cause(), Some("opening the data directory"));
/// ```
pub trait ErrorTraceExt: Sized {
    /// Annotate this error with the caller's stack. See [`annotate`].
    fn traced(self) -> Traced;

    /// Wrap this error with a cause and the caller's stack. See
    /// [`wrap`](crate::wrap).
    fn wrap(self, cause: impl Into<Cow<'static, str>>) -> Traced;
}

impl<E: Error + Send + Sync + 'static> ErrorTraceExt for E {
    #[inline(never)]
    fn traced(self) -> Traced {
        annotate(self)
    }

    #[inline(never)]
    fn wrap(self, cause: impl Into<Cow<'static, str>>) -> Traced {
        crate::traced::wrap(self, cause)
    }
}

// ============================================================================
// ResultTraceExt - for Results
// ============================================================================

/// Extension trait for annotating the error side of a `Result`.
///
/// Works for any error convertible into [`BoxError`]: `Traced`, `io::Error`,
/// `thiserror` enums, strings.
///
/// ## Example
///
/// ```rust
/// use errstack::{ResultTraceExt, Traced};
///
/// fn parse(input: &str) -> Result<u16, Traced> {
///     input.parse::<u16>().traced()
/// }
///
/// fn port(input: &str) -> Result<u16, Traced> {
///     let port = parse(input).wrap_err_with(|| format!("parsing port {input:?}"))?;
///     Ok(port)
/// }
///
/// let err = port("http").unwrap_err();
/// assert_eq!(err.cause(), Some("parsing port \"http\""));
/// assert!(port("8080").is_ok());
/// ```
pub trait ResultTraceExt<T> {
    /// Annotate the error, if any, with the caller's stack.
    fn traced(self) -> Result<T, Traced>;

    /// Wrap the error, if any, with `cause` and the caller's stack.
    fn wrap_err(self, cause: impl Into<Cow<'static, str>>) -> Result<T, Traced>;

    /// Like [`wrap_err`](Self::wrap_err), but the cause is only built on `Err`.
    fn wrap_err_with<C: Into<Cow<'static, str>>>(self, f: impl FnOnce() -> C) -> Result<T, Traced>;
}

impl<T, E: Into<BoxError>> ResultTraceExt<T> for Result<T, E> {
    #[inline(never)]
    fn traced(self) -> Result<T, Traced> {
        match self {
            Ok(v) => Ok(v),
            Err(e) => Err(annotate(e)),
        }
    }

    #[inline(never)]
    fn wrap_err(self, cause: impl Into<Cow<'static, str>>) -> Result<T, Traced> {
        match self {
            Ok(v) => Ok(v),
            Err(e) => Err(crate::traced::wrap(e, cause)),
        }
    }

    #[inline(never)]
    fn wrap_err_with<C: Into<Cow<'static, str>>>(self, f: impl FnOnce() -> C) -> Result<T, Traced> {
        match self {
            Ok(v) => Ok(v),
            Err(e) => {
                let cause = f().into();
                Err(crate::traced::wrap(e, cause))
            }
        }
    }
}
