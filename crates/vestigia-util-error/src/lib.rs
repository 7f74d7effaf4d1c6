//! Shared error plumbing for the Vestigia workspace.
//!
//! Deliberately tiny: type-erased error aliases for seams where the
//! concrete failure does not matter, and a one-line renderer for error
//! chains in structured log fields.

use std::error::Error;
use std::fmt;

/// A type-erased error for boundaries that only propagate, such as test
/// helpers.
pub type BoxedError = Box<dyn Error + Send + Sync + 'static>;

/// Shorthand for results carrying a [`BoxedError`].
pub type BoxedErrorResult<T> = std::result::Result<T, BoxedError>;

/// Renders an error and its whole source chain on a single line, for
/// structured log fields where a multi-line report is unreadable.
pub struct CompactFmt<'e, E>(&'e E);

impl<E> fmt::Display for CompactFmt<'_, E>
where
    E: Error,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)?;
        let mut source = self.0.source();
        while let Some(cause) = source {
            write!(f, ": {cause}")?;
            source = cause.source();
        }
        Ok(())
    }
}

pub trait FmtCompact {
    fn fmt_compact(&self) -> CompactFmt<'_, Self>
    where
        Self: Sized;
}

impl<E> FmtCompact for E
where
    E: Error,
{
    fn fmt_compact(&self) -> CompactFmt<'_, Self> {
        CompactFmt(self)
    }
}

#[cfg(test)]
mod tests {
    use snafu::Snafu;

    use super::*;

    #[derive(Debug, Snafu)]
    #[snafu(display("outer failed"))]
    struct Outer {
        source: Inner,
    }

    #[derive(Debug, Snafu)]
    #[snafu(display("inner detail"))]
    struct Inner;

    #[test]
    fn chain_renders_on_one_line() {
        let err = Outer { source: Inner };
        assert_eq!(err.fmt_compact().to_string(), "outer failed: inner detail");
    }

    #[test]
    fn boxed_alias_accepts_any_error() {
        fn fails() -> BoxedErrorResult<()> {
            Err(Box::new(Outer { source: Inner }))
        }
        let err = fails().expect_err("always fails");
        assert_eq!(err.to_string(), "outer failed");
        assert_eq!(
            err.source().expect("has a source").to_string(),
            "inner detail"
        );
    }
}
