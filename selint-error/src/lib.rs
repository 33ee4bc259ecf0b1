// SPDX-License-Identifier: Apache-2.0

//! The shared error type for the `selint` workspace.
//!
//! Every fallible operation in the analysis engine returns [`Result<T>`].
//! Errors form a singly-linked chain so that a low-level cause (an I/O
//! failure, say) can be wrapped with progressively more specific context as
//! it propagates, without losing the original error or paying for a `Box`
//! allocation per level.

use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};
use std::rc::Rc;

pub type Result<T> = std::result::Result<T, Error>;

/// The taxonomy of error conditions the core surfaces, matching the ten
/// kinds the analysis engine is specified to distinguish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Violated precondition of an internal routine.
    BadArg,
    /// Allocation failure; always fatal.
    OutOfMemory,
    /// Tried to record a declaration with no current module context.
    NoModName,
    /// Unbalanced block closer during parse.
    NotInBlock,
    /// Inference recursion exceeded the depth cap.
    IfCallLoop,
    /// The parser rejected the input.
    ParseError,
    /// Malformed `$N` substitution during template expansion.
    M4SubFailure,
    /// The configuration file was present but could not be parsed.
    ConfigParseError,
    /// A path could not be read.
    Io,
    /// Anything not captured by a more specific kind above.
    Internal,
}

impl ErrorKind {
    /// Whether this kind should abort the run rather than attach to a
    /// single finding and continue.
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            ErrorKind::OutOfMemory | ErrorKind::ConfigParseError | ErrorKind::ParseError
        )
    }
}

/// An introspectable error, with an optional chain of lower-level causes.
pub struct Error {
    kind: ErrorKind,
    head: Rc<ErrorNode>,
}

impl Error {
    /// Construct a new error from a message, with no specific kind.
    pub fn msg(msg: impl Into<Cow<'static, str>>) -> Error {
        Error::with_kind(ErrorKind::Internal, msg)
    }

    /// Construct a new error from a message with an explicit kind.
    pub fn with_kind(kind: ErrorKind, msg: impl Into<Cow<'static, str>>) -> Error {
        Error {
            kind,
            head: Rc::new(ErrorNode {
                current: Rc::new(Message(msg.into())),
                next: None,
            }),
        }
    }

    /// Wrap an existing standard error, with no specific kind.
    pub fn new(error: impl StdError + 'static) -> Error {
        Error {
            kind: ErrorKind::Internal,
            head: Rc::new(ErrorNode {
                current: Rc::new(error),
                next: None,
            }),
        }
    }

    /// The kind attached to the head of this error's chain.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Attach additional context, pushing the current error down the chain.
    pub fn context(self, msg: impl Into<Cow<'static, str>>) -> Error {
        log::trace!("attaching context to error [error: {}]", self.head);

        Error {
            kind: self.kind,
            head: Rc::new(ErrorNode {
                current: Rc::new(Message(msg.into())),
                next: Some(self.head),
            }),
        }
    }

    /// Reclassify the kind without discarding the chain.
    pub fn with_kind_override(mut self, kind: ErrorKind) -> Error {
        self.kind = kind;
        self
    }

    /// Iterate over the chain of causes, most recent first.
    pub fn chain(&self) -> Chain<'_> {
        Chain::new(self)
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl Eq for Error {}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(self.head.as_ref(), f)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self.head.as_ref(), f)
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.head.next.as_deref().map(|node| node as &dyn StdError)
    }
}

impl Clone for Error {
    fn clone(&self) -> Self {
        Error {
            kind: self.kind,
            head: Rc::clone(&self.head),
        }
    }
}

/// A single link in the error chain.
struct ErrorNode {
    current: ErrorObj,
    next: Option<ErrorLink>,
}

impl Debug for ErrorNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.current)?;

        if let Some(next) = &self.next {
            write!(f, "\n\nCaused by:")?;

            let mut index = 0;
            let mut link = Some(next.as_ref());

            while let Some(step) = link {
                write!(f, "\n{index:5}: {}", step.current)?;
                link = step.next.as_deref();
                index += 1;
            }
        }

        Ok(())
    }
}

impl Display for ErrorNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.current)
    }
}

impl StdError for ErrorNode {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.next.as_deref().map(|node| node as &dyn StdError)
    }
}

type ErrorObj = Rc<dyn StdError + 'static>;
type ErrorLink = Rc<ErrorNode>;

#[derive(Debug)]
struct Message(Cow<'static, str>);

impl Display for Message {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl StdError for Message {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        None
    }
}

pub struct Chain<'e> {
    current: Option<&'e ErrorNode>,
}

impl<'e> Chain<'e> {
    fn new(error: &'e Error) -> Chain<'e> {
        Chain {
            current: Some(error.head.as_ref()),
        }
    }
}

impl<'e> Iterator for Chain<'e> {
    type Item = &'e ErrorNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.current?;
        self.current = node.next.as_deref();
        Some(node)
    }
}

impl<T: StdError + 'static> From<T> for Error {
    fn from(error: T) -> Error {
        Error::new(error)
    }
}

/// A limited analogue of the `anyhow!` macro, scoped to `Error::msg`.
#[macro_export]
macro_rules! selint_error {
    ($msg:literal $(,)?) => {
        $crate::Error::msg($msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::msg(format!($fmt, $($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn macro_literal() {
        let error = selint_error!("bad thing happened");
        assert_eq!(format!("{error:?}"), "bad thing happened");
    }

    #[test]
    fn context_chain_prints_causes() {
        let error = Error::msg("root cause").context("while loading foo.te");
        let printed = format!("{error:?}");
        assert!(printed.contains("while loading foo.te"));
        assert!(printed.contains("Caused by"));
        assert!(printed.contains("root cause"));
    }

    #[test]
    fn kind_is_preserved_through_context() {
        let error = Error::with_kind(ErrorKind::Io, "no such file").context("loading policy.fc");
        assert_eq!(error.kind(), ErrorKind::Io);
    }

    #[test]
    fn clone_shares_the_chain() {
        let error = Error::msg("shared");
        let cloned = error.clone();
        assert_eq!(format!("{error:?}"), format!("{cloned:?}"));
    }
}
