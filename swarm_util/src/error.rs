use std::fmt;

/// Result type for length validation helpers.
pub type LengthResult<T> = Result<T, LengthError>;

/// Error produced when a buffer does not have the length an operation requires.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct LengthError {
    kind: LengthErrorKind,
    expected: usize,
}

impl LengthError {
    pub fn new(kind: LengthErrorKind, expected: usize) -> LengthError {
        LengthError { kind, expected }
    }

    pub fn kind(&self) -> LengthErrorKind {
        self.kind
    }

    pub fn expected(&self) -> usize {
        self.expected
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum LengthErrorKind {
    LengthExpected,
}

impl fmt::Display for LengthError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            LengthErrorKind::LengthExpected => {
                write!(f, "expected a buffer of exactly {} bytes", self.expected)
            }
        }
    }
}

impl std::error::Error for LengthError {}
