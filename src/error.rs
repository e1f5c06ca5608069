use std::fmt;

/// Errors raised by the reader and the evaluator.
///
/// The first two variants are reader signals: a driver catches them and
/// decides whether to stop reading. Everything else is an evaluation fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KonsError {
    /// Malformed token, unexpected closer, misplaced dot.
    Syntax { pos: usize, message: String },

    /// Input ended inside a list or after a committed token prefix.
    EndOfInput,

    /// A symbol had no binding in any enclosing scope.
    Unbound(String),

    /// The head of a call did not evaluate to a callable value.
    NotCallable(String),

    /// A primitive received an argument of the wrong kind.
    TypeError(String),

    /// Badly shaped special form, lambda, or parameter list.
    Malformed(String),

    /// Fewer arguments than non-rest parameters.
    UnderArgs(String),

    /// Checked integer arithmetic overflowed.
    Overflow(String),

    /// Evaluation nested deeper than the configured limit.
    DepthExceeded,

    /// The heap reached its page limit and a collection freed nothing usable.
    HeapExhausted,

    /// Internal interpreter error (a dangling handle, a kind mismatch).
    Internal(String),
}

impl KonsError {
    pub fn syntax(pos: usize, message: impl Into<String>) -> Self {
        KonsError::Syntax {
            pos,
            message: message.into(),
        }
    }

    /// True for the recoverable reader tier.
    pub fn is_reader_signal(&self) -> bool {
        matches!(self, KonsError::Syntax { .. } | KonsError::EndOfInput)
    }

    /// True for evaluator faults, which a driver treats as fatal.
    pub fn is_fault(&self) -> bool {
        !self.is_reader_signal()
    }
}

impl fmt::Display for KonsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KonsError::Syntax { pos, message } => {
                write!(f, "Syntax error at byte {}: {}", pos, message)
            }
            KonsError::EndOfInput => write!(f, "Reached end of input"),
            KonsError::Unbound(name) => write!(f, "Error: symbol '{}' was not found", name),
            KonsError::NotCallable(what) => write!(f, "Error: {} is not callable", what),
            KonsError::TypeError(msg) => write!(f, "Type error: {}", msg),
            KonsError::Malformed(msg) => write!(f, "Error: malformed form: {}", msg),
            KonsError::UnderArgs(name) => {
                write!(f, "Error: too few arguments (missing '{}')", name)
            }
            KonsError::Overflow(op) => write!(f, "Error: integer overflow in {}", op),
            KonsError::DepthExceeded => write!(f, "Error: evaluation depth limit exceeded"),
            KonsError::HeapExhausted => write!(f, "Error: heap page limit exceeded"),
            KonsError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for KonsError {}

pub type KonsResult<T> = Result<T, KonsError>;
