use thiserror::Error;

/// Errors produced while decoding or encoding bencode.
///
/// Every decode variant carries the byte offset at which the violation was
/// detected. Together they form the "malformed encoding" family: a bad
/// buffer fails the single decode call and nothing else.
#[derive(Debug, Error)]
pub enum BencodeError {
    #[error("unexpected end of input at byte {offset} while reading {context}")]
    UnexpectedEof {
        offset: usize,
        context: &'static str,
    },

    #[error("empty integer at byte {offset}")]
    EmptyInteger { offset: usize },

    #[error("invalid integer at byte {offset}: {reason}")]
    InvalidInteger { offset: usize, reason: String },

    #[error("invalid string length at byte {offset}")]
    InvalidStringLength { offset: usize },

    #[error("unexpected symbol {symbol:?} at byte {offset}")]
    UnexpectedChar { offset: usize, symbol: char },

    #[error("dictionary key at byte {offset} is not a byte string")]
    NonStringKey { offset: usize },

    #[error("dictionary key at byte {offset} has no value")]
    MissingDictValue { offset: usize },

    #[error("trailing data at byte {offset}")]
    TrailingData { offset: usize },

    #[error("nesting deeper than {max} levels at byte {offset}")]
    NestingTooDeep { offset: usize, max: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BencodeError {
    /// Byte offset of a decode failure, `None` for encoder I/O errors.
    pub fn offset(&self) -> Option<usize> {
        match self {
            BencodeError::UnexpectedEof { offset, .. }
            | BencodeError::EmptyInteger { offset }
            | BencodeError::InvalidInteger { offset, .. }
            | BencodeError::InvalidStringLength { offset }
            | BencodeError::UnexpectedChar { offset, .. }
            | BencodeError::NonStringKey { offset }
            | BencodeError::MissingDictValue { offset }
            | BencodeError::TrailingData { offset }
            | BencodeError::NestingTooDeep { offset, .. } => Some(*offset),
            BencodeError::Io(_) => None,
        }
    }
}
