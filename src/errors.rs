use std::fmt;

/// Error type for page encoding, node mutation and page storage.
///
/// Each variant represents a distinct error condition with a unique error code for easier debugging
/// and error handling in applications.
#[derive(Debug)]
pub enum Error {
    /// I/O-related error (e.g., file operations).
    /// Error code: 1000
    Io(std::io::Error),
    /// Page bytes that do not decode (unknown kind tag, offsets outside the page, truncated record).
    /// Error code: 2000
    CorruptPage(String),
    /// A single record that does not fit a page even alone.
    /// Error code: 3000
    OversizedRecord(String),
    /// The page store cannot hand out another page.
    /// Error code: 4000
    OutOfSpace(String),
    /// Unknown or released page id.
    /// Error code: 5000
    NotFound(String),
    /// Node content does not fit its target buffer or the maximum split fan-out.
    /// Error code: 6000
    Overflow(String),
    /// Store superblock serialization/deserialization error.
    /// Error code: 7000
    Encoding(String),
    /// Invalid operation (e.g., committing a scratch buffer).
    /// Error code: 8000
    InvalidOperation(String),
    /// Miscellaneous uncategorized error.
    /// Error code: 9000
    Other(String),
}

impl Error {
    /// Returns the error code associated with this error variant.
    ///
    /// # Examples
    /// ```
    /// use cowtree::errors::Error;
    /// let err = Error::CorruptPage("bad kind".to_string());
    /// assert_eq!(err.code(), 2000);
    /// ```
    pub fn code(&self) -> u32 {
        match self {
            Error::Io(_) => 1000,
            Error::CorruptPage(_) => 2000,
            Error::OversizedRecord(_) => 3000,
            Error::OutOfSpace(_) => 4000,
            Error::NotFound(_) => 5000,
            Error::Overflow(_) => 6000,
            Error::Encoding(_) => 7000,
            Error::InvalidOperation(_) => 8000,
            Error::Other(_) => 9000,
        }
    }

    /// Returns a human-readable error category for this error variant.
    ///
    /// # Examples
    /// ```
    /// use cowtree::errors::Error;
    /// let err = Error::OutOfSpace("store is full".to_string());
    /// assert_eq!(err.category(), "Out Of Space");
    /// ```
    pub fn category(&self) -> &'static str {
        match self {
            Error::Io(_) => "I/O",
            Error::CorruptPage(_) => "Corrupt Page",
            Error::OversizedRecord(_) => "Oversized Record",
            Error::OutOfSpace(_) => "Out Of Space",
            Error::NotFound(_) => "Not Found",
            Error::Overflow(_) => "Overflow",
            Error::Encoding(_) => "Encoding",
            Error::InvalidOperation(_) => "Invalid Operation",
            Error::Other(_) => "Other",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "[{}] I/O Error: {}", self.code(), e),
            Error::CorruptPage(msg) => write!(f, "[{}] Corrupt Page: {}", self.code(), msg),
            Error::OversizedRecord(msg) => {
                write!(f, "[{}] Oversized Record: {}", self.code(), msg)
            }
            Error::OutOfSpace(msg) => write!(f, "[{}] Out Of Space: {}", self.code(), msg),
            Error::NotFound(msg) => write!(f, "[{}] Not Found: {}", self.code(), msg),
            Error::Overflow(msg) => write!(f, "[{}] Overflow: {}", self.code(), msg),
            Error::Encoding(msg) => write!(f, "[{}] Encoding Error: {}", self.code(), msg),
            Error::InvalidOperation(msg) => {
                write!(f, "[{}] Invalid Operation: {}", self.code(), msg)
            }
            Error::Other(msg) => write!(f, "[{}] Unknown Error: {}", self.code(), msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<bincode::error::EncodeError> for Error {
    fn from(err: bincode::error::EncodeError) -> Self {
        Error::Encoding(format!("Failed to encode: {}", err))
    }
}

impl From<bincode::error::DecodeError> for Error {
    fn from(err: bincode::error::DecodeError) -> Self {
        Error::Encoding(format!("Failed to decode: {}", err))
    }
}

/// Convenience macro to create an `Error` with a formatted message.
///
/// # Examples
/// ```
/// use cowtree::err;
/// let err = err!(CorruptPage, "Unknown node kind {}", 7);
/// assert_eq!(err.code(), 2000);
/// assert_eq!(err.to_string(), "[2000] Corrupt Page: Unknown node kind 7");
/// ```
#[macro_export]
macro_rules! err {
    ($variant:ident, $msg:expr) => {
        $crate::errors::Error::$variant($msg.to_string())
    };
    ($variant:ident, $fmt:expr, $($arg:tt)*) => {
        $crate::errors::Error::$variant(format!($fmt, $($arg)*))
    };
}
