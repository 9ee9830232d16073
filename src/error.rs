use std::{error::Error as StdError, fmt, io};

#[derive(Debug)]
pub enum Error {
    /// A required constructor argument was empty or out of range.
    InvalidArgument(&'static str),
    InvalidMimeType(mime::FromStrError),
    InvalidHeader(http::header::InvalidHeaderValue),
    Io(io::Error),
    /// The stream source ended before yielding its declared length.
    StreamTruncated {
        expected: u64,
        read: u64,
    },
    Http(http::Error),
    Hyper(hyper::Error),
}

impl Error {
    pub(crate) fn invalid_argument(name: &'static str) -> Self {
        Error::InvalidArgument(name)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::InvalidArgument(name) => write!(f, "Invalid argument: {}", name),
            Error::InvalidMimeType(ref e) => write!(f, "Content-Type value invalid: {}", e),
            Error::InvalidHeader(ref e) => write!(f, "Header value invalid: {}", e),
            Error::Io(ref e) => write!(f, "IO: {}", e),
            Error::StreamTruncated { expected, read } => write!(
                f,
                "Stream ended after {} of {} expected bytes",
                read, expected
            ),
            Error::Http(ref e) => write!(f, "Http: {}", e),
            Error::Hyper(ref e) => write!(f, "Hyper error: {}", e),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match *self {
            Error::InvalidMimeType(ref e) => Some(e),
            Error::InvalidHeader(ref e) => Some(e),
            Error::Io(ref e) => Some(e),
            Error::Http(ref e) => Some(e),
            Error::Hyper(ref e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(inner: io::Error) -> Self {
        Error::Io(inner)
    }
}

impl From<mime::FromStrError> for Error {
    fn from(inner: mime::FromStrError) -> Self {
        Error::InvalidMimeType(inner)
    }
}

impl From<http::header::InvalidHeaderValue> for Error {
    fn from(inner: http::header::InvalidHeaderValue) -> Self {
        Error::InvalidHeader(inner)
    }
}

impl From<http::Error> for Error {
    fn from(inner: http::Error) -> Self {
        Error::Http(inner)
    }
}

impl From<hyper::Error> for Error {
    fn from(inner: hyper::Error) -> Self {
        Error::Hyper(inner)
    }
}
