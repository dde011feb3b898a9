use std::fmt;

/// A basic error type from this library.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Could not reach the resolver daemon's control socket.
    Connect(String),

    /// Read or write on the control channel failed mid-session.
    Io(String),

    /// The daemon closed the control channel. Fatal for a browse session:
    /// all subscriptions are gone with the connection.
    Disconnected,

    /// The daemon sent a frame that does not parse, or a lookup reply
    /// that does not correlate with the outstanding query.
    Malformed(String),

    /// An operation the control protocol defines but this client does not
    /// implement yet.
    NotImplemented(&'static str),

    /// A generic error message.
    Msg(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connect(s) => write!(f, "connect to resolver daemon failed: {s}"),
            Error::Io(s) => write!(f, "control channel i/o failed: {s}"),
            Error::Disconnected => write!(f, "resolver daemon closed the control channel"),
            Error::Malformed(s) => write!(f, "malformed control message: {s}"),
            Error::NotImplemented(what) => write!(f, "{what} is not implemented"),
            Error::Msg(s) => write!(f, "{s}"),
        }
    }
}

impl std::error::Error for Error {}

/// One and only `Result` type from this library crate.
pub type Result<T> = core::result::Result<T, Error>;
