//! The control channel: a framed Unix stream socket to the resolver daemon.

#[cfg(feature = "logging")]
use crate::log::{debug, trace};

use crate::ctl_parser::{
    decode_frame, encode_lookup_query, encode_subscribe, CtlMessage, FrameHeader, LookupKind,
    CTL_HEADER_LEN,
};
use crate::error::{Error, Result};
use socket2::{Domain, SockAddr, Socket, Type};
use std::io::{ErrorKind, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;

/// Default path of the resolver daemon's control socket.
pub const MDNSD_SOCKET: &str = "/var/run/mdnsd.sock";

/// The client end of the control channel.
///
/// One long-lived duplex connection, exclusively owned by its creator for
/// the whole session. Reads block with no timeout; cancellation is external
/// only (a signal that kills the process also closes the socket, at which
/// point the daemon drops every subscription made on it).
pub struct ControlConn {
    stream: UnixStream,
}

impl ControlConn {
    /// Connects to the daemon's control socket at `path`.
    pub fn connect<P: AsRef<Path>>(path: P) -> Result<Self> {
        let socket = Socket::new(Domain::UNIX, Type::STREAM, None)
            .map_err(|e| Error::Connect(format!("failed to create socket: {e}")))?;

        let addr = SockAddr::unix(path.as_ref())
            .map_err(|e| Error::Connect(format!("bad socket path: {e}")))?;

        socket
            .connect(&addr)
            .map_err(|e| Error::Connect(format!("{}: {e}", path.as_ref().display())))?;

        debug!("connected to resolver daemon at {}", path.as_ref().display());

        Ok(Self {
            stream: socket.into(),
        })
    }

    /// Wraps an already-connected stream.
    ///
    /// This is how the daemon end of the channel speaks the same codec; it
    /// is also what test harnesses use to script a fake daemon.
    pub fn from_stream(stream: UnixStream) -> Self {
        Self { stream }
    }

    /// Writes one pre-encoded frame to the channel.
    pub fn send(&mut self, frame: Vec<u8>) -> Result<()> {
        self.stream
            .write_all(&frame)
            .map_err(|e| Error::Io(format!("send failed: {e}")))?;
        trace!("sent frame, {} bytes", frame.len());
        Ok(())
    }

    /// Registers browse interest in an application/protocol pair. Both
    /// fields absent subscribes to every top-level application category.
    pub fn send_subscribe(
        &mut self,
        application: Option<&str>,
        protocol: Option<&str>,
    ) -> Result<()> {
        self.send(encode_subscribe(application, protocol, 0)?)
    }

    /// Issues a one-shot lookup query correlated by `token`.
    pub fn send_lookup(&mut self, kind: LookupKind, name: &str, token: u32) -> Result<()> {
        self.send(encode_lookup_query(kind, name, token)?)
    }

    /// Blocks until the next frame arrives and decodes it.
    ///
    /// Frame types this client does not know are skipped. A clean
    /// end-of-stream at a frame boundary comes back as
    /// [Error::Disconnected]; an end-of-stream that cuts a frame short is
    /// an i/o error like any other.
    pub fn receive(&mut self) -> Result<CtlMessage> {
        loop {
            let mut hdr_buf = [0u8; CTL_HEADER_LEN];
            self.read_full(&mut hdr_buf, true)?;
            let header = FrameHeader::parse(&hdr_buf)?;

            let mut payload = vec![0u8; header.payload_len()];
            self.read_full(&mut payload, false)?;

            match header.ty {
                Some(ty) => return decode_frame(ty, header.token, payload),
                None => {
                    debug!("skipping unknown frame, {} payload bytes", payload.len());
                }
            }
        }
    }

    // Fills `buf` completely. `at_boundary` is set when the read starts a
    // new frame, where a clean close by the daemon is a distinct condition.
    fn read_full(&mut self, buf: &mut [u8], at_boundary: bool) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.stream.read(&mut buf[filled..]) {
                Ok(0) => {
                    return if at_boundary && filled == 0 {
                        Err(Error::Disconnected)
                    } else {
                        Err(Error::Io("unexpected end of frame".to_string()))
                    };
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Io(e.to_string())),
            }
        }
        Ok(())
    }
}
