//! A small and safe client for the control channel of a local mDNS
//! resolver daemon.
//!
//! The daemon owns all of mDNS: multicast I/O, packet parsing and caching.
//! This crate speaks its framed control protocol over a Unix stream socket
//! and exposes two things: one-shot lookups (forward address, host info,
//! text record, reverse address) and long-lived browse subscriptions for
//! service discovery.
//!
//! A browse session behaves like this:
//!```text
//!  Client            <control socket>        resolver daemon
//!    |    --- subscribe all -->                 |
//!    |                                          | walks its tree
//!    |    <-- category _http/_tcp --            |
//!    |    --- subscribe _http/_tcp -->          |
//!    |    <-- up printer1._http._tcp --         |
//!    |           ...                            |
//!```
//! An event that carries no instance name announces a *category*: an
//! application/protocol pair that exists below the subscribed scope. The
//! client reacts by subscribing to exactly that pair, so a wildcard
//! subscription unfolds into concrete per-protocol subscriptions driven
//! entirely by the daemon's own output. The daemon tolerates redundant
//! subscriptions; the client suppresses them anyway to keep registration
//! traffic down.
//!
//! # Usage
//!
//! ## Example: browsing everything the daemon can see.
//!
//! ```rust,no_run
//! use mdns_ctl::{BrowseEvent, BrowseSession, ControlConn, Selector, MDNSD_SOCKET};
//!
//! let conn = ControlConn::connect(MDNSD_SOCKET).expect("Failed to connect to mdnsd");
//! let session = BrowseSession::open(conn, Selector::all(), false)
//!     .expect("Failed to subscribe");
//!
//! // Receive the browse events in sync or async. Users can call
//! // `receiver.recv_async().await` if running in an async environment.
//! let receiver = session.spawn().expect("Failed to start browsing");
//! while let Ok(event) = receiver.recv() {
//!     match event {
//!         BrowseEvent::ServiceUp(instance) => {
//!             println!("+ {} {}/{}",
//!                 instance.name(), instance.application(), instance.protocol());
//!         }
//!         other_event => {
//!             println!("Received other event: {:?}", &other_event);
//!         }
//!     }
//! }
//! ```
//!
//! ## Example: a one-shot address lookup.
//!
//! ```rust,no_run
//! use mdns_ctl::{ControlConn, LookupResult, MDNSD_SOCKET};
//!
//! let mut conn = ControlConn::connect(MDNSD_SOCKET).expect("Failed to connect to mdnsd");
//! match conn.lookup_address("myhost.local").expect("lookup failed") {
//!     LookupResult::Found(addr) => println!("Address: {}", addr),
//!     LookupResult::NotFound => println!("Address not found."),
//! }
//! ```
//!
//! # Limitations
//!
//! - Only IPv4, matching the daemon.
//! - Lookups and browse reads block with no timeout: a hung daemon hangs
//!   the client.
//! - A dead channel is fatal. There is no reconnect, and subscriptions are
//!   not replayed; the daemon drops them with the connection.

#![forbid(unsafe_code)]

#[cfg(feature = "logging")]
pub(crate) mod log {
    pub(crate) use ::log::{debug, trace};
}

#[cfg(not(feature = "logging"))]
#[macro_use]
mod log {
    macro_rules! debug {
        ($($arg:expr),*) => {
            {
                let _ = ($($arg),*); // avoid warnings about unused variables.
            }
        };
    }
    macro_rules! trace {
        ($($arg:expr),*) => {
            {
                let _ = ($($arg),*); // avoid warnings about unused variables.
            }
        };
    }
}

mod browse;
mod control;
pub mod ctl_parser;
mod error;
mod lookup;

pub use browse::{BrowseEvent, BrowseSession, Selector, ServiceInstance};
pub use control::{ControlConn, MDNSD_SOCKET};
pub use error::{Error, Result};
pub use lookup::{HostInfo, LookupResult, ServiceRecord};

/// Re-export from `flume`.
pub use flume::Receiver;
