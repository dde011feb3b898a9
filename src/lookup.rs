//! One-shot lookups over the control channel.
//!
//! Each call issues exactly one query and blocks for exactly one correlated
//! reply. Lookups are strictly serialized: there is never more than one
//! query in flight on a connection, and the first transport failure aborts
//! the whole invocation.

#[cfg(feature = "logging")]
use crate::log::trace;

use crate::control::ControlConn;
use crate::ctl_parser::{
    CtlIncoming, CtlMessage, LookupKind, LookupReply, STATUS_FOUND, STATUS_NOT_FOUND,
};
use crate::error::{Error, Result};
use std::net::Ipv4Addr;

/// Outcome of a one-shot lookup.
///
/// A name that does not resolve is an ordinary outcome, not an error;
/// transport failures and daemon-reported errors come back on the `Err`
/// path of the surrounding [Result].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LookupResult<T> {
    /// The daemon answered the query with a payload.
    Found(T),

    /// The daemon answered: no such record.
    NotFound,
}

impl<T> LookupResult<T> {
    /// Returns the payload, if any.
    pub fn found(self) -> Option<T> {
        match self {
            LookupResult::Found(payload) => Some(payload),
            LookupResult::NotFound => None,
        }
    }
}

/// Host information from a HINFO lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostInfo {
    pub cpu: String,
    pub os: String,
}

/// A service (SRV) record.
///
/// Only produced by [ControlConn::lookup_service], which is not implemented
/// yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceRecord {
    pub name: String,
    pub port: u16,
    pub priority: u16,
    pub weight: u16,
}

impl ControlConn {
    /// Looks up the IPv4 address of `hostname`.
    pub fn lookup_address(&mut self, hostname: &str) -> Result<LookupResult<Ipv4Addr>> {
        let reply = self.lookup_round_trip(LookupKind::Address, hostname)?;
        decode_found(reply, |body| body.read_ipv4())
    }

    /// Looks up host information (cpu and os) of `hostname`.
    pub fn lookup_host_info(&mut self, hostname: &str) -> Result<LookupResult<HostInfo>> {
        let reply = self.lookup_round_trip(LookupKind::HostInfo, hostname)?;
        decode_found(reply, |body| {
            Ok(HostInfo {
                cpu: body.read_char_string()?,
                os: body.read_char_string()?,
            })
        })
    }

    /// Looks up the text record of `hostname`.
    pub fn lookup_text(&mut self, hostname: &str) -> Result<LookupResult<String>> {
        let reply = self.lookup_round_trip(LookupKind::Text, hostname)?;
        decode_found(reply, |body| body.read_char_string())
    }

    /// Looks up the service record of `hostname`.
    ///
    /// Not wired up to the daemon yet; it fails loudly so the gap is never
    /// mistaken for an empty result.
    pub fn lookup_service(&mut self, _hostname: &str) -> Result<LookupResult<ServiceRecord>> {
        // TODO: needs the SRV query kind on the daemon side first.
        Err(Error::NotImplemented("SRV lookup"))
    }

    /// Looks up the hostname owning `address` (reverse lookup).
    pub fn reverse_lookup(&mut self, address: Ipv4Addr) -> Result<LookupResult<String>> {
        let reply = self.lookup_round_trip(LookupKind::Reverse, &address.to_string())?;
        decode_found(reply, |body| body.read_char_string())
    }

    // One query out, one correlated reply back.
    fn lookup_round_trip(&mut self, kind: LookupKind, name: &str) -> Result<LookupReply> {
        let token = fastrand::u32(..);
        trace!("lookup {} for {}, token {}", kind, name, token);

        self.send_lookup(kind, name, token)?;
        match self.receive()? {
            CtlMessage::LookupReply(reply) => {
                if reply.token != token {
                    return Err(Error::Malformed(format!(
                        "lookup reply token {} does not match query token {}",
                        reply.token, token
                    )));
                }
                Ok(reply)
            }
            other => Err(Error::Malformed(format!(
                "expected a lookup reply, got {:?}",
                other
            ))),
        }
    }
}

// Maps the daemon's tri-state reply status onto [LookupResult].
fn decode_found<T>(
    mut reply: LookupReply,
    read: impl FnOnce(&mut CtlIncoming) -> Result<T>,
) -> Result<LookupResult<T>> {
    match reply.status {
        STATUS_NOT_FOUND => Ok(LookupResult::NotFound),
        STATUS_FOUND => Ok(LookupResult::Found(read(&mut reply.body)?)),
        code => Err(Error::Msg(format!(
            "daemon reported lookup failure, status {code}"
        ))),
    }
}
