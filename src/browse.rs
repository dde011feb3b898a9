//! Browse sessions: long-lived, self-expanding service discovery
//! subscriptions over the control channel.

#[cfg(feature = "logging")]
use crate::log::{debug, trace};

use crate::control::ControlConn;
use crate::ctl_parser::{CtlEvent, CtlMessage, ServiceState};
use crate::error::{Error, Result};
use crate::Receiver;
use flume::bounded;
use std::{collections::HashSet, fmt, thread};

/// A simple macro to report all kinds of errors.
macro_rules! e_fmt {
  ($($arg:tt)+) => {
      Error::Msg(format!($($arg)+))
  };
}

/// The (application, protocol) filter of a browse subscription.
///
/// Both fields absent is the wildcard "all": it subscribes to every
/// top-level application category the daemon knows about. A selector is
/// immutable once issued.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Selector {
    application: Option<String>,
    protocol: Option<String>,
}

impl Selector {
    /// The wildcard selector: browse everything.
    pub fn all() -> Self {
        Self {
            application: None,
            protocol: None,
        }
    }

    /// A concrete application/protocol pair, for example `_http` / `_tcp`.
    pub fn new(application: impl Into<String>, protocol: impl Into<String>) -> Self {
        Self {
            application: Some(application.into()),
            protocol: Some(protocol.into()),
        }
    }

    pub fn application(&self) -> Option<&str> {
        self.application.as_deref()
    }

    pub fn protocol(&self) -> Option<&str> {
        self.protocol.as_deref()
    }

    /// Whether this is the wildcard "all" selector.
    pub fn is_all(&self) -> bool {
        self.application.is_none() && self.protocol.is_none()
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.application, &self.protocol) {
            (Some(app), Some(proto)) => write!(f, "{app}/{proto}"),
            (Some(app), None) => write!(f, "{app}/*"),
            (None, Some(proto)) => write!(f, "*/{proto}"),
            (None, None) => write!(f, "all"),
        }
    }
}

/// A concrete service instance reported by the daemon.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceInstance {
    name: String,
    application: String,
    protocol: String,
}

impl ServiceInstance {
    /// The service instance name, e.g. `printer1._http._tcp`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn application(&self) -> &str {
        &self.application
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }
}

/// All possible events delivered to the client of a browse session.
#[derive(Debug)]
#[non_exhaustive]
pub enum BrowseEvent {
    /// A service instance appeared under the browsed scope.
    ServiceUp(ServiceInstance),

    /// A previously reported instance went away.
    ServiceDown(ServiceInstance),

    /// The session hit a fatal error and is over; nothing follows.
    ///
    /// Only delivered on the channel returned by [BrowseSession::spawn].
    /// [BrowseSession::run] returns the error to the caller instead.
    SessionFailed(Error),
}

/// Tracks which selectors were already sent to the daemon in this session.
///
/// The daemon tolerates redundant subscribe calls; suppressing duplicates
/// only trims registration traffic. The set strictly grows: there is no
/// unsubscribe in the protocol, subscriptions die with the connection.
#[derive(Debug, Default)]
struct SubscriptionRegistry {
    issued: HashSet<Selector>,
}

impl SubscriptionRegistry {
    /// Records `selector` as issued. Returns false if it already was.
    fn insert(&mut self, selector: &Selector) -> bool {
        if self.issued.contains(selector) {
            return false;
        }
        self.issued.insert(selector.clone());
        true
    }
}

/// A live browse session over an exclusively owned control channel.
///
/// The session registers interest in the opening selector and then walks
/// the daemon's directory tree as it is revealed: every event that names a
/// category instead of a service instance triggers a subscription one level
/// further down. A wildcard session thereby unfolds, event by event, into
/// concrete per-protocol subscriptions driven entirely by the daemon's own
/// output.
pub struct BrowseSession {
    conn: ControlConn,
    registry: SubscriptionRegistry,
    resolve_on_discovery: bool,
}

impl BrowseSession {
    /// Opens a session on `conn` and issues the initial subscription for
    /// `selector`.
    ///
    /// `resolve_on_discovery` asks the session to also resolve full
    /// connection details for every discovered instance. That resolution
    /// step is not implemented: the first discovery will end the session
    /// with [Error::NotImplemented] rather than silently skip it.
    pub fn open(
        conn: ControlConn,
        selector: Selector,
        resolve_on_discovery: bool,
    ) -> Result<Self> {
        let mut session = Self {
            conn,
            registry: SubscriptionRegistry::default(),
            resolve_on_discovery,
        };
        session.issue_subscription(selector)?;
        Ok(session)
    }

    /// Runs the read-dispatch loop.
    ///
    /// Browsing is open-ended: the loop never decides to stop on its own
    /// and this function never returns `Ok`. It blocks until the channel
    /// dies ([Error::Io] or [Error::Disconnected]) or `on_event` fails, and
    /// returns that error; the connection is dropped on the way out. No
    /// reconnect or resubscription is attempted.
    pub fn run<F>(mut self, mut on_event: F) -> Result<()>
    where
        F: FnMut(BrowseEvent) -> Result<()>,
    {
        loop {
            match self.conn.receive()? {
                CtlMessage::Event(event) => self.handle_event(event, &mut on_event)?,
                other => debug!("ignoring non-browse message: {:?}", other),
            }
        }
    }

    /// Moves the session onto its own thread and delivers events over a
    /// bounded channel.
    ///
    /// The returned [Receiver] supports both `recv()` and `recv_async()`.
    /// A fatal error arrives as a final [BrowseEvent::SessionFailed] before
    /// the channel closes. Dropping the receiver ends the session.
    pub fn spawn(self) -> Result<Receiver<BrowseEvent>> {
        let (sender, receiver) = bounded(100);
        let event_sender = sender.clone();

        thread::Builder::new()
            .name("mdns-browse".to_string())
            .spawn(move || {
                let result = self.run(|event| {
                    event_sender
                        .send(event)
                        .map_err(|_| Error::Msg("browse listener dropped".to_string()))
                });
                if let Err(e) = result {
                    debug!("browse session ended: {}", &e);
                    let _ = sender.send(BrowseEvent::SessionFailed(e));
                }
            })
            .map_err(|e| e_fmt!("thread builder failed to spawn: {}", e))?;

        Ok(receiver)
    }

    /// Classifies one daemon event.
    ///
    /// A named event is a concrete service instance and goes up to the
    /// caller with its up/down delta. A nameless event announces an
    /// application/protocol category available under the subscribed scope,
    /// and expands the session instead: subscribe to exactly that pair.
    fn handle_event<F>(&mut self, event: CtlEvent, on_event: &mut F) -> Result<()>
    where
        F: FnMut(BrowseEvent) -> Result<()>,
    {
        let CtlEvent {
            state,
            name,
            application,
            protocol,
        } = event;

        match name {
            Some(name) => {
                trace!("service {}: {} {}/{}", state, &name, &application, &protocol);
                let instance = ServiceInstance {
                    name,
                    application,
                    protocol,
                };
                on_event(match state {
                    ServiceState::Up => BrowseEvent::ServiceUp(instance),
                    ServiceState::Down => BrowseEvent::ServiceDown(instance),
                })?;

                if self.resolve_on_discovery {
                    return Err(Error::NotImplemented(
                        "service resolution over the control channel",
                    ));
                }
                Ok(())
            }
            // No instance name: walk one level down, whatever the delta.
            None => self.issue_subscription(Selector::new(application, protocol)),
        }
    }

    /// Sends a subscribe request for `selector` unless this session already
    /// sent one. The daemon streams the directory structure one level at a
    /// time; nothing bounds how many categories it may reveal.
    fn issue_subscription(&mut self, selector: Selector) -> Result<()> {
        if !self.registry.insert(&selector) {
            debug!("already subscribed to {}", selector);
            return Ok(());
        }
        trace!("subscribing to {}", &selector);
        self.conn
            .send_subscribe(selector.application(), selector.protocol())
    }
}
