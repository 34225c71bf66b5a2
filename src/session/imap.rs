//! [`MailboxSession`] over a real IMAPS connection (the `imap` crate).
//!
//! Mailboxes are opened with `EXAMINE` and headers are fetched with
//! `BODY.PEEK[HEADER]`, so a run never changes server state.

use std::collections::{BTreeMap, BTreeSet};
use std::net::TcpStream;
use std::time::Duration;

use imap_proto::NameAttribute;
use tracing::{debug, info, warn};

use super::{sequence_set, FolderInfo, MailboxSession};
use crate::error::{Result, SearchError};
use crate::model::record::SeqNum;

type Connection = Box<dyn ::imap::ImapConnection>;
type Session = ::imap::Session<Connection>;

/// Connection parameters for an IMAPS server.
#[derive(Clone)]
pub struct ConnectParams {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Read/write timeout on the socket; `None` waits forever.
    pub timeout: Option<Duration>,
    /// Dump the IMAP conversation to stderr.
    pub debug: bool,
}

impl std::fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("timeout", &self.timeout)
            .field("debug", &self.debug)
            .finish()
    }
}

/// A logged-in IMAP session that can re-establish itself once dropped.
pub struct ImapSession {
    params: ConnectParams,
    session: Option<Session>,
}

impl ImapSession {
    /// Connect over TLS and log in.
    ///
    /// Login failures map to `Authentication`, everything else to `Network`.
    pub fn connect(params: ConnectParams) -> Result<Self> {
        let session = open(&params)?;
        Ok(Self {
            params,
            session: Some(session),
        })
    }

    /// Log out politely. Errors are only logged.
    pub fn logout(mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.logout() {
                debug!(error = %e, "Logout failed");
            }
        }
    }

    fn live(&mut self) -> Result<&mut Session> {
        self.session
            .as_mut()
            .ok_or_else(|| SearchError::Network("not connected".to_string()))
    }
}

fn open(params: &ConnectParams) -> Result<Session> {
    info!(host = %params.host, port = params.port, user = %params.user, "Connecting");
    let timeout = params.timeout;
    let net_err = |e: &dyn std::fmt::Display| {
        SearchError::Network(format!("{}:{}: {e}", params.host, params.port))
    };
    let tcp = TcpStream::connect((params.host.as_str(), params.port)).map_err(|e| net_err(&e))?;
    let conn = tls_handshake(params.host.as_str(), tcp, timeout).map_err(|e| net_err(&e))?;
    let mut client = ::imap::Client::new(conn);
    client.read_greeting().map_err(|e| net_err(&e))?;

    let mut session = client
        .login(&params.user, &params.password)
        .map_err(|(e, _)| match e {
            ::imap::Error::Io(io) => SearchError::Network(io.to_string()),
            ::imap::Error::ConnectionLost => SearchError::Network("connection lost".to_string()),
            other => SearchError::Authentication(other.to_string()),
        })?;
    session.debug = params.debug;
    Ok(session)
}

/// Arm the socket timeouts, then wrap the stream in TLS.
///
/// A read that hits the timeout surfaces as an I/O error, i.e. `Network`.
fn tls_handshake(
    domain: &str,
    tcp: TcpStream,
    timeout: Option<Duration>,
) -> ::imap::Result<Connection> {
    tcp.set_read_timeout(timeout)?;
    tcp.set_write_timeout(timeout)?;
    let connector = native_tls::TlsConnector::new()?;
    let tls = connector.connect(domain, tcp)?;
    Ok(Box::new(tls))
}

/// Map a transport error, using `on_reject` for NO/BAD answers.
fn classify(err: ::imap::Error, on_reject: impl FnOnce(String) -> SearchError) -> SearchError {
    match err {
        ::imap::Error::Io(e) => SearchError::Network(e.to_string()),
        ::imap::Error::ConnectionLost => SearchError::Network("connection lost".to_string()),
        ::imap::Error::No(no) => on_reject(no.to_string()),
        ::imap::Error::Bad(bad) => on_reject(bad.to_string()),
        other => SearchError::Protocol(other.to_string()),
    }
}

impl MailboxSession for ImapSession {
    fn list_folders(&mut self) -> Result<Vec<FolderInfo>> {
        let names = self
            .live()?
            .list(Some(""), Some("*"))
            .map_err(|e| classify(e, SearchError::Protocol))?;

        Ok(names
            .iter()
            .map(|name| {
                let selectable = !name
                    .attributes()
                    .iter()
                    .any(|a| matches!(a, NameAttribute::NoSelect));
                FolderInfo::new(name.name(), selectable)
            })
            .collect())
    }

    fn select(&mut self, mailbox: &str) -> Result<()> {
        let info = self.live()?.examine(mailbox).map_err(|e| {
            classify(e, |reason| SearchError::MailboxSelection {
                mailbox: mailbox.to_string(),
                reason,
            })
        })?;
        debug!(mailbox, exists = info.exists, "Examined mailbox");
        Ok(())
    }

    fn search(&mut self, criteria: &str) -> Result<BTreeSet<SeqNum>> {
        debug!(criteria, "SEARCH");
        let found = self
            .live()?
            .search(criteria)
            .map_err(|e| classify(e, SearchError::CriteriaRejected))?;
        Ok(found.into_iter().collect())
    }

    fn fetch_headers(&mut self, seqs: &[SeqNum]) -> Result<BTreeMap<SeqNum, Vec<u8>>> {
        if seqs.is_empty() {
            return Ok(BTreeMap::new());
        }
        let set = sequence_set(seqs);
        let fetches = self
            .live()?
            .fetch(&set, "BODY.PEEK[HEADER]")
            .map_err(|e| classify(e, SearchError::Protocol))?;

        let mut headers = BTreeMap::new();
        for fetch in fetches.iter() {
            match fetch.header() {
                Some(raw) => {
                    headers.insert(fetch.message, raw.to_vec());
                }
                None => warn!(seq = fetch.message, "FETCH response without header section"),
            }
        }
        Ok(headers)
    }

    fn reconnect(&mut self) -> Result<()> {
        warn!(host = %self.params.host, "Reconnecting after connection loss");
        self.session = None;
        self.session = Some(open(&self.params)?);
        Ok(())
    }
}
