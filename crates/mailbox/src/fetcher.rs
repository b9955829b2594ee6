use std::{
    io::{Read, Write},
    net::{TcpStream, ToSocketAddrs},
    time::Duration,
};

use chrono::{DateTime, Utc};
use engine::{CodeFetcher, FetchError, MailboxCredentials};
use native_tls::TlsConnector;

use crate::extract::{CodeExtractor, imap_since};

pub const DEFAULT_HOST: &str = "imap.firstmail.ltd";
pub const DEFAULT_PORT: u16 = 993;
pub const DEFAULT_SUBJECT_FILTER: &str = "Steam";

/// Where and how to look for verification emails.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MailboxSettings {
    pub host: String,
    pub port: u16,
    /// Substring the subject must contain.
    pub subject_filter: String,
    /// Bound on connecting and on each socket read/write.
    pub timeout: Duration,
}

impl Default for MailboxSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            subject_filter: DEFAULT_SUBJECT_FILTER.to_string(),
            timeout: Duration::from_secs(20),
        }
    }
}

/// Reads verification codes over IMAPS.
///
/// Every call opens its own connection and logs out before returning, so one
/// call is exactly one attempt.
#[derive(Clone, Debug)]
pub struct ImapCodeFetcher {
    settings: MailboxSettings,
    extractor: CodeExtractor,
}

impl ImapCodeFetcher {
    pub fn new(settings: MailboxSettings) -> Result<Self, regex::Error> {
        let extractor = CodeExtractor::new(&settings.subject_filter)?;
        Ok(Self {
            settings,
            extractor,
        })
    }

    pub fn settings(&self) -> &MailboxSettings {
        &self.settings
    }

    fn connect(&self) -> Result<imap::Client<native_tls::TlsStream<TcpStream>>, FetchError> {
        let MailboxSettings {
            host,
            port,
            timeout,
            ..
        } = &self.settings;

        let address = (host.as_str(), *port)
            .to_socket_addrs()
            .map_err(|err| FetchError::Connection(format!("{host}: {err}")))?
            .next()
            .ok_or_else(|| FetchError::Connection(format!("{host}: no address")))?;
        let tcp = TcpStream::connect_timeout(&address, *timeout)
            .map_err(|err| FetchError::Connection(err.to_string()))?;
        tcp.set_read_timeout(Some(*timeout))
            .and_then(|()| tcp.set_write_timeout(Some(*timeout)))
            .map_err(|err| FetchError::Connection(err.to_string()))?;

        let tls = TlsConnector::new().map_err(|err| FetchError::Connection(err.to_string()))?;
        let stream = tls
            .connect(host, tcp)
            .map_err(|err| FetchError::Connection(err.to_string()))?;

        let mut client = imap::Client::new(stream);
        client.read_greeting().map_err(map_imap_error)?;
        Ok(client)
    }

    fn scan<T: Read + Write>(
        &self,
        session: &mut imap::Session<T>,
        since: Option<DateTime<Utc>>,
    ) -> Result<Option<String>, FetchError> {
        session.select("INBOX").map_err(map_imap_error)?;

        let query = match since {
            Some(since) => format!("SINCE {}", imap_since(since)),
            None => "ALL".to_string(),
        };
        let mut ids: Vec<u32> = session
            .search(&query)
            .map_err(map_imap_error)?
            .into_iter()
            .collect();
        tracing::debug!(query, found = ids.len(), "mailbox searched");
        ids.sort_unstable_by(|a, b| b.cmp(a));

        for id in ids {
            let fetches = session
                .fetch(id.to_string(), "RFC822")
                .map_err(map_imap_error)?;
            for fetch in fetches.iter() {
                let Some(raw) = fetch.body() else {
                    continue;
                };
                if let Some(code) = self.extractor.code_from_message(raw, since) {
                    return Ok(Some(code));
                }
            }
        }
        Ok(None)
    }
}

impl CodeFetcher for ImapCodeFetcher {
    fn fetch_latest_code(
        &self,
        credentials: &MailboxCredentials,
        since: Option<DateTime<Utc>>,
    ) -> Result<Option<String>, FetchError> {
        let client = self.connect()?;
        let mut session = client
            .login(&credentials.login, &credentials.password)
            .map_err(|(err, _)| FetchError::Auth(err.to_string()))?;

        let found = self.scan(&mut session, since);
        if let Err(err) = session.logout() {
            tracing::debug!("mailbox logout failed: {err}");
        }
        if let Ok(Some(_)) = &found {
            tracing::info!(login = %credentials.login, "verification code read from mailbox");
        }
        found
    }
}

fn map_imap_error(err: imap::Error) -> FetchError {
    match err {
        imap::Error::Io(err) => FetchError::Connection(err.to_string()),
        imap::Error::ConnectionLost => FetchError::Connection("connection lost".to_string()),
        imap::Error::Tls(err) => FetchError::Connection(err.to_string()),
        imap::Error::Parse(err) => FetchError::Parse(err.to_string()),
        other => FetchError::Protocol(other.to_string()),
    }
}
