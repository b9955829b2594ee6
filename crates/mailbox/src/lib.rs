//! IMAP implementation of [`engine::CodeFetcher`].
//!
//! [`extract`] holds the pure parsing side (subject filter, fingerprint
//! check, code extraction) so it can be tested without a mail server;
//! [`ImapCodeFetcher`] does the network part.

pub use extract::{CodeExtractor, imap_since};
pub use fetcher::{ImapCodeFetcher, MailboxSettings};

mod extract;
mod fetcher;
