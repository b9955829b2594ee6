use chrono::{DateTime, Utc};
use mailparse::{MailHeaderMap, ParsedMail};
use regex::Regex;

/// Sentence every new-device login email carries, compared case-insensitively.
const FINGERPRINT: &str = "it looks like you are trying to log in from a new device.";

/// Format a timestamp as the date argument of an IMAP `SEARCH SINCE`.
pub fn imap_since(since: DateTime<Utc>) -> String {
    since.format("%d-%b-%Y").to_string()
}

/// Recognises verification emails and pulls the code out of them.
#[derive(Clone, Debug)]
pub struct CodeExtractor {
    subject_filter: String,
    labeled: Regex,
    bare: Regex,
}

impl CodeExtractor {
    pub fn new(subject_filter: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            subject_filter: subject_filter.to_string(),
            labeled: Regex::new(r"(?s)(?i:steam guard code).*?\b([A-Z0-9]{5})\b")?,
            bare: Regex::new(r"\b[A-Z0-9]{5}\b")?,
        })
    }

    pub fn subject_matches(&self, subject: &str) -> bool {
        subject.contains(&self.subject_filter)
    }

    pub fn is_verification_email(body: &str) -> bool {
        body.to_lowercase().contains(FINGERPRINT)
    }

    /// A code next to its label wins over any other five-character token.
    pub fn extract_code(&self, text: &str) -> Option<String> {
        if let Some(code) = self.labeled.captures(text).and_then(|caps| caps.get(1)) {
            return Some(code.as_str().to_string());
        }
        self.bare.find(text).map(|m| m.as_str().to_string())
    }

    /// Code carried by one raw RFC 822 message, if it qualifies.
    ///
    /// Messages with the wrong subject, an unreadable `Date`, or a date before
    /// `since` are skipped.
    pub fn code_from_message(&self, raw: &[u8], since: Option<DateTime<Utc>>) -> Option<String> {
        let mail = match mailparse::parse_mail(raw) {
            Ok(mail) => mail,
            Err(err) => {
                tracing::warn!("unreadable message skipped: {err}");
                return None;
            }
        };

        let subject = mail.headers.get_first_value("Subject").unwrap_or_default();
        if !self.subject_matches(&subject) {
            tracing::debug!(subject, "message skipped by subject");
            return None;
        }

        let Some(sent_at) = message_date(&mail) else {
            tracing::warn!(subject, "message without a readable date skipped");
            return None;
        };
        if since.is_some_and(|since| sent_at < since) {
            tracing::debug!(%sent_at, "message older than the wait window");
            return None;
        }

        self.code_from_part(&mail)
    }

    fn code_from_part(&self, part: &ParsedMail<'_>) -> Option<String> {
        if part.subparts.is_empty() {
            return self.code_from_body(part);
        }
        part.subparts.iter().find_map(|sub| {
            if sub.subparts.is_empty() && sub.ctype.mimetype != "text/plain" {
                return None;
            }
            self.code_from_part(sub)
        })
    }

    fn code_from_body(&self, part: &ParsedMail<'_>) -> Option<String> {
        let body = match part.get_body() {
            Ok(body) => body,
            Err(err) => {
                tracing::warn!("message body could not be decoded: {err}");
                return None;
            }
        };
        if !Self::is_verification_email(&body) {
            return None;
        }
        self.extract_code(&body)
    }
}

fn message_date(mail: &ParsedMail<'_>) -> Option<DateTime<Utc>> {
    let raw = mail.headers.get_first_value("Date")?;
    let timestamp = mailparse::dateparse(&raw).ok()?;
    DateTime::from_timestamp(timestamp, 0)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    const BODY: &str = "Dear player,\r\n\
        It looks like you are trying to log in from a new device.\r\n\
        Here is the Steam Guard code you need to login to account player:\r\n\
        \r\n\
        F7K2Q\r\n";

    fn extractor() -> CodeExtractor {
        CodeExtractor::new("Steam").unwrap()
    }

    fn message(subject: &str, date: &str, body: &str) -> Vec<u8> {
        format!(
            "From: noreply@steampowered.com\r\n\
             Subject: {subject}\r\n\
             Date: {date}\r\n\
             Content-Type: text/plain; charset=utf-8\r\n\
             \r\n\
             {body}"
        )
        .into_bytes()
    }

    #[test]
    fn since_uses_imap_date_format() {
        let since = Utc.with_ymd_and_hms(2024, 5, 1, 11, 55, 0).unwrap();
        assert_eq!(imap_since(since), "01-May-2024");
    }

    #[test]
    fn labeled_code_beats_earlier_tokens() {
        let text = "ABCDE is your ticket. Your Steam Guard code is: Q9W8E";
        assert_eq!(extractor().extract_code(text).as_deref(), Some("Q9W8E"));
    }

    #[test]
    fn bare_token_is_the_fallback() {
        assert_eq!(
            extractor().extract_code("use 7H3XZ to continue").as_deref(),
            Some("7H3XZ")
        );
        assert_eq!(extractor().extract_code("no code in here"), None);
    }

    #[test]
    fn fingerprint_is_case_insensitive() {
        assert!(CodeExtractor::is_verification_email(
            "IT LOOKS LIKE YOU ARE TRYING TO LOG IN FROM A NEW DEVICE."
        ));
        assert!(!CodeExtractor::is_verification_email("Your purchase receipt"));
    }

    #[test]
    fn qualifying_message_yields_its_code() {
        let raw = message(
            "Your Steam account: Access from new computer",
            "Wed, 01 May 2024 12:01:00 +0000",
            BODY,
        );
        let since = Utc.with_ymd_and_hms(2024, 5, 1, 11, 55, 0).unwrap();
        assert_eq!(
            extractor().code_from_message(&raw, Some(since)).as_deref(),
            Some("F7K2Q")
        );
    }

    #[test]
    fn wrong_subject_or_old_message_is_skipped() {
        let since = Utc.with_ymd_and_hms(2024, 5, 1, 11, 55, 0).unwrap();
        let newsletter = message("Weekly deals", "Wed, 01 May 2024 12:01:00 +0000", BODY);
        assert_eq!(extractor().code_from_message(&newsletter, Some(since)), None);

        let stale = message("Steam login", "Wed, 01 May 2024 11:50:00 +0000", BODY);
        assert_eq!(extractor().code_from_message(&stale, Some(since)), None);
        assert_eq!(
            extractor().code_from_message(&stale, None).as_deref(),
            Some("F7K2Q")
        );
    }

    #[test]
    fn unreadable_date_is_skipped() {
        let raw = message("Steam login", "sometime yesterday", BODY);
        assert_eq!(extractor().code_from_message(&raw, None), None);
    }

    #[test]
    fn only_plain_text_parts_are_scanned() {
        let raw = "Subject: Steam Guard\r\n\
             Date: Wed, 01 May 2024 12:01:00 +0000\r\n\
             Content-Type: multipart/alternative; boundary=\"sep\"\r\n\
             \r\n\
             --sep\r\n\
             Content-Type: text/html\r\n\
             \r\n\
             <p>It looks like you are trying to log in from a new device. HTMLX</p>\r\n\
             --sep\r\n\
             Content-Type: text/plain\r\n\
             \r\n\
             It looks like you are trying to log in from a new device.\r\n\
             Steam Guard code: 4RT6Y\r\n\
             --sep--\r\n";
        assert_eq!(
            extractor().code_from_message(raw.as_bytes(), None).as_deref(),
            Some("4RT6Y")
        );
    }
}
