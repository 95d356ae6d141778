use std::fmt::Write;
use std::time::Duration;

use lettre::message::{Mailbox, header::ContentType};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use log::info;

use crate::config::MailConfig;
use crate::error::NotifyError;
use crate::models::FeedUpdate;
use crate::report::Report;

const SMTP_PORT: u16 = 25;
const SUBMISSION_PORT: u16 = 587;
const SMTP_TIMEOUT: Duration = Duration::from_secs(30);
const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Delivers a finished report somewhere a person will read it.
#[allow(async_fn_in_trait)]
pub trait Notifier {
    async fn deliver(&self, report: &Report) -> Result<(), NotifyError>;
}

/// Everything needed to render one notification.
pub struct Envelope<'a> {
    pub to: &'a str,
    pub from: &'a str,
    pub subject: &'a str,
    pub updates: &'a [FeedUpdate],
}

impl<'a> Envelope<'a> {
    pub fn new(mail: &'a MailConfig, report: &'a Report) -> Self {
        Self {
            to: &mail.to,
            from: &mail.from,
            subject: &mail.subject,
            updates: report.updates(),
        }
    }

    /// Message body: each feed's title followed by its new items.
    pub fn body(&self) -> String {
        let mut out = String::new();
        for update in self.updates {
            let _ = writeln!(out, "* {}\n", update.title);
            for item in &update.items {
                let date = item
                    .published_at
                    .map(|d| d.format(DATE_FORMAT).to_string())
                    .unwrap_or_else(|| "undated".to_string());
                let _ = writeln!(out, "{} - {}", date, item.title);
                let _ = writeln!(out, "{}\n", item.link);
            }
            out.push('\n');
        }
        out
    }

    /// Headers and body as plain text, for printing instead of sending.
    pub fn to_text(&self) -> String {
        format!(
            "To: {}\nFrom: {}\nSubject: {}\n\n{}",
            self.to,
            self.from,
            self.subject,
            self.body()
        )
    }

    pub fn to_message(&self) -> Result<Message, NotifyError> {
        let message = Message::builder()
            .from(parse_mailbox(self.from)?)
            .to(parse_mailbox(self.to)?)
            .subject(self.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(self.body())?;
        Ok(message)
    }
}

/// Sends the report as a plain-text e-mail over unauthenticated SMTP.
pub struct MailNotifier {
    mail: MailConfig,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl MailNotifier {
    /// Fails on a malformed endpoint or address, so a bad configuration is
    /// caught before any feed is marked seen.
    pub fn new(mail: MailConfig) -> Result<Self, NotifyError> {
        parse_mailbox(&mail.from)?;
        parse_mailbox(&mail.to)?;
        let (host, port) = parse_endpoint(&mail.addr)?;
        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
            .port(port)
            .timeout(Some(SMTP_TIMEOUT))
            .build();
        Ok(Self { mail, transport })
    }
}

impl Notifier for MailNotifier {
    async fn deliver(&self, report: &Report) -> Result<(), NotifyError> {
        let message = Envelope::new(&self.mail, report).to_message()?;
        self.transport.send(message).await?;
        info!(
            "sent {} new items to {} via {}",
            report.item_count(),
            self.mail.to,
            self.mail.addr
        );
        Ok(())
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, NotifyError> {
    address.parse().map_err(|source| NotifyError::Address {
        address: address.to_string(),
        source,
    })
}

/// Split `host:port`, accepting the service names `smtp` and `submission`.
fn parse_endpoint(addr: &str) -> Result<(&str, u16), NotifyError> {
    let (host, port) = match addr.rsplit_once(':') {
        Some((host, port)) if !host.ends_with(':') => (host, Some(port)),
        _ => (addr, None),
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(NotifyError::Endpoint(addr.to_string()));
    }

    let port = match port {
        None | Some("smtp") => SMTP_PORT,
        Some("submission") => SUBMISSION_PORT,
        Some(p) => p
            .parse()
            .map_err(|_| NotifyError::Endpoint(addr.to_string()))?,
    };
    Ok((host, port))
}
