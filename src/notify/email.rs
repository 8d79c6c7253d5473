use anyhow::{Context, Result};
use lettre::message::{Mailbox, Message, MultiPart};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};
use pulldown_cmark::{html, Options, Parser};
use std::time::Duration;

use super::{headline, Channel};
use crate::config::settings::EmailSettings;
use crate::report::Report;

/// Markdown report body -> HTML fragment.
pub fn markdown_to_html(md: &str) -> String {
    let mut opts = Options::empty();
    opts.insert(Options::ENABLE_TABLES);
    opts.insert(Options::ENABLE_STRIKETHROUGH);
    let mut out = String::with_capacity(md.len() * 3 / 2);
    html::push_html(&mut out, Parser::new_ext(md, opts));
    out
}

fn parse_recipients(list: &str) -> Result<Vec<Mailbox>> {
    let to: Vec<Mailbox> = list
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<Mailbox>().with_context(|| format!("invalid recipient {s:?}")))
        .collect::<Result<_>>()?;
    anyhow::ensure!(!to.is_empty(), "no email recipients configured");
    Ok(to)
}

pub struct EmailChannel<T = AsyncSmtpTransport<Tokio1Executor>> {
    mailer: T,
    from: Mailbox,
    to: Vec<Mailbox>,
}

impl EmailChannel {
    /// SMTP over implicit TLS (port 465) or STARTTLS when the port is 587.
    /// The sender address doubles as the login user unless one is given.
    pub fn from_settings(s: &EmailSettings, timeout: Duration) -> Result<Self> {
        let from: Mailbox = s
            .from
            .parse()
            .with_context(|| format!("invalid sender {:?}", s.from))?;
        let to = parse_recipients(&s.to)?;

        let user = s.username.clone().unwrap_or_else(|| from.email.to_string());
        let creds = Credentials::new(user, s.password.clone());
        let builder = (if s.smtp_port == 587 {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&s.smtp_server)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&s.smtp_server)
        })
        .with_context(|| format!("invalid smtp server {:?}", s.smtp_server))?;
        let mailer = builder
            .port(s.smtp_port)
            .credentials(creds)
            .timeout(Some(timeout))
            .build();

        Ok(Self { mailer, from, to })
    }
}

impl<T> EmailChannel<T> {
    pub fn with_transport(mailer: T, from: Mailbox, to: Vec<Mailbox>) -> Self {
        Self { mailer, from, to }
    }

    /// Multipart/alternative: the Markdown as plain text plus rendered HTML.
    pub fn build_message(&self, report: &Report) -> Result<Message> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(headline(report));
        for rcpt in &self.to {
            builder = builder.to(rcpt.clone());
        }
        builder
            .multipart(MultiPart::alternative_plain_html(
                report.body.clone(),
                markdown_to_html(&report.body),
            ))
            .context("build email")
    }
}

#[async_trait::async_trait]
impl<T> Channel for EmailChannel<T>
where
    T: AsyncTransport + Send + Sync,
    T::Error: std::error::Error + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "email"
    }

    async fn send(&self, report: &Report) -> Result<()> {
        let msg = self.build_message(report)?;
        self.mailer.send(msg).await.context("send email")?;
        Ok(())
    }
}
