use async_trait::async_trait;
use interfaces::defs::{DigestMessage, Mailer};
use interfaces::{DossierError, Result};
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use percent_encoding::percent_decode_str;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// How the SMTP connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpSecurity {
    /// Plain connection upgraded with STARTTLS (usually port 587)
    StartTls,
    /// Implicit TLS from the first byte (usually port 465)
    Tls,
    /// Unencrypted; only for local relays and test servers
    None,
}

impl SmtpSecurity {
    fn default_port(self) -> u16 {
        match self {
            SmtpSecurity::StartTls => 587,
            SmtpSecurity::Tls => 465,
            SmtpSecurity::None => 25,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    pub security: SmtpSecurity,
    pub timeout: Duration,
}

impl SmtpConfig {
    /// Parse `smtp://user@host:port?tls=starttls|tls|none`.
    ///
    /// `smtps://` defaults to implicit TLS, `smtp://` to STARTTLS. The
    /// username may be omitted for relays that do not authenticate.
    pub fn from_uri(uri: &str, password: &str, from: &str) -> Result<Self> {
        let parsed = Url::parse(uri).map_err(|e| invalid(format!("invalid SMTP URI '{}': {}", uri, e)))?;

        let default_security = match parsed.scheme() {
            "smtp" => SmtpSecurity::StartTls,
            "smtps" => SmtpSecurity::Tls,
            other => return Err(invalid(format!("SMTP URI must use smtp:// or smtps://, got {}://", other))),
        };

        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| invalid(format!("no host in SMTP URI '{}'", uri)))?
            .to_string();

        let security = match parsed.query_pairs().find(|(key, _)| key == "tls") {
            None => default_security,
            Some((_, value)) => match value.to_lowercase().as_str() {
                "starttls" => SmtpSecurity::StartTls,
                "tls" => SmtpSecurity::Tls,
                "none" => SmtpSecurity::None,
                other => return Err(invalid(format!("unknown tls mode '{}'", other))),
            },
        };

        let timeout = parsed
            .query_pairs()
            .find(|(key, _)| key == "timeout")
            .and_then(|(_, value)| value.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(30));

        // Usernames are frequently full addresses written as user%40domain
        let username = percent_decode_str(parsed.username())
            .decode_utf8()
            .map_err(|e| invalid(format!("SMTP username is not valid UTF-8: {}", e)))?
            .into_owned();

        Ok(Self {
            port: parsed.port().unwrap_or(security.default_port()),
            host,
            username,
            password: password.to_string(),
            from: from.to_string(),
            security,
            timeout,
        })
    }
}

fn invalid(message: String) -> DossierError {
    DossierError::InvalidConfig(message)
}

/// Sends digests through an authenticated SMTP relay.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    host: String,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Result<Self> {
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e| invalid(format!("invalid sender '{}': {}", config.from, e)))?;

        let builder = match config.security {
            SmtpSecurity::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| DossierError::Transport(e.to_string()))?,
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| DossierError::Transport(e.to_string()))?,
            SmtpSecurity::None => {
                warn!("SMTP relay {}:{} is used without TLS", config.host, config.port);
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
            }
        };

        let mut builder = builder.port(config.port).timeout(Some(config.timeout));
        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(config.username.clone(), config.password.clone()));
        }

        info!(
            "SMTP transport ready: {}:{} ({:?}) as {}",
            config.host, config.port, config.security, from
        );

        Ok(Self {
            transport: builder.build(),
            from,
            host: config.host,
        })
    }

    /// Build the `multipart/alternative` message for one recipient.
    pub fn build_message(&self, message: &DigestMessage) -> Result<Message> {
        let to: Mailbox = message
            .recipient
            .parse()
            .map_err(|e| DossierError::Transport(format!("invalid recipient '{}': {}", message.recipient, e)))?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(message.subject.clone())
            .multipart(MultiPart::alternative_plain_html(message.text.clone(), message.html.clone()))
            .map_err(|e| DossierError::Transport(format!("failed to build message: {}", e)))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, message: &DigestMessage) -> Result<()> {
        let email = self.build_message(message)?;
        debug!("Sending '{}' to {} via {}", message.subject, message.recipient, self.host);

        let response = self
            .transport
            .send(email)
            .await
            .map_err(|e| DossierError::Transport(e.to_string()))?;

        info!(
            recipient = %message.recipient,
            code = %response.code(),
            "Digest handed to SMTP relay"
        );
        Ok(())
    }
}
