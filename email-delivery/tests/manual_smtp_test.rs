mod common;

use anyhow::{Context, Result};
use chrono::Utc;
use common::*;
use email_delivery::{compose_digest, DeliveryMode, SmtpConfig, SmtpMailer};
use interfaces::defs::Mailer;
use std::env;

/// Manual send through a real provider - IGNORED BY DEFAULT
///
/// ## Setup
///
/// ```bash
/// export SMTP_URL="smtp://you%40gmail.com@smtp.gmail.com:587?tls=starttls"
/// export SMTP_PASSWORD="your-app-password"
/// export SMTP_FROM="Dossier <you@gmail.com>"
/// export MANUAL_TEST_RECIPIENT="you@gmail.com"
/// cargo test -p email-delivery manual_smtp_send -- --ignored --nocapture
/// ```
///
/// Sends one `[TEST]` digest built from sample articles. Check the inbox for
/// both the HTML and plain-text parts.
#[tokio::test]
#[ignore]
async fn manual_smtp_send() -> Result<()> {
    let url = env::var("SMTP_URL").context("SMTP_URL not set")?;
    let password = env::var("SMTP_PASSWORD").context("SMTP_PASSWORD not set")?;
    let from = env::var("SMTP_FROM").context("SMTP_FROM not set")?;
    let recipient = env::var("MANUAL_TEST_RECIPIENT").context("MANUAL_TEST_RECIPIENT not set")?;

    let mailer = SmtpMailer::new(SmtpConfig::from_uri(&url, &password, &from)?)?;
    let message = compose_digest(
        &sample_config(&recipient),
        &sample_summary(),
        Utc::now(),
        DeliveryMode::Test,
    )?;

    mailer.send(&message).await?;
    println!("Sent '{}' to {}", message.subject, recipient);
    Ok(())
}
