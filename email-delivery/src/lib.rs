pub mod composer;
pub mod mailer;

pub use composer::{compose_digest, DeliveryMode};
pub use mailer::{SmtpConfig, SmtpMailer, SmtpSecurity};
