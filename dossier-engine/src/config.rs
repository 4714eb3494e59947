use crate::pipeline::PipelineConfig;
use crate::scheduler::SchedulerConfig;
use crate::tones::ModelSelection;
use crate::types::FetchConfig;
use clap::{Args, Parser, Subcommand};
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "dossier", version, about = "Scheduled feed digests, summarized and emailed")]
pub struct Cli {
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value_t = 5)]
    pub max_connections: u32,

    #[command(flatten)]
    pub inference: InferenceArgs,

    #[command(flatten)]
    pub smtp: SmtpArgs,

    /// Scheduler poll period, also the delivery window width
    #[arg(long, env = "DOSSIER_POLL_SECS", default_value_t = 60)]
    pub poll_secs: u64,

    #[arg(long, env = "DOSSIER_FETCH_TIMEOUT_SECS", default_value_t = 30)]
    pub fetch_timeout_secs: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args)]
pub struct InferenceArgs {
    #[arg(id = "ollama_url", long = "ollama-url", env = "OLLAMA_URL", default_value = crate::llm_adapter::DEFAULT_OLLAMA_URL)]
    pub url: String,

    #[arg(long = "standard-model", env = "DOSSIER_STANDARD_MODEL")]
    pub standard_model: Option<String>,

    /// Model used for tones that need unfiltered output
    #[arg(long = "unrestricted-model", env = "DOSSIER_UNRESTRICTED_MODEL")]
    pub unrestricted_model: Option<String>,

    /// Per-call timeout
    #[arg(long = "inference-timeout-secs", env = "DOSSIER_INFERENCE_TIMEOUT_SECS", default_value_t = 300)]
    pub timeout_secs: u64,
}

#[derive(Debug, Args)]
pub struct SmtpArgs {
    /// smtp://user@host:port?tls=starttls|tls
    #[arg(id = "smtp_url", long = "smtp-url", env = "SMTP_URL")]
    pub url: Option<String>,

    #[arg(long = "smtp-password", env = "SMTP_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Sender identity, e.g. "Dossier <digest@example.com>"
    #[arg(long = "smtp-from", env = "SMTP_FROM")]
    pub from: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the scheduler until interrupted
    Run,
    /// Send one digest with a [TEST] subject without recording it
    TestSend { id: Uuid },
    /// Generate, send and record one digest right away
    GenerateNow { id: Uuid },
    /// Apply database migrations and seed system tones
    Migrate,
    /// List stored tones and the model each one routes to
    Tones,
}

impl Cli {
    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            timeout_seconds: self.fetch_timeout_secs,
            ..FetchConfig::default()
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            poll_interval: Duration::from_secs(self.poll_secs.max(1)),
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig::default()
    }

    pub fn model_selection(&self) -> ModelSelection {
        let defaults = ModelSelection::default();
        ModelSelection {
            standard: self.inference.standard_model.clone().unwrap_or(defaults.standard),
            unrestricted: self
                .inference
                .unrestricted_model
                .clone()
                .unwrap_or(defaults.unrestricted),
        }
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_secs(self.inference.timeout_secs)
    }

    /// Database URL with the password masked, for logs.
    pub fn redacted_database_url(&self) -> String {
        match url::Url::parse(&self.database_url) {
            Ok(mut parsed) if parsed.password().is_some() => {
                let _ = parsed.set_password(Some("***"));
                parsed.to_string()
            }
            Ok(parsed) => parsed.to_string(),
            Err(_) => "<unparsable database url>".to_string(),
        }
    }
}
