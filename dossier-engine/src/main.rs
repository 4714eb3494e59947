use anyhow::{bail, Context};
use clap::Parser;
use dossier_engine::config::{Cli, Command};
use dossier_engine::tones::{self, ModelRoute};
use dossier_engine::{
    FeedAggregator, ManualOutcome, OllamaClient, PgStore, Scheduler, SummarizationPipeline, ToneStore,
};
use email_delivery::{SmtpConfig, SmtpMailer};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    info!("Connecting to database: {}", cli.redacted_database_url());
    let store = Arc::new(
        PgStore::connect(&cli.database_url, cli.max_connections)
            .await
            .context("failed to connect to database")?,
    );

    match &cli.command {
        Command::Migrate => {
            store.migrate().await?;
            tones::seed_system_tones(store.pool()).await?;
            info!("Database ready");
        }
        Command::Tones => {
            let models = cli.model_selection();
            for tone in store.list_tones().await? {
                let model = models.model_for(ModelRoute::for_tone(&tone));
                println!(
                    "{:<16} {:<8} {}",
                    tone.name,
                    if tone.is_system_default { "system" } else { "custom" },
                    model
                );
            }
        }
        Command::Run => {
            let scheduler = build_scheduler(&cli, store)?;
            let handle = scheduler.spawn();

            tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
            info!("Interrupt received, stopping scheduler");
            handle.stop().await.context("scheduler task failed")?;
        }
        Command::TestSend { id } => {
            let outcome = build_scheduler(&cli, store)?.test_send(*id).await;
            report(outcome)?;
        }
        Command::GenerateNow { id } => {
            let outcome = build_scheduler(&cli, store)?.generate_now(*id).await;
            report(outcome)?;
        }
    }

    Ok(())
}

fn build_scheduler(cli: &Cli, store: Arc<PgStore>) -> anyhow::Result<Scheduler> {
    let aggregator = FeedAggregator::new(cli.fetch_config())?.with_store(store.clone());

    let inference = OllamaClient::new(&cli.inference.url, cli.inference_timeout())?;
    info!("Using inference endpoint {}", inference.base_url());
    let pipeline = SummarizationPipeline::new(Arc::new(inference), store.clone(), cli.model_selection())
        .with_config(cli.pipeline_config());

    let smtp_url = cli.smtp.url.as_deref().context("SMTP_URL is required")?;
    let password = cli.smtp.password.as_deref().context("SMTP_PASSWORD is required")?;
    let from = cli.smtp.from.as_deref().context("SMTP_FROM is required")?;
    let mailer = SmtpMailer::new(SmtpConfig::from_uri(smtp_url, password, from)?)?;

    Ok(Scheduler::new(
        store,
        Arc::new(aggregator),
        Arc::new(pipeline),
        Arc::new(mailer),
        cli.scheduler_config(),
    ))
}

fn report(outcome: ManualOutcome) -> anyhow::Result<()> {
    if let Some(delivery) = &outcome.delivery {
        info!("Recorded delivery {}", delivery.id);
    }
    if outcome.success {
        info!("{}", outcome.message);
        Ok(())
    } else {
        error!("{}", outcome.message);
        bail!(outcome.message)
    }
}
