pub mod types;
pub mod fetcher;
pub mod parser;
pub mod aggregator;
pub mod traits;
pub mod llm_adapter;
pub mod tones;
pub mod processing;
pub mod pipeline;
pub mod store;
pub mod schedule;
pub mod scheduler;
pub mod config;

pub use types::*;
pub use fetcher::Fetcher;
pub use parser::FeedParser;
pub use aggregator::FeedAggregator;
pub use traits::{InferenceClient, InferenceRequest};
pub use llm_adapter::OllamaClient;
pub use tones::{ModelRoute, ModelSelection};
pub use pipeline::{PipelineConfig, SummarizationPipeline};
pub use store::PgStore;
pub use scheduler::{
    DispatchOutcome, DispatchReport, InFlightRuns, ManualOutcome, Scheduler, SchedulerConfig, SchedulerHandle,
};
