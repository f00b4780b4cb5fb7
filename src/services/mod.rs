// CFP Guardian Core Services
// Capabilities, corpus handling and the screening pipeline

pub mod capability;
pub mod config_store;
pub mod corpus_store;
pub mod ingestion;
pub mod providers;
pub mod screening;
pub mod text_processor;

pub use capability::*;
pub use config_store::*;
pub use corpus_store::CorpusStore;
pub use ingestion::{CorpusIngestion, CrawlSummary, PlatformCrawler, TalkPlatform};
pub use providers::*;
pub use screening::{
    EvaluationOrchestrator,
    RetryPolicy,
    RiskAggregator,
    ScreeningError,
    ScreeningPipeline,
    SimilaritySearch,
};
