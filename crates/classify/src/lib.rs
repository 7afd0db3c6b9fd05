pub mod bayes;
pub mod cascade;
pub mod config;
pub mod csv;
pub mod engine;
pub mod enrich;
pub mod index;
pub mod model;

pub use self::bayes::{training_set, NaiveBayesModel};
pub use self::cascade::classify;
pub use self::config::{ConfigError, EngineConfig, KnowledgeSource, DEFAULT_REVIEW_THRESHOLD};
pub use self::csv::{
    read_knowledge_base, read_training_examples, read_transactions, stage_results, write_results,
    CsvError, StagedOutput, Table,
};
pub use self::engine::{unmatched_subgroups, ClassificationEngine, RunSummary};
pub use self::enrich::enrich;
pub use self::index::{AccountDetail, KnowledgeIndex};
pub use self::model::{MockClassifier, ModelError, TextClassifier};
