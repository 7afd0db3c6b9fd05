use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use chrono::Utc;
use contaflow_classify::{
    read_knowledge_base, read_training_examples, read_transactions, stage_results, training_set,
    ClassificationEngine, EngineConfig, KnowledgeSource, NaiveBayesModel, RunSummary,
    DEFAULT_REVIEW_THRESHOLD,
};
use contaflow_core::{ClassificationMethod, KnowledgeBase, TrainingExample};
use contaflow_storage::DbPool;

use crate::ClassifyArgs;

/// Where `train` reads its chart of accounts and curated examples from.
#[derive(Debug, Clone)]
pub enum TrainingSource {
    Database(PathBuf),
    Csv {
        chart: PathBuf,
        training: Option<PathBuf>,
    },
}

async fn open_db(path: &Path) -> anyhow::Result<DbPool> {
    contaflow_storage::create_db(path)
        .await
        .with_context(|| format!("cannot open database '{}'", path.display()))
}

pub async fn migrate(chart: &Path, training: Option<&Path>, db: &Path) -> anyhow::Result<()> {
    let knowledge_base = read_knowledge_base(chart)?;
    let curated = match training {
        Some(path) => read_training_examples(path)?,
        None => Vec::new(),
    };

    let pool = open_db(db).await?;
    let accounts = contaflow_storage::replace_chart_of_accounts(&pool, knowledge_base.accounts())
        .await
        .context("failed to store chart of accounts")?;
    let examples = contaflow_storage::replace_training_examples(&pool, &curated)
        .await
        .context("failed to store training examples")?;
    pool.close().await;

    tracing::info!(accounts, examples, db = %db.display(), "migration complete");
    Ok(())
}

pub async fn train(source: &TrainingSource, output: &Path) -> anyhow::Result<()> {
    let (knowledge_base, curated) = load_training_inputs(source).await?;

    let examples = training_set(&knowledge_base, &curated);
    let model = NaiveBayesModel::train(&examples).context("model training failed")?;
    model.save(output)?;

    tracing::info!(
        examples = examples.len(),
        curated = curated.len(),
        codes = model.labels().len(),
        vocabulary = model.vocabulary_size(),
        output = %output.display(),
        "model trained"
    );
    Ok(())
}

async fn load_training_inputs(
    source: &TrainingSource,
) -> anyhow::Result<(KnowledgeBase, Vec<TrainingExample>)> {
    match source {
        TrainingSource::Database(db) => {
            let pool = open_db(db).await?;
            let accounts = contaflow_storage::load_chart_of_accounts(&pool)
                .await
                .context("failed to load chart of accounts")?;
            let curated = contaflow_storage::load_training_examples(&pool)
                .await
                .context("failed to load training examples")?;
            pool.close().await;
            Ok((KnowledgeBase::new(accounts), curated))
        }
        TrainingSource::Csv { chart, training } => {
            let knowledge_base = read_knowledge_base(chart)?;
            let curated = match training {
                Some(path) => read_training_examples(path)?,
                None => Vec::new(),
            };
            Ok((knowledge_base, curated))
        }
    }
}

/// Merges `--config` with command-line flags. Flags win.
pub fn resolve_config(args: &ClassifyArgs) -> anyhow::Result<EngineConfig> {
    let base = match &args.config {
        Some(path) => Some(EngineConfig::load(path)?),
        None => None,
    };

    let knowledge_source = match (&args.knowledge_csv, &args.knowledge_db) {
        (Some(path), _) => Some(KnowledgeSource::Csv { path: path.clone() }),
        (None, Some(path)) => Some(KnowledgeSource::Sqlite { path: path.clone() }),
        (None, None) => base.as_ref().map(|c| c.knowledge_source.clone()),
    };

    let pick = |flag: &Option<PathBuf>, from_base: Option<&PathBuf>, name: &str| {
        flag.clone()
            .or_else(|| from_base.cloned())
            .with_context(|| format!("missing {name}: pass --{name} or set it in --config"))
    };

    let config = EngineConfig {
        knowledge_source: match knowledge_source {
            Some(source) => source,
            None => bail!("missing knowledge source: pass --knowledge-csv, --knowledge-db or --config"),
        },
        model_source: pick(&args.model, base.as_ref().map(|c| &c.model_source), "model")?,
        input: pick(&args.input, base.as_ref().map(|c| &c.input), "input")?,
        output: pick(&args.output, base.as_ref().map(|c| &c.output), "output")?,
        history_db: args
            .history_db
            .clone()
            .or_else(|| base.as_ref().and_then(|c| c.history_db.clone())),
        review_threshold: args
            .review_threshold
            .or_else(|| base.as_ref().map(|c| c.review_threshold))
            .unwrap_or(DEFAULT_REVIEW_THRESHOLD),
    };
    config.validate()?;
    Ok(config)
}

async fn load_knowledge_base(source: &KnowledgeSource) -> anyhow::Result<KnowledgeBase> {
    match source {
        KnowledgeSource::Csv { path } => Ok(read_knowledge_base(path)?),
        KnowledgeSource::Sqlite { path } => {
            let pool = open_db(path).await?;
            let accounts = contaflow_storage::load_chart_of_accounts(&pool)
                .await
                .context("failed to load chart of accounts")?;
            pool.close().await;
            Ok(KnowledgeBase::new(accounts))
        }
    }
}

pub async fn classify(config: &EngineConfig) -> anyhow::Result<RunSummary> {
    let model = NaiveBayesModel::load(&config.model_source)?;
    let knowledge_base = load_knowledge_base(&config.knowledge_source).await?;
    if knowledge_base.is_empty() {
        tracing::warn!("chart of accounts is empty; only the model can classify");
    }
    let transactions = read_transactions(&config.input)?;
    tracing::info!(rows = transactions.len(), input = %config.input.display(), "classifying");

    let engine = ClassificationEngine::new(&knowledge_base, model);
    let results = engine
        .classify_all(&transactions)
        .context("classification aborted")?;

    let staged = stage_results(&config.output, &results)?;

    if let Some(history_db) = &config.history_db {
        let records: Vec<_> = results.iter().map(|r| r.history_record()).collect();
        let pool = open_db(history_db).await?;
        contaflow_storage::append_classified_transactions(&pool, &records, Utc::now())
            .await
            .context("failed to record classification history")?;
        pool.close().await;
        tracing::debug!(rows = records.len(), db = %history_db.display(), "history appended");
    }
    staged.commit()?;

    let summary = RunSummary::from_results(&results, config.review_threshold);
    tracing::info!(
        total = summary.total,
        group_and_subgroup = summary.count(ClassificationMethod::GroupAndSubgroup),
        subgroup = summary.count(ClassificationMethod::Subgroup),
        model = summary.count(ClassificationMethod::Model),
        failures = summary.failures,
        needs_review = summary.needs_review,
        output = %config.output.display(),
        "classification complete"
    );
    Ok(summary)
}
