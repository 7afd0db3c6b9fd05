use chrono::{DateTime, Utc};
use contaflow_core::{Account, ClassificationMethod, HistoryRecord, Money, TrainingExample};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;

pub type DbPool = Pool<Sqlite>;

pub const DEFAULT_REVIEW_STATUS: &str = "para_verificar";

/// A history row as stored, with the columns the store adds on insert.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredClassification {
    pub id: i64,
    pub record: HistoryRecord,
    pub status: String,
    pub processed_at: DateTime<Utc>,
}

pub async fn create_db(path: &Path) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    run_migrations(&pool).await?;
    tracing::debug!(path = %path.display(), "database ready");

    Ok(pool)
}

async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS plano_de_contas (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            codigo TEXT NOT NULL,
            grupo TEXT NOT NULL DEFAULT '',
            subgrupo TEXT NOT NULL DEFAULT '',
            movimentacao TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS base_de_treinamento (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            descricao TEXT NOT NULL,
            codigo_correto TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transacoes_classificadas (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            data TEXT NOT NULL,
            descricao_original TEXT,
            valor_cents INTEGER NOT NULL,
            codigo_classificado TEXT NOT NULL,
            metodo TEXT NOT NULL,
            confianca REAL NOT NULL,
            status TEXT NOT NULL DEFAULT 'para_verificar',
            data_processamento TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

// ── Chart of accounts ─────────────────────────────────────────────────────────

/// Replaces the whole chart of accounts in one transaction.
pub async fn replace_chart_of_accounts(
    pool: &DbPool,
    accounts: &[Account],
) -> Result<u64, sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM plano_de_contas")
        .execute(&mut *tx)
        .await?;

    for account in accounts {
        sqlx::query(
            "INSERT INTO plano_de_contas (codigo, grupo, subgrupo, movimentacao) VALUES (?, ?, ?, ?)",
        )
        .bind(&account.code)
        .bind(&account.group)
        .bind(&account.subgroup)
        .bind(account.movement.as_deref())
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(accounts.len() as u64)
}

/// Accounts in insertion order, which the index relies on for first-wins.
pub async fn load_chart_of_accounts(pool: &DbPool) -> Result<Vec<Account>, sqlx::Error> {
    let rows = sqlx::query_as::<_, (String, String, String, Option<String>)>(
        "SELECT codigo, grupo, subgrupo, movimentacao FROM plano_de_contas ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(code, group, subgroup, movement)| Account {
            code,
            group,
            subgroup,
            movement,
        })
        .collect())
}

// ── Curated training examples ─────────────────────────────────────────────────

pub async fn replace_training_examples(
    pool: &DbPool,
    examples: &[TrainingExample],
) -> Result<u64, sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM base_de_treinamento")
        .execute(&mut *tx)
        .await?;

    for example in examples {
        sqlx::query("INSERT INTO base_de_treinamento (descricao, codigo_correto) VALUES (?, ?)")
            .bind(&example.text)
            .bind(&example.code)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(examples.len() as u64)
}

pub async fn load_training_examples(pool: &DbPool) -> Result<Vec<TrainingExample>, sqlx::Error> {
    let rows = sqlx::query_as::<_, (String, String)>(
        "SELECT descricao, codigo_correto FROM base_de_treinamento ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(text, code)| TrainingExample { text, code })
        .collect())
}

// ── Classification history ────────────────────────────────────────────────────

/// Appends one run's results atomically. Rows are never updated afterwards.
pub async fn append_classified_transactions(
    pool: &DbPool,
    records: &[HistoryRecord],
    processed_at: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let mut tx = pool.begin().await?;

    for r in records {
        sqlx::query(
            "INSERT INTO transacoes_classificadas (data, descricao_original, valor_cents, codigo_classificado, metodo, confianca, data_processamento) VALUES (?, ?, ?, ?, ?, ?, ?)"
        )
        .bind(&r.date)
        .bind(r.original_description.as_deref())
        .bind(r.amount.to_cents())
        .bind(&r.code)
        .bind(r.method.label())
        .bind(r.confidence)
        .bind(processed_at)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(records.len() as u64)
}

pub async fn get_classified_transactions(
    pool: &DbPool,
) -> Result<Vec<StoredClassification>, sqlx::Error> {
    let rows = sqlx::query_as::<
        _,
        (i64, String, Option<String>, i64, String, String, f64, String, DateTime<Utc>),
    >(
        "SELECT id, data, descricao_original, valor_cents, codigo_classificado, metodo, confianca, status, data_processamento FROM transacoes_classificadas ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| {
            let method = ClassificationMethod::from_label(&r.5).unwrap_or_else(|| {
                tracing::warn!(id = r.0, metodo = %r.5, "unknown method label in history");
                ClassificationMethod::Unclassified
            });
            StoredClassification {
                id: r.0,
                record: HistoryRecord {
                    date: r.1,
                    original_description: r.2,
                    amount: Money::from_cents(r.3),
                    code: r.4,
                    method,
                    confidence: r.6,
                },
                status: r.7,
                processed_at: r.8,
            }
        })
        .collect())
}
