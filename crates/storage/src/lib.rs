pub mod db;

pub use db::{
    append_classified_transactions, create_db, get_classified_transactions,
    load_chart_of_accounts, load_training_examples, replace_chart_of_accounts,
    replace_training_examples, DbPool, StoredClassification, DEFAULT_REVIEW_STATUS,
};
