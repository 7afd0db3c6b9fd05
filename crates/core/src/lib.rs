pub mod account;
pub mod money;
pub mod normalize;
pub mod transaction;

pub use account::{is_usable_code, Account, KnowledgeBase, TrainingExample};
pub use money::{AmountError, Money};
pub use normalize::{normalize, normalize_field};
pub use transaction::{
    Classification, ClassificationMethod, ClassificationResult, HistoryRecord, Transaction,
    FAILURE_CODE, NOT_AVAILABLE,
};
