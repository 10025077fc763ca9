use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Condition {0} is not registered in this condition set")]
    UnregisteredCondition(String),

    #[error("A condition set needs at least one dependent")]
    EmptyConditionSet,

    #[error("Condition {0} is declared more than once")]
    DuplicateCondition(String),

    #[error("Condition {0} is reserved for the aggregate")]
    ReservedCondition(String),

    #[error("SerializationError: {0}")]
    SerializationError(#[from] serde_json::Error),
}
pub type Result<T, E = Error> = std::result::Result<T, E>;

pub mod childstatus;
pub mod condition;
pub mod conditionmanager;
pub mod conditionset;
pub mod conditionstore;
pub mod inmemorychannel;

pub use childstatus::{ChildCondition, ChildStatusProjector};
pub use condition::{Condition, ConditionSeverity, ConditionStatus, ConditionType};
pub use conditionmanager::ConditionManager;
pub use conditionset::{ConditionSet, ConditionSetBuilder, Dependent};
pub use conditionstore::ConditionStore;
pub use inmemorychannel::{ChannelConditionType, InMemoryChannel, InMemoryChannelStatus};
