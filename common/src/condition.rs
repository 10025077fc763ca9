use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::{fmt::Debug, hash::Hash};

/// A closed enumeration of the condition types a resource kind reports.
///
/// Every kind has its own enum; the engine is generic over it so that several
/// kinds with different condition sets can live in the same process.
pub trait ConditionType:
    Copy + Eq + Hash + Debug + Serialize + DeserializeOwned + JsonSchema + Send + Sync + 'static
{
    /// The aggregate condition derived from every dependent
    const READY: Self;

    /// Wire name of the type, also the sort key of the serialized list
    fn as_str(&self) -> &'static str;
}

#[derive(Serialize, Deserialize, Eq, PartialEq, Clone, Copy, Debug, JsonSchema, Default)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl ConditionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionStatus::True => "True",
            ConditionStatus::False => "False",
            ConditionStatus::Unknown => "Unknown",
        }
    }

    /// Parse the status string kubernetes objects carry in their own conditions
    pub fn from_k8s(status: &str) -> Option<Self> {
        match status {
            "True" => Some(ConditionStatus::True),
            "False" => Some(ConditionStatus::False),
            "Unknown" => Some(ConditionStatus::Unknown),
            _ => None,
        }
    }
}

/// Info conditions are reported but never block the aggregate
#[derive(Serialize, Deserialize, Eq, PartialEq, Clone, Copy, Debug, JsonSchema, Default)]
pub enum ConditionSeverity {
    #[default]
    Error,
    Info,
}

impl ConditionSeverity {
    pub fn is_error(&self) -> bool {
        *self == ConditionSeverity::Error
    }
}

/// Condition contains details about one observed aspect of a resource
#[derive(Serialize, Deserialize, Eq, PartialEq, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition<T> {
    /// Type of the condition
    #[serde(rename = "type")]
    pub condition_type: T,
    /// Status of the condition: True, False or Unknown
    pub status: ConditionStatus,
    /// Severity, omitted for Error
    #[serde(default, skip_serializing_if = "ConditionSeverity::is_error")]
    pub severity: ConditionSeverity,
    /// LastTransitionTime is the last time the status changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
    /// Machine readable reason of the last transition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Human readable details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T: ConditionType> Condition<T> {
    #[must_use]
    pub fn new(condition_type: T, status: ConditionStatus, severity: ConditionSeverity) -> Self {
        Condition {
            condition_type,
            status,
            severity,
            last_transition_time: None,
            reason: None,
            message: None,
        }
    }

    /// Empty strings are stored as absent so they do not show up on the wire
    #[must_use]
    pub fn with_reason(mut self, reason: &str, message: &str) -> Self {
        self.reason = (!reason.is_empty()).then(|| reason.to_string());
        self.message = (!message.is_empty()).then(|| message.to_string());
        self
    }

    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }

    pub fn is_false(&self) -> bool {
        self.status == ConditionStatus::False
    }

    pub fn is_unknown(&self) -> bool {
        self.status == ConditionStatus::Unknown
    }
}
