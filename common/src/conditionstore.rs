use crate::condition::{Condition, ConditionType};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Current conditions of one resource, as stored in its status.
///
/// Holds at most one condition per type, kept sorted by type name. Mutations go
/// through a [`crate::ConditionManager`] so that `Ready` always matches the
/// dependents.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase", bound(deserialize = "T: ConditionType"))]
pub struct ConditionStore<T> {
    /// Generation of the spec these conditions were computed against
    #[serde(default)]
    observed_generation: i64,
    /// Conditions of the resource
    #[serde(default)]
    conditions: Vec<Condition<T>>,
}

impl<T> Default for ConditionStore<T> {
    fn default() -> Self {
        Self {
            observed_generation: 0,
            conditions: Vec::new(),
        }
    }
}

impl<T: ConditionType> ConditionStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, condition_type: T) -> Option<&Condition<T>> {
        self.conditions
            .iter()
            .find(|c| c.condition_type == condition_type)
    }

    pub fn conditions(&self) -> &[Condition<T>] {
        &self.conditions
    }

    pub fn observed_generation(&self) -> i64 {
        self.observed_generation
    }

    /// `Ready` is True and was computed against `generation`
    pub fn is_happy(&self, generation: i64) -> bool {
        self.observed_generation == generation && self.get(T::READY).is_some_and(Condition::is_true)
    }

    pub(crate) fn set_observed_generation(&mut self, generation: i64) {
        self.observed_generation = generation;
    }

    /// Replace the condition of the same type and return whether its status moved.
    ///
    /// The transition time only changes with the status and never goes backwards.
    pub(crate) fn set(&mut self, mut condition: Condition<T>, now: DateTime<Utc>) -> bool {
        let existing = self
            .conditions
            .iter()
            .position(|c| c.condition_type == condition.condition_type);
        match existing {
            Some(idx) => {
                let previous = &mut self.conditions[idx];
                let transitioned = previous.status != condition.status;
                condition.last_transition_time = if transitioned {
                    Some(previous.last_transition_time.map_or(now, |t| t.max(now)))
                } else {
                    previous.last_transition_time
                };
                *previous = condition;
                transitioned
            }
            None => {
                condition.last_transition_time = Some(now);
                self.conditions.push(condition);
                self.conditions
                    .sort_by(|a, b| a.condition_type.as_str().cmp(b.condition_type.as_str()));
                true
            }
        }
    }
}
