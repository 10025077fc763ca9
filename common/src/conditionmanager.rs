use crate::{
    ConditionSet, ConditionStore, Error, Result,
    condition::{Condition, ConditionSeverity, ConditionStatus, ConditionType},
};
use chrono::{DateTime, Utc};
use tracing::debug;

/// Mutation surface over one resource's [`ConditionStore`].
///
/// Every mutation validates the type against the [`ConditionSet`], applies the
/// change, then recomputes `Ready` before returning. All mutations made through
/// one manager share the same transition timestamp.
pub struct ConditionManager<'a, T: ConditionType> {
    set: &'a ConditionSet<T>,
    store: &'a mut ConditionStore<T>,
    now: DateTime<Utc>,
}

impl<'a, T: ConditionType> ConditionManager<'a, T> {
    pub(crate) fn new(set: &'a ConditionSet<T>, store: &'a mut ConditionStore<T>) -> Self {
        Self {
            set,
            store,
            now: Utc::now(),
        }
    }

    /// Use `now` as the transition time of the following mutations
    #[must_use]
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn mark_true(&mut self, condition_type: T) -> Result<()> {
        self.apply(condition_type, ConditionStatus::True, "", "")
    }

    pub fn mark_true_with_reason(&mut self, condition_type: T, reason: &str, message: &str) -> Result<()> {
        self.apply(condition_type, ConditionStatus::True, reason, message)
    }

    pub fn mark_false(&mut self, condition_type: T, reason: &str, message: &str) -> Result<()> {
        self.apply(condition_type, ConditionStatus::False, reason, message)
    }

    pub fn mark_unknown(&mut self, condition_type: T, reason: &str, message: &str) -> Result<()> {
        self.apply(condition_type, ConditionStatus::Unknown, reason, message)
    }

    /// Seed every Error dependent that has no entry yet to Unknown.
    /// Info types only appear once something marks them. Existing entries are
    /// left alone, so this is safe on every pass.
    pub fn initialize_conditions(&mut self) {
        for dep in self.set.dependents().iter().filter(|d| d.severity.is_error()) {
            if self.store.get(dep.condition_type).is_none() {
                self.store.set(
                    Condition::new(dep.condition_type, ConditionStatus::Unknown, dep.severity),
                    self.now,
                );
            }
        }
        self.recompute();
    }

    /// Copy of the current condition, never a live reference into the store
    pub fn get_condition(&self, condition_type: T) -> Option<Condition<T>> {
        self.store.get(condition_type).cloned()
    }

    pub fn is_happy(&self, generation: i64) -> bool {
        self.store.is_happy(generation)
    }

    /// Record the generation the conditions were evaluated against
    pub fn observe_generation(&mut self, generation: i64) {
        self.store.set_observed_generation(generation);
    }

    pub fn snapshot(&self) -> ConditionStore<T> {
        self.store.clone()
    }

    fn apply(&mut self, condition_type: T, status: ConditionStatus, reason: &str, message: &str) -> Result<()> {
        let severity = self
            .set
            .severity(condition_type)
            .ok_or_else(|| Error::UnregisteredCondition(condition_type.as_str().to_string()))?;
        self.store.set(
            Condition::new(condition_type, status, severity).with_reason(reason, message),
            self.now,
        );
        self.recompute();
        Ok(())
    }

    fn recompute(&mut self) {
        let ready = aggregate(self.set, &*self.store);
        let (status, reason) = (ready.status, ready.reason.clone());
        if self.store.set(ready, self.now) {
            debug!(
                condition = T::READY.as_str(),
                status = status.as_str(),
                reason = reason.unwrap_or_default(),
                "aggregate transitioned"
            );
        }
    }
}

/// Derive `Ready` from the dependents, in declaration order.
///
/// A False dependent wins over an Unknown one; within a status the first
/// declared dependent provides the reason. Missing entries count as Unknown and
/// Info dependents never block.
fn aggregate<T: ConditionType>(set: &ConditionSet<T>, store: &ConditionStore<T>) -> Condition<T> {
    let mut first_unknown: Option<(Option<String>, Option<String>)> = None;
    for dep in set.dependents().iter().filter(|d| d.severity.is_error()) {
        match store.get(dep.condition_type) {
            Some(c) if c.is_true() => {}
            Some(c) if c.is_false() => {
                return ready(ConditionStatus::False, c.reason.clone(), c.message.clone());
            }
            Some(c) => {
                first_unknown.get_or_insert_with(|| (c.reason.clone(), c.message.clone()));
            }
            None => {
                first_unknown.get_or_insert((None, None));
            }
        }
    }
    match first_unknown {
        Some((reason, message)) => ready(ConditionStatus::Unknown, reason, message),
        None => ready(ConditionStatus::True, None, None),
    }
}

fn ready<T: ConditionType>(status: ConditionStatus, reason: Option<String>, message: Option<String>) -> Condition<T> {
    Condition {
        reason,
        message,
        ..Condition::new(T::READY, status, ConditionSeverity::Error)
    }
}
