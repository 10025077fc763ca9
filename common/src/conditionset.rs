use crate::{
    ConditionManager, ConditionStore, Error, Result,
    condition::{ConditionSeverity, ConditionType},
};
use std::sync::Arc;

/// One registered condition and how much it weighs on the aggregate
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dependent<T> {
    pub condition_type: T,
    pub severity: ConditionSeverity,
}

/// Immutable, ordered declaration of the conditions rolling up into `Ready`.
///
/// The declaration order is the tie-break order: when several dependents are
/// unhealthy, the aggregate reports the first one declared. Build it once at
/// startup and hand it to [`ConditionSet::manage`]; clones are cheap.
#[derive(Clone, Debug)]
pub struct ConditionSet<T> {
    dependents: Arc<[Dependent<T>]>,
}

impl<T: ConditionType> ConditionSet<T> {
    /// Declare dependents that all block the aggregate
    pub fn new(types: impl IntoIterator<Item = T>) -> Result<Self> {
        types
            .into_iter()
            .fold(Self::builder(), |builder, t| builder.dependent(t))
            .build()
    }

    pub fn builder() -> ConditionSetBuilder<T> {
        ConditionSetBuilder {
            dependents: Vec::new(),
        }
    }

    pub fn dependents(&self) -> &[Dependent<T>] {
        &self.dependents
    }

    /// Registered severity of a type, `None` when the type is not part of the set
    pub fn severity(&self, condition_type: T) -> Option<ConditionSeverity> {
        self.dependents
            .iter()
            .find(|d| d.condition_type == condition_type)
            .map(|d| d.severity)
    }

    pub fn is_registered(&self, condition_type: T) -> bool {
        self.severity(condition_type).is_some()
    }

    /// Start managing the conditions held by `store`
    pub fn manage<'a>(&'a self, store: &'a mut ConditionStore<T>) -> ConditionManager<'a, T> {
        ConditionManager::new(self, store)
    }
}

pub struct ConditionSetBuilder<T> {
    dependents: Vec<Dependent<T>>,
}

impl<T: ConditionType> ConditionSetBuilder<T> {
    #[must_use]
    pub fn dependent(self, condition_type: T) -> Self {
        self.with_severity(condition_type, ConditionSeverity::Error)
    }

    #[must_use]
    pub fn informational(self, condition_type: T) -> Self {
        self.with_severity(condition_type, ConditionSeverity::Info)
    }

    #[must_use]
    pub fn with_severity(mut self, condition_type: T, severity: ConditionSeverity) -> Self {
        self.dependents.push(Dependent {
            condition_type,
            severity,
        });
        self
    }

    pub fn build(self) -> Result<ConditionSet<T>> {
        if self.dependents.is_empty() {
            return Err(Error::EmptyConditionSet);
        }
        for (i, dep) in self.dependents.iter().enumerate() {
            if dep.condition_type == T::READY {
                return Err(Error::ReservedCondition(dep.condition_type.as_str().to_string()));
            }
            if self.dependents[..i]
                .iter()
                .any(|d| d.condition_type == dep.condition_type)
            {
                return Err(Error::DuplicateCondition(dep.condition_type.as_str().to_string()));
            }
        }
        Ok(ConditionSet {
            dependents: Arc::from(self.dependents),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChannelConditionType::*;

    #[test]
    fn test_declaration_order_is_kept() {
        let set = ConditionSet::new([Addressable, ServiceReady, EndpointsReady]).unwrap();
        let order: Vec<_> = set.dependents().iter().map(|d| d.condition_type).collect();
        assert_eq!(order, vec![Addressable, ServiceReady, EndpointsReady]);
        assert!(set.dependents().iter().all(|d| d.severity.is_error()));
    }

    #[test]
    fn test_empty_set_is_rejected() {
        let set = ConditionSet::<crate::ChannelConditionType>::new([]);
        assert!(matches!(set, Err(Error::EmptyConditionSet)));
    }

    #[test]
    fn test_duplicate_is_rejected() {
        let set = ConditionSet::builder()
            .dependent(ServiceReady)
            .informational(ServiceReady)
            .build();
        assert!(matches!(set, Err(Error::DuplicateCondition(t)) if t == "ServiceReady"));
    }

    #[test]
    fn test_ready_cannot_be_a_dependent() {
        let set = ConditionSet::new([ServiceReady, Ready]);
        assert!(matches!(set, Err(Error::ReservedCondition(t)) if t == "Ready"));
    }

    #[test]
    fn test_severity_lookup() {
        let set = ConditionSet::builder()
            .dependent(ServiceReady)
            .informational(DispatcherReady)
            .build()
            .unwrap();
        assert_eq!(set.severity(ServiceReady), Some(ConditionSeverity::Error));
        assert_eq!(set.severity(DispatcherReady), Some(ConditionSeverity::Info));
        assert_eq!(set.severity(Addressable), None);
        assert!(!set.is_registered(Ready));
    }
}
