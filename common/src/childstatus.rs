use crate::{
    ConditionManager, Result,
    condition::{ConditionStatus, ConditionType},
};
use k8s_openapi::{api::apps::v1::DeploymentCondition, apimachinery::pkg::apis::meta::v1::Condition as MetaCondition};

/// Read access to a condition reported by a child object
pub trait ChildCondition {
    fn condition_type(&self) -> &str;
    fn status(&self) -> &str;
    fn reason(&self) -> Option<&str>;
    fn message(&self) -> Option<&str>;
}

impl ChildCondition for DeploymentCondition {
    fn condition_type(&self) -> &str {
        &self.type_
    }

    fn status(&self) -> &str {
        &self.status
    }

    fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

impl ChildCondition for MetaCondition {
    fn condition_type(&self) -> &str {
        &self.type_
    }

    fn status(&self) -> &str {
        &self.status
    }

    fn reason(&self) -> Option<&str> {
        Some(self.reason.as_str()).filter(|r| !r.is_empty())
    }

    fn message(&self) -> Option<&str> {
        Some(self.message.as_str()).filter(|m| !m.is_empty())
    }
}

/// Feeds one parent dependent from one designated condition of a child object.
///
/// False and Unknown are re-wrapped with the name of the child so the parent's
/// message tells which sub-resource is unhealthy. When the child does not report
/// the designated condition the parent is left as it is.
#[derive(Clone, Debug)]
pub struct ChildStatusProjector<T> {
    target: T,
    child_type: &'static str,
    reason_prefix: &'static str,
    label: &'static str,
}

impl<T: ConditionType> ChildStatusProjector<T> {
    /// `reason_prefix` is suffixed with the child status to form the reason
    /// (`DispatcherDeployment` gives `DispatcherDeploymentFalse`), `label` names
    /// the child in messages.
    pub const fn new(
        target: T,
        child_type: &'static str,
        reason_prefix: &'static str,
        label: &'static str,
    ) -> Self {
        Self {
            target,
            child_type,
            reason_prefix,
            label,
        }
    }

    pub fn target(&self) -> T {
        self.target
    }

    /// Apply the child's conditions and return the status that was projected, if any
    pub fn project<C: ChildCondition>(
        &self,
        manager: &mut ConditionManager<'_, T>,
        conditions: &[C],
    ) -> Result<Option<ConditionStatus>> {
        let Some(child) = conditions.iter().find(|c| c.condition_type() == self.child_type) else {
            return Ok(None);
        };
        let Some(status) = ConditionStatus::from_k8s(child.status()) else {
            tracing::debug!(
                child = self.label,
                status = child.status(),
                "ignoring unrecognized child status"
            );
            return Ok(None);
        };
        match status {
            ConditionStatus::True => manager.mark_true(self.target)?,
            ConditionStatus::False => {
                manager.mark_false(self.target, &self.reason(status), &self.message(status, child))?
            }
            ConditionStatus::Unknown => {
                manager.mark_unknown(self.target, &self.reason(status), &self.message(status, child))?
            }
        }
        Ok(Some(status))
    }

    fn reason(&self, status: ConditionStatus) -> String {
        format!("{}{}", self.reason_prefix, status.as_str())
    }

    fn message<C: ChildCondition>(&self, status: ConditionStatus, child: &C) -> String {
        format!(
            "The status of {} is {}: {} : {}",
            self.label,
            status.as_str(),
            child.reason().unwrap_or_default(),
            child.message().unwrap_or_default()
        )
    }
}
