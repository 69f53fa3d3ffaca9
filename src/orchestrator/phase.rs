//! # Startup phases.
//!
//! Descriptors are grouped by their phase tag. Each phase has a [`PhasePolicy`]:
//! members start one after another or all at once, and the phase is either
//! required (its failure aborts startup) or optional (its failure is a warning).
//!
//! ```text
//! PhasePlan::default()
//!   1. datastore    sequential  required
//!   2. ai-runtime   sequential  optional
//!   3. application  parallel    required
//!   4+ <unknown>    sequential  required   (first appearance order)
//! ```
//! Empty phases are skipped; members keep their input order.

use crate::services::ServiceDescriptor;

/// Start policy of one phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhasePolicy {
    pub name: String,
    /// Start all members concurrently instead of one at a time.
    pub parallel: bool,
    /// A failing required member of a required phase aborts startup.
    pub required: bool,
}

impl PhasePolicy {
    pub fn sequential(name: impl Into<String>, required: bool) -> Self {
        Self {
            name: name.into(),
            parallel: false,
            required,
        }
    }

    pub fn parallel(name: impl Into<String>, required: bool) -> Self {
        Self {
            name: name.into(),
            parallel: true,
            required,
        }
    }
}

/// One planned phase: its policy and the descriptors that start in it.
#[derive(Debug, Clone)]
pub struct Phase {
    pub policy: PhasePolicy,
    pub services: Vec<ServiceDescriptor>,
}

/// Ordered table of known phases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhasePlan {
    policies: Vec<PhasePolicy>,
}

impl Default for PhasePlan {
    fn default() -> Self {
        Self {
            policies: vec![
                PhasePolicy::sequential("datastore", true),
                PhasePolicy::sequential("ai-runtime", false),
                PhasePolicy::parallel("application", true),
            ],
        }
    }
}

impl PhasePlan {
    /// Plan with exactly these phases, in this order.
    pub fn new(policies: Vec<PhasePolicy>) -> Self {
        let mut plan = Self {
            policies: Vec::with_capacity(policies.len()),
        };
        for p in policies {
            plan = plan.with_policy(p);
        }
        plan
    }

    /// Replaces the policy with the same name, or appends a new last phase.
    pub fn with_policy(mut self, policy: PhasePolicy) -> Self {
        match self.policies.iter_mut().find(|p| p.name == policy.name) {
            Some(existing) => *existing = policy,
            None => self.policies.push(policy),
        }
        self
    }

    pub fn policy(&self, name: &str) -> Option<&PhasePolicy> {
        self.policies.iter().find(|p| p.name == name)
    }

    pub fn policies(&self) -> &[PhasePolicy] {
        &self.policies
    }

    /// Groups descriptors into non-empty phases in start order.
    pub fn plan(&self, descriptors: &[ServiceDescriptor]) -> Vec<Phase> {
        let mut phases: Vec<Phase> = self
            .policies
            .iter()
            .map(|policy| Phase {
                policy: policy.clone(),
                services: Vec::new(),
            })
            .collect();

        for desc in descriptors {
            let tag = desc.phase();
            match phases.iter_mut().find(|p| p.policy.name == tag) {
                Some(phase) => phase.services.push(desc.clone()),
                None => phases.push(Phase {
                    policy: PhasePolicy::sequential(tag, true),
                    services: vec![desc.clone()],
                }),
            }
        }

        phases.retain(|p| !p.services.is_empty());
        phases
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(key: &str, phase: &str) -> ServiceDescriptor {
        ServiceDescriptor::new(key, "true").with_phase(phase)
    }

    fn names(phases: &[Phase]) -> Vec<&str> {
        phases.iter().map(|p| p.policy.name.as_str()).collect()
    }

    #[test]
    fn orders_known_phases_regardless_of_input_order() {
        let plan = PhasePlan::default().plan(&[
            desc("web", "application"),
            desc("db", "datastore"),
            desc("api", "application"),
            desc("ollama", "ai-runtime"),
        ]);
        assert_eq!(names(&plan), ["datastore", "ai-runtime", "application"]);

        let app: Vec<&str> = plan[2].services.iter().map(|d| d.key()).collect();
        assert_eq!(app, ["web", "api"]);
        assert!(plan[2].policy.parallel);
        assert!(!plan[1].policy.required);
    }

    #[test]
    fn unknown_tags_follow_known_phases() {
        let plan = PhasePlan::default().plan(&[
            desc("worker", "jobs"),
            desc("db", "datastore"),
            desc("cache", "cache"),
        ]);
        assert_eq!(names(&plan), ["datastore", "jobs", "cache"]);
        assert!(!plan[1].policy.parallel);
        assert!(plan[1].policy.required);
    }

    #[test]
    fn skips_empty_phases() {
        let plan = PhasePlan::default().plan(&[desc("api", "application")]);
        assert_eq!(names(&plan), ["application"]);
        assert!(PhasePlan::default().plan(&[]).is_empty());
    }

    #[test]
    fn with_policy_overrides_in_place() {
        let plan = PhasePlan::default().with_policy(PhasePolicy::sequential("application", true));
        assert_eq!(plan.policies().len(), 3);
        assert!(!plan.policy("application").unwrap().parallel);

        let plan = plan.with_policy(PhasePolicy::parallel("frontend", false));
        assert_eq!(plan.policies().last().unwrap().name, "frontend");
    }
}
