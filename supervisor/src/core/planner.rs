//! Startup ordering
//!
//! Builds the deterministic start plan: ascending priority, ties broken by
//! service name. The descriptor store guarantees unique names, so a fully
//! validated set can always be ordered; the error variant exists because
//! `plan` accepts arbitrary slices.

use crate::error::{SupervisorError, SupervisorResult};
use shared::ProcessDescriptor;
use std::sync::Arc;

/// Order descriptors into the sequence they must be started in
pub fn plan(descriptors: &[Arc<ProcessDescriptor>]) -> SupervisorResult<Vec<Arc<ProcessDescriptor>>> {
    let mut ordered: Vec<Arc<ProcessDescriptor>> = descriptors.to_vec();
    ordered.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then_with(|| a.name.cmp(&b.name))
    });

    for pair in ordered.windows(2) {
        if pair[0].priority == pair[1].priority && pair[0].name == pair[1].name {
            return Err(SupervisorError::Unorderable {
                service: pair[0].name.clone(),
            });
        }
    }

    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::RestartPolicy;

    fn descriptor(name: &str, priority: i32) -> Arc<ProcessDescriptor> {
        Arc::new(
            serde_json::from_value(serde_json::json!({
                "name": name,
                "command": "/bin/true",
                "priority": priority,
                "restart": RestartPolicy::Never,
            }))
            .unwrap(),
        )
    }

    #[test]
    fn test_plan_sorted_by_priority() {
        let descriptors = vec![
            descriptor("dockerd", 30),
            descriptor("sshd", 10),
            descriptor("crond", 20),
        ];

        let order: Vec<String> = plan(&descriptors)
            .unwrap()
            .iter()
            .map(|d| d.name.clone())
            .collect();

        assert_eq!(order, vec!["sshd", "crond", "dockerd"]);
    }

    #[test]
    fn test_plan_ties_broken_by_name() {
        let descriptors = vec![
            descriptor("beta", 10),
            descriptor("alpha", 10),
            descriptor("gamma", 10),
        ];

        let order: Vec<String> = plan(&descriptors)
            .unwrap()
            .iter()
            .map(|d| d.name.clone())
            .collect();

        assert_eq!(order, vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn test_plan_deterministic_across_calls() {
        let descriptors = vec![
            descriptor("crond", 20),
            descriptor("sshd", 10),
            descriptor("dockerd", 30),
            descriptor("agent", 20),
        ];

        let first = plan(&descriptors).unwrap();
        let second = plan(&descriptors).unwrap();

        let names = |p: &[Arc<ProcessDescriptor>]| -> Vec<String> {
            p.iter().map(|d| d.name.clone()).collect()
        };
        assert_eq!(names(&first), names(&second));
        assert_eq!(names(&first), vec!["sshd", "agent", "crond", "dockerd"]);
    }

    #[test]
    fn test_plan_rejects_indistinguishable_descriptors() {
        let descriptors = vec![descriptor("sshd", 10), descriptor("sshd", 10)];

        assert!(matches!(
            plan(&descriptors),
            Err(SupervisorError::Unorderable { .. })
        ));
    }

    #[test]
    fn test_plan_empty_set() {
        assert!(plan(&[]).unwrap().is_empty());
    }
}
