//! In-flight run registry.
//!
//! Workspaces are keyed by organization id, so two concurrent runs for the
//! same organization would share a directory. The registry lets exactly one
//! of them proceed; the other is rejected with
//! [`SiteBuilderError::WorkspaceBusy`].

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use sitebuilder_shared::{Result, SiteBuilderError};

/// Set of organization ids with a run in progress. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct InFlightRegistry {
    inner: Arc<Mutex<HashSet<String>>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `organization_id`, or fail if another run holds it.
    ///
    /// The claim is released when the returned guard is dropped.
    pub fn try_acquire(&self, organization_id: &str) -> Result<InFlightGuard> {
        if !self.lock().insert(organization_id.to_string()) {
            return Err(SiteBuilderError::WorkspaceBusy {
                organization_id: organization_id.to_string(),
            });
        }
        Ok(InFlightGuard {
            registry: self.clone(),
            organization_id: organization_id.to_string(),
        })
    }

    pub fn is_in_flight(&self, organization_id: &str) -> bool {
        self.lock().contains(organization_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        // The set stays consistent even if a holder panicked.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Releases an organization id on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    registry: InFlightRegistry,
    organization_id: String,
}

impl InFlightGuard {
    pub fn organization_id(&self) -> &str {
        &self.organization_id
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.organization_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_claim_is_rejected() {
        let registry = InFlightRegistry::new();
        let guard = registry.try_acquire("999000999").unwrap();
        assert_eq!(guard.organization_id(), "999000999");

        let err = registry.try_acquire("999000999").unwrap_err();
        assert!(matches!(err, SiteBuilderError::WorkspaceBusy { .. }));
    }

    #[test]
    fn drop_releases_claim() {
        let registry = InFlightRegistry::new();
        {
            let _guard = registry.try_acquire("1").unwrap();
            assert!(registry.is_in_flight("1"));
        }
        assert!(!registry.is_in_flight("1"));
        assert!(registry.try_acquire("1").is_ok());
    }

    #[test]
    fn different_organizations_are_independent() {
        let registry = InFlightRegistry::new();
        let _a = registry.try_acquire("1").unwrap();
        let _b = registry.try_acquire("2").unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn concurrent_claims_admit_exactly_one() {
        let registry = InFlightRegistry::new();
        let barrier = Arc::new(std::sync::Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    registry.try_acquire("same-org").ok()
                })
            })
            .collect();

        let guards: Vec<_> = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .collect();
        assert_eq!(guards.len(), 1);
    }
}
