//! The set of work packages seen during this process's lifetime.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::WorkPackage;
use crate::coordinator::PackageDescriptor;
use crate::job::{self, JobCompiler, PrepareError};
use crate::tracing::prelude::*;

/// Known work packages keyed by id.
///
/// Packages are never removed; a package whose job cannot be prepared stays
/// in the catalog blacklisted so it is not prepared again.
pub struct WorkCatalog {
    packages: RwLock<BTreeMap<u64, WorkPackage>>,
    compiler: Arc<dyn JobCompiler>,
}

impl WorkCatalog {
    pub fn new(compiler: Arc<dyn JobCompiler>) -> Self {
        Self {
            packages: RwLock::new(BTreeMap::new()),
            compiler,
        }
    }

    /// Return the id of the package described by `desc`, preparing and
    /// inserting it first if it is new.
    ///
    /// Preparation runs without holding the catalog lock.
    pub fn upsert(&self, desc: &PackageDescriptor) -> u64 {
        let work_id = desc.work_id;
        if self.packages.read().contains_key(&work_id) {
            return work_id;
        }

        let package = WorkPackage::from_descriptor(desc);
        let prepared = job::decode_source(&desc.source)
            .and_then(|source| self.compiler.prepare(&package.work_str, &source))
            .and_then(|job| match job.wcet {
                0 => Err(PrepareError::Wcet),
                _ => Ok(job),
            });

        let package = match prepared {
            Ok(job) => {
                debug!(work_id, wcet = job.wcet, name = %desc.title, "Added work package");
                package.prepared(job)
            }
            Err(e) => {
                error!(work_id, error = %e, "Unable to prepare work package, blacklisting");
                package.blacklist()
            }
        };

        self.packages.write().entry(work_id).or_insert(package);
        work_id
    }

    /// Whether `work_id` may be selected, given the number of bounties the
    /// coordinator reports as already received.
    pub fn is_eligible(&self, work_id: u64, received_bounties: u32) -> bool {
        self.packages
            .read()
            .get(&work_id)
            .is_some_and(|p| p.is_eligible(received_bounties))
    }

    /// Apply a pending-bounty delta to a package.
    pub fn adjust_pending(&self, work_id: u64, delta: i32) {
        let mut packages = self.packages.write();
        let Some(package) = packages.get_mut(&work_id) else {
            warn!(work_id, delta, "Pending adjustment for unknown work package");
            return;
        };

        if delta >= 0 {
            package.pending = package.pending.saturating_add(delta.unsigned_abs());
        } else {
            let decrement = delta.unsigned_abs();
            if decrement > package.pending {
                warn!(work_id, pending = package.pending, delta, "Pending count underflow");
            }
            package.pending = package.pending.saturating_sub(decrement);
        }
    }

    /// Snapshot of one package.
    pub fn get(&self, work_id: u64) -> Option<WorkPackage> {
        self.packages.read().get(&work_id).cloned()
    }

    /// Bounties pending across all packages.
    pub fn total_pending(&self) -> u32 {
        self.packages.read().values().map(|p| p.pending).sum()
    }

    pub fn len(&self) -> usize {
        self.packages.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{PreparedJob, ReferenceCompiler};
    use crate::types::Target;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts preparations and delegates to the reference compiler.
    #[derive(Default)]
    struct CountingCompiler {
        calls: AtomicUsize,
    }

    impl JobCompiler for CountingCompiler {
        fn prepare(&self, work_str: &str, source: &[u8]) -> Result<PreparedJob, PrepareError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            ReferenceCompiler.prepare(work_str, source)
        }
    }

    fn descriptor(work_id: u64, source: &str) -> PackageDescriptor {
        PackageDescriptor {
            work_id,
            block_id: 7,
            title: format!("work {}", work_id),
            target: Target::MAX,
            source: source.to_string(),
            bounty_limit: 3,
            xel_per_bounty: 100,
            xel_per_pow: 10,
            received_bounties: 0,
        }
    }

    #[test]
    fn test_upsert_prepares_once() {
        let compiler = Arc::new(CountingCompiler::default());
        let catalog = WorkCatalog::new(compiler.clone());

        assert_eq!(catalog.upsert(&descriptor(5, "87cURDZ")), 5);
        assert_eq!(catalog.upsert(&descriptor(5, "87cURDZ")), 5);
        assert_eq!(compiler.calls.load(Ordering::SeqCst), 1);

        let pkg = catalog.get(5).unwrap();
        assert_eq!(pkg.wcet, 5);
        assert_eq!(pkg.block_id, 7);
        assert!(!pkg.blacklisted);
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_bad_source_blacklists_without_retry() {
        let compiler = Arc::new(CountingCompiler::default());
        let catalog = WorkCatalog::new(compiler.clone());

        catalog.upsert(&descriptor(1, ""));
        catalog.upsert(&descriptor(2, "{{{{"));
        catalog.upsert(&descriptor(2, "87cURDZ"));

        assert!(catalog.get(1).unwrap().blacklisted);
        assert!(catalog.get(2).unwrap().blacklisted);
        assert!(!catalog.is_eligible(1, 0));
        assert!(!catalog.is_eligible(2, 0));
        assert_eq!(compiler.calls.load(Ordering::SeqCst), 0);
    }

    /// Compiler that reports no execution cost.
    struct CostlessCompiler;

    impl JobCompiler for CostlessCompiler {
        fn prepare(&self, work_str: &str, source: &[u8]) -> Result<PreparedJob, PrepareError> {
            let mut job = ReferenceCompiler.prepare(work_str, source)?;
            job.wcet = 0;
            Ok(job)
        }
    }

    #[test]
    fn test_zero_wcet_blacklists() {
        let catalog = WorkCatalog::new(Arc::new(CostlessCompiler));
        catalog.upsert(&descriptor(6, "87cURDZ"));

        let pkg = catalog.get(6).unwrap();
        assert!(pkg.blacklisted);
        assert!(pkg.job.is_none());
        assert!(!catalog.is_eligible(6, 0));
    }

    #[test]
    fn test_eligibility_counts_pending() {
        let catalog = WorkCatalog::new(Arc::new(ReferenceCompiler));
        catalog.upsert(&descriptor(9, "87cURDZ"));

        assert!(catalog.is_eligible(9, 2));
        catalog.adjust_pending(9, 1);
        assert!(!catalog.is_eligible(9, 2));
        assert!(catalog.is_eligible(9, 1));

        catalog.adjust_pending(9, -1);
        assert!(catalog.is_eligible(9, 2));

        assert!(!catalog.is_eligible(404, 0));
    }

    #[test]
    fn test_adjust_pending_saturates() {
        let catalog = WorkCatalog::new(Arc::new(ReferenceCompiler));
        catalog.upsert(&descriptor(3, "87cURDZ"));
        catalog.upsert(&descriptor(4, "87cURDZ"));

        catalog.adjust_pending(3, -1);
        assert_eq!(catalog.get(3).unwrap().pending, 0);

        catalog.adjust_pending(3, 1);
        catalog.adjust_pending(4, 1);
        catalog.adjust_pending(4, 1);
        assert_eq!(catalog.total_pending(), 3);

        // Unknown ids are ignored
        catalog.adjust_pending(99, 1);
        assert_eq!(catalog.total_pending(), 3);
    }
}
