// Sync module - reconcile the object sets of two storage backends
use crate::error::{StorageError, ValidationError};
use crate::id_range::IdRange;
use crate::storage::{ensure_distinct, StorageBackend};
use std::collections::BTreeSet;
use std::fmt::Write;

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncMode {
    /// Remove destination objects missing at origin
    pub delete: bool,
    /// Re-transfer objects present at both sides
    pub replace: bool,
}

/// Differences between origin and destination, computed before any change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    pub origin: String,
    pub destination: String,
    pub to_add: Vec<String>,
    pub to_update: Vec<String>,
    pub to_delete: Vec<String>,
    /// Names at both sides not scheduled for update
    pub unchanged: Vec<String>,
}

impl SyncPlan {
    /// Names present at both sides
    pub fn existing(&self) -> usize {
        self.to_update.len() + self.unchanged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }

    /// Objects copied from origin to destination when applied
    pub fn transfers(&self) -> impl Iterator<Item = &String> {
        self.to_add.iter().chain(self.to_update.iter())
    }

    /// One line per planned action: `ADD name`, `UPD name` or `DEL name`
    pub fn render(&self) -> String {
        let mut out = String::new();
        for name in &self.to_add {
            let _ = writeln!(out, "ADD {}", name);
        }
        for name in &self.to_update {
            let _ = writeln!(out, "UPD {}", name);
        }
        for name in &self.to_delete {
            let _ = writeln!(out, "DEL {}", name);
        }
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub transferred: usize,
    pub deleted: usize,
    pub failed: usize,
}

pub struct SyncReconciler<'a> {
    origin: &'a dyn StorageBackend,
    destination: &'a dyn StorageBackend,
}

impl<'a> SyncReconciler<'a> {
    /// Pair two backends; a backend cannot be synced onto itself
    pub fn new(
        origin: &'a dyn StorageBackend,
        destination: &'a dyn StorageBackend,
    ) -> Result<Self, ValidationError> {
        ensure_distinct(origin, destination)?;
        Ok(Self {
            origin,
            destination,
        })
    }

    pub async fn plan(&self, range: &IdRange, mode: SyncMode) -> Result<SyncPlan, StorageError> {
        let from: BTreeSet<String> = self.origin.list(range).await?.into_iter().collect();
        let to: BTreeSet<String> = self.destination.list(range).await?.into_iter().collect();
        log::info!(
            "Origin: {} objects at {}; destination: {} objects at {}",
            from.len(),
            self.origin.location(),
            to.len(),
            self.destination.location()
        );

        let existing: Vec<String> = from.intersection(&to).cloned().collect();
        let (to_update, unchanged) = if mode.replace {
            (existing, Vec::new())
        } else {
            (Vec::new(), existing)
        };
        let to_delete = if mode.delete {
            to.difference(&from).cloned().collect()
        } else {
            Vec::new()
        };

        let plan = SyncPlan {
            origin: self.origin.location(),
            destination: self.destination.location(),
            to_add: from.difference(&to).cloned().collect(),
            to_update,
            to_delete,
            unchanged,
        };
        log::info!(
            "{} to add, {} to update, {} to delete",
            plan.to_add.len(),
            plan.to_update.len(),
            plan.to_delete.len()
        );
        Ok(plan)
    }

    /// Execute a plan: deletions first, then transfers.
    ///
    /// Single failures are logged and counted; `on_step` is called after every
    /// action with the number of actions done.
    pub async fn apply<F>(&self, plan: &SyncPlan, mut on_step: F) -> SyncSummary
    where
        F: FnMut(usize),
    {
        let mut summary = SyncSummary::default();
        let mut done = 0;

        for name in &plan.to_delete {
            match self.destination.delete(name).await {
                Ok(()) => {
                    log::debug!("Deleted {}", name);
                    summary.deleted += 1;
                }
                Err(e) => {
                    log::error!("Deletion of {} failed: {}", name, e);
                    summary.failed += 1;
                }
            }
            done += 1;
            on_step(done);
        }

        for name in plan.transfers() {
            let copied = match self.origin.read(name).await {
                Ok(data) => self.destination.store(name, &data).await,
                Err(e) => Err(e),
            };
            match copied {
                Ok(()) => {
                    log::debug!("Transferred {}", name);
                    summary.transferred += 1;
                }
                Err(e) => {
                    log::error!("Transfer of {} failed: {}", name, e);
                    summary.failed += 1;
                }
            }
            done += 1;
            on_step(done);
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render() {
        let plan = SyncPlan {
            to_add: vec!["ntp00000001_a.pdf".into()],
            to_update: vec!["ntp00000002_a.pdf".into()],
            to_delete: vec!["ntp00000003_a.pdf".into()],
            ..Default::default()
        };
        assert_eq!(
            plan.render(),
            "ADD ntp00000001_a.pdf\nUPD ntp00000002_a.pdf\nDEL ntp00000003_a.pdf\n"
        );
        assert_eq!(plan.existing(), 1);
        assert!(!plan.is_empty());
        assert!(SyncPlan::default().is_empty());
    }
}
