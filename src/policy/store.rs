use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;

use crate::domain::Rule;
use crate::storage::RuleStore;

use super::hot_reload::RuleSnapshotRx;
use super::loader::RuleSnapshot;

/// Rule store backed by the hot-reloaded rule file.
///
/// Reads never touch the filesystem; they clone the latest published
/// snapshot. Until a snapshot exists every read fails.
#[derive(Debug, Clone)]
pub struct FileRuleStore {
    rx: RuleSnapshotRx,
}

impl FileRuleStore {
    pub fn new(rx: RuleSnapshotRx) -> Self {
        FileRuleStore { rx }
    }

    /// Store serving a fixed snapshot, with no watcher behind it.
    pub fn from_snapshot(snapshot: RuleSnapshot) -> Self {
        let (_tx, rx) = watch::channel(Some(Arc::new(snapshot)));
        FileRuleStore { rx }
    }

    /// Version of the snapshot currently served.
    pub fn version(&self) -> Option<String> {
        self.rx.borrow().as_ref().map(|s| s.version.clone())
    }
}

#[async_trait]
impl RuleStore for FileRuleStore {
    async fn list_active_rules(&self) -> anyhow::Result<Vec<Rule>> {
        let snapshot = self.rx.borrow().clone();
        match snapshot {
            Some(snapshot) => Ok(snapshot.rules.clone()),
            None => anyhow::bail!("rule file has not been loaded"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::rule::{AmountCondition, RuleCondition};
    use crate::domain::{Action, AlertType, Severity};
    use rust_decimal::Decimal;

    fn snapshot(version: &str) -> RuleSnapshot {
        RuleSnapshot {
            version: version.to_string(),
            rules: vec![Rule {
                id: "R_BIG".to_string(),
                name: "large_amount".to_string(),
                condition: RuleCondition::Amount(AmountCondition {
                    threshold: Decimal::new(10_000, 0),
                }),
                action: Action::Review,
                severity: Severity::Medium,
                priority: 0,
                alert_type: AlertType::LargeAmount,
            }],
            skipped: 0,
        }
    }

    #[tokio::test]
    async fn test_serves_snapshot() {
        let store = FileRuleStore::from_snapshot(snapshot("v1"));

        let rules = store.list_active_rules().await.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(store.version().as_deref(), Some("v1"));
    }

    #[tokio::test]
    async fn test_unloaded_is_an_error() {
        let (_tx, rx) = watch::channel(None);
        let store = FileRuleStore::new(rx);

        assert!(store.list_active_rules().await.is_err());
        assert!(store.version().is_none());
    }

    #[tokio::test]
    async fn test_follows_updates() {
        let (tx, rx) = watch::channel(None);
        let store = FileRuleStore::new(rx);

        tx.send(Some(Arc::new(snapshot("v2")))).unwrap();

        assert_eq!(store.list_active_rules().await.unwrap().len(), 1);
        assert_eq!(store.version().as_deref(), Some("v2"));
    }
}
