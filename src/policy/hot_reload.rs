use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::observability::MetricsRegistry;

use super::loader::{RuleFileError, RuleFileLoader, RuleSnapshot};

/// Latest successfully loaded rules. `None` until a load succeeds.
pub type RuleSnapshotRx = watch::Receiver<Option<Arc<RuleSnapshot>>>;

/// Watch the rule file and broadcast new snapshots when its version changes.
///
/// A failed reload keeps the last good snapshot in place.
pub struct RuleFileWatcher {
    loader: RuleFileLoader,
    check_interval: Duration,
    last_version: Option<String>,
    metrics: Arc<MetricsRegistry>,
}

impl RuleFileWatcher {
    pub fn new(
        loader: RuleFileLoader,
        check_interval: Duration,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        RuleFileWatcher {
            loader,
            check_interval,
            last_version: None,
            metrics,
        }
    }

    /// Load the rules once and start the reload task.
    pub fn start(mut self) -> (RuleSnapshotRx, tokio::task::JoinHandle<()>) {
        let initial = match self.loader.load() {
            Ok(snapshot) => {
                info!(
                    version = %snapshot.version,
                    rules = snapshot.rules.len(),
                    skipped = snapshot.skipped,
                    "Loaded rule file"
                );
                self.last_version = Some(snapshot.version.clone());
                Some(Arc::new(snapshot))
            }
            Err(e) => {
                error!(path = %self.loader.path().display(), error = %e, "Failed to load rule file");
                self.metrics.record_rule_reload(false);
                None
            }
        };

        let (tx, rx) = watch::channel(initial);

        let handle = tokio::spawn(async move {
            let mut interval = interval(self.check_interval);
            // First tick completes immediately
            interval.tick().await;

            loop {
                interval.tick().await;

                match self.check_for_updates(&tx) {
                    Ok(true) => self.metrics.record_rule_reload(true),
                    Ok(false) => {}
                    Err(e) => {
                        self.metrics.record_rule_reload(false);
                        warn!(error = %e, "Error checking for rule file updates");
                    }
                }
            }
        });

        (rx, handle)
    }

    /// Publish a new snapshot if the file's version differs from the last one.
    fn check_for_updates(
        &mut self,
        tx: &watch::Sender<Option<Arc<RuleSnapshot>>>,
    ) -> Result<bool, RuleFileError> {
        let file = self.loader.load_file()?;

        if self.last_version.as_ref() == Some(&file.version) {
            return Ok(false);
        }

        let snapshot = RuleSnapshot::from_file(&file);
        info!(
            from = ?self.last_version,
            to = %snapshot.version,
            rules = snapshot.rules.len(),
            "Rule file version changed"
        );

        self.last_version = Some(snapshot.version.clone());
        let _ = tx.send(Some(Arc::new(snapshot)));

        Ok(true)
    }
}
