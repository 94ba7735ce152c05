pub mod hot_reload;
pub mod loader;
pub mod store;

pub use hot_reload::{RuleFileWatcher, RuleSnapshotRx};
pub use loader::{load_rule_file, RuleFile, RuleFileError, RuleFileLoader, RuleSnapshot};
pub use store::FileRuleStore;
