use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::domain::rule::compile_active;
use crate::domain::{Rule, RuleDef};

/// Errors that can occur during rule file loading.
#[derive(Error, Debug)]
pub enum RuleFileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// On-disk rule file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleFile {
    /// Bumped whenever the rules change; drives hot reload
    pub version: String,

    #[serde(default)]
    pub rules: Vec<RuleDef>,
}

/// Compiled, active rules from one version of the rule file.
#[derive(Debug, Clone)]
pub struct RuleSnapshot {
    pub version: String,
    /// Active rules ordered by priority
    pub rules: Vec<Rule>,
    /// Definitions dropped because they were inactive or malformed
    pub skipped: usize,
}

impl RuleSnapshot {
    pub fn from_file(file: &RuleFile) -> Self {
        let rules = compile_active(&file.rules);
        RuleSnapshot {
            version: file.version.clone(),
            skipped: file.rules.len() - rules.len(),
            rules,
        }
    }
}

/// Load a rule file from YAML.
///
/// Individual malformed rules are not an error here; they are skipped at
/// compile time. Structural problems with the file are.
pub fn load_rule_file(path: impl AsRef<Path>) -> Result<RuleFile, RuleFileError> {
    let content = fs::read_to_string(path)?;
    let file: RuleFile = serde_yaml::from_str(&content)?;

    validate_rule_file(&file)?;

    Ok(file)
}

fn validate_rule_file(file: &RuleFile) -> Result<(), RuleFileError> {
    if file.version.trim().is_empty() {
        return Err(RuleFileError::Validation(
            "Rule file version cannot be empty".to_string(),
        ));
    }

    let mut seen_ids = HashSet::new();
    for rule in &file.rules {
        if rule.id.trim().is_empty() {
            return Err(RuleFileError::Validation("Rule ID cannot be empty".to_string()));
        }
        if !seen_ids.insert(&rule.id) {
            return Err(RuleFileError::Validation(format!(
                "Duplicate rule ID: {}",
                rule.id
            )));
        }
    }

    Ok(())
}

/// Loads and compiles the rule file at a fixed path.
#[derive(Debug, Clone)]
pub struct RuleFileLoader {
    path: PathBuf,
}

impl RuleFileLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        RuleFileLoader { path: path.into() }
    }

    /// Load and compile the rules.
    pub fn load(&self) -> Result<RuleSnapshot, RuleFileError> {
        Ok(RuleSnapshot::from_file(&self.load_file()?))
    }

    /// Load the raw definitions without compiling them.
    pub fn load_file(&self) -> Result<RuleFile, RuleFileError> {
        load_rule_file(&self.path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
