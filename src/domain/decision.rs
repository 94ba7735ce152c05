use serde::{Deserialize, Serialize};
use std::fmt;

/// Action taken on a transaction, ordered by severity.
///
/// Rules declare one of these; the aggregate decision is derived from the
/// declared actions of matched rules and the composite score.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Action {
    /// Transaction proceeds
    #[default]
    Allow = 0,
    /// Transaction proceeds after step-up verification
    Challenge = 1,
    /// Transaction held for manual review
    Review = 2,
    /// Transaction refused
    Block = 3,
}

impl Action {
    /// Returns the more severe of two actions.
    #[inline]
    pub fn max(self, other: Self) -> Self {
        std::cmp::max(self, other)
    }

    /// Returns true if the transaction may proceed.
    #[inline]
    pub fn is_allowed(&self) -> bool {
        *self != Action::Block
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Allow => "allow",
            Action::Challenge => "challenge",
            Action::Review => "review",
            Action::Block => "block",
        }
    }

    /// Parse from string representation.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "allow" => Some(Action::Allow),
            "challenge" => Some(Action::Challenge),
            "review" => Some(Action::Review),
            "block" => Some(Action::Block),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fraud classification recorded on the payment intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FraudStatus {
    #[default]
    Clean,
    Review,
    Blocked,
}

impl FraudStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FraudStatus::Clean => "clean",
            FraudStatus::Review => "review",
            FraudStatus::Blocked => "blocked",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "clean" => Some(FraudStatus::Clean),
            "review" => Some(FraudStatus::Review),
            "blocked" => Some(FraudStatus::Blocked),
            _ => None,
        }
    }
}

impl fmt::Display for FraudStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_ordering() {
        assert!(Action::Allow < Action::Challenge);
        assert!(Action::Challenge < Action::Review);
        assert!(Action::Review < Action::Block);
    }

    #[test]
    fn test_action_max() {
        assert_eq!(Action::Allow.max(Action::Review), Action::Review);
        assert_eq!(Action::Block.max(Action::Challenge), Action::Block);
    }

    #[test]
    fn test_only_block_disallows() {
        assert!(Action::Allow.is_allowed());
        assert!(Action::Challenge.is_allowed());
        assert!(Action::Review.is_allowed());
        assert!(!Action::Block.is_allowed());
    }

    #[test]
    fn test_serialization() {
        let json = serde_json::to_string(&Action::Challenge).unwrap();
        assert_eq!(json, "\"challenge\"");

        let parsed: FraudStatus = serde_json::from_str("\"blocked\"").unwrap();
        assert_eq!(parsed, FraudStatus::Blocked);
        assert_eq!(Action::from_str("BLOCK"), Some(Action::Block));
    }
}
