//! Platform conditions (`on` / `ignoring`) on packages and registry entries.

use serde::{Deserialize, Serialize};

/// One OS/architecture pattern. An empty field matches any value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionSpec {
    /// Operating system to match (empty = any).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub os: String,
    /// Architecture to match (empty = any).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub arch: String,
}

impl ConditionSpec {
    fn matches(&self, os: &str, arch: &str) -> bool {
        (self.os.is_empty() || self.os == os) && (self.arch.is_empty() || self.arch == arch)
    }
}

/// Platform applicability of a package: an allow-list (`on`) or a
/// deny-list (`ignoring`).
///
/// When both lists are populated only `on` is consulted.
///
/// # Example
///
/// ```
/// use tackle_schema::{Condition, ConditionSpec};
///
/// let cond = Condition {
///     on: vec![ConditionSpec { os: "linux".into(), arch: String::new() }],
///     ignoring: vec![],
/// };
/// assert!(cond.matches("linux", "arm64"));
/// assert!(!cond.matches("darwin", "arm64"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    /// The package applies only where one of these matches.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on: Vec<ConditionSpec>,
    /// The package applies everywhere except where one of these matches.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignoring: Vec<ConditionSpec>,
}

impl Condition {
    /// Returns `true` if the package applies to the given OS/architecture.
    pub fn matches(&self, os: &str, arch: &str) -> bool {
        if !self.on.is_empty() {
            return self.on.iter().any(|spec| spec.matches(os, arch));
        }
        if !self.ignoring.is_empty() {
            return !self.ignoring.iter().any(|spec| spec.matches(os, arch));
        }
        true
    }

    /// Returns `true` if neither list restricts anything.
    pub fn is_empty(&self) -> bool {
        self.on.is_empty() && self.ignoring.is_empty()
    }
}

/// Evaluate an optional condition; an absent condition never restricts.
pub fn matches(os: &str, arch: &str, condition: Option<&Condition>) -> bool {
    condition.is_none_or(|c| c.matches(os, arch))
}
