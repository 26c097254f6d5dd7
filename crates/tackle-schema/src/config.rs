//! Configuration documents (`tackle.yaml`).
//!
//! A configuration lists the packages a project pins, the registries those
//! packages come from and the checksum policy. Import directives are kept
//! as-is here; expanding them requires the file system and happens in
//! `tackle-core`.

use serde::{Deserialize, Serialize};

use crate::condition::Condition;

/// Registry used by a [`PackageRef`] that does not name one.
pub const DEFAULT_REGISTRY: &str = "standard";

/// A parsed configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Registries packages may refer to by name.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub registries: Vec<RegistryDecl>,
    /// Packages and import directives, in declaration order.
    #[serde(default)]
    pub packages: Vec<PackageRef>,
    /// Checksum verification policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<ChecksumSettings>,
}

impl Config {
    /// Parse a configuration document from YAML text.
    ///
    /// An empty document yields an empty configuration. `name@version`
    /// shorthands are split into separate fields.
    ///
    /// # Errors
    ///
    /// Returns the YAML error if the text is not a well-formed configuration.
    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let mut cfg: Self = serde_yaml::from_str(content)?;
        for pkg in &mut cfg.packages {
            pkg.normalize();
        }
        Ok(cfg)
    }

    /// Look up a registry declaration by name.
    pub fn registry(&self, name: &str) -> Option<&RegistryDecl> {
        self.registries.iter().find(|r| r.name == name)
    }

    /// Whether installs driven by this configuration maintain a checksum file.
    pub fn checksum_enabled(&self) -> bool {
        self.checksum.as_ref().is_some_and(|c| c.enabled)
    }

    /// Whether an install must fail when no checksum can be established.
    pub fn require_checksum(&self) -> bool {
        self.checksum
            .as_ref()
            .is_some_and(|c| c.enabled && c.require_checksum)
    }
}

/// The `checksum:` section of a configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumSettings {
    /// Maintain the checksum side-car file.
    #[serde(default)]
    pub enabled: bool,
    /// Refuse to install packages whose digest cannot be established.
    #[serde(default)]
    pub require_checksum: bool,
}

/// One entry of the `packages:` list: either a package or an import directive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRef {
    /// Package name as known to its registry (e.g. `cli/cli`).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Registry name; empty means [`DEFAULT_REGISTRY`].
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub registry: String,
    /// Pinned version.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    /// Glob pattern of configuration files to splice in at this position.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub import: String,
    /// Optional platform restriction declared by the project.
    #[serde(flatten)]
    pub condition: Condition,
}

impl PackageRef {
    /// Create a package reference in the default registry.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ..Self::default()
        }
    }

    /// Returns `true` if this entry is an import directive.
    pub fn is_import(&self) -> bool {
        !self.import.is_empty()
    }

    /// The registry this package resolves against.
    pub fn registry_name(&self) -> &str {
        if self.registry.is_empty() {
            DEFAULT_REGISTRY
        } else {
            &self.registry
        }
    }

    /// Split a `name@version` shorthand when no explicit version is set.
    pub fn normalize(&mut self) {
        if self.version.is_empty() && self.name.contains('@') {
            let (name, version) = split_name_version(&self.name);
            let (name, version) = (name.to_string(), version.to_string());
            self.name = name;
            self.version = version;
        }
    }
}

impl std::fmt::Display for PackageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.registry_name(), self.name)?;
        if !self.version.is_empty() {
            write!(f, "@{}", self.version)?;
        }
        Ok(())
    }
}

/// Split `name@version` at the first `@`.
///
/// # Example
///
/// ```
/// use tackle_schema::split_name_version;
///
/// assert_eq!(split_name_version("foo@v1.0.0"), ("foo", "v1.0.0"));
/// assert_eq!(split_name_version("foo"), ("foo", ""));
/// ```
pub fn split_name_version(name: &str) -> (&str, &str) {
    name.split_once('@').unwrap_or((name, ""))
}

/// Kinds of registry sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryType {
    /// A registry file on the local file system.
    Local,
    /// A registry file stored in a GitHub repository.
    GitHubContent,
}

impl std::str::FromStr for RegistryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Self::Local),
            "github_content" => Ok(Self::GitHubContent),
            _ => Err(format!("Unknown registry type: {s}")),
        }
    }
}

/// A registry declaration in the `registries:` list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryDecl {
    /// Name packages use to refer to this registry.
    pub name: String,
    /// Source type tag (`local` or `github_content`).
    #[serde(rename = "type")]
    pub type_: String,
    /// Registry file path; relative to the configuration file for `local`,
    /// relative to the repository root for `github_content`.
    #[serde(default)]
    pub path: String,
    /// Repository owner (`github_content`).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub repo_owner: String,
    /// Repository name (`github_content`).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub repo_name: String,
    /// Git ref to read the registry file at (`github_content`).
    #[serde(default, rename = "ref", skip_serializing_if = "String::is_empty")]
    pub git_ref: String,
}

impl RegistryDecl {
    /// Parse the type tag.
    ///
    /// # Errors
    ///
    /// Returns an error string naming the unknown tag.
    pub fn kind(&self) -> Result<RegistryType, String> {
        self.type_.parse()
    }
}
