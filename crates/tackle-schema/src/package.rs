//! Registry documents and resolved packages.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::condition::Condition;
use crate::config::PackageRef;
use crate::runtime::Runtime;
use crate::template::{TemplateError, TemplateVars};

/// Where a package's artifacts are downloaded from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageType {
    /// An asset attached to a GitHub release.
    #[default]
    GithubRelease,
    /// An arbitrary URL.
    Http,
}

impl PackageType {
    /// Registry tag for this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GithubRelease => "github_release",
            Self::Http => "http",
        }
    }
}

impl std::fmt::Display for PackageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Archive format of a downloaded artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArchiveFormat {
    /// Gzip-compressed tar archive (`.tar.gz` / `.tgz`).
    #[serde(rename = "tar.gz", alias = "tgz")]
    TarGz,
    /// Zip archive (`.zip`).
    #[serde(rename = "zip")]
    Zip,
    /// Standalone executable with no archive wrapper.
    #[serde(rename = "raw")]
    Raw,
}

impl ArchiveFormat {
    /// Detect the format from a file name or URL.
    pub fn detect(name: &str) -> Self {
        let name = name.to_lowercase();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Self::TarGz
        } else if name.ends_with(".zip") {
            Self::Zip
        } else {
            Self::Raw
        }
    }

    /// Registry tag for this format.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TarGz => "tar.gz",
            Self::Zip => "zip",
            Self::Raw => "raw",
        }
    }
}

/// An executable a package provides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    /// Command name users invoke.
    pub name: String,
    /// Path of the executable inside the unpacked package (template).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub src: String,
}

/// Where a package's checksum file comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumSource {
    /// Source type tag (`github_release` or `http`). Kept as text so an
    /// unknown tag can be reported verbatim.
    #[serde(rename = "type")]
    pub type_: String,
    /// Checksum asset name template (`github_release`).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub asset: String,
    /// Checksum URL template (`http`).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    /// Digest algorithm; only `sha256` is supported.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub algorithm: String,
}

/// Registry metadata for one package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    /// Registry name; defaults to `repo_owner/repo_name`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Download source type.
    #[serde(rename = "type", default)]
    pub type_: PackageType,
    /// GitHub repository owner.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub repo_owner: String,
    /// GitHub repository name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub repo_name: String,
    /// Release asset name template (`github_release`).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub asset: String,
    /// Download URL template (`http`).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    /// Archive format; detected from the asset name when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<ArchiveFormat>,
    /// Executables the package provides.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<File>,
    /// Substitutions applied to OS/architecture names before rendering.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub replacements: BTreeMap<String, String>,
    /// Platforms the registry supports this package on.
    #[serde(flatten)]
    pub condition: Condition,
    /// Checksum file source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<ChecksumSource>,
}

impl PackageInfo {
    /// The name packages refer to this entry by.
    pub fn name(&self) -> String {
        if self.name.is_empty() {
            format!("{}/{}", self.repo_owner, self.repo_name)
        } else {
            self.name.clone()
        }
    }

    /// Declared executables, or a single one named after the repository.
    pub fn files(&self) -> Vec<File> {
        if !self.files.is_empty() {
            return self.files.clone();
        }
        let default_name = self
            .name()
            .rsplit('/')
            .next()
            .map(str::to_string)
            .unwrap_or_default();
        vec![File {
            name: default_name,
            src: String::new(),
        }]
    }

    fn replace<'a>(&'a self, value: &'a str) -> &'a str {
        self.replacements.get(value).map_or(value, String::as_str)
    }
}

/// A registry document: the package metadata a registry publishes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryContent {
    /// Package entries.
    #[serde(default)]
    pub packages: Vec<PackageInfo>,
}

impl RegistryContent {
    /// Parse a registry document from YAML text.
    ///
    /// # Errors
    ///
    /// Returns the YAML error if the document is malformed.
    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    /// Find the entry for a package name.
    pub fn find(&self, name: &str) -> Option<&PackageInfo> {
        self.packages.iter().find(|p| p.name() == name)
    }
}

/// A configuration entry joined with its registry metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    /// The entry from the configuration file.
    pub package_ref: PackageRef,
    /// The registry's metadata for it.
    pub info: PackageInfo,
}

impl Package {
    /// Join a configuration entry with its registry metadata.
    pub fn new(package_ref: PackageRef, info: PackageInfo) -> Self {
        Self { package_ref, info }
    }

    /// Package name.
    pub fn name(&self) -> &str {
        &self.package_ref.name
    }

    /// Pinned version.
    pub fn version(&self) -> &str {
        &self.package_ref.version
    }

    /// Whether both the project and the registry allow this platform.
    pub fn matches(&self, rt: &Runtime) -> bool {
        self.package_ref.condition.matches(&rt.os, &rt.arch)
            && self.info.condition.matches(&rt.os, &rt.arch)
    }

    fn vars(&self, rt: &Runtime) -> TemplateVars {
        TemplateVars {
            version: self.version().to_string(),
            os: self.info.replace(&rt.os).to_string(),
            arch: self.info.replace(&rt.arch).to_string(),
            format: self
                .info
                .format
                .map(|f| f.as_str().to_string())
                .unwrap_or_default(),
            asset: String::new(),
        }
    }

    /// Render the download URL.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError`] if a template cannot be rendered.
    pub fn render_url(&self, rt: &Runtime) -> Result<String, TemplateError> {
        match self.info.type_ {
            PackageType::Http => self.vars(rt).render(&self.info.url),
            PackageType::GithubRelease => Ok(format!(
                "https://github.com/{}/{}/releases/download/{}/{}",
                self.info.repo_owner,
                self.info.repo_name,
                self.version(),
                self.render_asset(rt)?
            )),
        }
    }

    /// Render the name of the downloaded artifact.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError`] if a template cannot be rendered.
    pub fn render_asset(&self, rt: &Runtime) -> Result<String, TemplateError> {
        match self.info.type_ {
            PackageType::GithubRelease => self.vars(rt).render(&self.info.asset),
            PackageType::Http => {
                let url = self.vars(rt).render(&self.info.url)?;
                Ok(file_name_from_url(&url).to_string())
            }
        }
    }

    /// Archive format of the artifact.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError`] if the asset name cannot be rendered.
    pub fn format(&self, rt: &Runtime) -> Result<ArchiveFormat, TemplateError> {
        match self.info.format {
            Some(format) => Ok(format),
            None => Ok(ArchiveFormat::detect(&self.render_asset(rt)?)),
        }
    }

    /// Directory the package is unpacked into.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError`] if a template cannot be rendered.
    pub fn pkg_path(&self, root: &Path, rt: &Runtime) -> Result<PathBuf, TemplateError> {
        let pkgs = root.join("pkgs").join(self.info.type_.as_str());
        match self.info.type_ {
            PackageType::GithubRelease => Ok(pkgs
                .join("github.com")
                .join(&self.info.repo_owner)
                .join(&self.info.repo_name)
                .join(self.version())
                .join(self.render_asset(rt)?)),
            PackageType::Http => {
                let url = self.render_url(rt)?;
                let without_scheme = url.split_once("://").map_or(url.as_str(), |(_, r)| r);
                Ok(without_scheme
                    .split('/')
                    .filter(|s| !s.is_empty() && *s != "..")
                    .fold(pkgs, |path, segment| path.join(segment)))
            }
        }
    }

    /// Path of the given executable once installed.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError`] if a template cannot be rendered.
    pub fn exe_path(&self, root: &Path, file: &File, rt: &Runtime) -> Result<PathBuf, TemplateError> {
        let pkg_path = self.pkg_path(root, rt)?;
        let src = if !file.src.is_empty() {
            self.vars(rt).render(&file.src)?
        } else if self.format(rt)? == ArchiveFormat::Raw {
            self.render_asset(rt)?
        } else {
            file.name.clone()
        };
        Ok(pkg_path.join(src))
    }

    /// Render the checksum asset name (`github_release` checksum source).
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError`] if a template cannot be rendered.
    pub fn render_checksum_file_name(&self, rt: &Runtime) -> Result<String, TemplateError> {
        let template = self
            .info
            .checksum
            .as_ref()
            .map(|c| c.asset.as_str())
            .unwrap_or_default();
        self.checksum_vars(rt)?.render(template)
    }

    /// Render the checksum URL (`http` checksum source).
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError`] if a template cannot be rendered.
    pub fn render_checksum_url(&self, rt: &Runtime) -> Result<String, TemplateError> {
        let template = self
            .info
            .checksum
            .as_ref()
            .map(|c| c.url.as_str())
            .unwrap_or_default();
        self.checksum_vars(rt)?.render(template)
    }

    fn checksum_vars(&self, rt: &Runtime) -> Result<TemplateVars, TemplateError> {
        let mut vars = self.vars(rt);
        vars.asset = self.render_asset(rt)?;
        Ok(vars)
    }

    /// Key of this package's entry in a checksum file.
    pub fn checksum_id(&self, rt: &Runtime) -> String {
        format!("{}/{}/{}/{}", self.name(), self.version(), rt.os, rt.arch)
    }
}

impl std::fmt::Display for Package {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.package_ref)
    }
}

/// Extract the filename from a URL.
pub fn file_name_from_url(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.split('/').next_back().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gh_package() -> Package {
        let info = PackageInfo {
            repo_owner: "cli".into(),
            repo_name: "cli".into(),
            asset: "gh_{{trimV .Version}}_{{.OS}}_{{.Arch}}.tar.gz".into(),
            files: vec![File {
                name: "gh".into(),
                src: "gh_{{trimV .Version}}_{{.OS}}_{{.Arch}}/bin/gh".into(),
            }],
            replacements: BTreeMap::from([("darwin".into(), "macOS".into())]),
            checksum: Some(ChecksumSource {
                type_: "github_release".into(),
                asset: "gh_{{trimV .Version}}_checksums.txt".into(),
                ..ChecksumSource::default()
            }),
            ..PackageInfo::default()
        };
        Package::new(PackageRef::new("cli/cli", "v2.40.0"), info)
    }

    fn http_package() -> Package {
        let info = PackageInfo {
            name: "hashicorp/terraform".into(),
            type_: PackageType::Http,
            url: "https://releases.example.com/terraform/{{trimV .Version}}/terraform_{{.OS}}_{{.Arch}}.zip".into(),
            files: vec![File {
                name: "terraform".into(),
                src: String::new(),
            }],
            checksum: Some(ChecksumSource {
                type_: "http".into(),
                url: "https://releases.example.com/terraform/{{trimV .Version}}/SHA256SUMS".into(),
                ..ChecksumSource::default()
            }),
            ..PackageInfo::default()
        };
        Package::new(PackageRef::new("hashicorp/terraform", "v1.6.0"), info)
    }

    #[test]
    fn test_info_name_defaults_to_repo() {
        let info = gh_package().info;
        assert_eq!(info.name(), "cli/cli");
        let info = PackageInfo {
            repo_owner: "BurntSushi".into(),
            repo_name: "ripgrep".into(),
            ..PackageInfo::default()
        };
        assert_eq!(info.files()[0].name, "ripgrep");
    }

    #[test]
    fn test_github_release_paths() {
        let pkg = gh_package();
        let rt = Runtime::new("darwin", "arm64");
        let root = Path::new("/root");

        assert_eq!(pkg.render_asset(&rt).unwrap(), "gh_2.40.0_macOS_arm64.tar.gz");
        assert_eq!(
            pkg.render_url(&rt).unwrap(),
            "https://github.com/cli/cli/releases/download/v2.40.0/gh_2.40.0_macOS_arm64.tar.gz"
        );
        assert_eq!(pkg.format(&rt).unwrap(), ArchiveFormat::TarGz);
        let exe = pkg.exe_path(root, &pkg.info.files[0], &rt).unwrap();
        assert_eq!(
            exe,
            PathBuf::from(
                "/root/pkgs/github_release/github.com/cli/cli/v2.40.0/gh_2.40.0_macOS_arm64.tar.gz/gh_2.40.0_macOS_arm64/bin/gh"
            )
        );
        assert_eq!(
            pkg.render_checksum_file_name(&rt).unwrap(),
            "gh_2.40.0_checksums.txt"
        );
        assert_eq!(pkg.checksum_id(&rt), "cli/cli/v2.40.0/darwin/arm64");
    }

    #[test]
    fn test_http_paths() {
        let pkg = http_package();
        let rt = Runtime::new("linux", "amd64");
        let exe = pkg
            .exe_path(Path::new("/root"), &pkg.info.files[0], &rt)
            .unwrap();
        assert_eq!(
            exe,
            PathBuf::from(
                "/root/pkgs/http/releases.example.com/terraform/1.6.0/terraform_linux_amd64.zip/terraform"
            )
        );
        assert_eq!(
            pkg.render_checksum_url(&rt).unwrap(),
            "https://releases.example.com/terraform/1.6.0/SHA256SUMS"
        );
    }

    #[test]
    fn test_raw_exe_defaults_to_asset_name() {
        let mut pkg = gh_package();
        pkg.info.asset = "tool_{{.OS}}_{{.Arch}}".into();
        pkg.info.files = vec![File {
            name: "tool".into(),
            src: String::new(),
        }];
        let rt = Runtime::new("linux", "amd64");
        let exe = pkg
            .exe_path(Path::new("/r"), &pkg.info.files[0], &rt)
            .unwrap();
        assert!(exe.ends_with("tool_linux_amd64/tool_linux_amd64"));
    }

    #[test]
    fn test_package_matches_requires_both_conditions() {
        let mut pkg = gh_package();
        let linux = Runtime::new("linux", "amd64");
        let windows = Runtime::new("windows", "amd64");
        assert!(pkg.matches(&linux));

        pkg.info.condition.ignoring = vec![crate::ConditionSpec {
            os: "windows".into(),
            arch: String::new(),
        }];
        assert!(pkg.matches(&linux));
        assert!(!pkg.matches(&windows));

        pkg.package_ref.condition.on = vec![crate::ConditionSpec {
            os: "darwin".into(),
            arch: String::new(),
        }];
        assert!(!pkg.matches(&linux));
    }

    #[test]
    fn test_detect_format() {
        assert_eq!(ArchiveFormat::detect("foo.tar.gz"), ArchiveFormat::TarGz);
        assert_eq!(ArchiveFormat::detect("FOO.TGZ"), ArchiveFormat::TarGz);
        assert_eq!(ArchiveFormat::detect("foo.zip"), ArchiveFormat::Zip);
        assert_eq!(ArchiveFormat::detect("foo"), ArchiveFormat::Raw);
    }

    #[test]
    fn test_parse_registry() {
        let registry = RegistryContent::from_yaml(
            r"
packages:
  - type: http
    name: acme/tool
    url: https://example.com/tool-{{.Version}}
    format: raw
    on:
      - os: linux
    files:
      - name: tool
  - repo_owner: cli
    repo_name: cli
    asset: gh.tar.gz
",
        )
        .unwrap();
        assert_eq!(registry.packages.len(), 2);
        let tool = registry.find("acme/tool").unwrap();
        assert_eq!(tool.type_, PackageType::Http);
        assert_eq!(tool.format, Some(ArchiveFormat::Raw));
        assert_eq!(tool.condition.on.len(), 1);
        let gh = registry.find("cli/cli").unwrap();
        assert_eq!(gh.type_, PackageType::GithubRelease);
        assert!(registry.find("missing").is_none());
    }

    #[test]
    fn test_file_name_from_url() {
        assert_eq!(file_name_from_url("https://example.com/a/b.tar.gz"), "b.tar.gz");
        assert_eq!(file_name_from_url("https://example.com/a/b?x=1"), "b");
        assert_eq!(file_name_from_url(""), "");
    }
}
