//! The platform packages are resolved for.

/// The OS/architecture pair a package is being resolved for.
///
/// Values use the names registries are written against (`darwin`, `linux`,
/// `windows` and `amd64`, `arm64`), not Rust's target triples.
///
/// # Example
///
/// ```
/// use tackle_schema::Runtime;
///
/// let rt = Runtime::new("linux", "amd64");
/// assert_eq!(rt.to_string(), "linux/amd64");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Runtime {
    /// Operating system name (e.g. `linux`).
    pub os: String,
    /// Architecture name (e.g. `amd64`).
    pub arch: String,
}

impl Runtime {
    /// Create a runtime from explicit OS and architecture names.
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// Get the runtime of the running host
    pub fn host() -> Self {
        Self::new(
            os_name(std::env::consts::OS),
            arch_name(std::env::consts::ARCH),
        )
    }
}

impl std::fmt::Display for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}

/// Map a Rust OS constant to the registry naming convention.
fn os_name(os: &str) -> &str {
    match os {
        "macos" => "darwin",
        other => other,
    }
}

/// Map a Rust architecture constant to the registry naming convention.
fn arch_name(arch: &str) -> &str {
    match arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        other => other,
    }
}
