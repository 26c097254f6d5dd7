//! Data model shared by the tackle resolver, installer and CLI.
//!
//! Nothing in this crate touches the network or the file system. Documents
//! are parsed from strings; reading them is the job of `tackle-core`.

pub mod condition;
pub mod config;
pub mod package;
pub mod runtime;
pub mod template;

// Re-exports
pub use condition::{Condition, ConditionSpec};
pub use config::{
    ChecksumSettings, Config, DEFAULT_REGISTRY, PackageRef, RegistryDecl, RegistryType,
    split_name_version,
};
pub use package::{
    ArchiveFormat, ChecksumSource, File, Package, PackageInfo, PackageType, RegistryContent,
};
pub use runtime::Runtime;
pub use template::{TemplateError, TemplateVars};
