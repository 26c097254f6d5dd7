//! Checksum acquisition, parsing and the side-car store.

pub mod download;
pub mod parse;
pub mod store;

pub use download::{ChecksumDownloadError, ChecksumDownloader};
pub use parse::find_checksum;
pub use store::{ChecksumEntry, ChecksumFileError, Checksums, checksum_file_path};

/// The only digest algorithm supported.
pub const SHA256: &str = "sha256";
