pub mod download;
pub mod extract;
pub mod github;

pub use download::{ByteStream, Download, FetchError, HttpDownload, HttpDownloader};
pub use github::{GitHubReleaseDownloader, ReleaseAssetDownload, ReleaseAssetParam};
