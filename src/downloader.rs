use chrono::{DateTime, Local};
use regex::Regex;
use reqwest::blocking::Client;
use std::fs::{DirBuilder, File};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DOWNLOAD_DIR: &str = "download";
#[cfg(unix)]
const DIR_MODE: u32 = 0o755;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Failed to create directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("Failed to create file {path}: {source}")]
    CreateFile { path: PathBuf, source: io::Error },

    #[error("Failed to write body to {path}: {source}")]
    WriteBody { path: PathBuf, source: io::Error },
}

impl DownloadError {
    /// Filesystem failures abort the process; transport failures are only logged.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, DownloadError::Request(_))
    }
}

pub struct Downloader {
    client: Client,
    filename_pattern: Option<Regex>,
    root: PathBuf,
}

impl Downloader {
    /// `root` is the directory `download/` is created under, normally the working directory.
    pub fn new(filename_pattern: Option<Regex>, root: PathBuf) -> Self {
        Self {
            client: Client::new(),
            filename_pattern,
            root,
        }
    }

    pub fn download(&self, url: &str) -> Result<PathBuf, DownloadError> {
        self.download_at(url, Local::now())
    }

    fn download_at(&self, url: &str, now: DateTime<Local>) -> Result<PathBuf, DownloadError> {
        let mut response = self.client.get(url).send()?;

        let name = derive_filename(self.filename_pattern.as_ref(), response.url().as_str(), now);
        let dir = dated_dir(&self.root, now);
        create_dir(&dir)?;

        let path = dir.join(name);
        let mut file = File::create(&path).map_err(|source| DownloadError::CreateFile {
            path: path.clone(),
            source,
        })?;

        let written = response
            .copy_to(&mut file)
            .map_err(|e| DownloadError::WriteBody {
                path: path.clone(),
                source: io::Error::new(io::ErrorKind::Other, e),
            })?;
        tracing::info!("Saved {} bytes from {} to {}", written, response.url(), path.display());

        Ok(path)
    }
}

/// Picks the first capture group of `pattern` in `url`, falling back to the Unix timestamp of `now`.
pub fn derive_filename(pattern: Option<&Regex>, url: &str, now: DateTime<Local>) -> String {
    pattern
        .and_then(|re| re.captures(url))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| now.timestamp().to_string())
}

/// `<root>/download/<YYYY-MM-DD>`
pub fn dated_dir(root: &Path, now: DateTime<Local>) -> PathBuf {
    root.join(DOWNLOAD_DIR)
        .join(now.date_naive().format("%Y-%m-%d").to_string())
}

/// Creates `dir` and its parents as rwxr-xr-x.
fn create_dir(dir: &Path) -> Result<(), DownloadError> {
    let to_error = |source| DownloadError::CreateDir {
        path: dir.to_path_buf(),
        source,
    };

    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(DIR_MODE);
    }
    builder.create(dir).map_err(to_error)?;

    // the builder's mode is still filtered by the umask
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(dir, std::fs::Permissions::from_mode(DIR_MODE))
            .map_err(to_error)?;
    }
    Ok(())
}
