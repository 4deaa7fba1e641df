/// Parameter file provisioning
///
/// Makes sure every proving parameter file the engine needs is on disk before
/// anything else runs. Files are fetched one at a time so progress reporting
/// stays unambiguous; a failed transfer never leaves a file behind that a later
/// check would mistake for a finished download.
use futures::StreamExt;
use reqwest::StatusCode;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;

use crate::config::{BootstrapConfig, ParameterSource};
use crate::error::{ProvisionError, TransferError};
use crate::session::StatusReporter;

/// Suffix of the in-progress download beside the final file
const PARTIAL_SUFFIX: &str = "download";

/// A required parameter file and whether it is already on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterFile {
    pub name: String,
    pub remote_url: String,
    pub local_path: PathBuf,
    pub present: bool,
}

/// Platform location for parameter files
///
/// Linux keeps them in `~/.zcash-params`; macOS and Windows use `ZcashParams`
/// under the per-user application data directory.
pub fn locate_params_dir() -> Option<PathBuf> {
    if cfg!(target_os = "linux") {
        dirs::home_dir().map(|home| home.join(".zcash-params"))
    } else {
        dirs::data_dir().map(|data| data.join("ZcashParams"))
    }
}

fn megabytes(bytes: u64) -> String {
    format!("{:.0}", bytes as f64 / 1024.0 / 1024.0)
}

pub fn progress_message(name: &str, transferred: u64, total: Option<u64>) -> String {
    let total = total.map(megabytes).unwrap_or_else(|| "?".to_string());
    format!(
        "Downloading {}... ({} MB / {} MB)",
        name,
        megabytes(transferred),
        total
    )
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(PARTIAL_SUFFIX);
    dest.with_file_name(name)
}

async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => log::debug!("Removed partial download {:?}", path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("Failed to remove partial download {:?}: {}", path, e),
    }
}

pub struct ParameterProvisioner {
    client: reqwest::Client,
    sources: Vec<ParameterSource>,
    params_dir: Option<PathBuf>,
    progress_interval: Duration,
}

impl ParameterProvisioner {
    pub fn new(sources: Vec<ParameterSource>, params_dir: Option<PathBuf>) -> Self {
        Self {
            client: reqwest::Client::new(),
            sources,
            params_dir,
            progress_interval: Duration::from_secs(1),
        }
    }

    pub fn from_config(config: &BootstrapConfig) -> Self {
        Self {
            progress_interval: config.progress_interval,
            ..Self::new(config.parameter_files.clone(), config.params_dir.clone())
        }
    }

    /// Resolve the parameter directory, creating it if needed
    pub fn params_dir(&self) -> Result<PathBuf, ProvisionError> {
        let dir = match &self.params_dir {
            Some(dir) => dir.clone(),
            None => locate_params_dir().ok_or(ProvisionError::NoParamsDir)?,
        };
        std::fs::create_dir_all(&dir).map_err(|source| ProvisionError::CreateDir {
            path: dir.clone(),
            source,
        })?;
        Ok(dir)
    }

    /// Current on-disk state of every required file
    pub fn check(&self) -> Result<Vec<ParameterFile>, ProvisionError> {
        let dir = self.params_dir()?;
        Ok(self
            .sources
            .iter()
            .map(|source| {
                let local_path = dir.join(&source.name);
                ParameterFile {
                    name: source.name.clone(),
                    remote_url: source.url.clone(),
                    present: local_path.exists(),
                    local_path,
                }
            })
            .collect())
    }

    /// Download every missing file in order, stopping at the first failure
    pub async fn ensure_all(&self, reporter: &StatusReporter) -> Result<(), ProvisionError> {
        for file in self.check()? {
            if file.present {
                log::debug!("Parameter file {} already present", file.name);
                continue;
            }

            log::info!("Downloading {} from {}", file.name, file.remote_url);
            reporter.info(format!("Downloading {}...", file.name));

            if let Err(cause) = self.download(&file, reporter).await {
                let err = ProvisionError::Download {
                    name: file.name.clone(),
                    cause,
                };
                log::error!("{}", err);
                reporter.error_message(err.to_string());
                return Err(err);
            }
            log::info!("Downloaded {} to {:?}", file.name, file.local_path);
        }
        Ok(())
    }

    async fn download(&self, file: &ParameterFile, reporter: &StatusReporter) -> Result<(), TransferError> {
        let partial = partial_path(&file.local_path);

        if let Err(e) = self.transfer(file, &partial, reporter).await {
            remove_partial(&partial).await;
            return Err(e);
        }
        if let Err(e) = tokio::fs::rename(&partial, &file.local_path).await {
            remove_partial(&partial).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn transfer(
        &self,
        file: &ParameterFile,
        partial: &Path,
        reporter: &StatusReporter,
    ) -> Result<(), TransferError> {
        let response = self.client.get(&file.remote_url).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(TransferError::Status(status.as_u16()));
        }

        let total = response.content_length();
        let mut out = tokio::fs::File::create(partial).await?;
        let mut body = response.bytes_stream();
        let mut transferred = 0u64;
        let mut last_report = Instant::now();

        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            out.write_all(&chunk).await?;
            transferred += chunk.len() as u64;

            if last_report.elapsed() >= self.progress_interval {
                reporter.info(progress_message(&file.name, transferred, total));
                last_report = Instant::now();
            }
        }

        out.flush().await?;
        out.sync_all().await?;
        Ok(())
    }
}
