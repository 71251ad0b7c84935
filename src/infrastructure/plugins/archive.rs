use super::plugin_interface::{
    DeployContext, DeployPlugin, FileRef, FileTask, PluginCapabilities, PluginError,
};
use super::{resolve_local_dir, settings_of};
use crate::domain::entities::{Target, Value};
use crate::domain::value_objects::PluginType;
use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Deserialize;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tar::Builder as TarBuilder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use validator::Validate;
use zip::write::FileOptions as ZipFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Container written by an archive target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// gzip compressed tarball, type `archive`
    TarGz,
    /// ZIP archive, type `zip`
    Zip,
}

impl ArchiveFormat {
    fn plugin_type(self) -> &'static str {
        match self {
            Self::TarGz => PluginType::ARCHIVE,
            Self::Zip => PluginType::ZIP,
        }
    }

    fn default_file_name(self) -> &'static str {
        match self {
            Self::TarGz => "${target_name}_${archive_time}.tar.gz",
            Self::Zip => "${target_name}_${archive_time}.zip",
        }
    }
}

/// Settings of an `archive` or `zip` target
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveSettings {
    /// Output directory of the archive
    #[serde(default = "default_output_dir")]
    #[validate(length(min = 1))]
    pub target: String,

    /// Archive file name, placeholders allowed
    #[serde(default)]
    #[validate(length(min = 1))]
    pub file_name: Option<String>,
}

fn default_output_dir() -> String {
    ".".to_string()
}

/// Packs every file of a deployment into one archive
#[derive(Debug)]
pub struct ArchivePlugin {
    format: ArchiveFormat,
}

impl ArchivePlugin {
    pub fn new(format: ArchiveFormat) -> Self {
        Self { format }
    }

    pub fn tar_gz() -> Self {
        Self::new(ArchiveFormat::TarGz)
    }

    pub fn zip() -> Self {
        Self::new(ArchiveFormat::Zip)
    }

    fn archive_path(&self, settings: &ArchiveSettings, target: &Target, ctx: &DeployContext) -> PathBuf {
        let values = ctx.values.with_values(vec![
            Value::built_in("target_name", target.name.clone()),
            Value::built_in(
                "archive_time",
                chrono::Local::now().format("%Y%m%d_%H%M%S").to_string(),
            ),
        ]);
        let file_name = settings
            .file_name
            .as_deref()
            .unwrap_or_else(|| self.format.default_file_name());
        resolve_local_dir(ctx, &settings.target).join(values.resolve(file_name))
    }
}

enum ArchiveWriter {
    TarGz(TarBuilder<GzEncoder<File>>),
    Zip(ZipWriter<File>),
}

impl ArchiveWriter {
    fn create(format: ArchiveFormat, path: &Path) -> Result<Self, PluginError> {
        let output = File::create(path).map_err(|e| PluginError::io(path, e))?;
        Ok(match format {
            ArchiveFormat::TarGz => {
                Self::TarGz(TarBuilder::new(GzEncoder::new(output, Compression::default())))
            }
            ArchiveFormat::Zip => Self::Zip(ZipWriter::new(output)),
        })
    }

    fn append(&mut self, file: &FileRef, entry_name: &str) -> io::Result<()> {
        match self {
            Self::TarGz(builder) => builder.append_path_with_name(&file.local_path, entry_name),
            Self::Zip(writer) => {
                // Open first so a missing file leaves no empty entry behind
                let mut source = File::open(&file.local_path)?;
                let options = ZipFileOptions::default().compression_method(CompressionMethod::Deflated);
                writer.start_file(entry_name, options)?;
                io::copy(&mut source, writer)?;
                Ok(())
            }
        }
    }

    fn finish(self) -> io::Result<()> {
        match self {
            Self::TarGz(builder) => builder.into_inner()?.finish().map(|_| ()),
            Self::Zip(mut writer) => writer.finish().map(|_| ()).map_err(io::Error::from),
        }
    }
}

/// Outcome of packing, one entry per input file
enum PackResult {
    Packed(Vec<Result<(), String>>),
    Cancelled,
}

fn pack(
    format: ArchiveFormat,
    archive_path: &Path,
    files: &[FileRef],
    token: &CancellationToken,
) -> Result<PackResult, PluginError> {
    let mut writer = ArchiveWriter::create(format, archive_path)?;

    let mut results = Vec::with_capacity(files.len());
    for file in files {
        if token.is_cancelled() {
            return Ok(PackResult::Cancelled);
        }
        let entry_name = file.target_path.trim_start_matches('/');
        debug!("Packing {} as {}", file.local_path.display(), entry_name);
        let result = writer
            .append(file, entry_name)
            .map_err(|e| PluginError::io(&file.local_path, e).to_string());
        results.push(result);
    }

    writer.finish().map_err(|e| PluginError::io(archive_path, e))?;
    Ok(PackResult::Packed(results))
}

#[async_trait]
impl DeployPlugin for ArchivePlugin {
    fn plugin_type(&self) -> PluginType {
        PluginType::new(self.format.plugin_type())
    }

    fn capabilities(&self) -> PluginCapabilities {
        PluginCapabilities::deploy_only().with_batch()
    }

    async fn deploy_workspace(
        &self,
        tasks: Vec<FileTask>,
        target: &Target,
        ctx: &DeployContext,
    ) -> Result<(), PluginError> {
        let settings: ArchiveSettings = settings_of(target)?;
        ctx.check_cancelled()?;

        let archive_path = self.archive_path(&settings, target, ctx);
        if let Some(parent) = archive_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PluginError::io(parent, e))?;
        }

        let files: Vec<FileRef> = tasks.iter().map(|task| task.file.clone()).collect();
        let token = ctx.cancellation.clone();
        let path = archive_path.clone();
        let format = self.format;
        let packed = tokio::task::spawn_blocking(move || pack(format, &path, &files, &token))
            .await
            .map_err(|e| PluginError::Transfer(format!("archive task failed: {}", e)));

        match packed.and_then(|result| result) {
            Ok(PackResult::Packed(results)) => {
                info!("Created archive {}", archive_path.display());
                for (task, result) in tasks.into_iter().zip(results) {
                    match result {
                        Ok(()) => task.succeed(),
                        Err(message) => task.fail(message),
                    }
                }
                Ok(())
            }
            Ok(PackResult::Cancelled) => {
                remove_partial(&archive_path).await;
                tasks.into_iter().for_each(FileTask::cancel);
                Ok(())
            }
            Err(e) => {
                remove_partial(&archive_path).await;
                Err(e)
            }
        }
    }
}

async fn remove_partial(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != io::ErrorKind::NotFound {
            warn!("Could not remove partial archive {}: {}", path.display(), e);
        }
    }
}
