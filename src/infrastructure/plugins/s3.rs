use super::plugin_interface::{
    DeployContext, DeployPlugin, FileRef, FileTask, PluginCapabilities, PluginError,
    RemoteFileInfo,
};
use super::settings_of;
use crate::domain::entities::Target;
use crate::domain::value_objects::PluginType;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::Client;
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use std::future::Future;
use tracing::debug;
use validator::Validate;

/// Settings of an `s3` target
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct S3Settings {
    #[validate(length(min = 1))]
    pub bucket: String,

    #[serde(default = "default_region")]
    pub region: String,

    /// Custom endpoint of S3 compatible storage
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Key prefix
    #[serde(default)]
    pub dir: String,

    /// Canned ACL, e.g. `public-read`
    #[serde(default)]
    pub acl: Option<String>,

    #[serde(default)]
    pub content_type: Option<String>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl S3Settings {
    fn key_for(&self, file: &FileRef) -> String {
        let prefix = self.dir.trim_matches('/');
        let path = file.target_path.trim_start_matches('/');
        if prefix.is_empty() {
            path.to_string()
        } else {
            format!("{}/{}", prefix, path)
        }
    }
}

/// Client bound to one target's bucket
struct S3Connection {
    client: Client,
    settings: S3Settings,
}

impl S3Connection {
    async fn open(settings: S3Settings) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &settings.endpoint {
            debug!("Using custom S3 endpoint: {}", endpoint);
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: Client::from_conf(builder.build()),
            settings,
        }
    }

    async fn upload(&self, file: &FileRef, ctx: &DeployContext) -> Result<(), PluginError> {
        ctx.check_cancelled()?;
        let key = self.settings.key_for(file);
        debug!("Uploading {} -> s3://{}/{}", file.local_path.display(), self.settings.bucket, key);

        let body = ByteStream::from_path(&file.local_path)
            .await
            .map_err(|e| PluginError::Transfer(format!("{}: {}", file.local_path.display(), e)))?;

        let mut request = self
            .client
            .put_object()
            .bucket(&self.settings.bucket)
            .key(&key)
            .body(body);
        if let Some(acl) = &self.settings.acl {
            request = request.acl(ObjectCannedAcl::from(acl.as_str()));
        }
        if let Some(content_type) = &self.settings.content_type {
            request = request.content_type(content_type);
        }

        cancellable(ctx, request.send())
            .await?
            .map_err(|e| PluginError::Transfer(format!("put {}: {}", key, e.into_service_error())))?;
        Ok(())
    }

    async fn download(&self, file: &FileRef, ctx: &DeployContext) -> Result<(), PluginError> {
        ctx.check_cancelled()?;
        let key = self.settings.key_for(file);
        debug!("Downloading s3://{}/{} -> {}", self.settings.bucket, key, file.local_path.display());

        let response = cancellable(
            ctx,
            self.client
                .get_object()
                .bucket(&self.settings.bucket)
                .key(&key)
                .send(),
        )
        .await?
        .map_err(|e| PluginError::Transfer(format!("get {}: {}", key, e.into_service_error())))?;

        let data = cancellable(ctx, response.body.collect())
            .await?
            .map_err(|e| PluginError::Transfer(format!("read {}: {}", key, e)))?
            .into_bytes();

        if let Some(parent) = file.local_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PluginError::io(parent, e))?;
        }
        tokio::fs::write(&file.local_path, &data)
            .await
            .map_err(|e| PluginError::io(&file.local_path, e))
    }

    async fn head(&self, file: &FileRef, ctx: &DeployContext) -> Result<RemoteFileInfo, PluginError> {
        let key = self.settings.key_for(file);
        let location = format!("s3://{}/{}", self.settings.bucket, key);

        match cancellable(
            ctx,
            self.client
                .head_object()
                .bucket(&self.settings.bucket)
                .key(&key)
                .send(),
        )
        .await?
        {
            Ok(output) => {
                let modify_time = output
                    .last_modified()
                    .and_then(|time| Utc.timestamp_opt(time.secs(), 0).single());
                let size = output.content_length().and_then(|size| u64::try_from(size).ok());
                Ok(RemoteFileInfo::found(location, modify_time, size))
            }
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    Ok(RemoteFileInfo::missing(location))
                } else {
                    Err(PluginError::Transfer(format!("head {}: {}", key, service_error)))
                }
            }
        }
    }
}

async fn cancellable<F: Future>(ctx: &DeployContext, future: F) -> Result<F::Output, PluginError> {
    tokio::select! {
        output = future => Ok(output),
        _ = ctx.cancellation.cancelled() => Err(PluginError::Cancelled),
    }
}

/// Uploads files as objects of an S3 bucket
#[derive(Debug, Default)]
pub struct S3Plugin;

impl S3Plugin {
    pub fn new() -> Self {
        Self
    }

    async fn connect(target: &Target, ctx: &DeployContext) -> Result<S3Connection, PluginError> {
        let mut settings: S3Settings = settings_of(target)?;
        settings.bucket = ctx.values.resolve(&settings.bucket);
        settings.dir = ctx.values.resolve(&settings.dir);
        Ok(S3Connection::open(settings).await)
    }
}

#[async_trait]
impl DeployPlugin for S3Plugin {
    fn plugin_type(&self) -> PluginType {
        PluginType::new(PluginType::S3)
    }

    fn capabilities(&self) -> PluginCapabilities {
        PluginCapabilities::full()
    }

    async fn deploy_workspace(
        &self,
        tasks: Vec<FileTask>,
        target: &Target,
        ctx: &DeployContext,
    ) -> Result<(), PluginError> {
        let connection = Self::connect(target, ctx).await?;
        for task in tasks {
            if ctx.is_cancelled() {
                task.cancel();
                continue;
            }
            let result = connection.upload(&task.file, ctx).await;
            task.finish(result);
        }
        Ok(())
    }

    async fn deploy_file(
        &self,
        file: &FileRef,
        target: &Target,
        ctx: &DeployContext,
    ) -> Result<(), PluginError> {
        Self::connect(target, ctx).await?.upload(file, ctx).await
    }

    async fn pull_workspace(
        &self,
        tasks: Vec<FileTask>,
        target: &Target,
        ctx: &DeployContext,
    ) -> Result<(), PluginError> {
        let connection = Self::connect(target, ctx).await?;
        for task in tasks {
            if ctx.is_cancelled() {
                task.cancel();
                continue;
            }
            let result = connection.download(&task.file, ctx).await;
            task.finish(result);
        }
        Ok(())
    }

    async fn pull_file(
        &self,
        file: &FileRef,
        target: &Target,
        ctx: &DeployContext,
    ) -> Result<(), PluginError> {
        Self::connect(target, ctx).await?.download(file, ctx).await
    }

    async fn get_file_info(
        &self,
        file: &FileRef,
        target: &Target,
        ctx: &DeployContext,
    ) -> Result<RemoteFileInfo, PluginError> {
        Self::connect(target, ctx).await?.head(file, ctx).await
    }
}
