use super::plugin_interface::{DeployContext, DeployPlugin, FileRef, FileTask, PluginError};
use super::settings_of;
use crate::domain::entities::Target;
use crate::domain::value_objects::PluginType;
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;
use validator::Validate;

/// Settings of an `http` target
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct HttpSettings {
    /// Request URL, per-file placeholders such as `${relative_path}` allowed
    #[validate(length(min = 1))]
    pub url: String,

    #[serde(default = "default_method")]
    pub method: String,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Request timeout in milliseconds
    #[serde(default)]
    pub timeout: Option<u64>,
}

fn default_method() -> String {
    "PUT".to_string()
}

/// Sends every file as the body of one HTTP request
#[derive(Debug, Default)]
pub struct HttpPlugin;

impl HttpPlugin {
    pub fn new() -> Self {
        Self
    }

    fn client(settings: &HttpSettings) -> Result<Client, PluginError> {
        let mut builder = Client::builder();
        if let Some(timeout) = settings.timeout {
            builder = builder.timeout(Duration::from_millis(timeout));
        }
        builder
            .build()
            .map_err(|e| PluginError::Transfer(format!("HTTP client: {}", e)))
    }

    async fn send(
        client: &Client,
        settings: &HttpSettings,
        file: &FileRef,
        target: &Target,
        ctx: &DeployContext,
    ) -> Result<(), PluginError> {
        ctx.check_cancelled()?;
        let values = ctx.file_values(file, target);
        let url = values.resolve(&settings.url);
        let method = Method::from_str(&settings.method.trim().to_uppercase())
            .map_err(|e| PluginError::invalid_settings(target, e))?;

        let body = tokio::fs::read(&file.local_path)
            .await
            .map_err(|e| PluginError::io(&file.local_path, e))?;

        debug!("{} {} ({} bytes)", method, url, body.len());
        let mut request = client.request(method, &url).body(body);
        for (name, value) in &settings.headers {
            request = request.header(name, values.resolve(value));
        }
        if let Some(user) = &settings.user {
            request = request.basic_auth(
                values.resolve(user),
                settings.password.as_deref().map(|password| values.resolve(password)),
            );
        }

        let response = tokio::select! {
            response = request.send() => response.map_err(|e| PluginError::Transfer(e.to_string()))?,
            _ = ctx.cancellation.cancelled() => return Err(PluginError::Cancelled),
        };

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(PluginError::Transfer(format!("{} answered {}", url, status)))
        }
    }
}

#[async_trait]
impl DeployPlugin for HttpPlugin {
    fn plugin_type(&self) -> PluginType {
        PluginType::new(PluginType::HTTP)
    }

    async fn deploy_workspace(
        &self,
        tasks: Vec<FileTask>,
        target: &Target,
        ctx: &DeployContext,
    ) -> Result<(), PluginError> {
        let settings: HttpSettings = settings_of(target)?;
        let client = Self::client(&settings)?;

        for task in tasks {
            if ctx.is_cancelled() {
                task.cancel();
                continue;
            }
            let result = Self::send(&client, &settings, &task.file, target, ctx).await;
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
        let settings: HttpSettings = settings_of(target)?;
        let client = Self::client(&settings)?;
        Self::send(&client, &settings, file, target, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::value_resolver::ValueResolver;
    use crate::application::session::DeploySession;
    use crate::domain::value_objects::{DeployDirection, FileStatus};
    use crate::infrastructure::plugins::{run_plugin, PluginRegistry};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn context(root: &std::path::Path) -> DeployContext {
        DeployContext::new(
            Arc::new(DeploySession::default()),
            CancellationToken::new(),
            ValueResolver::default(),
            root,
            Arc::new(PluginRegistry::new()),
            Arc::new(Vec::new()),
        )
    }

    #[tokio::test]
    async fn test_one_request_per_file() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/upload/a.txt"))
            .and(header("x-deploy", "web"))
            .and(body_string("alpha"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/upload/b.txt"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let ws = TempDir::new().unwrap();
        std::fs::write(ws.path().join("a.txt"), "alpha").unwrap();
        std::fs::write(ws.path().join("b.txt"), "beta").unwrap();

        let plugin: Arc<dyn DeployPlugin> = Arc::new(HttpPlugin::new());
        let target = Target::new("web", "http")
            .with_setting("url", format!("{}/upload/${{relative_path}}", server.uri()))
            .with_setting("headers", serde_json::json!({ "X-Deploy": "${target_name}" }));
        let files = vec![
            FileRef::new(ws.path().join("a.txt"), "a.txt", "a.txt"),
            FileRef::new(ws.path().join("b.txt"), "b.txt", "b.txt"),
        ];

        let statuses = run_plugin(&plugin, DeployDirection::Deploy, &files, &target, &context(ws.path()), |_, _| {}).await;
        assert_eq!(statuses[0], FileStatus::Succeeded);
        assert!(matches!(&statuses[1], FileStatus::Failed(m) if m.contains("500")));
    }

    #[test]
    fn test_default_method_is_put() {
        let settings: HttpSettings = Target::new("web", "http")
            .with_setting("url", "http://localhost/")
            .typed_settings()
            .unwrap();
        assert_eq!(settings.method, "PUT");
    }
}
