use super::plugin_interface::{
    DeployContext, DeployPlugin, FileRef, FileTask, PluginCapabilities, PluginError,
    RemoteFileInfo,
};
use super::{join_remote_path, settings_of};
use crate::application::services::value_resolver::ValueResolver;
use crate::domain::entities::Target;
use crate::domain::value_objects::PluginType;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use ssh2::{CheckResult, ErrorCode, FileStat, KnownHostFileKind, Session, Sftp};
use std::fmt;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use validator::Validate;

/// `LIBSSH2_FX_NO_SUCH_FILE`
const SFTP_NO_SUCH_FILE: i32 = 2;

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Settings of an `sftp` target
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SftpSettings {
    #[validate(length(min = 1))]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Login name, the current user when omitted
    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Remote root directory
    #[serde(default = "default_dir")]
    pub dir: String,

    /// Private key file, the SSH agent is asked when neither a key nor a password is set
    #[serde(default)]
    pub private_key: Option<String>,

    #[serde(default)]
    pub passphrase: Option<String>,

    /// Connection timeout in seconds
    #[serde(default)]
    pub timeout: Option<u64>,

    /// Remote commands run once after connecting
    #[serde(default)]
    pub connected: Vec<String>,

    /// Remote commands run before each upload
    #[serde(default)]
    pub before_upload: Vec<String>,

    /// Remote commands run after each upload
    #[serde(default)]
    pub uploaded: Vec<String>,

    /// Remote commands run once before disconnecting
    #[serde(default)]
    pub closing: Vec<String>,
}

fn default_port() -> u16 {
    22
}

fn default_dir() -> String {
    "/".to_string()
}

impl SftpSettings {
    /// Connection parameters with placeholders resolved
    fn endpoint(&self, values: &ValueResolver) -> Endpoint {
        let user = self
            .user
            .as_ref()
            .map(|user| values.resolve(user))
            .or_else(current_user)
            .unwrap_or_default();

        Endpoint {
            host: values.resolve(&self.host),
            port: self.port,
            user,
            password: self.password.as_ref().map(|p| values.resolve(p)),
            private_key: self
                .private_key
                .as_ref()
                .map(|key| expand_home(&values.resolve(key))),
            passphrase: self.passphrase.as_ref().map(|p| values.resolve(p)),
            timeout: self.timeout.map(Duration::from_secs),
        }
    }

    fn remote_path(&self, values: &ValueResolver, file: &FileRef) -> String {
        join_remote_path(&values.resolve(&self.dir), &file.target_path)
    }

    fn resolve_hooks(hooks: &[String], values: &ValueResolver) -> Vec<String> {
        hooks.iter().map(|hook| values.resolve(hook)).collect()
    }
}

fn current_user() -> Option<String> {
    ["USER", "USERNAME", "LOGNAME"]
        .iter()
        .find_map(|name| std::env::var(name).ok().filter(|v| !v.is_empty()))
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

/// Resolved connection parameters
#[derive(Clone)]
struct Endpoint {
    host: String,
    port: u16,
    user: String,
    password: Option<String>,
    private_key: Option<PathBuf>,
    passphrase: Option<String>,
    timeout: Option<Duration>,
}

impl Endpoint {
    /// Key of the remote directory cache
    fn connection_key(&self) -> String {
        format!("{}@{}:{}", self.user, self.host, self.port)
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("private_key", &self.private_key)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

fn ssh_error(action: &str, error: ssh2::Error) -> PluginError {
    PluginError::Transfer(format!("{}: {}", action, error))
}

fn is_missing(error: &ssh2::Error) -> bool {
    matches!(error.code(), ErrorCode::SFTP(SFTP_NO_SUCH_FILE))
}

/// Every ancestor of an absolute remote directory, outermost first
fn remote_ancestors(dir: &str) -> Vec<String> {
    let mut current = String::new();
    dir.split('/')
        .filter(|part| !part.is_empty())
        .map(|part| {
            current.push('/');
            current.push_str(part);
            current.clone()
        })
        .collect()
}

/// Directory part of an absolute remote path
fn remote_parent(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some(("", _)) | None => "/",
        Some((dir, _)) => dir,
    }
}

fn file_info_from_stat(path: String, stat: &FileStat) -> RemoteFileInfo {
    let modify_time = stat
        .mtime
        .and_then(|seconds| i64::try_from(seconds).ok())
        .and_then(|seconds| Utc.timestamp_opt(seconds, 0).single());
    RemoteFileInfo::found(path, modify_time, stat.size)
}

/// Copy in chunks, stopping once the token fired
fn copy_cancellable<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    cancellation: &CancellationToken,
) -> std::io::Result<bool> {
    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
    loop {
        if cancellation.is_cancelled() {
            return Ok(false);
        }
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            return Ok(true);
        }
        writer.write_all(&buffer[..read])?;
    }
}

/// Reject a host whose key differs from the one in `~/.ssh/known_hosts`
///
/// Hosts missing from the file are accepted with a warning.
fn verify_host_key(session: &Session, endpoint: &Endpoint) -> Result<(), PluginError> {
    let known_hosts_file = expand_home("~/.ssh/known_hosts");
    if !known_hosts_file.is_file() {
        debug!("No {}, host key of {} not checked", known_hosts_file.display(), endpoint.host);
        return Ok(());
    }

    let mut known_hosts = session.known_hosts().map_err(|e| ssh_error("known hosts", e))?;
    known_hosts
        .read_file(&known_hosts_file, KnownHostFileKind::OpenSSH)
        .map_err(|e| ssh_error("known hosts", e))?;
    let (key, _) = session
        .host_key()
        .ok_or_else(|| PluginError::Transfer(format!("{} sent no host key", endpoint.host)))?;

    match known_hosts.check_port(&endpoint.host, endpoint.port, key) {
        CheckResult::Match => Ok(()),
        CheckResult::NotFound => {
            warn!("{} is not in {}", endpoint.host, known_hosts_file.display());
            Ok(())
        }
        CheckResult::Mismatch => Err(PluginError::Transfer(format!(
            "Host key of {} does not match {}",
            endpoint.host,
            known_hosts_file.display()
        ))),
        CheckResult::Failure => Err(PluginError::Transfer(format!(
            "Cannot check the host key of {}",
            endpoint.host
        ))),
    }
}

/// One authenticated SSH session with its SFTP subsystem
struct SftpConnection {
    session: Session,
    sftp: Sftp,
}

impl SftpConnection {
    fn open(endpoint: &Endpoint) -> Result<Self, PluginError> {
        let address = (endpoint.host.as_str(), endpoint.port)
            .to_socket_addrs()
            .map_err(|e| PluginError::Transfer(format!("Cannot resolve {}: {}", endpoint.host, e)))?
            .next()
            .ok_or_else(|| PluginError::Transfer(format!("No address for {}", endpoint.host)))?;

        let tcp = match endpoint.timeout {
            Some(timeout) => TcpStream::connect_timeout(&address, timeout),
            None => TcpStream::connect(address),
        }
        .map_err(|e| PluginError::Transfer(format!("Cannot connect to {}: {}", address, e)))?;

        let mut session = Session::new().map_err(|e| ssh_error("SSH session", e))?;
        if let Some(timeout) = endpoint.timeout {
            session.set_timeout(u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX));
        }
        session.set_tcp_stream(tcp);
        session.handshake().map_err(|e| ssh_error("SSH handshake", e))?;
        verify_host_key(&session, endpoint)?;

        let auth = if let Some(key) = &endpoint.private_key {
            session.userauth_pubkey_file(&endpoint.user, None, key, endpoint.passphrase.as_deref())
        } else if let Some(password) = &endpoint.password {
            session.userauth_password(&endpoint.user, password)
        } else {
            session.userauth_agent(&endpoint.user)
        };
        auth.map_err(|e| ssh_error("SSH authentication", e))?;
        if !session.authenticated() {
            return Err(PluginError::Transfer(format!(
                "SSH authentication as '{}' was rejected",
                endpoint.user
            )));
        }

        let sftp = session.sftp().map_err(|e| ssh_error("SFTP subsystem", e))?;
        Ok(Self { session, sftp })
    }

    /// Run a remote command, a non-zero exit is an error
    fn exec(&self, command: &str) -> Result<String, PluginError> {
        let mut channel = self
            .session
            .channel_session()
            .map_err(|e| ssh_error("SSH channel", e))?;
        channel.exec(command).map_err(|e| ssh_error(command, e))?;

        let mut stdout = String::new();
        channel
            .read_to_string(&mut stdout)
            .map_err(|e| PluginError::Transfer(format!("{}: {}", command, e)))?;
        let mut stderr = String::new();
        // stderr is only used for the error message
        let _ = channel.stderr().read_to_string(&mut stderr);
        channel.wait_close().map_err(|e| ssh_error(command, e))?;

        let status = channel.exit_status().map_err(|e| ssh_error(command, e))?;
        if status != 0 {
            return Err(PluginError::Transfer(format!(
                "'{}' exited with {}: {}",
                command,
                status,
                stderr.trim()
            )));
        }
        Ok(stdout)
    }

    fn exec_all(&self, commands: &[String]) -> Result<(), PluginError> {
        for command in commands {
            debug!("Running remote command: {}", command);
            self.exec(command)?;
        }
        Ok(())
    }

    fn create_dir_all(&self, dir: &str) -> Result<(), PluginError> {
        for ancestor in remote_ancestors(dir) {
            let path = Path::new(&ancestor);
            match self.sftp.stat(path) {
                Ok(stat) if stat.is_dir() => continue,
                Ok(_) => {
                    return Err(PluginError::Transfer(format!("'{}' is not a directory", ancestor)))
                }
                Err(e) if is_missing(&e) => {
                    self.sftp
                        .mkdir(path, 0o755)
                        .map_err(|e| ssh_error(&format!("mkdir {}", ancestor), e))?;
                }
                Err(e) => return Err(ssh_error(&format!("stat {}", ancestor), e)),
            }
        }
        Ok(())
    }

    fn upload(
        &self,
        local: &Path,
        remote: &str,
        cancellation: &CancellationToken,
    ) -> Result<(), PluginError> {
        let mut source = std::fs::File::open(local).map_err(|e| PluginError::io(local, e))?;
        let modified = source
            .metadata()
            .and_then(|metadata| metadata.modified())
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map(|elapsed| elapsed.as_secs());

        let mut destination = self
            .sftp
            .create(Path::new(remote))
            .map_err(|e| ssh_error(&format!("create {}", remote), e))?;
        let completed = copy_cancellable(&mut source, &mut destination, cancellation)
            .map_err(|e| PluginError::Transfer(format!("write {}: {}", remote, e)))?;
        drop(destination);
        if !completed {
            return Err(PluginError::Cancelled);
        }

        // Keep the local modification time so later comparisons stay meaningful
        if let Some(mtime) = modified {
            let stat = FileStat {
                size: None,
                uid: None,
                gid: None,
                perm: None,
                atime: Some(mtime),
                mtime: Some(mtime),
            };
            if let Err(e) = self.sftp.setstat(Path::new(remote), stat) {
                debug!("Cannot set modification time of {}: {}", remote, e);
            }
        }
        Ok(())
    }

    fn download(
        &self,
        remote: &str,
        local: &Path,
        cancellation: &CancellationToken,
    ) -> Result<(), PluginError> {
        let mut source = self
            .sftp
            .open(Path::new(remote))
            .map_err(|e| ssh_error(&format!("open {}", remote), e))?;
        if let Some(parent) = local.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PluginError::io(parent, e))?;
        }
        let mut destination = std::fs::File::create(local).map_err(|e| PluginError::io(local, e))?;
        let completed = copy_cancellable(&mut source, &mut destination, cancellation)
            .map_err(|e| PluginError::io(local, e))?;
        if !completed {
            return Err(PluginError::Cancelled);
        }
        Ok(())
    }

    fn file_info(&self, remote: String) -> Result<RemoteFileInfo, PluginError> {
        match self.sftp.stat(Path::new(&remote)) {
            Ok(stat) => Ok(file_info_from_stat(remote, &stat)),
            Err(e) if is_missing(&e) => Ok(RemoteFileInfo::missing(remote)),
            Err(e) => Err(ssh_error(&format!("stat {}", remote), e)),
        }
    }

    fn close(&self) {
        if let Err(e) = self.session.disconnect(None, "done", None) {
            debug!("SSH disconnect: {}", e);
        }
    }
}

/// Blocking libssh2 calls run on the blocking pool, one at a time per connection
#[derive(Clone)]
struct SharedConnection {
    inner: Arc<Mutex<SftpConnection>>,
    key: String,
}

impl SharedConnection {
    async fn open(endpoint: Endpoint) -> Result<Self, PluginError> {
        let key = endpoint.connection_key();
        debug!("Connecting to {}", key);
        let connection = tokio::task::spawn_blocking(move || SftpConnection::open(&endpoint))
            .await
            .map_err(|e| PluginError::Transfer(e.to_string()))??;
        Ok(Self {
            inner: Arc::new(Mutex::new(connection)),
            key,
        })
    }

    async fn run<T, F>(&self, job: F) -> Result<T, PluginError>
    where
        T: Send + 'static,
        F: FnOnce(&SftpConnection) -> Result<T, PluginError> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let connection = inner
                .lock()
                .map_err(|_| PluginError::Transfer("SFTP connection is unusable".to_string()))?;
            job(&*connection)
        })
        .await
        .map_err(|e| PluginError::Transfer(e.to_string()))?
    }

    async fn exec_all(&self, commands: Vec<String>) -> Result<(), PluginError> {
        if commands.is_empty() {
            return Ok(());
        }
        self.run(move |connection| connection.exec_all(&commands)).await
    }

    async fn close(&self) {
        let _ = self
            .run(|connection| {
                connection.close();
                Ok(())
            })
            .await;
    }
}

/// Transfers files over the SFTP subsystem of an SSH server
#[derive(Debug, Default)]
pub struct SftpPlugin;

impl SftpPlugin {
    pub fn new() -> Self {
        Self
    }

    async fn connect(settings: &SftpSettings, ctx: &DeployContext) -> Result<SharedConnection, PluginError> {
        ctx.check_cancelled()?;
        let connection = SharedConnection::open(settings.endpoint(&ctx.values)).await?;
        connection
            .exec_all(SftpSettings::resolve_hooks(&settings.connected, &ctx.values))
            .await?;
        Ok(connection)
    }

    /// Create the remote directory once per session and connection
    async fn ensure_remote_dir(
        connection: &SharedConnection,
        remote_dir: &str,
        ctx: &DeployContext,
    ) -> Result<(), PluginError> {
        if ctx.session.is_remote_dir_known(&connection.key, remote_dir) {
            return Ok(());
        }

        let dir = remote_dir.to_string();
        connection.run(move |c| c.create_dir_all(&dir)).await?;
        ctx.session.remember_remote_dir(&connection.key, remote_dir);
        Ok(())
    }

    async fn upload(
        connection: &SharedConnection,
        settings: &SftpSettings,
        file: &FileRef,
        target: &Target,
        ctx: &DeployContext,
    ) -> Result<(), PluginError> {
        ctx.check_cancelled()?;
        let values = ctx.file_values(file, target);
        let remote_path = settings.remote_path(&values, file);

        Self::ensure_remote_dir(connection, remote_parent(&remote_path), ctx).await?;
        connection
            .exec_all(SftpSettings::resolve_hooks(&settings.before_upload, &values))
            .await?;

        debug!("Uploading {} -> {}", file.local_path.display(), remote_path);
        let local = file.local_path.clone();
        let cancellation = ctx.cancellation.clone();
        connection
            .run(move |c| c.upload(&local, &remote_path, &cancellation))
            .await?;

        connection
            .exec_all(SftpSettings::resolve_hooks(&settings.uploaded, &values))
            .await
    }

    async fn disconnect(connection: &SharedConnection, settings: &SftpSettings, target: &Target, ctx: &DeployContext) {
        let closing = SftpSettings::resolve_hooks(&settings.closing, &ctx.values);
        if let Err(e) = connection.exec_all(closing).await {
            warn!("Closing commands of target '{}' failed: {}", target.name, e);
        }
        connection.close().await;
    }
}

#[async_trait]
impl DeployPlugin for SftpPlugin {
    fn plugin_type(&self) -> PluginType {
        PluginType::new(PluginType::SFTP)
    }

    fn capabilities(&self) -> PluginCapabilities {
        PluginCapabilities::full().with_batch()
    }

    async fn deploy_workspace(
        &self,
        tasks: Vec<FileTask>,
        target: &Target,
        ctx: &DeployContext,
    ) -> Result<(), PluginError> {
        let settings: SftpSettings = settings_of(target)?;
        let connection = Self::connect(&settings, ctx).await?;
        info!("Connected to {}", connection.key);

        for task in tasks {
            if ctx.is_cancelled() {
                task.cancel();
                continue;
            }
            let result = Self::upload(&connection, &settings, &task.file, target, ctx).await;
            task.finish(result);
        }

        Self::disconnect(&connection, &settings, target, ctx).await;
        Ok(())
    }

    async fn deploy_file(
        &self,
        file: &FileRef,
        target: &Target,
        ctx: &DeployContext,
    ) -> Result<(), PluginError> {
        let settings: SftpSettings = settings_of(target)?;
        let connection = Self::connect(&settings, ctx).await?;
        let result = Self::upload(&connection, &settings, file, target, ctx).await;
        Self::disconnect(&connection, &settings, target, ctx).await;
        result
    }

    async fn pull_workspace(
        &self,
        tasks: Vec<FileTask>,
        target: &Target,
        ctx: &DeployContext,
    ) -> Result<(), PluginError> {
        let settings: SftpSettings = settings_of(target)?;
        let connection = SharedConnection::open(settings.endpoint(&ctx.values)).await?;

        for task in tasks {
            if ctx.is_cancelled() {
                task.cancel();
                continue;
            }
            let values = ctx.file_values(&task.file, target);
            let remote_path = settings.remote_path(&values, &task.file);
            let local = task.file.local_path.clone();
            let cancellation = ctx.cancellation.clone();
            debug!("Downloading {} -> {}", remote_path, local.display());
            let result = connection
                .run(move |c| c.download(&remote_path, &local, &cancellation))
                .await;
            task.finish(result);
        }

        connection.close().await;
        Ok(())
    }

    async fn pull_file(
        &self,
        file: &FileRef,
        target: &Target,
        ctx: &DeployContext,
    ) -> Result<(), PluginError> {
        let settings: SftpSettings = settings_of(target)?;
        ctx.check_cancelled()?;
        let values = ctx.file_values(file, target);
        let remote_path = settings.remote_path(&values, file);
        let connection = SharedConnection::open(settings.endpoint(&values)).await?;

        debug!("Downloading {} -> {}", remote_path, file.local_path.display());
        let local = file.local_path.clone();
        let cancellation = ctx.cancellation.clone();
        let result = connection
            .run(move |c| c.download(&remote_path, &local, &cancellation))
            .await;
        connection.close().await;
        result
    }

    async fn get_file_info(
        &self,
        file: &FileRef,
        target: &Target,
        ctx: &DeployContext,
    ) -> Result<RemoteFileInfo, PluginError> {
        let settings: SftpSettings = settings_of(target)?;
        let values = ctx.file_values(file, target);
        let remote_path = settings.remote_path(&values, file);
        let connection = SharedConnection::open(settings.endpoint(&values)).await?;

        let result = connection.run(move |c| c.file_info(remote_path)).await;
        connection.close().await;
        result
    }
}
