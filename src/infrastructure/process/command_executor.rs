use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command as TokioCommand;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Command executor errors
#[derive(Debug, Error)]
pub enum CommandExecutorError {
    #[error("'{command}' failed with exit code {exit_code}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("Command was cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Process spawn failed: {0}")]
    SpawnFailed(String),
}

/// Configuration for command execution
#[derive(Clone, Default)]
pub struct ExecutionConfig {
    /// Working directory for command execution
    pub working_directory: Option<PathBuf>,

    /// Whether to run the command line through the platform shell
    pub use_shell: bool,

    /// Kill the process when this token is cancelled
    pub cancellation: Option<CancellationToken>,

    /// Written to the standard input of the process, which is closed afterwards
    pub stdin: Option<String>,
}

impl fmt::Debug for ExecutionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // stdin may carry credentials
        f.debug_struct("ExecutionConfig")
            .field("working_directory", &self.working_directory)
            .field("use_shell", &self.use_shell)
            .field("cancellation", &self.cancellation.is_some())
            .field("stdin", &self.stdin.as_ref().map(String::len))
            .finish()
    }
}

impl ExecutionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_working_directory<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.working_directory = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn with_shell(mut self, use_shell: bool) -> Self {
        self.use_shell = use_shell;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn with_stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }
}

/// Result of command execution
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

impl ExecutionResult {
    pub fn new(exit_code: i32, stdout: String, stderr: String) -> Self {
        Self {
            exit_code,
            stdout,
            stderr,
            success: exit_code == 0,
        }
    }

    /// Turn a non-zero exit into an error
    pub fn into_success(self, command: &str) -> Result<Self, CommandExecutorError> {
        if self.success {
            Ok(self)
        } else {
            Err(CommandExecutorError::CommandFailed {
                command: command.to_string(),
                exit_code: self.exit_code,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// Runs external processes for plugins and operations
pub struct CommandExecutor;

impl CommandExecutor {
    /// Execute a command line
    pub async fn execute(
        command: &str,
        config: &ExecutionConfig,
    ) -> Result<ExecutionResult, CommandExecutorError> {
        let (program, args) = Self::parse_command(command, config.use_shell)?;
        Self::execute_program(&program, &args, config).await
    }

    /// Execute a program with an explicit argument list
    pub async fn execute_program(
        program: &str,
        args: &[String],
        config: &ExecutionConfig,
    ) -> Result<ExecutionResult, CommandExecutorError> {
        if program.trim().is_empty() {
            return Err(CommandExecutorError::InvalidCommand(
                "Program is empty".to_string(),
            ));
        }
        if config
            .cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
        {
            return Err(CommandExecutorError::Cancelled);
        }

        debug!("Executing {} {:?}", program, args);

        let mut cmd = TokioCommand::new(program);
        cmd.args(args);
        if let Some(working_dir) = &config.working_directory {
            cmd.current_dir(working_dir);
        }
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.stdin(if config.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            CommandExecutorError::SpawnFailed(format!("Failed to spawn '{}': {}", program, e))
        })?;

        if let (Some(input), Some(mut stdin)) = (&config.stdin, child.stdin.take()) {
            stdin.write_all(input.as_bytes()).await?;
            // Dropping the handle closes the pipe
            drop(stdin);
        }

        let completion = child.wait_with_output();

        // Dropping the completion future kills the child
        let output = match &config.cancellation {
            Some(token) => tokio::select! {
                output = completion => output?,
                _ = token.cancelled() => return Err(CommandExecutorError::Cancelled),
            },
            None => completion.await?,
        };

        Ok(ExecutionResult::new(
            output.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&output.stdout).into_owned(),
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ))
    }

    /// Execute and require a zero exit code
    pub async fn execute_checked(
        program: &str,
        args: &[String],
        config: &ExecutionConfig,
    ) -> Result<ExecutionResult, CommandExecutorError> {
        Self::execute_program(program, args, config)
            .await?
            .into_success(program)
    }

    /// Start a program without waiting for it
    pub fn spawn_detached(
        program: &str,
        args: &[String],
        config: &ExecutionConfig,
    ) -> Result<u32, CommandExecutorError> {
        if program.trim().is_empty() {
            return Err(CommandExecutorError::InvalidCommand(
                "Program is empty".to_string(),
            ));
        }

        debug!("Starting {} {:?}", program, args);
        let mut cmd = TokioCommand::new(program);
        cmd.args(args);
        if let Some(working_dir) = &config.working_directory {
            cmd.current_dir(working_dir);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::null());

        let child = cmd.spawn().map_err(|e| {
            CommandExecutorError::SpawnFailed(format!("Failed to spawn '{}': {}", program, e))
        })?;
        Ok(child.id().unwrap_or_default())
    }

    /// Parse command into program and arguments
    fn parse_command(
        command: &str,
        use_shell: bool,
    ) -> Result<(String, Vec<String>), CommandExecutorError> {
        if command.trim().is_empty() {
            return Err(CommandExecutorError::InvalidCommand(
                "Command is empty".to_string(),
            ));
        }

        if use_shell {
            let (shell, flag) = if cfg!(target_os = "windows") {
                ("cmd", "/C")
            } else {
                ("sh", "-c")
            };
            return Ok((shell.to_string(), vec![flag.to_string(), command.to_string()]));
        }

        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| CommandExecutorError::InvalidCommand("Command has no parts".to_string()))?;
        Ok((program, parts.collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn test_parse_command() {
        let (program, args) = CommandExecutor::parse_command("git pull --rebase", false).unwrap();
        assert_eq!(program, "git");
        assert_eq!(args, vec!["pull", "--rebase"]);

        assert!(CommandExecutor::parse_command("   ", false).is_err());
    }

    #[test]
    fn test_parse_command_with_shell() {
        let (program, args) = CommandExecutor::parse_command("echo a && echo b", true).unwrap();
        if cfg!(target_os = "windows") {
            assert_eq!(program, "cmd");
        } else {
            assert_eq!(program, "sh");
            assert_eq!(args, vec!["-c", "echo a && echo b"]);
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_captures_output() {
        let result = CommandExecutor::execute("echo hello", &ExecutionConfig::new())
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.stdout.trim(), "hello");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stdin_is_written_and_closed() {
        let config = ExecutionConfig::new().with_stdin("user = \"bob:secret\"\n");
        let result = CommandExecutor::execute_checked("cat", &[], &config).await.unwrap();
        assert_eq!(result.stdout, "user = \"bob:secret\"\n");
        assert!(!format!("{:?}", config).contains("secret"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_is_error_when_checked() {
        let result =
            CommandExecutor::execute_checked("false", &[], &ExecutionConfig::new()).await;
        assert!(matches!(
            result,
            Err(CommandExecutorError::CommandFailed { exit_code: 1, .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancellation_kills_process() {
        let token = CancellationToken::new();
        let config = ExecutionConfig::new().with_cancellation(token.clone());

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        let result = CommandExecutor::execute("sleep 10", &config).await;
        assert!(matches!(result, Err(CommandExecutorError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_missing_program_fails_to_spawn() {
        let result = CommandExecutor::execute(
            "definitely-not-a-real-program-xyz",
            &ExecutionConfig::new(),
        )
        .await;
        assert!(matches!(result, Err(CommandExecutorError::SpawnFailed(_))));
    }
}
