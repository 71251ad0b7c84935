use super::{OperationContext, OperationError};
use crate::application::services::filter_service::FileFilter;
use crate::domain::entities::CompileOperation;
use crate::infrastructure::filesystem::WorkspaceScanner;
use crate::infrastructure::process::{CommandExecutor, CommandExecutorError, ExecutionConfig};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Supported compilers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compiler {
    Less,
    TypeScript,
    UglifyJs,
}

impl Compiler {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "less" => Some(Self::Less),
            "typescript" | "ts" => Some(Self::TypeScript),
            "uglifyjs" | "uglify" => Some(Self::UglifyJs),
            _ => None,
        }
    }

    fn executable(&self) -> &'static str {
        match self {
            Self::Less => "lessc",
            Self::TypeScript => "tsc",
            Self::UglifyJs => "uglifyjs",
        }
    }

    fn default_files(&self) -> Vec<String> {
        match self {
            Self::Less => vec!["**/*.less".to_string()],
            Self::TypeScript => vec!["**/*.ts".to_string()],
            Self::UglifyJs => vec!["**/*.js".to_string()],
        }
    }

    fn default_exclude(&self) -> Vec<String> {
        match self {
            Self::TypeScript => vec!["**/*.d.ts".to_string()],
            Self::UglifyJs => vec!["**/*.min.js".to_string()],
            Self::Less => Vec::new(),
        }
    }

    fn output_extension(&self) -> &'static str {
        match self {
            Self::Less => "css",
            Self::TypeScript => "js",
            Self::UglifyJs => "min.js",
        }
    }

    /// Output next to the input, or in `out_dir` when set
    pub fn output_path(&self, input: &Path, out_dir: Option<&Path>) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = format!("{}.{}", stem, self.output_extension());
        match out_dir {
            Some(dir) => dir.join(name),
            None => input.with_file_name(name),
        }
    }

    fn arguments(&self, input: &Path, output: &Path) -> Vec<String> {
        let input = input.display().to_string();
        let output = output.display().to_string();
        match self {
            Self::Less => vec![input, output],
            Self::TypeScript => vec![input, "--outFile".to_string(), output],
            Self::UglifyJs => vec![input, "-o".to_string(), output],
        }
    }
}

/// Compile every selected file, collecting per-file errors
pub async fn run(op: &CompileOperation, ctx: &OperationContext) -> Result<(), OperationError> {
    let compiler =
        Compiler::from_name(&op.compiler).ok_or_else(|| OperationError::UnknownCompiler(op.compiler.clone()))?;

    let files = if op.files.is_empty() { compiler.default_files() } else { op.files.clone() };
    let exclude = if op.exclude.is_empty() { compiler.default_exclude() } else { op.exclude.clone() };
    let inputs = WorkspaceScanner::new(&ctx.workspace_root)
        .scan(&FileFilter::new(files, exclude))
        .map_err(|e| OperationError::InvalidOperation(e.to_string()))?;

    let executable = op
        .executable
        .as_deref()
        .map(|executable| ctx.values.resolve(executable))
        .unwrap_or_else(|| compiler.executable().to_string());
    let out_dir = op.out_dir.as_deref().map(|dir| ctx.resolve_path(dir));
    let extra: Vec<String> = op.arguments.iter().map(|arg| ctx.values.resolve(arg)).collect();
    let config = ExecutionConfig::new()
        .with_working_directory(&ctx.workspace_root)
        .with_cancellation(ctx.cancellation.clone());

    if let Some(dir) = &out_dir {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| OperationError::InvalidOperation(format!("{}: {}", dir.display(), e)))?;
    }

    let total = inputs.len();
    let mut failed = 0;
    for input in &inputs {
        ctx.check_cancelled()?;
        let output = compiler.output_path(input, out_dir.as_deref());
        let mut args = compiler.arguments(input, &output);
        args.extend(extra.iter().cloned());

        debug!("Compiling {} -> {}", input.display(), output.display());
        match CommandExecutor::execute_checked(&executable, &args, &config).await {
            Ok(_) => {}
            Err(CommandExecutorError::Cancelled) => {
                return Err(OperationError::Cancelled)
            }
            Err(e) => {
                warn!("Compiling {} failed: {}", input.display(), e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        return Err(OperationError::CompileFailed {
            failed,
            total,
            all_failed: failed == total,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::value_resolver::ValueResolver;
    use tokio_util::sync::CancellationToken;

    fn operation(compiler: &str, executable: Option<&str>) -> CompileOperation {
        CompileOperation {
            compiler: compiler.to_string(),
            files: Vec::new(),
            exclude: Vec::new(),
            executable: executable.map(str::to_string),
            out_dir: None,
            arguments: Vec::new(),
        }
    }

    #[test]
    fn test_compiler_names_and_outputs() {
        assert_eq!(Compiler::from_name("LESS"), Some(Compiler::Less));
        assert_eq!(Compiler::from_name("typescript"), Some(Compiler::TypeScript));
        assert_eq!(Compiler::from_name("coffee"), None);

        let input = Path::new("/ws/js/app.js");
        assert_eq!(
            Compiler::UglifyJs.output_path(input, None),
            PathBuf::from("/ws/js/app.min.js")
        );
        assert_eq!(
            Compiler::Less.output_path(Path::new("/ws/site.less"), Some(Path::new("/out"))),
            PathBuf::from("/out/site.css")
        );
        assert_eq!(
            Compiler::TypeScript.arguments(Path::new("a.ts"), Path::new("a.js")),
            vec!["a.ts", "--outFile", "a.js"]
        );
    }

    #[tokio::test]
    async fn test_unknown_compiler() {
        let ctx = OperationContext::new(CancellationToken::new(), ValueResolver::default(), "/ws");
        let result = run(&operation("coffee", None), &ctx).await;
        assert!(matches!(result, Err(OperationError::UnknownCompiler(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failures_are_counted() {
        let ws = tempfile::TempDir::new().unwrap();
        std::fs::write(ws.path().join("a.less"), "a {}").unwrap();
        std::fs::write(ws.path().join("b.less"), "b {}").unwrap();
        let ctx = OperationContext::new(CancellationToken::new(), ValueResolver::default(), ws.path());

        let result = run(&operation("less", Some("false")), &ctx).await;
        match result {
            Err(OperationError::CompileFailed { failed, total, all_failed }) => {
                assert_eq!((failed, total, all_failed), (2, 2, true));
            }
            other => panic!("unexpected {:?}", other),
        }

        assert!(run(&operation("less", Some("true")), &ctx).await.is_ok());
    }
}
