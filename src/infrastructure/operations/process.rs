use super::{OperationContext, OperationError};
use crate::domain::entities::{OpenOperation, WebDeployOperation};
use crate::infrastructure::process::{CommandExecutor, ExecutionConfig};
use tracing::{debug, info};

const MSDEPLOY: &str = "msdeploy";

fn execution_config(ctx: &OperationContext, cwd: Option<&str>) -> ExecutionConfig {
    let cwd = cwd
        .map(|cwd| ctx.resolve_path(cwd))
        .unwrap_or_else(|| ctx.workspace_root.clone());
    ExecutionConfig::new()
        .with_working_directory(cwd)
        .with_cancellation(ctx.cancellation.clone())
}

/// Start a program, waiting for it only when asked to
pub async fn open(op: &OpenOperation, ctx: &OperationContext) -> Result<(), OperationError> {
    let program = ctx.values.resolve(&op.target);
    let args: Vec<String> = op.arguments.iter().map(|arg| ctx.values.resolve(arg)).collect();
    let config = execution_config(ctx, op.cwd.as_deref());

    if op.wait {
        CommandExecutor::execute_checked(&program, &args, &config).await?;
    } else {
        let pid = CommandExecutor::spawn_detached(&program, &args, &config)?;
        debug!("Started '{}' as process {}", program, pid);
    }
    Ok(())
}

/// Run `msdeploy -verb:<verb> -source:<source> -dest:<dest> ...`
pub async fn web_deploy(op: &WebDeployOperation, ctx: &OperationContext) -> Result<(), OperationError> {
    let program = op
        .executable
        .as_deref()
        .map(|executable| ctx.values.resolve(executable))
        .unwrap_or_else(|| MSDEPLOY.to_string());
    let args = web_deploy_arguments(op, ctx);

    info!("Running {} -verb:{}", program, op.verb);
    CommandExecutor::execute_checked(&program, &args, &execution_config(ctx, None)).await?;
    Ok(())
}

fn web_deploy_arguments(op: &WebDeployOperation, ctx: &OperationContext) -> Vec<String> {
    let mut args = vec![format!("-verb:{}", ctx.values.resolve(&op.verb))];
    if let Some(source) = &op.source {
        args.push(format!("-source:{}", ctx.values.resolve(source)));
    }
    if let Some(dest) = &op.dest {
        args.push(format!("-dest:{}", ctx.values.resolve(dest)));
    }
    args.extend(op.arguments.iter().map(|arg| ctx.values.resolve(arg)));
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::value_resolver::ValueResolver;
    use crate::domain::entities::Value;
    use tokio_util::sync::CancellationToken;

    fn context(root: &std::path::Path) -> OperationContext {
        OperationContext::new(
            CancellationToken::new(),
            ValueResolver::new(vec![Value::text("site", "Default Web Site")]),
            root,
        )
    }

    #[test]
    fn test_web_deploy_arguments() {
        let op = WebDeployOperation {
            executable: None,
            verb: "sync".to_string(),
            source: Some("contentPath=C:\\build".to_string()),
            dest: Some("iisApp='${site}'".to_string()),
            arguments: vec!["-allowUntrusted".to_string()],
        };
        assert_eq!(
            web_deploy_arguments(&op, &context(std::path::Path::new("/ws"))),
            vec![
                "-verb:sync",
                "-source:contentPath=C:\\build",
                "-dest:iisApp='Default Web Site'",
                "-allowUntrusted"
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_open_and_wait() {
        let ws = tempfile::TempDir::new().unwrap();
        let op = OpenOperation {
            target: "sh".to_string(),
            arguments: vec!["-c".to_string(), "echo ${site} > opened.txt".to_string()],
            wait: true,
            cwd: None,
        };
        open(&op, &context(ws.path())).await.unwrap();
        let written = std::fs::read_to_string(ws.path().join("opened.txt")).unwrap();
        assert_eq!(written.trim(), "Default Web Site");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_waiting_for_failing_program() {
        let ws = tempfile::TempDir::new().unwrap();
        let op = OpenOperation {
            target: "false".to_string(),
            wait: true,
            ..OpenOperation::default()
        };
        let result = open(&op, &context(ws.path())).await;
        assert!(matches!(result, Err(OperationError::Command(_))));
    }
}
