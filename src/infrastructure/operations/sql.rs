use super::{OperationContext, OperationError};
use crate::domain::entities::SqlOperation;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::Connection;
use std::str::FromStr;
use tiberius::{AuthMethod, Client as MssqlClient, Config as MssqlConfig};
use tokio::net::TcpStream;
use tokio_util::compat::TokioAsyncWriteCompatExt;
use tracing::{debug, warn};

/// Run the statements in order on one connection
///
/// The connection is closed after the last statement or the first failure.
/// Result rows are discarded.
pub async fn run(op: &SqlOperation, ctx: &OperationContext) -> Result<(), OperationError> {
    let queries: Vec<String> = op.queries.iter().map(|query| ctx.values.resolve(query)).collect();
    if queries.is_empty() {
        debug!("No SQL statements to run");
        return Ok(());
    }

    let work = async {
        match op.engine.trim().to_lowercase().as_str() {
            "mysql" | "mariadb" => run_mysql(op, ctx, &queries).await,
            "mssql" | "sqlserver" => run_mssql(op, ctx, &queries).await,
            "sqlite" => run_sqlite(op, ctx, &queries).await,
            other => Err(OperationError::UnsupportedEngine(other.to_string())),
        }
    };

    tokio::select! {
        result = work => result,
        _ = ctx.cancellation.cancelled() => Err(OperationError::Cancelled),
    }
}

fn sql_error(error: sqlx::Error) -> OperationError {
    OperationError::Sql(error.to_string())
}

fn mysql_options(op: &SqlOperation, ctx: &OperationContext) -> Result<MySqlConnectOptions, OperationError> {
    let values = &ctx.values;
    if let Some(url) = &op.url {
        return MySqlConnectOptions::from_str(&values.resolve(url)).map_err(sql_error);
    }

    let mut options = MySqlConnectOptions::new()
        .host(&values.resolve(op.host.as_deref().unwrap_or("localhost")))
        .port(op.port.unwrap_or(3306));
    if let Some(user) = &op.user {
        options = options.username(&values.resolve(user));
    }
    if let Some(password) = &op.password {
        options = options.password(&values.resolve(password));
    }
    if let Some(database) = &op.database {
        options = options.database(&values.resolve(database));
    }
    Ok(options)
}

fn mssql_error(error: tiberius::error::Error) -> OperationError {
    OperationError::Sql(error.to_string())
}

/// `url` is an ADO.NET connection string
fn mssql_config(op: &SqlOperation, ctx: &OperationContext) -> Result<MssqlConfig, OperationError> {
    let values = &ctx.values;
    if let Some(url) = &op.url {
        return MssqlConfig::from_ado_string(&values.resolve(url)).map_err(mssql_error);
    }

    let mut config = MssqlConfig::new();
    config.host(values.resolve(op.host.as_deref().unwrap_or("localhost")));
    config.port(op.port.unwrap_or(1433));
    if let Some(user) = &op.user {
        let password = op
            .password
            .as_deref()
            .map(|password| values.resolve(password))
            .unwrap_or_default();
        config.authentication(AuthMethod::sql_server(values.resolve(user), password));
    }
    if let Some(database) = &op.database {
        config.database(values.resolve(database));
    }
    Ok(config)
}

fn sqlite_options(op: &SqlOperation, ctx: &OperationContext) -> Result<SqliteConnectOptions, OperationError> {
    if let Some(url) = &op.url {
        return SqliteConnectOptions::from_str(&ctx.values.resolve(url)).map_err(sql_error);
    }

    let database = op
        .database
        .as_deref()
        .ok_or_else(|| OperationError::InvalidOperation("sqlite needs 'url' or 'database'".to_string()))?;
    Ok(SqliteConnectOptions::new()
        .filename(ctx.resolve_path(database))
        .create_if_missing(true))
}

async fn run_mysql(op: &SqlOperation, ctx: &OperationContext, queries: &[String]) -> Result<(), OperationError> {
    let mut connection = MySqlConnection::connect_with(&mysql_options(op, ctx)?)
        .await
        .map_err(sql_error)?;

    let mut result = Ok(());
    for query in queries {
        debug!("SQL: {}", query);
        if let Err(e) = sqlx::raw_sql(query).execute(&mut connection).await {
            result = Err(sql_error(e));
            break;
        }
    }

    if let Err(e) = connection.close().await {
        warn!("Closing MySQL connection failed: {}", e);
    }
    result
}

async fn run_mssql(op: &SqlOperation, ctx: &OperationContext, queries: &[String]) -> Result<(), OperationError> {
    let config = mssql_config(op, ctx)?;
    let address = config.get_addr();
    let tcp = TcpStream::connect(&address)
        .await
        .map_err(|e| OperationError::Sql(format!("Cannot connect to {}: {}", address, e)))?;
    tcp.set_nodelay(true)
        .map_err(|e| OperationError::Sql(e.to_string()))?;
    let mut client = MssqlClient::connect(config, tcp.compat_write())
        .await
        .map_err(mssql_error)?;

    let mut result = Ok(());
    for query in queries {
        debug!("SQL: {}", query);
        let outcome = match client.simple_query(query.as_str()).await {
            Ok(stream) => stream.into_results().await.map(drop),
            Err(e) => Err(e),
        };
        if let Err(e) = outcome {
            result = Err(mssql_error(e));
            break;
        }
    }

    if let Err(e) = client.close().await {
        warn!("Closing MS-SQL connection failed: {}", e);
    }
    result
}

async fn run_sqlite(op: &SqlOperation, ctx: &OperationContext, queries: &[String]) -> Result<(), OperationError> {
    let mut connection = SqliteConnection::connect_with(&sqlite_options(op, ctx)?)
        .await
        .map_err(sql_error)?;

    let mut result = Ok(());
    for query in queries {
        debug!("SQL: {}", query);
        if let Err(e) = sqlx::raw_sql(query).execute(&mut connection).await {
            result = Err(sql_error(e));
            break;
        }
    }

    if let Err(e) = connection.close().await {
        warn!("Closing SQLite connection failed: {}", e);
    }
    result
}
