use super::{OperationContext, OperationError};
use crate::domain::entities::HttpOperation;
use reqwest::{Client, Method};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Send the request and classify the answer
pub async fn run(op: &HttpOperation, ctx: &OperationContext) -> Result<(), OperationError> {
    let values = &ctx.values;
    let url = values.resolve(&op.url);
    let method = Method::from_str(&op.method.trim().to_uppercase())
        .map_err(|e| OperationError::InvalidOperation(format!("HTTP method '{}': {}", op.method, e)))?;

    let mut builder = Client::builder();
    if let Some(timeout) = op.timeout {
        builder = builder.timeout(Duration::from_millis(timeout));
    }
    let client = builder
        .build()
        .map_err(|e| OperationError::Request(e.to_string()))?;

    let mut request = client.request(method.clone(), &url);
    for (name, value) in &op.headers {
        request = request.header(name, values.resolve(value));
    }
    if let Some(body) = &op.body {
        request = request.body(values.resolve(body));
    }
    if let Some(username) = &op.username {
        request = request.basic_auth(
            values.resolve(username),
            op.password.as_deref().map(|password| values.resolve(password)),
        );
    }

    debug!("{} {}", method, url);
    let response = tokio::select! {
        response = request.send() => response.map_err(|e| OperationError::Request(e.to_string()))?,
        _ = ctx.cancellation.cancelled() => return Err(OperationError::Cancelled),
    };

    classify(url, response.status())
}

fn classify(url: String, status: reqwest::StatusCode) -> Result<(), OperationError> {
    if status.is_success() {
        Ok(())
    } else if status.is_client_error() {
        Err(OperationError::ClientError { url, status })
    } else if status.is_server_error() {
        Err(OperationError::ServerError { url, status })
    } else {
        Err(OperationError::UnexpectedStatus { url, status })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::value_resolver::ValueResolver;
    use crate::domain::entities::Value;
    use std::collections::BTreeMap;
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn operation(url: String) -> HttpOperation {
        HttpOperation {
            url,
            method: "post".to_string(),
            headers: BTreeMap::from([("X-Env".to_string(), "${env}".to_string())]),
            body: Some("deployed ${env}".to_string()),
            username: None,
            password: None,
            timeout: None,
        }
    }

    fn context() -> OperationContext {
        OperationContext::new(
            CancellationToken::new(),
            ValueResolver::new(vec![Value::text("env", "prod")]),
            "/ws",
        )
    }

    #[tokio::test]
    async fn test_success_with_resolved_placeholders() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("x-env", "prod"))
            .and(body_string("deployed prod"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let op = operation(format!("{}/hook", server.uri()));
        run(&op, &context()).await.unwrap();
    }

    #[tokio::test]
    async fn test_status_classes() {
        let server = MockServer::start().await;
        Mock::given(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(path("/broken"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let missing = run(&operation(format!("{}/missing", server.uri())), &context()).await;
        assert!(matches!(missing, Err(OperationError::ClientError { status, .. }) if status.as_u16() == 404));

        let broken = run(&operation(format!("{}/broken", server.uri())), &context()).await;
        assert!(matches!(broken, Err(OperationError::ServerError { .. })));
    }

    #[test]
    fn test_redirect_is_unexpected() {
        let result = classify("http://x".to_string(), reqwest::StatusCode::MOVED_PERMANENTLY);
        assert!(matches!(result, Err(OperationError::UnexpectedStatus { .. })));
    }
}
