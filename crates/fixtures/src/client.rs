//! Authenticated HTTP client for the backend under test

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::auth::{AuthSessionStore, LoginFailure};
use crate::config::{CredentialsConfig, FixtureConfig};
use crate::error::{FixtureError, FixtureResult};
use crate::model::{EntityKind, FixtureEntity, Listing, Role};

/// Optional parts of a request
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Attach a bearer token for this role
    pub role: Option<Role>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn header(mut self, key: &str, value: impl Into<String>) -> Self {
        self.headers.push((key.to_string(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// A completed exchange. Non-2xx statuses are data, not errors.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
    pub text: String,
}

impl ApiResponse {
    fn new(status: u16, text: String) -> Self {
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or_else(|_| Value::String(text.clone()))
        };
        Self { status, body, text }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == StatusCode::NOT_FOUND.as_u16()
    }

    pub fn is_conflict(&self) -> bool {
        self.status == StatusCode::CONFLICT.as_u16()
    }

    pub fn json<T: DeserializeOwned>(&self) -> FixtureResult<T> {
        Ok(serde_json::from_value(self.body.clone())?)
    }

    pub fn rejection(&self) -> FixtureError {
        FixtureError::BackendRejection {
            status: self.status,
            body: self.text.clone(),
        }
    }

    /// `Ok(self)` for 2xx, `BackendRejection` otherwise.
    pub fn ensure_success(self) -> FixtureResult<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(self.rejection())
        }
    }
}

#[derive(Deserialize)]
struct LoginResponse {
    #[serde(default)]
    token: Option<String>,
}

/// Thin request wrapper with bounded retry and per-role auth
#[derive(Clone)]
pub struct FixtureClient {
    http: reqwest::Client,
    base_url: String,
    max_retries: u32,
    backoff: Duration,
    credentials: CredentialsConfig,
    sessions: Arc<AuthSessionStore>,
}

impl FixtureClient {
    pub fn new(config: &FixtureConfig, sessions: Arc<AuthSessionStore>) -> FixtureResult<Self> {
        url::Url::parse(&config.api.base_url)?;
        let http = reqwest::Client::builder()
            .timeout(config.api.request_timeout())
            .build()?;

        Ok(Self {
            http,
            base_url: config.api.base_url.trim_end_matches('/').to_string(),
            max_retries: config.api.max_retries,
            backoff: config.api.retry_backoff(),
            credentials: config.credentials.clone(),
            sessions,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn sessions(&self) -> &Arc<AuthSessionStore> {
        &self.sessions
    }

    fn url(&self, path: &str) -> FixtureResult<url::Url> {
        let path = path.trim_start_matches('/');
        Ok(url::Url::parse(&format!("{}/{}", self.base_url, path))?)
    }

    /// Send a request, retrying network failures and 5xx up to the configured bound.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> FixtureResult<ApiResponse> {
        let token = match options.role {
            Some(role) => Some(self.token(role).await?),
            None => None,
        };
        self.execute(method, path, &options, token.as_deref()).await
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        options: &RequestOptions,
        token: Option<&str>,
    ) -> FixtureResult<ApiResponse> {
        let url = self.url(path)?;

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;

            let mut request = self.http.request(method.clone(), url.clone());
            if !options.query.is_empty() {
                request = request.query(&options.query);
            }
            for (key, value) in &options.headers {
                request = request.header(key.as_str(), value.as_str());
            }
            if let Some(token) = token {
                request = request.bearer_auth(token);
            }
            if let Some(body) = &options.body {
                request = request.json(body);
            }

            // A body that breaks off mid-read is as transient as a failed send.
            let outcome = match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_server_error() && attempt <= self.max_retries {
                        warn!(%method, path, status = status.as_u16(), attempt, "server error, retrying");
                        sleep(self.backoff).await;
                        continue;
                    }
                    response.text().await.map(|text| (status, text))
                }
                Err(e) => Err(e),
            };

            match outcome {
                Ok((status, text)) => {
                    debug!(%method, path, status = status.as_u16(), attempt, "request complete");
                    return Ok(ApiResponse::new(status.as_u16(), text));
                }
                Err(e) if e.is_builder() => return Err(FixtureError::Http(e)),
                Err(e) => {
                    if attempt <= self.max_retries {
                        warn!(%method, path, attempt, "request failed, retrying: {}", e);
                        sleep(self.backoff).await;
                        continue;
                    }
                    return Err(FixtureError::TransientInfra {
                        attempts: attempt,
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    async fn login_flight(self, role: Role) -> Result<String, LoginFailure> {
        let creds = self.credentials.for_role(role);
        let body = serde_json::json!({
            "username": creds.username,
            "password": creds.password,
        });

        let options = RequestOptions::new().json(body);
        let response = self
            .execute(Method::POST, "/auth/login", &options, None)
            .await
            .map_err(|e| LoginFailure {
                status: None,
                message: e.to_string(),
            })?;

        if !response.is_success() {
            return Err(LoginFailure {
                status: Some(response.status),
                message: response.text,
            });
        }

        response
            .json::<LoginResponse>()
            .ok()
            .and_then(|r| r.token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| LoginFailure {
                status: Some(response.status),
                message: "login response carried no token".to_string(),
            })
    }

    /// Log in directly, bypassing the session cache.
    pub async fn login(&self, role: Role) -> FixtureResult<String> {
        self.clone()
            .login_flight(role)
            .await
            .map_err(|failure| FixtureError::Login {
                role,
                status: failure.status,
                message: failure.message,
            })
    }

    /// Cached token for `role`, logging in at most once per role across concurrent callers.
    pub async fn token(&self, role: Role) -> FixtureResult<String> {
        let client = self.clone();
        self.sessions
            .token_with(role, move || client.login_flight(role))
            .await
    }

    pub async fn get(&self, role: Role, path: &str, query: &[(&str, String)]) -> FixtureResult<ApiResponse> {
        let mut options = RequestOptions::new().as_role(role);
        for (key, value) in query {
            options = options.query(key, value);
        }
        self.request(Method::GET, path, options).await
    }

    pub async fn post_json(&self, role: Role, path: &str, body: Value) -> FixtureResult<ApiResponse> {
        self.request(Method::POST, path, RequestOptions::new().as_role(role).json(body))
            .await
    }

    pub async fn delete(&self, role: Role, path: &str) -> FixtureResult<ApiResponse> {
        self.request(Method::DELETE, path, RequestOptions::new().as_role(role))
            .await
    }

    /// Read a list endpoint, whichever shape it answers with.
    pub async fn list<T: DeserializeOwned>(
        &self,
        role: Role,
        path: &str,
        query: &[(&str, String)],
    ) -> FixtureResult<Vec<T>> {
        let response = self.get(role, path, query).await?.ensure_success()?;
        Listing::items_from_value(response.body)
    }

    /// First page (of `page_size` items) of one kind, decoded into entities.
    pub async fn list_entities(
        &self,
        role: Role,
        kind: EntityKind,
        page_size: u32,
    ) -> FixtureResult<Vec<FixtureEntity>> {
        let query = [("page", "0".to_string()), ("size", page_size.to_string())];
        let raw: Vec<Value> = self.list(role, kind.listing_path(), &query).await?;

        let mut entities = Vec::with_capacity(raw.len());
        for value in raw {
            match kind.decode(value) {
                Ok(entity) => entities.push(entity),
                Err(e) => debug!(%kind, "skipping undecodable record: {}", e),
            }
        }
        Ok(entities)
    }

    /// Whether the service answers at all. 401/403 still mean "up".
    pub async fn health(&self) -> FixtureResult<bool> {
        let response = self
            .request(Method::GET, "/health", RequestOptions::new())
            .await?;
        Ok(matches!(response.status, 200 | 401 | 403))
    }
}

impl std::fmt::Debug for FixtureClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixtureClient")
            .field("base_url", &self.base_url)
            .field("max_retries", &self.max_retries)
            .field("backoff", &self.backoff)
            .finish()
    }
}
