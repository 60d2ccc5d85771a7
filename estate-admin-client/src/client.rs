use estate_admin_core::{CredentialStore, MemoryStore, Session};
use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::interceptor::{AuthInterceptor, AuthOutcome};
use crate::notify::{AuthEvent, AuthNotifier};
use crate::refresh::{HttpRefresher, TokenRefresher};
use crate::request::ApiRequest;
use crate::types::{ApiError, Result, TokenResponse};

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// Client for the estate admin REST backend.
///
/// Every request passes through an [`AuthInterceptor`] that attaches the
/// stored bearer token, refreshing it first when it has expired.
///
/// # Example
///
/// ```no_run
/// use estate_admin_client::{ApiClient, ClientConfig};
///
/// #[tokio::main]
/// async fn main() -> estate_admin_client::Result<()> {
///     let client = ApiClient::builder(ClientConfig::with_base_url("https://admin.example.com/api"))
///         .build()?;
///
///     client.login("admin@example.com", "hunter2").await?;
///
///     let listings: Option<serde_json::Value> = client.get("/listings").await;
///     println!("{:?}", listings);
///     Ok(())
/// }
/// ```
pub struct ApiClient {
    http: reqwest::Client,
    interceptor: AuthInterceptor,
    notifier: AuthNotifier,
    store: Arc<dyn CredentialStore>,
    config: ClientConfig,
}

/// Builder for [`ApiClient`].
pub struct ApiClientBuilder {
    config: ClientConfig,
    store: Option<Arc<dyn CredentialStore>>,
    refresher: Option<Arc<dyn TokenRefresher>>,
    http: Option<reqwest::Client>,
}

impl ApiClientBuilder {
    /// Use `store` for credentials. Defaults to an in-memory store.
    pub fn store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replace the HTTP refresher, e.g. with a test double.
    pub fn refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    /// Use a preconfigured `reqwest::Client`.
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    pub fn build(self) -> Result<ApiClient> {
        self.config.validate()?;

        let http = match self.http {
            Some(http) => http,
            None => reqwest::Client::builder()
                .user_agent(self.config.user_agent.clone())
                .build()?,
        };

        let store: Arc<dyn CredentialStore> = match self.store {
            Some(store) => store,
            None => Arc::new(MemoryStore::new()),
        };

        let refresher: Arc<dyn TokenRefresher> = match self.refresher {
            Some(refresher) => refresher,
            None => Arc::new(HttpRefresher::from_config(http.clone(), &self.config)?),
        };

        let notifier = AuthNotifier::default();
        let interceptor =
            AuthInterceptor::from_config(&self.config, store.clone(), refresher, notifier.clone())?;

        Ok(ApiClient {
            http,
            interceptor,
            notifier,
            store,
            config: self.config,
        })
    }
}

impl ApiClient {
    pub fn builder(config: ClientConfig) -> ApiClientBuilder {
        ApiClientBuilder {
            config,
            store: None,
            refresher: None,
            http: None,
        }
    }

    /// Create a client with an in-memory credential store.
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Observe [`AuthEvent`]s such as forced logouts.
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.notifier.subscribe()
    }

    /// Summary of the stored credentials. No network access.
    pub fn session(&self) -> Option<Session> {
        self.store.get().map(|pair| Session::from_pair(&pair))
    }

    /// Authorize and dispatch a request, returning the raw response.
    pub async fn send(&self, request: ApiRequest) -> Result<reqwest::Response> {
        self.send_with_outcome(request).await.map(|(_, response)| response)
    }

    /// Like [`send`](Self::send), also reporting how the request was authorized.
    pub async fn send_with_outcome(
        &self,
        mut request: ApiRequest,
    ) -> Result<(AuthOutcome, reqwest::Response)> {
        let outcome = self.interceptor.intercept(&mut request).await;

        let url = match request.url() {
            Some(url) => url?,
            None => crate::request::resolve_url(&self.config.api_base()?, &request.path)?,
        };
        debug!(method = %request.method, %url, ?outcome, "Dispatching request");

        let ApiRequest {
            method,
            query,
            headers,
            body,
            timeout,
            ..
        } = request;

        let mut builder = self.http.request(method, url).headers(headers);
        if !query.is_empty() {
            builder = builder.query(&query);
        }
        if let Some(body) = &body {
            builder = builder.json(body);
        }
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await?;
        Ok((outcome, response))
    }

    /// Dispatch a request and decode a JSON success response.
    ///
    /// Non-success statuses become [`ApiError::Status`]. An empty body
    /// decodes as JSON `null`, so `()` and `Option<T>` work for 204 responses.
    pub async fn try_request<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        let response = self.send(request).await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status { status, body });
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() || status == StatusCode::NO_CONTENT {
            return serde_json::from_value(serde_json::Value::Null).map_err(ApiError::Decode);
        }
        serde_json::from_slice(&bytes).map_err(ApiError::Decode)
    }

    /// Dispatch a request, logging failures and returning `None` instead.
    pub async fn request<T: DeserializeOwned>(&self, request: ApiRequest) -> Option<T> {
        let method = request.method.clone();
        let path = request.path.clone();

        match self.try_request(request).await {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(%method, %path, "API request failed: {}", e);
                None
            }
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Option<T> {
        self.request(ApiRequest::get(path)).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Option<T> {
        self.request(with_body(ApiRequest::post(path), body)?).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Option<T> {
        self.request(with_body(ApiRequest::put(path), body)?).await
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Option<T> {
        self.request(with_body(ApiRequest::patch(path), body)?).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Option<T> {
        self.request(ApiRequest::delete(path)).await
    }

    /// Exchange email and password for a credential pair and store it.
    pub async fn login(&self, email: &str, password: &str) -> Result<Session> {
        let request = ApiRequest::post(self.config.login_path.as_str())
            .skip_auth()
            .try_json(&LoginRequest { email, password })
            .map_err(ApiError::Body)?;

        let pair = self.try_request::<TokenResponse>(request).await?.into_pair();
        self.store.replace(&pair);

        let session = Session::from_pair(&pair);
        info!(subject = ?session.subject, "Logged in");
        Ok(session)
    }

    /// Tell the backend the session is over, then drop local credentials.
    ///
    /// The backend call is best-effort and never refreshes an expired token;
    /// local credentials are always cleared.
    pub async fn logout(&self) {
        if self.store.get().is_some() {
            let request = ApiRequest::post(self.config.logout_path.as_str()).no_refresh();
            match self.send(request).await {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => debug!("Logout endpoint returned {}", response.status()),
                Err(e) => debug!("Logout request failed: {}", e),
            }
        }

        self.store.clear();
        info!("Logged out");
    }

    /// The authenticated admin's profile.
    pub async fn profile(&self) -> Result<serde_json::Value> {
        self.try_request(ApiRequest::get(self.config.profile_path.as_str()))
            .await
    }
}

fn with_body<B: Serialize + ?Sized>(request: ApiRequest, body: &B) -> Option<ApiRequest> {
    match request.try_json(body) {
        Ok(request) => Some(request),
        Err(e) => {
            warn!("Could not serialize request body: {}", e);
            None
        }
    }
}
