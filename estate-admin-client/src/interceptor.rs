//! Request authorization.
//!
//! [`AuthInterceptor`] runs before every outgoing request:
//!
//! 1. Requests marked skip-auth pass through untouched.
//! 2. The access token is read from the credential store.
//! 3. If its `exp` claim is in the past, a refresh is attempted. With no
//!    usable refresh token, or when the refresh fails, the store is cleared,
//!    an [`AuthEvent::Unauthorized`] is broadcast, and the request goes out
//!    unauthenticated so the backend answers 401.
//! 4. With a token in hand, `Authorization: Bearer <token>` and the identity
//!    header (the token's `sub` claim) are attached.
//! 5. Default base URL and timeout fill in whatever the caller left unset.
//!
//! Requests marked no-refresh stop at step 3: an expired token is left
//! alone, nothing is broadcast, and the request goes out unauthenticated.
//!
//! # Single-flight refresh
//!
//! Concurrent requests that all find the access token expired share one
//! refresh. The first caller installs the refresh future in a slot; later
//! callers await the same future; the slot is emptied once it resolves. The
//! store is written once and, on failure, exactly one event is broadcast.

use chrono::{Duration as ChronoDuration, Utc};
use estate_admin_core::{CredentialStore, Secret, is_token_expired, token_subject};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use reqwest::header::{AUTHORIZATION, HeaderName, HeaderValue};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{ClientConfig, DEFAULT_TIMEOUT_SECS};
use crate::notify::{AuthEvent, AuthNotifier, UnauthorizedReason};
use crate::refresh::TokenRefresher;
use crate::request::ApiRequest;
use crate::types::ApiError;

/// Default header carrying the admin identifier.
pub const IDENTITY_HEADER: &str = "x-admin-id";

type RefreshFuture = Shared<BoxFuture<'static, Option<Secret>>>;

/// Terminal authorization state of a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    /// The request was marked skip-auth.
    Skipped,

    /// A bearer token was attached.
    Authorized {
        /// Whether the token came from a refresh during this request.
        refreshed: bool,
    },

    /// No token was attached; the backend is expected to reject the request.
    Unauthenticated,
}

enum Ticket {
    /// The store already settled the question while we waited for the slot.
    Settled(Option<Secret>),

    Flight(RefreshFuture),
}

pub struct AuthInterceptor {
    store: Arc<dyn CredentialStore>,
    refresher: Arc<dyn TokenRefresher>,
    notifier: AuthNotifier,
    identity_header: HeaderName,
    default_base_url: Url,
    default_timeout: Duration,
    expiry_leeway: ChronoDuration,
    in_flight: Mutex<Option<RefreshFuture>>,
}

impl AuthInterceptor {
    /// Create an interceptor with the default identity header, a 30 second
    /// timeout, and no expiry leeway.
    pub fn new(
        store: Arc<dyn CredentialStore>,
        refresher: Arc<dyn TokenRefresher>,
        notifier: AuthNotifier,
        default_base_url: Url,
    ) -> Self {
        Self {
            store,
            refresher,
            notifier,
            identity_header: HeaderName::from_static(IDENTITY_HEADER),
            default_base_url,
            default_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            expiry_leeway: ChronoDuration::zero(),
            in_flight: Mutex::new(None),
        }
    }

    /// Create an interceptor configured from `config`.
    pub fn from_config(
        config: &ClientConfig,
        store: Arc<dyn CredentialStore>,
        refresher: Arc<dyn TokenRefresher>,
        notifier: AuthNotifier,
    ) -> Result<Self, ApiError> {
        let identity_header =
            HeaderName::from_bytes(config.identity_header.as_bytes()).map_err(|e| {
                crate::config::ConfigError::InvalidValue {
                    key: "identity_header".to_string(),
                    message: format!("{}", e),
                }
            })?;

        Ok(Self::new(store, refresher, notifier, config.api_base()?)
            .with_identity_header(identity_header)
            .with_timeout(config.timeout())
            .with_expiry_leeway(config.expiry_leeway()))
    }

    pub fn with_identity_header(mut self, header: HeaderName) -> Self {
        self.identity_header = header;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Treat access tokens expiring within `leeway` as already expired.
    pub fn with_expiry_leeway(mut self, leeway: ChronoDuration) -> Self {
        self.expiry_leeway = leeway;
        self
    }

    /// Authorize `request` in place.
    pub async fn intercept(&self, request: &mut ApiRequest) -> AuthOutcome {
        self.apply_defaults(request);

        if request.skip_auth {
            debug!(path = %request.path, "Skipping authorization");
            return AuthOutcome::Skipped;
        }

        let Some(access_token) = self.store.get().map(|pair| pair.access_token) else {
            debug!(path = %request.path, "No access token, sending unauthenticated");
            return AuthOutcome::Unauthenticated;
        };

        let (token, refreshed) = if self.is_expired(&access_token) {
            if request.no_refresh {
                debug!(path = %request.path, "Access token expired, refresh not allowed");
                return AuthOutcome::Unauthenticated;
            }
            debug!(path = %request.path, "Access token expired");
            match self.refresh(&access_token).await {
                Some(token) => (token, true),
                None => return AuthOutcome::Unauthenticated,
            }
        } else {
            (access_token, false)
        };

        self.attach(request, &token);
        AuthOutcome::Authorized { refreshed }
    }

    fn apply_defaults(&self, request: &mut ApiRequest) {
        if request.base_url.is_none() {
            request.base_url = Some(self.default_base_url.clone());
        }
        if request.timeout.is_none() {
            request.timeout = Some(self.default_timeout);
        }
    }

    fn is_expired(&self, token: &Secret) -> bool {
        is_token_expired(token.expose(), Utc::now(), self.expiry_leeway)
    }

    fn attach(&self, request: &mut ApiRequest, token: &Secret) {
        match HeaderValue::from_str(&format!("Bearer {}", token.expose())) {
            Ok(mut value) => {
                value.set_sensitive(true);
                request.headers.insert(AUTHORIZATION, value);
            }
            Err(_) => warn!("Access token is not a valid header value, not attaching it"),
        }

        match token_subject(token.expose()).map(|sub| HeaderValue::from_str(&sub)) {
            Some(Ok(value)) => {
                request.headers.insert(self.identity_header.clone(), value);
            }
            Some(Err(_)) => debug!("Token subject is not a valid header value"),
            None => {}
        }
    }

    async fn refresh(&self, expired: &Secret) -> Option<Secret> {
        let flight = match self.join_or_start(expired) {
            Ticket::Settled(token) => return token,
            Ticket::Flight(flight) => flight,
        };

        let token = flight.clone().await;
        self.finish(&flight);
        token
    }

    fn join_or_start(&self, expired: &Secret) -> Ticket {
        let mut slot = self.in_flight.lock();

        if let Some(flight) = slot.as_ref() {
            if flight.peek().is_none() {
                debug!("Joining in-flight token refresh");
                return Ticket::Flight(flight.clone());
            }
            *slot = None;
        }

        // A refresh may have completed between our store read and the lock.
        match self.store.get() {
            None => return Ticket::Settled(None),
            Some(pair) if pair.access_token != *expired && !self.is_expired(&pair.access_token) => {
                return Ticket::Settled(Some(pair.access_token));
            }
            Some(_) => {}
        }

        let flight = refresh_flow(
            Arc::clone(&self.store),
            Arc::clone(&self.refresher),
            self.notifier.clone(),
        )
        .boxed()
        .shared();
        *slot = Some(flight.clone());
        Ticket::Flight(flight)
    }

    fn finish(&self, flight: &RefreshFuture) {
        let mut slot = self.in_flight.lock();
        if slot.as_ref().is_some_and(|current| current.ptr_eq(flight)) {
            *slot = None;
        }
    }
}

/// Exchange the stored refresh token and persist the result.
///
/// Returns the new access token, or `None` after clearing the store and
/// broadcasting the reason.
async fn refresh_flow(
    store: Arc<dyn CredentialStore>,
    refresher: Arc<dyn TokenRefresher>,
    notifier: AuthNotifier,
) -> Option<Secret> {
    let refresh_token = match store.refresh_token() {
        None => {
            return revoke(store.as_ref(), &notifier, UnauthorizedReason::RefreshTokenMissing);
        }
        Some(token) if is_token_expired(token.expose(), Utc::now(), ChronoDuration::zero()) => {
            return revoke(store.as_ref(), &notifier, UnauthorizedReason::RefreshTokenExpired);
        }
        Some(token) => token,
    };

    match refresher.refresh(&refresh_token).await {
        Ok(pair) => {
            info!("Refreshed access token");
            store.set(&pair);
            Some(pair.access_token)
        }
        Err(e) => {
            warn!("Token refresh failed: {}", e);
            revoke(store.as_ref(), &notifier, UnauthorizedReason::RefreshFailed)
        }
    }
}

fn revoke(
    store: &dyn CredentialStore,
    notifier: &AuthNotifier,
    reason: UnauthorizedReason,
) -> Option<Secret> {
    warn!("Session ended ({}), clearing credentials", reason);
    store.clear();
    notifier.notify(AuthEvent::Unauthorized { reason });
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refresh::RefreshError;
    use async_trait::async_trait;
    use estate_admin_core::{CredentialPair, MemoryStore};
    use jsonwebtoken::{EncodingKey, Header, encode};
    use reqwest::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn jwt(sub: &str, exp_offset_secs: i64) -> String {
        encode(
            &Header::default(),
            &serde_json::json!({ "sub": sub, "exp": Utc::now().timestamp() + exp_offset_secs }),
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap()
    }

    /// Refresher returning a fixed outcome after a delay, counting calls.
    struct FakeRefresher {
        calls: AtomicUsize,
        result: Option<CredentialPair>,
        delay: Duration,
    }

    impl FakeRefresher {
        fn succeeding(pair: CredentialPair) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                result: Some(pair),
                delay: Duration::from_millis(50),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                result: None,
                delay: Duration::from_millis(50),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenRefresher for FakeRefresher {
        async fn refresh(&self, _refresh_token: &Secret) -> Result<CredentialPair, RefreshError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.result.clone().ok_or(RefreshError::Rejected {
                status: StatusCode::UNAUTHORIZED,
            })
        }
    }

    fn interceptor(
        store: Arc<MemoryStore>,
        refresher: Arc<FakeRefresher>,
    ) -> (AuthInterceptor, AuthNotifier) {
        let notifier = AuthNotifier::default();
        let interceptor = AuthInterceptor::new(
            store,
            refresher,
            notifier.clone(),
            Url::parse("http://localhost:3000/api").unwrap(),
        );
        (interceptor, notifier)
    }

    fn bearer(request: &ApiRequest) -> Option<&str> {
        request
            .headers
            .get(AUTHORIZATION)
            .map(|v| v.to_str().unwrap())
    }

    #[tokio::test]
    async fn test_skip_auth_attaches_nothing() {
        let store = Arc::new(MemoryStore::with_pair(CredentialPair::new(jwt("7", -10))));
        let refresher = FakeRefresher::failing();
        let (interceptor, _) = interceptor(store.clone(), refresher.clone());

        let mut request = ApiRequest::post("/auth/login").skip_auth();
        let outcome = interceptor.intercept(&mut request).await;

        assert_eq!(outcome, AuthOutcome::Skipped);
        assert!(request.headers.is_empty());
        assert_eq!(refresher.calls(), 0);
        assert!(store.get().is_some());
    }

    #[tokio::test]
    async fn test_defaults_applied() {
        let (interceptor, _) = interceptor(Arc::new(MemoryStore::new()), FakeRefresher::failing());

        let mut request = ApiRequest::get("/listings");
        interceptor.intercept(&mut request).await;
        assert_eq!(request.timeout, Some(Duration::from_secs(30)));
        assert_eq!(
            request.url().unwrap().unwrap().as_str(),
            "http://localhost:3000/api/listings"
        );

        let custom = Url::parse("http://other/api").unwrap();
        let mut request = ApiRequest::get("/x")
            .base_url(custom.clone())
            .timeout(Duration::from_secs(1));
        interceptor.intercept(&mut request).await;
        assert_eq!(request.base_url, Some(custom));
        assert_eq!(request.timeout, Some(Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn test_no_token_is_unauthenticated() {
        let refresher = FakeRefresher::failing();
        let (interceptor, notifier) = interceptor(Arc::new(MemoryStore::new()), refresher.clone());
        let mut events = notifier.subscribe();

        let mut request = ApiRequest::get("/users");
        let outcome = interceptor.intercept(&mut request).await;

        assert_eq!(outcome, AuthOutcome::Unauthenticated);
        assert!(bearer(&request).is_none());
        assert_eq!(refresher.calls(), 0);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_valid_token_attached_unchanged() {
        let token = jwt("42", 3600);
        let store = Arc::new(MemoryStore::with_pair(
            CredentialPair::new(token.clone()).with_refresh_token("r"),
        ));
        let refresher = FakeRefresher::failing();
        let (interceptor, _) = interceptor(store, refresher.clone());

        let mut request = ApiRequest::get("/listings");
        let outcome = interceptor.intercept(&mut request).await;

        assert_eq!(outcome, AuthOutcome::Authorized { refreshed: false });
        assert_eq!(bearer(&request), Some(format!("Bearer {}", token).as_str()));
        assert_eq!(request.headers.get("X-Admin-Id").unwrap(), "42");
        assert_eq!(refresher.calls(), 0);
    }

    #[tokio::test]
    async fn test_opaque_token_has_no_identity() {
        let store = Arc::new(MemoryStore::with_pair(CredentialPair::new("opaque")));
        let (interceptor, _) = interceptor(store, FakeRefresher::failing());

        let mut request = ApiRequest::get("/listings");
        let outcome = interceptor.intercept(&mut request).await;

        assert_eq!(outcome, AuthOutcome::Authorized { refreshed: false });
        assert_eq!(bearer(&request), Some("Bearer opaque"));
        assert!(request.headers.get("X-Admin-Id").is_none());
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed() {
        let new_token = jwt("42", 3600);
        let store = Arc::new(MemoryStore::with_pair(
            CredentialPair::new(jwt("42", -1)).with_refresh_token(jwt("42", 86400)),
        ));
        let refresher = FakeRefresher::succeeding(
            CredentialPair::new(new_token.clone()).with_refresh_token("rotated"),
        );
        let (interceptor, _) = interceptor(store.clone(), refresher.clone());

        let mut request = ApiRequest::get("/listings");
        let outcome = interceptor.intercept(&mut request).await;

        assert_eq!(outcome, AuthOutcome::Authorized { refreshed: true });
        assert_eq!(refresher.calls(), 1);
        assert_eq!(bearer(&request), Some(format!("Bearer {}", new_token).as_str()));

        let stored = store.get().unwrap();
        assert_eq!(stored.access_token.expose(), new_token);
        assert_eq!(stored.refresh_token.unwrap().expose(), "rotated");
    }

    #[tokio::test]
    async fn test_missing_refresh_token_clears_session() {
        let store = Arc::new(MemoryStore::with_pair(CredentialPair::new(jwt("42", -1))));
        let refresher = FakeRefresher::failing();
        let (interceptor, notifier) = interceptor(store.clone(), refresher.clone());
        let mut events = notifier.subscribe();

        let mut request = ApiRequest::get("/listings");
        let outcome = interceptor.intercept(&mut request).await;

        assert_eq!(outcome, AuthOutcome::Unauthenticated);
        assert!(bearer(&request).is_none());
        assert_eq!(refresher.calls(), 0);
        assert!(store.get().is_none());
        assert_eq!(
            events.try_recv().unwrap(),
            AuthEvent::Unauthorized {
                reason: UnauthorizedReason::RefreshTokenMissing
            }
        );
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_expired_refresh_token_clears_session() {
        let store = Arc::new(MemoryStore::with_pair(
            CredentialPair::new(jwt("42", -1)).with_refresh_token(jwt("42", -1)),
        ));
        let refresher = FakeRefresher::failing();
        let (interceptor, notifier) = interceptor(store.clone(), refresher.clone());
        let mut events = notifier.subscribe();

        let mut request = ApiRequest::get("/listings");
        let outcome = interceptor.intercept(&mut request).await;

        assert_eq!(outcome, AuthOutcome::Unauthenticated);
        assert_eq!(refresher.calls(), 0);
        assert!(store.get().is_none());
        assert!(store.refresh_token().is_none());
        assert_eq!(
            events.try_recv().unwrap(),
            AuthEvent::Unauthorized {
                reason: UnauthorizedReason::RefreshTokenExpired
            }
        );
    }

    #[tokio::test]
    async fn test_refresh_failure_clears_session() {
        let store = Arc::new(MemoryStore::with_pair(
            CredentialPair::new(jwt("42", -1)).with_refresh_token("opaque-refresh"),
        ));
        let refresher = FakeRefresher::failing();
        let (interceptor, notifier) = interceptor(store.clone(), refresher.clone());
        let mut events = notifier.subscribe();

        let mut request = ApiRequest::get("/listings");
        let outcome = interceptor.intercept(&mut request).await;

        assert_eq!(outcome, AuthOutcome::Unauthenticated);
        assert_eq!(refresher.calls(), 1);
        assert!(bearer(&request).is_none());
        assert!(store.get().is_none());
        assert_eq!(
            events.try_recv().unwrap(),
            AuthEvent::Unauthorized {
                reason: UnauthorizedReason::RefreshFailed
            }
        );
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_no_refresh_request_leaves_expired_session_alone() {
        let store = Arc::new(MemoryStore::with_pair(CredentialPair::new(jwt("42", -1))));
        let refresher = FakeRefresher::failing();
        let (interceptor, notifier) = interceptor(store.clone(), refresher.clone());
        let mut events = notifier.subscribe();

        let mut request = ApiRequest::post("/auth/logout").no_refresh();
        let outcome = interceptor.intercept(&mut request).await;

        assert_eq!(outcome, AuthOutcome::Unauthenticated);
        assert!(bearer(&request).is_none());
        assert_eq!(refresher.calls(), 0);
        assert!(store.get().is_some());
        assert!(events.try_recv().is_err());

    }

    #[tokio::test]
    async fn test_no_refresh_request_attaches_valid_token() {
        let store = Arc::new(MemoryStore::with_pair(CredentialPair::new(jwt("42", 3600))));
        let (interceptor, _) = interceptor(store, FakeRefresher::failing());

        let mut request = ApiRequest::post("/auth/logout").no_refresh();
        let outcome = interceptor.intercept(&mut request).await;

        assert_eq!(outcome, AuthOutcome::Authorized { refreshed: false });
        assert!(bearer(&request).is_some());
    }

    #[tokio::test]
    async fn test_leeway_refreshes_early() {
        let store = Arc::new(MemoryStore::with_pair(
            CredentialPair::new(jwt("42", 30)).with_refresh_token("r"),
        ));
        let refresher = FakeRefresher::succeeding(CredentialPair::new(jwt("42", 3600)));
        let (interceptor, _) = interceptor(store, refresher.clone());
        let interceptor = interceptor.with_expiry_leeway(ChronoDuration::minutes(1));

        let mut request = ApiRequest::get("/listings");
        let outcome = interceptor.intercept(&mut request).await;

        assert_eq!(outcome, AuthOutcome::Authorized { refreshed: true });
        assert_eq!(refresher.calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_refresh() {
        let new_token = jwt("42", 3600);
        let store = Arc::new(MemoryStore::with_pair(
            CredentialPair::new(jwt("42", -1)).with_refresh_token("r"),
        ));
        let refresher = FakeRefresher::succeeding(CredentialPair::new(new_token.clone()));
        let (interceptor, _) = interceptor(store, refresher.clone());

        let mut first = ApiRequest::get("/listings");
        let mut second = ApiRequest::get("/users");
        let mut third = ApiRequest::get("/news");
        let (a, b, c) = tokio::join!(
            interceptor.intercept(&mut first),
            interceptor.intercept(&mut second),
            interceptor.intercept(&mut third),
        );

        assert_eq!(refresher.calls(), 1);
        for outcome in [a, b, c] {
            assert!(matches!(outcome, AuthOutcome::Authorized { .. }));
        }
        let expected = format!("Bearer {}", new_token);
        for request in [&first, &second, &third] {
            assert_eq!(bearer(request), Some(expected.as_str()));
        }
        assert!(interceptor.in_flight.lock().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_failure_notifies_once() {
        let store = Arc::new(MemoryStore::with_pair(
            CredentialPair::new(jwt("42", -1)).with_refresh_token("r"),
        ));
        let refresher = FakeRefresher::failing();
        let (interceptor, notifier) = interceptor(store.clone(), refresher.clone());
        let mut events = notifier.subscribe();

        let mut first = ApiRequest::get("/listings");
        let mut second = ApiRequest::get("/users");
        let (a, b) = tokio::join!(
            interceptor.intercept(&mut first),
            interceptor.intercept(&mut second),
        );

        assert_eq!(a, AuthOutcome::Unauthenticated);
        assert_eq!(b, AuthOutcome::Unauthenticated);
        assert_eq!(refresher.calls(), 1);
        assert!(events.try_recv().is_ok());
        assert!(events.try_recv().is_err());
        assert!(store.get().is_none());
    }

    #[tokio::test]
    async fn test_sequential_refreshes_start_new_flights() {
        let store = Arc::new(MemoryStore::with_pair(
            CredentialPair::new(jwt("42", -1)).with_refresh_token("r"),
        ));
        // The refreshed token is itself already expired, forcing another refresh.
        let refresher = FakeRefresher::succeeding(CredentialPair::new(jwt("42", -1)));
        let (interceptor, _) = interceptor(store, refresher.clone());

        interceptor.intercept(&mut ApiRequest::get("/a")).await;
        interceptor.intercept(&mut ApiRequest::get("/b")).await;

        assert_eq!(refresher.calls(), 2);
    }
}
