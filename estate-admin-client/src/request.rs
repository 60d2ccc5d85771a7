//! Outgoing request description.
//!
//! An [`ApiRequest`] is plain data until the client dispatches it, so the
//! interceptor can inspect and amend it before anything hits the network.

use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,

    /// Path relative to the base URL, or an absolute `http(s)://` URL.
    pub path: String,

    pub query: Vec<(String, String)>,

    pub headers: HeaderMap,

    /// JSON body, if any.
    pub body: Option<serde_json::Value>,

    /// Bypass authorization entirely: no token lookup, no refresh, no headers.
    pub skip_auth: bool,

    /// Attach the stored token only while it is still valid. An expired token
    /// is not refreshed and the request goes out unauthenticated.
    pub no_refresh: bool,

    /// Base URL override. Filled with the client default when unset.
    pub base_url: Option<Url>,

    /// Timeout override. Filled with the client default when unset.
    pub timeout: Option<Duration>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
            skip_auth: false,
            no_refresh: false,
            base_url: None,
            timeout: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Append a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set a JSON body.
    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Set a JSON body from any serializable value.
    pub fn try_json<T: Serialize + ?Sized>(self, body: &T) -> Result<Self, serde_json::Error> {
        Ok(self.json(serde_json::to_value(body)?))
    }

    /// Mark the request as not needing authorization.
    pub fn skip_auth(mut self) -> Self {
        self.skip_auth = true;
        self
    }

    /// Never start a token refresh for this request.
    pub fn no_refresh(mut self) -> Self {
        self.no_refresh = true;
        self
    }

    pub fn base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Resolve the full request URL.
    ///
    /// Returns `None` only if no base URL has been set and `path` is relative.
    pub fn url(&self) -> Option<Result<Url, url::ParseError>> {
        if is_absolute(&self.path) {
            return Some(Url::parse(&self.path));
        }
        self.base_url.as_ref().map(|base| resolve_url(base, &self.path))
    }
}

fn is_absolute(path: &str) -> bool {
    path.starts_with("http://") || path.starts_with("https://")
}

/// Join `path` onto `base`, keeping the base path as a prefix.
///
/// Unlike [`Url::join`], a leading slash in `path` does not discard the base
/// path: `http://host/api` + `/auth/refresh` is `http://host/api/auth/refresh`.
pub fn resolve_url(base: &Url, path: &str) -> Result<Url, url::ParseError> {
    if is_absolute(path) {
        return Url::parse(path);
    }

    let base = base.as_str().trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        Url::parse(base)
    } else {
        Url::parse(&format!("{}/{}", base, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_keeps_base_path() {
        let base = Url::parse("http://localhost:3000/api").unwrap();
        assert_eq!(
            resolve_url(&base, "/auth/refresh").unwrap().as_str(),
            "http://localhost:3000/api/auth/refresh"
        );

        let base = Url::parse("http://localhost:3000/api/").unwrap();
        assert_eq!(
            resolve_url(&base, "listings").unwrap().as_str(),
            "http://localhost:3000/api/listings"
        );
    }

    #[test]
    fn test_absolute_path_wins() {
        let base = Url::parse("http://localhost:3000/api").unwrap();
        assert_eq!(
            resolve_url(&base, "https://cdn.example.com/x").unwrap().as_str(),
            "https://cdn.example.com/x"
        );
    }

    #[test]
    fn test_url_requires_base_for_relative_paths() {
        let request = ApiRequest::get("/listings");
        assert!(request.url().is_none());

        let request = request.base_url(Url::parse("http://h/api").unwrap());
        assert_eq!(
            request.url().unwrap().unwrap().as_str(),
            "http://h/api/listings"
        );
    }

    #[test]
    fn test_builder() {
        let request = ApiRequest::post("/news")
            .query("draft", "true")
            .try_json(&serde_json::json!({ "title": "Open house" }))
            .unwrap()
            .skip_auth()
            .timeout(Duration::from_secs(2));

        assert_eq!(request.method, Method::POST);
        assert_eq!(request.query, vec![("draft".to_string(), "true".to_string())]);
        assert!(request.skip_auth);
        assert_eq!(request.body.unwrap()["title"], "Open house");
    }
}
