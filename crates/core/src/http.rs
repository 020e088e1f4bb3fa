//! Request and response descriptors crossing the interception boundary.
//!
//! A [`Response`] body is treated as consume-once: the type is intentionally
//! not `Clone`, and a second copy for the cache must be made with
//! [`Response::duplicate`]. The stored snapshot and the returned response are
//! therefore always distinct values.

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::cache::hash::compute_request_key;

/// Header map with lowercased names.
pub type Headers = BTreeMap<String, String>;

/// An intercepted outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Uppercased HTTP method.
    pub method: String,
    pub url: Url,
    pub headers: Headers,
    pub body: Option<Bytes>,
}

impl Request {
    /// Build a request, normalizing the method to uppercase.
    pub fn new(method: &str, url: Url) -> Self {
        Self { method: method.trim().to_ascii_uppercase(), url, headers: Headers::new(), body: None }
    }

    /// Shorthand for a `GET` request.
    pub fn get(url: Url) -> Self {
        Self::new("GET", url)
    }

    /// Add a header; the name is lowercased.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Stable identity of this request in the response cache.
    pub fn cache_key(&self) -> String {
        compute_request_key(&self.method, &self.url)
    }

    /// Only retrievals are looked up in or written to the response cache.
    pub fn is_cacheable(&self) -> bool {
        self.method == "GET"
    }
}

/// How a response relates to the serving origin.
///
/// The transport only produces `Basic` and `Cors`. `Opaque` and `Error` are
/// accepted when reading rows written by other producers into a shared cache
/// database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// Same-origin response, safe to cache and reuse.
    Basic,
    /// Cross-origin response with readable headers.
    Cors,
    /// Cross-origin response whose contents are hidden.
    Opaque,
    /// Network error placeholder.
    Error,
}

impl ResponseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseType::Basic => "basic",
            ResponseType::Cors => "cors",
            ResponseType::Opaque => "opaque",
            ResponseType::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "basic" => Some(ResponseType::Basic),
            "cors" => Some(ResponseType::Cors),
            "opaque" => Some(ResponseType::Opaque),
            "error" => Some(ResponseType::Error),
            _ => None,
        }
    }
}

impl fmt::Display for ResponseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A response produced by the transport or served from the cache.
#[derive(Debug, PartialEq, Eq)]
pub struct Response {
    /// Final URL after redirects.
    pub url: Url,
    pub status: u16,
    pub response_type: ResponseType,
    pub headers: Headers,
    pub body: Bytes,
}

impl Response {
    /// Build a same-origin response with no headers.
    pub fn new(url: Url, status: u16, body: impl Into<Bytes>) -> Self {
        Self { url, status, response_type: ResponseType::Basic, headers: Headers::new(), body: body.into() }
    }

    pub fn with_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Status in the 2xx range.
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Produce an independent copy of this response.
    ///
    /// Must be called before a response is both stored and returned.
    pub fn duplicate(&self) -> Response {
        Response {
            url: self.url.clone(),
            status: self.status,
            response_type: self.response_type,
            headers: self.headers.clone(),
            body: Bytes::copy_from_slice(&self.body),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_method_normalized() {
        let req = Request::new(" post ", Url::parse("https://app.example/api/x").unwrap());
        assert_eq!(req.method, "POST");
        assert!(!req.is_cacheable());
        assert!(Request::get(Url::parse("https://app.example/").unwrap()).is_cacheable());
    }

    #[test]
    fn test_header_names_lowercased() {
        let req = Request::get(Url::parse("https://app.example/").unwrap()).with_header("Accept", "text/html");
        assert_eq!(req.headers.get("accept").map(String::as_str), Some("text/html"));
    }

    #[test]
    fn test_cache_key_ignores_fragment() {
        let a = Request::get(Url::parse("https://app.example/page#top").unwrap());
        let b = Request::get(Url::parse("https://app.example/page").unwrap());
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn test_response_ok_range() {
        let url = Url::parse("https://app.example/").unwrap();
        assert!(Response::new(url.clone(), 200, "").ok());
        assert!(Response::new(url.clone(), 204, "").ok());
        assert!(!Response::new(url.clone(), 304, "").ok());
        assert!(!Response::new(url, 500, "").ok());
    }

    #[test]
    fn test_duplicate_is_equal_but_distinct() {
        let url = Url::parse("https://app.example/data").unwrap();
        let original = Response::new(url, 200, "payload").with_header("Content-Type", "application/json");
        let copy = original.duplicate();
        assert_eq!(original, copy);
        assert_ne!(original.body.as_ptr(), copy.body.as_ptr());
    }

    #[test]
    fn test_response_type_parse() {
        for ty in [ResponseType::Basic, ResponseType::Cors, ResponseType::Opaque, ResponseType::Error] {
            assert_eq!(ResponseType::parse(ty.as_str()), Some(ty));
        }
        assert_eq!(ResponseType::parse("opaqueredirect"), None);
        assert_eq!(ResponseType::parse("Basic"), None);
    }
}
