//! CORS policy for the JSON gateway
//!
//! Only the allowed origins are configurable. Everything else uses
//! conservative defaults: simple methods, a short header list, no
//! credentials.

use axum::http::{header, request::Parts, HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Build the CORS layer wrapping the gateway router
///
/// An empty list, or one containing `*`, allows any origin. An entry with a
/// single `*` (e.g. `https://*.example.com`) matches any origin with that
/// prefix and suffix.
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(allow_origin(allowed_origins))
        .allow_methods([Method::GET, Method::POST, Method::HEAD])
        .allow_headers([
            header::ACCEPT,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-requested-with"),
        ])
}

fn allow_origin(allowed_origins: &[String]) -> AllowOrigin {
    if allowed_origins.is_empty() || allowed_origins.iter().any(|o| o == "*") {
        return AllowOrigin::any();
    }

    let patterns: Vec<OriginPattern> = allowed_origins
        .iter()
        .map(|o| OriginPattern::parse(o))
        .collect();

    AllowOrigin::predicate(move |origin: &HeaderValue, _parts: &Parts| {
        origin
            .to_str()
            .map(|o| {
                let o = o.to_ascii_lowercase();
                patterns.iter().any(|p| p.matches(&o))
            })
            .unwrap_or(false)
    })
}

/// One configured origin, compared case-insensitively
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum OriginPattern {
    Exact(String),
    Wildcard { prefix: String, suffix: String },
}

impl OriginPattern {
    pub(crate) fn parse(origin: &str) -> Self {
        let origin = origin.trim().to_ascii_lowercase();
        match origin.split_once('*') {
            Some((prefix, suffix)) if !suffix.contains('*') => OriginPattern::Wildcard {
                prefix: prefix.to_string(),
                suffix: suffix.to_string(),
            },
            _ => OriginPattern::Exact(origin),
        }
    }

    pub(crate) fn matches(&self, origin: &str) -> bool {
        match self {
            OriginPattern::Exact(expected) => origin == expected,
            OriginPattern::Wildcard { prefix, suffix } => {
                origin.len() >= prefix.len() + suffix.len()
                    && origin.starts_with(prefix.as_str())
                    && origin.ends_with(suffix.as_str())
            }
        }
    }
}
