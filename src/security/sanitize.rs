//! Angle-bracket stripping for query strings and flat request bodies.
//!
//! # Responsibilities
//! - Strip `<` and `>` from every query parameter value
//! - Strip them from top-level string fields of JSON objects and from
//!   urlencoded form values
//! - Leave non-string fields, nested structures and other media types alone
//!
//! # Design Decisions
//! - Shallow pass only; this does not replace output encoding
//! - A body that cannot be read or parsed is an error, never passed through
//! - Requests are only rebuilt when something actually changed

use axum::body::Body;
use axum::http::uri::{InvalidUri, InvalidUriParts, PathAndQuery};
use axum::http::{header, HeaderValue, Request, Uri};
use serde_json::Value;
use thiserror::Error;
use url::form_urlencoded;

use crate::config::SecurityConfig;
use crate::security::headers::media_type;

#[derive(Debug, Error)]
pub enum SanitizeError {
    #[error("request body unreadable or larger than {limit} bytes")]
    Body { limit: usize },

    #[error("malformed JSON body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid path and query: {0}")]
    PathAndQuery(#[from] InvalidUri),

    #[error("invalid uri: {0}")]
    Uri(#[from] InvalidUriParts),
}

/// Remove angle brackets in place; returns true if any were removed.
pub fn strip_angle_brackets(value: &mut String) -> bool {
    let before = value.len();
    value.retain(|c| c != '<' && c != '>');
    value.len() != before
}

/// Re-encode urlencoded pairs with cleaned values, or `None` if clean already.
pub fn sanitize_pairs(input: &[u8]) -> Option<String> {
    let mut changed = false;
    let pairs: Vec<(String, String)> = form_urlencoded::parse(input)
        .map(|(key, value)| {
            let mut value = value.into_owned();
            changed |= strip_angle_brackets(&mut value);
            (key.into_owned(), value)
        })
        .collect();

    changed.then(|| form_urlencoded::Serializer::new(String::new()).extend_pairs(pairs).finish())
}

/// Clean the top-level string fields of a JSON object body.
///
/// Returns `Ok(None)` when nothing changed, including for empty bodies and
/// JSON values that are not objects.
pub fn sanitize_json(body: &[u8]) -> Result<Option<Vec<u8>>, SanitizeError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    let mut value: Value = serde_json::from_slice(body)?;
    let Some(object) = value.as_object_mut() else {
        return Ok(None);
    };

    let mut changed = false;
    for field in object.values_mut() {
        if let Value::String(text) = field {
            changed |= strip_angle_brackets(text);
        }
    }

    if changed {
        Ok(Some(serde_json::to_vec(&value)?))
    } else {
        Ok(None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    Json,
    Form,
}

impl BodyKind {
    fn of(request_media_type: Option<&str>) -> Option<Self> {
        match request_media_type? {
            "application/json" => Some(BodyKind::Json),
            "application/x-www-form-urlencoded" => Some(BodyKind::Form),
            other if other.ends_with("+json") => Some(BodyKind::Json),
            _ => None,
        }
    }
}

/// Rewrites requests so that admitted data is free of angle brackets.
#[derive(Debug, Clone)]
pub struct Sanitizer {
    max_body_size: usize,
    sanitize_body: bool,
}

impl Sanitizer {
    pub fn new(max_body_size: usize, sanitize_body: bool) -> Self {
        Self {
            max_body_size,
            sanitize_body,
        }
    }

    pub fn from_config(config: &SecurityConfig) -> Self {
        Self::new(config.max_body_size, config.sanitize_body)
    }

    pub async fn sanitize(&self, request: Request<Body>) -> Result<Request<Body>, SanitizeError> {
        let (mut parts, body) = request.into_parts();

        if let Some(clean) = parts.uri.query().and_then(|q| sanitize_pairs(q.as_bytes())) {
            parts.uri = with_query(&parts.uri, &clean)?;
        }

        let kind = if self.sanitize_body {
            BodyKind::of(media_type(&parts.headers).as_deref())
        } else {
            None
        };
        let Some(kind) = kind else {
            return Ok(Request::from_parts(parts, body));
        };

        let bytes = axum::body::to_bytes(body, self.max_body_size)
            .await
            .map_err(|_| SanitizeError::Body {
                limit: self.max_body_size,
            })?;

        let cleaned = match kind {
            BodyKind::Json => sanitize_json(&bytes)?,
            BodyKind::Form => sanitize_pairs(&bytes).map(String::into_bytes),
        };

        let body = match cleaned {
            Some(clean) => {
                parts.headers.remove(header::TRANSFER_ENCODING);
                parts
                    .headers
                    .insert(header::CONTENT_LENGTH, HeaderValue::from(clean.len()));
                Body::from(clean)
            }
            None => Body::from(bytes),
        };

        Ok(Request::from_parts(parts, body))
    }
}

fn with_query(uri: &Uri, query: &str) -> Result<Uri, SanitizeError> {
    let path_and_query = if query.is_empty() {
        uri.path().to_string()
    } else {
        format!("{}?{}", uri.path(), query)
    };
    replace_path_and_query(uri, &path_and_query)
}

/// Replace the path of `uri`, keeping its query.
pub fn with_path(uri: &Uri, path: &str) -> Result<Uri, SanitizeError> {
    let path_and_query = match uri.query() {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    };
    replace_path_and_query(uri, &path_and_query)
}

fn replace_path_and_query(uri: &Uri, path_and_query: &str) -> Result<Uri, SanitizeError> {
    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(path_and_query.parse::<PathAndQuery>()?);
    Ok(Uri::from_parts(parts)?)
}
