//! Method, content-type, origin and upload checks for allowed surfaces.

use axum::http::{header, HeaderMap, Method};
use std::fmt;

use crate::config::{ApiConfig, UploadConfig};
use crate::security::headers::media_type;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceViolation {
    Method,
    ContentType,
    Origin,
    UploadExtension,
    Referer,
}

impl SurfaceViolation {
    pub fn as_str(&self) -> &'static str {
        match self {
            SurfaceViolation::Method => "method",
            SurfaceViolation::ContentType => "content_type",
            SurfaceViolation::Origin => "origin",
            SurfaceViolation::UploadExtension => "upload_extension",
            SurfaceViolation::Referer => "referer",
        }
    }
}

impl fmt::Display for SurfaceViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct SurfaceGuard {
    api_prefix: String,
    allowed_methods: Vec<Method>,
    allowed_origins: Vec<String>,
    upload_paths: Vec<String>,
    upload_content_types: Vec<String>,
    uploads: UploadConfig,
}

impl SurfaceGuard {
    pub fn from_config(api: &ApiConfig, uploads: &UploadConfig, api_prefix: &str) -> Self {
        Self {
            api_prefix: api_prefix.to_string(),
            allowed_methods: api
                .allowed_methods
                .iter()
                .filter_map(|m| Method::from_bytes(m.trim().to_ascii_uppercase().as_bytes()).ok())
                .collect(),
            allowed_origins: api.allowed_origins.clone(),
            upload_paths: api.upload_paths.clone(),
            upload_content_types: api
                .upload_content_types
                .iter()
                .map(|t| t.to_ascii_lowercase())
                .collect(),
            uploads: UploadConfig {
                allowed_extensions: lowercase_all(&uploads.allowed_extensions),
                ..uploads.clone()
            },
        }
    }

    pub fn check(&self, method: &Method, path: &str, headers: &HeaderMap) -> Result<(), SurfaceViolation> {
        if path.starts_with(&self.uploads.prefix) {
            self.check_upload(path, headers)?;
        }
        if path.starts_with(&self.api_prefix) {
            self.check_api(method, path, headers)?;
        }
        Ok(())
    }

    fn check_api(&self, method: &Method, path: &str, headers: &HeaderMap) -> Result<(), SurfaceViolation> {
        if !self.allowed_methods.contains(method) {
            return Err(SurfaceViolation::Method);
        }

        if carries_body(method) {
            let media = media_type(headers);
            let media = media.as_deref().unwrap_or_default();
            let accepted = if self.upload_paths.iter().any(|p| path.starts_with(p.as_str())) {
                self.upload_content_types.iter().any(|t| t == media)
            } else {
                media == "application/json"
            };
            if !accepted {
                return Err(SurfaceViolation::ContentType);
            }
        }

        if let Some(origin) = headers.get(header::ORIGIN) {
            let origin = origin.to_str().map_err(|_| SurfaceViolation::Origin)?;
            if !self.origin_allowed(origin, headers) {
                return Err(SurfaceViolation::Origin);
            }
        }

        Ok(())
    }

    fn origin_allowed(&self, origin: &str, headers: &HeaderMap) -> bool {
        let host = headers
            .get(header::HOST)
            .and_then(|h| h.to_str().ok())
            .filter(|h| !h.is_empty());

        host.is_some_and(|host| origin.contains(host))
            || self.allowed_origins.iter().any(|o| origin.contains(o.as_str()))
    }

    fn check_upload(&self, path: &str, headers: &HeaderMap) -> Result<(), SurfaceViolation> {
        let lowered = path.to_ascii_lowercase();
        if !self
            .uploads
            .allowed_extensions
            .iter()
            .any(|ext| lowered.ends_with(ext.as_str()))
        {
            return Err(SurfaceViolation::UploadExtension);
        }

        if self.uploads.require_referer {
            let referer = headers
                .get(header::REFERER)
                .and_then(|r| r.to_str().ok())
                .unwrap_or_default();
            let from_app_page = self
                .uploads
                .referer_markers
                .iter()
                .any(|m| referer.contains(m.as_str()));
            if !from_app_page {
                return Err(SurfaceViolation::Referer);
            }
        }

        Ok(())
    }
}

fn carries_body(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

fn lowercase_all(items: &[String]) -> Vec<String> {
    items.iter().map(|s| s.to_ascii_lowercase()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn guard() -> SurfaceGuard {
        SurfaceGuard::from_config(&ApiConfig::default(), &UploadConfig::default(), "/api/")
    }

    fn headers(pairs: &[(header::HeaderName, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(name.clone(), HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_api_methods() {
        let g = guard();
        assert_eq!(g.check(&Method::GET, "/api/chat/rooms", &HeaderMap::new()), Ok(()));
        assert_eq!(g.check(&Method::DELETE, "/api/chat/rooms/1", &HeaderMap::new()), Ok(()));
        assert_eq!(
            g.check(&Method::PUT, "/api/chat/rooms/1", &headers(&[(header::CONTENT_TYPE, "application/json")])),
            Err(SurfaceViolation::Method)
        );
    }

    #[test]
    fn test_api_bodies_must_be_json() {
        let g = guard();
        assert_eq!(
            g.check(&Method::POST, "/api/auth/login", &headers(&[(header::CONTENT_TYPE, "application/json; charset=utf-8")])),
            Ok(())
        );
        assert_eq!(
            g.check(&Method::POST, "/api/auth/login", &headers(&[(header::CONTENT_TYPE, "text/plain")])),
            Err(SurfaceViolation::ContentType)
        );
        assert_eq!(
            g.check(&Method::POST, "/api/auth/login", &HeaderMap::new()),
            Err(SurfaceViolation::ContentType)
        );
    }

    #[test]
    fn test_upload_endpoint_accepts_multipart() {
        let g = guard();
        let multipart = headers(&[(header::CONTENT_TYPE, "multipart/form-data; boundary=abc")]);
        assert_eq!(g.check(&Method::POST, "/api/chat/upload", &multipart), Ok(()));
        assert_eq!(
            g.check(&Method::POST, "/api/chat/rooms", &multipart),
            Err(SurfaceViolation::ContentType)
        );
    }

    #[test]
    fn test_origin_must_reference_host() {
        let g = guard();
        let same = headers(&[(header::HOST, "chat.example.com"), (header::ORIGIN, "https://chat.example.com")]);
        assert_eq!(g.check(&Method::GET, "/api/chat/rooms", &same), Ok(()));

        let foreign = headers(&[(header::HOST, "chat.example.com"), (header::ORIGIN, "https://evil.test")]);
        assert_eq!(g.check(&Method::GET, "/api/chat/rooms", &foreign), Err(SurfaceViolation::Origin));

        let config = ApiConfig {
            allowed_origins: vec!["evil.test".to_string()],
            ..ApiConfig::default()
        };
        let g = SurfaceGuard::from_config(&config, &UploadConfig::default(), "/api/");
        assert_eq!(g.check(&Method::GET, "/api/chat/rooms", &foreign), Ok(()));
    }

    #[test]
    fn test_uploads_need_image_extension() {
        let g = guard();
        assert_eq!(g.check(&Method::GET, "/uploads/a1/photo.PNG", &HeaderMap::new()), Ok(()));
        assert_eq!(
            g.check(&Method::GET, "/uploads/a1/shell.php", &HeaderMap::new()),
            Err(SurfaceViolation::UploadExtension)
        );
    }

    #[test]
    fn test_upload_referer_when_required() {
        let uploads = UploadConfig {
            require_referer: true,
            ..UploadConfig::default()
        };
        let g = SurfaceGuard::from_config(&ApiConfig::default(), &uploads, "/api/");
        assert_eq!(
            g.check(&Method::GET, "/uploads/a.png", &HeaderMap::new()),
            Err(SurfaceViolation::Referer)
        );
        let from_chat = headers(&[(header::REFERER, "https://chat.example.com/chat/abc12")]);
        assert_eq!(g.check(&Method::GET, "/uploads/a.png", &from_chat), Ok(()));
    }
}
