// Response containers: values requiring bespoke transport-response construction

use crate::error::Error;
use crate::headers::Cookie;
use crate::http::MediaType;
use crate::response::Response;
use crate::status::is_redirect_status;
use std::collections::HashMap;
use std::path::PathBuf;

/// A file download response.
#[derive(Clone, Debug, Default)]
pub struct File {
    pub path: PathBuf,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub headers: HashMap<String, String>,
    pub cookies: Vec<Cookie>,
    pub media_type: Option<MediaType>,
}

impl File {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// A redirect response.
#[derive(Clone, Debug)]
pub struct Redirect {
    pub path: String,
    pub headers: HashMap<String, String>,
    pub cookies: Vec<Cookie>,
    pub media_type: Option<MediaType>,
}

impl Redirect {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            headers: HashMap::new(),
            cookies: Vec::new(),
            media_type: None,
        }
    }
}

/// A value representing a non-trivial response shape. The dispatch layer asks
/// the container itself to produce the transport response.
#[derive(Clone, Debug)]
pub enum ResponseContainer {
    File(File),
    Redirect(Redirect),
}

impl ResponseContainer {
    /// Headers declared directly on the container; these override resolved
    /// layer headers on key collision.
    pub fn headers(&self) -> &HashMap<String, String> {
        match self {
            ResponseContainer::File(file) => &file.headers,
            ResponseContainer::Redirect(redirect) => &redirect.headers,
        }
    }

    pub fn cookies(&self) -> &[Cookie] {
        match self {
            ResponseContainer::File(file) => &file.cookies,
            ResponseContainer::Redirect(redirect) => &redirect.cookies,
        }
    }

    /// Media type override declared on the container.
    pub fn media_type(&self) -> Option<MediaType> {
        match self {
            ResponseContainer::File(file) => file.media_type.clone(),
            ResponseContainer::Redirect(redirect) => redirect.media_type.clone(),
        }
    }

    /// Build the transport response from this container.
    pub async fn to_response(
        &self,
        headers: HashMap<String, String>,
        status_code: u16,
        media_type: MediaType,
    ) -> Result<Response, Error> {
        match self {
            ResponseContainer::Redirect(redirect) => {
                if !is_redirect_status(status_code) {
                    return Err(Error::Validation(format!(
                        "redirect responses require a redirect status code, got {status_code}"
                    )));
                }
                let mut response = Response::new(status_code).with_media_type(media_type);
                response.headers = headers;
                response
                    .headers
                    .insert("location".to_string(), redirect.path.clone());
                Ok(response)
            }
            ResponseContainer::File(file) => {
                let body = tokio::fs::read(&file.path)
                    .await
                    .map_err(|e| Error::Internal(format!("failed to read {:?}: {e}", file.path)))?;
                let mut response = Response::new(status_code).with_media_type(
                    file.content_type
                        .clone()
                        .map(MediaType::Custom)
                        .unwrap_or(media_type),
                );
                response.headers = headers;
                let filename = file
                    .filename
                    .clone()
                    .or_else(|| {
                        file.path
                            .file_name()
                            .map(|name| name.to_string_lossy().to_string())
                    })
                    .unwrap_or_else(|| "download".to_string());
                response.headers.insert(
                    "content-disposition".to_string(),
                    format!("attachment; filename=\"{filename}\""),
                );
                response.body = body;
                Ok(response)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_redirect_sets_location() {
        let container = ResponseContainer::Redirect(Redirect::new("/elsewhere"));
        let response = container
            .to_response(HashMap::new(), 302, MediaType::Text)
            .await
            .unwrap();
        assert_eq!(response.status_code, 302);
        assert_eq!(response.headers.get("location"), Some(&"/elsewhere".to_string()));
    }

    #[tokio::test]
    async fn test_redirect_rejects_non_redirect_status() {
        let container = ResponseContainer::Redirect(Redirect::new("/elsewhere"));
        let result = container.to_response(HashMap::new(), 200, MediaType::Text).await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_file_response_reads_bytes() {
        let dir = std::env::temp_dir().join("pharos-file-container-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("payload.txt");
        std::fs::write(&path, b"file contents").unwrap();

        let container = ResponseContainer::File(File::new(&path).with_filename("report.txt"));
        let response = container
            .to_response(HashMap::new(), 200, MediaType::Text)
            .await
            .unwrap();
        assert_eq!(response.body, b"file contents".to_vec());
        assert_eq!(
            response.headers.get("content-disposition"),
            Some(&"attachment; filename=\"report.txt\"".to_string())
        );
    }
}
