//! Local file retriever.
//!
//! Copies a file from anywhere on disk into the temporary area. Options:
//! `path` (required, non-empty string) and `media_type` (optional, a
//! `type/subtype` string overriding the guess made from the extension).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::fs;
use tracing::{debug, warn};

use super::{RetrievalFields, Retrieved, Retriever, RetrieverError};
use crate::error::SourceError;
use crate::folder::TemporaryArea;

/// Retriever for the `file` protocol
#[derive(Debug)]
pub struct FileRetriever {
    fields: RetrievalFields,
}

impl FileRetriever {
    pub const PROTOCOL: &'static str = "file";

    pub fn new() -> Result<Self, RetrieverError> {
        let fields = RetrievalFields::new()
            .required("path", is_non_empty_string)?
            .optional("media_type", is_media_type)?;
        Ok(Self { fields })
    }
}

fn is_non_empty_string(value: &Value) -> bool {
    value.as_str().is_some_and(|s| !s.is_empty())
}

fn is_media_type(value: &Value) -> bool {
    value
        .as_str()
        .and_then(|s| s.split_once('/'))
        .is_some_and(|(kind, sub)| !kind.is_empty() && !sub.is_empty())
}

/// Media type from the file extension, `application/octet-stream` if unknown
pub fn guess_media_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "pdf" => "application/pdf",
        "epub" => "application/epub+zip",
        "djvu" => "image/vnd.djvu",
        "html" | "htm" => "text/html",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "ps" => "application/postscript",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl Retriever for FileRetriever {
    fn protocol(&self) -> &str {
        Self::PROTOCOL
    }

    fn fields(&self) -> &RetrievalFields {
        &self.fields
    }

    async fn fetch(
        &self,
        options: &Map<String, Value>,
        tmp: &TemporaryArea,
    ) -> Result<Retrieved, RetrieverError> {
        let source = PathBuf::from(options.get("path").and_then(Value::as_str).unwrap_or_default());
        let name = source
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("source");

        let file = tmp.allocate(name)?;
        debug!(source = %source.display(), dest = %file.path().display(), "Copying file");

        if let Err(e) = fs::copy(&source, file.path()).await {
            if let Err(cleanup) = file.cleanup() {
                warn!(path = %file.path().display(), error = %cleanup, "Failed to remove temporary file");
            }
            return Err(SourceError::from_io(&source, e).into());
        }

        let media_type = options
            .get("media_type")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| guess_media_type(&source).to_string());

        Ok(Retrieved { file, media_type })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retriever::run;
    use serde_json::json;
    use tempfile::TempDir;

    fn options(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn create_test_area() -> (TemporaryArea, TempDir) {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join(".tmp")).unwrap();
        (TemporaryArea::new(temp.path().join(".tmp")).unwrap(), temp)
    }

    #[test]
    fn test_option_validation() {
        let retriever = FileRetriever::new().unwrap();

        assert!(retriever.validate(&options(json!({"path": "/a/b.pdf"}))));
        assert!(retriever.validate(&options(json!({"path": "/a/b", "media_type": "text/plain"}))));
        assert!(!retriever.validate(&options(json!({}))));
        assert!(!retriever.validate(&options(json!({"path": ""}))));
        assert!(!retriever.validate(&options(json!({"path": 3}))));
        assert!(!retriever.validate(&options(json!({"path": "/a", "media_type": "plain"}))));
        assert!(!retriever.validate(&options(json!({"path": "/a", "url": "http://x"}))));
    }

    #[test]
    fn test_guess_media_type() {
        assert_eq!(guess_media_type(Path::new("a/paper.PDF")), "application/pdf");
        assert_eq!(guess_media_type(Path::new("notes.md")), "text/markdown");
        assert_eq!(guess_media_type(Path::new("blob")), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_fetch_copies_file() {
        let (tmp, temp) = create_test_area();
        let source = temp.path().join("paper.pdf");
        std::fs::write(&source, b"%PDF-1.4").unwrap();

        let retriever = FileRetriever::new().unwrap();
        let retrieved = run(
            &retriever,
            &options(json!({"path": source.to_str().unwrap()})),
            &tmp,
        )
        .await
        .unwrap();

        assert_eq!(retrieved.media_type, "application/pdf");
        assert_eq!(retrieved.file.suffix(), "paper.pdf");
        assert_eq!(std::fs::read(retrieved.file.path()).unwrap(), b"%PDF-1.4");
        assert!(source.exists());
    }

    #[tokio::test]
    async fn test_fetch_media_type_override() {
        let (tmp, temp) = create_test_area();
        let source = temp.path().join("scan");
        std::fs::write(&source, b"...").unwrap();

        let retriever = FileRetriever::new().unwrap();
        let retrieved = run(
            &retriever,
            &options(json!({"path": source.to_str().unwrap(), "media_type": "image/tiff"})),
            &tmp,
        )
        .await
        .unwrap();

        assert_eq!(retrieved.media_type, "image/tiff");
    }

    #[tokio::test]
    async fn test_fetch_missing_source_leaves_nothing() {
        let (tmp, temp) = create_test_area();
        let retriever = FileRetriever::new().unwrap();

        let result = run(
            &retriever,
            &options(json!({"path": temp.path().join("gone.pdf").to_str().unwrap()})),
            &tmp,
        )
        .await;

        assert!(matches!(
            result,
            Err(RetrieverError::Source(SourceError::NotFound(_)))
        ));
        assert!(tmp.available().unwrap().is_empty());
    }
}
