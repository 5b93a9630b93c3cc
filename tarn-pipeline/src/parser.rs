use async_trait::async_trait;
use tarn_common::AppError;

/// Document parsing is an external collaborator (a document-parsing
/// service such as Kreuzberg); this trait is the abstract capability the
/// Parse stage depends on, not a parser implementation.
#[async_trait]
pub trait DocumentParser: Send + Sync {
    async fn parse(&self, source_ref: &str, mime: &str) -> Result<String, AppError>;
}

/// Default implementation for text-shaped mime types, used when no external
/// parsing service is configured. Anything else is a fatal configuration
/// error rather than a silent pass-through.
pub struct PlainTextParser;

#[async_trait]
impl DocumentParser for PlainTextParser {
    async fn parse(&self, source_ref: &str, mime: &str) -> Result<String, AppError> {
        match mime {
            "text/plain" | "text/markdown" => tokio::fs::read_to_string(source_ref)
                .await
                .map_err(|err| AppError::InternalError(format!("reading `{source_ref}`: {err}"))),
            other => Err(AppError::Config(format!(
                "no parser configured for mime type `{other}`; wire an external DocumentParser"
            ))),
        }
    }
}
