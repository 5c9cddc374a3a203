//! Text producers feeding the delivery service.
//!
//! The relay does not care where text comes from (OCR, a book file, a typed
//! line); anything that can hand over a `String` implements [`TextSource`].

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncReadExt;

#[async_trait]
pub trait TextSource: Send + Sync {
    /// Short description for logs, e.g. `file:chapter1.txt`.
    fn label(&self) -> String;

    async fn produce_text(&self) -> Result<String>;
}

/// Text given inline, usually from the command line.
#[derive(Debug, Clone)]
pub struct LiteralText(pub String);

#[async_trait]
impl TextSource for LiteralText {
    fn label(&self) -> String {
        "literal".to_string()
    }

    async fn produce_text(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// UTF-8 text file read in full.
#[derive(Debug, Clone)]
pub struct FileText {
    pub path: PathBuf,
}

impl FileText {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TextSource for FileText {
    fn label(&self) -> String {
        format!("file:{}", self.path.display())
    }

    async fn produce_text(&self) -> Result<String> {
        tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading text from {}", self.path.display()))
    }
}

/// Everything on standard input until EOF.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinText;

#[async_trait]
impl TextSource for StdinText {
    fn label(&self) -> String {
        "stdin".to_string()
    }

    async fn produce_text(&self) -> Result<String> {
        let mut buf = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buf)
            .await
            .map_err(|e| anyhow!("reading text from stdin: {}", e))?;
        Ok(buf)
    }
}

/// Pick a source from CLI-style inputs: a file wins over inline text, and
/// `-` or nothing at all means stdin.
pub fn select(text: Option<String>, file: Option<PathBuf>) -> Box<dyn TextSource> {
    match (file, text) {
        (Some(path), _) if path.as_os_str() != "-" => Box::new(FileText::new(path)),
        (Some(_), _) => Box::new(StdinText),
        (None, Some(text)) if text != "-" => Box::new(LiteralText(text)),
        (None, _) => Box::new(StdinText),
    }
}
