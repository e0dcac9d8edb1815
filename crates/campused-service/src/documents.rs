//! Uploaded file classification and local text extraction.
//!
//! Images go to the vision model. PDF and DOCX files are converted to text
//! here, on the blocking pool, and never cost tokens.

use axum::body::Bytes;

/// MIME type of DOCX files.
pub const DOCX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Errors raised while accepting or reading an upload.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    /// The content type is not accepted.
    #[error("unsupported file type '{content_type}' for {file_name}")]
    UnsupportedType {
        /// Uploaded file name.
        file_name: String,
        /// Declared content type.
        content_type: String,
    },

    /// The file exceeds the per-file limit.
    #[error("{file_name} is larger than {limit} bytes")]
    TooLarge {
        /// Uploaded file name.
        file_name: String,
        /// Limit in bytes.
        limit: usize,
    },

    /// The file could not be parsed.
    #[error("could not read {file_name}: {message}")]
    Unreadable {
        /// Uploaded file name.
        file_name: String,
        /// Parser message.
        message: String,
    },

    /// The extraction task failed to run.
    #[error("extraction task failed: {0}")]
    Task(String),
}

/// What an upload is, and so how it is turned into context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// JPEG, PNG or WebP image. Transcribed by the vision model.
    Image,
    /// PDF document.
    Pdf,
    /// Word document.
    Docx,
}

impl FileKind {
    /// Classify a declared content type.
    #[must_use]
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "image/jpeg" | "image/jpg" | "image/png" | "image/webp" => Some(Self::Image),
            "application/pdf" => Some(Self::Pdf),
            DOCX_CONTENT_TYPE => Some(Self::Docx),
            _ => None,
        }
    }
}

/// A validated upload.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Client-side file name.
    pub file_name: String,
    /// Declared content type.
    pub content_type: String,
    /// Kind derived from the content type.
    pub kind: FileKind,
    /// File contents.
    pub data: Bytes,
}

impl UploadedFile {
    /// Accept an upload if its type is supported and it fits in `max_bytes`.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedType` or `TooLarge`.
    pub fn accept(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        data: Bytes,
        max_bytes: usize,
    ) -> Result<Self, DocumentError> {
        let file_name = file_name.into();
        let content_type = content_type.into();

        let kind = FileKind::from_content_type(&content_type).ok_or_else(|| {
            DocumentError::UnsupportedType {
                file_name: file_name.clone(),
                content_type: content_type.clone(),
            }
        })?;

        if data.len() > max_bytes {
            return Err(DocumentError::TooLarge {
                file_name,
                limit: max_bytes,
            });
        }

        Ok(Self {
            file_name,
            content_type,
            kind,
            data,
        })
    }

    /// Extract the text of a PDF or DOCX upload on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns `Unreadable` if parsing fails, or `UnsupportedType` for images.
    pub async fn extract_text(&self) -> Result<String, DocumentError> {
        let extract: fn(&str, &[u8]) -> Result<String, DocumentError> = match self.kind {
            FileKind::Pdf => extract_pdf,
            FileKind::Docx => extract_docx,
            FileKind::Image => {
                return Err(DocumentError::UnsupportedType {
                    file_name: self.file_name.clone(),
                    content_type: self.content_type.clone(),
                })
            }
        };

        let file_name = self.file_name.clone();
        let data = self.data.clone();

        tokio::task::spawn_blocking(move || extract(&file_name, &data))
            .await
            .map_err(|e| DocumentError::Task(e.to_string()))?
    }
}

fn extract_pdf(file_name: &str, data: &[u8]) -> Result<String, DocumentError> {
    // pdf-extract can panic on malformed fonts
    let text = match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem(data)
    })) {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            tracing::warn!(file_name = %file_name, error = %e, "PDF extraction failed");
            return Err(DocumentError::Unreadable {
                file_name: file_name.to_string(),
                message: e.to_string(),
            });
        }
        Err(_) => {
            tracing::error!(file_name = %file_name, "PDF extraction panicked");
            return Err(DocumentError::Unreadable {
                file_name: file_name.to_string(),
                message: "malformed PDF".into(),
            });
        }
    };

    let text = clean_text(&text);
    tracing::debug!(file_name = %file_name, chars = text.len(), "PDF text extracted");
    Ok(text)
}

fn extract_docx(file_name: &str, data: &[u8]) -> Result<String, DocumentError> {
    let doc = docx_rs::read_docx(data).map_err(|e| DocumentError::Unreadable {
        file_name: file_name.to_string(),
        message: e.to_string(),
    })?;

    let mut text = String::new();
    for child in &doc.document.children {
        docx_content(child, &mut text);
    }

    let text = clean_text(&text);
    tracing::debug!(file_name = %file_name, chars = text.len(), "DOCX text extracted");
    Ok(text)
}

fn docx_content(element: &docx_rs::DocumentChild, output: &mut String) {
    match element {
        docx_rs::DocumentChild::Paragraph(para) => {
            paragraph_text(para, output);
            output.push('\n');
        }
        docx_rs::DocumentChild::Table(table) => {
            for row in &table.rows {
                let docx_rs::TableChild::TableRow(tr) = row;
                for cell in &tr.cells {
                    let docx_rs::TableRowChild::TableCell(tc) = cell;
                    for child in &tc.children {
                        if let docx_rs::TableCellContent::Paragraph(para) = child {
                            paragraph_text(para, output);
                            output.push_str(" | ");
                        }
                    }
                }
                output.push('\n');
            }
        }
        _ => {}
    }
}

fn paragraph_text(para: &docx_rs::Paragraph, output: &mut String) {
    for child in &para.children {
        match child {
            docx_rs::ParagraphChild::Run(run) => run_text(run, output),
            docx_rs::ParagraphChild::Hyperlink(link) => {
                for child in &link.children {
                    if let docx_rs::ParagraphChild::Run(run) = child {
                        run_text(run, output);
                    }
                }
            }
            _ => {}
        }
    }
}

fn run_text(run: &docx_rs::Run, output: &mut String) {
    for child in &run.children {
        if let docx_rs::RunChild::Text(text) = child {
            output.push_str(&text.text);
        }
    }
}

fn clean_text(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: usize = 1024 * 1024;

    fn docx_bytes(lines: &[&str]) -> Bytes {
        let mut docx = docx_rs::Docx::new();
        for line in lines {
            docx = docx.add_paragraph(
                docx_rs::Paragraph::new().add_run(docx_rs::Run::new().add_text(*line)),
            );
        }
        let mut buffer = std::io::Cursor::new(Vec::new());
        docx.build().pack(&mut buffer).unwrap();
        Bytes::from(buffer.into_inner())
    }

    #[test]
    fn classifies_supported_types() {
        assert_eq!(FileKind::from_content_type("image/png"), Some(FileKind::Image));
        assert_eq!(FileKind::from_content_type("IMAGE/JPEG"), Some(FileKind::Image));
        assert_eq!(FileKind::from_content_type("image/webp"), Some(FileKind::Image));
        assert_eq!(
            FileKind::from_content_type("application/pdf; charset=binary"),
            Some(FileKind::Pdf)
        );
        assert_eq!(FileKind::from_content_type(DOCX_CONTENT_TYPE), Some(FileKind::Docx));
        assert_eq!(FileKind::from_content_type("text/plain"), None);
    }

    #[test]
    fn rejects_unsupported_and_oversized_files() {
        let err = UploadedFile::accept("notes.txt", "text/plain", Bytes::from_static(b"x"), MIB)
            .unwrap_err();
        assert!(matches!(err, DocumentError::UnsupportedType { .. }));

        let err = UploadedFile::accept("big.png", "image/png", Bytes::from(vec![0; 11]), 10)
            .unwrap_err();
        assert!(matches!(err, DocumentError::TooLarge { limit: 10, .. }));
    }

    #[tokio::test]
    async fn extracts_docx_paragraphs() {
        let file = UploadedFile::accept(
            "notes.docx",
            DOCX_CONTENT_TYPE,
            docx_bytes(&["Newton's laws", "  ", "F = ma"]),
            MIB,
        )
        .unwrap();

        let text = file.extract_text().await.unwrap();
        assert_eq!(text, "Newton's laws\nF = ma");
    }

    #[tokio::test]
    async fn garbage_pdf_is_unreadable() {
        let file = UploadedFile::accept(
            "broken.pdf",
            "application/pdf",
            Bytes::from_static(b"not a pdf"),
            MIB,
        )
        .unwrap();

        assert!(matches!(
            file.extract_text().await,
            Err(DocumentError::Unreadable { .. })
        ));
    }
}
