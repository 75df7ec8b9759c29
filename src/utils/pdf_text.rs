use tokio::task;
use tracing::debug;

/// Raised when uploaded bytes cannot be turned into text.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("Error extracting text from PDF: {0}")]
    Parse(String),
    #[error("Error extracting text from PDF: parser panicked: {0}")]
    Panicked(String),
    #[error("PDF extraction task failed: {0}")]
    Join(String),
}

/// Concatenate the text layer of every page in document order, trimmed.
///
/// `pdf-extract` works on an in-memory copy, so there is no document handle to
/// release on either the success or the failure path.
pub fn extract_text(pdf_bytes: &[u8]) -> Result<String, ExtractionError> {
    let text = pdf_extract::extract_text_from_mem(pdf_bytes)
        .map_err(|err| ExtractionError::Parse(err.to_string()))?;
    debug!(bytes = pdf_bytes.len(), text_len = text.len(), "extracted PDF text");
    Ok(text.trim().to_string())
}

/// Run [`extract_text`] on the blocking pool. A parser panic is reported as an error.
pub async fn extract_text_blocking(pdf_bytes: Vec<u8>) -> Result<String, ExtractionError> {
    task::spawn_blocking(move || extract_text(&pdf_bytes))
        .await
        .map_err(|err| {
            if err.is_panic() {
                let payload = err.into_panic();
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                ExtractionError::Panicked(message)
            } else {
                ExtractionError::Join(err.to_string())
            }
        })?
}

#[cfg(test)]
pub(crate) mod test_support {
    use lopdf::content::{Content, Operation};
    use lopdf::{Document, Object, Stream, dictionary};

    /// Build a PDF with one Courier text run per page.
    pub fn fixture_pdf(pages: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });

        let mut kids: Vec<Object> = Vec::new();
        for text in pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 24.into()]),
                    Operation::new("Td", vec![72.into(), 700.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(
                dictionary! {},
                content.encode().expect("encode content"),
            ));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("save fixture pdf");
        bytes
    }
}
