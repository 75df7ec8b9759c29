pub mod chunking;
pub mod pdf_text;

pub use chunking::{ChunkingError, chunk_text, clean_text};
pub use pdf_text::{ExtractionError, extract_text, extract_text_blocking};
