pub mod processor;

pub use processor::{corpus_fingerprint, list_pdf_files, load_pdf_directory, Document, PdfError};
