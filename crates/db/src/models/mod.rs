mod document;
mod round_document;

pub(crate) use document::datetime_to_timestamp;
pub use document::{Document, DocumentRow};
pub use round_document::RoundDocument;
