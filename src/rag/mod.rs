pub mod document;
pub mod engine;
pub mod prompt;
pub mod retriever;

pub use document::InvoiceDocument;
pub use engine::AnswerEngine;
pub use retriever::Retriever;
