//! Shared test helpers.

pub mod mock_document_store;
pub mod mock_upstream;
