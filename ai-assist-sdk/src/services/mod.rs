//! Outbound service clients
//!
//! `completion` holds the text-completion provider adapter. `common` holds
//! HTTP client construction shared with the request layer.

pub mod completion;
pub(crate) mod common;

pub use common::UserAgent;
pub use completion::{CompletionClient, CompletionProvider};
