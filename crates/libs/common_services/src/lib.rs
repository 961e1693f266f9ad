#![deny(clippy::unwrap_used)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_inception,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap
)]

pub mod api;
pub mod api_client;
pub mod database;
pub mod document_store;
pub mod error;
pub mod identity;
pub mod utils;
