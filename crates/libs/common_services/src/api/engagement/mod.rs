mod error;
mod interfaces;
mod service;

pub use error::*;
pub use interfaces::*;
pub use service::*;
