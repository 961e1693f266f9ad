mod error;
mod policy;
mod service;

pub use error::*;
pub use policy::*;
pub use service::*;
