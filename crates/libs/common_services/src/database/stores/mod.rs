mod album_store;
mod memory_album_store;

pub use album_store::*;
pub use memory_album_store::*;
