mod album;
mod engagement;
mod media;
mod permission;
mod user;

pub use album::*;
pub use engagement::*;
pub use media::*;
pub use permission::*;
pub use user::*;
