pub mod access;
pub mod engagement;
