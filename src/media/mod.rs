pub mod mime;
pub mod probe;
pub mod title;
