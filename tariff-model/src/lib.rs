pub mod domain;
pub mod error;
pub mod tables;

pub use error::ModelError;
pub use tables::{Cell, TableRecord};
