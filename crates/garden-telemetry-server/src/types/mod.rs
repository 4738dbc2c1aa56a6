//! Data types used by the HTTP layer.

pub mod api;
pub mod error;

pub use api::*;
pub use error::*;
