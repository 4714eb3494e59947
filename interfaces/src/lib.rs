pub mod defs;
pub mod error;

pub use error::{DossierError, Result};
