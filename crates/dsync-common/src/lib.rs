pub mod error;

pub use error::{DsyncError, Result};
