pub mod error;
pub mod freshness;
pub mod iqair;
pub mod mqtt;
pub mod poll;

pub use error::{Error, Result, ShareError};
