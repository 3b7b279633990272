mod client;
mod device;
mod measurement;
mod parser;
#[cfg(feature = "smb")]
mod smb;

pub use client::*;
pub use device::*;
pub use measurement::*;
pub use parser::*;
#[cfg(feature = "smb")]
pub use smb::*;
