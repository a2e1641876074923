pub mod charge;
pub mod client;
pub mod notification;
pub mod profile;

pub use charge::*;
pub use client::*;
pub use notification::*;
pub use profile::*;
