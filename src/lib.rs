#![cfg_attr(doc, doc = include_str!("../README.md"))]

pub mod error;
pub(crate) mod serde_helpers;
pub mod stream;
pub mod types;
pub mod ws;

pub use error::{Error, Kind};
pub use stream::{DEFAULT_ENDPOINT, EventStream, Shutdown};
pub use types::Message;

pub type Result<T> = std::result::Result<T, Error>;
