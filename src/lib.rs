pub mod builder;
pub mod cli;
pub mod collection;
pub mod config;
pub mod embed;
mod error;
pub mod index;
pub mod matcher;
mod metrics;
mod server;
pub mod store;
pub mod upload;
pub mod utils;

pub use collection::{CollectionService, IngestReport};
pub use config::Opts;
pub use error::{Error, ErrorKind, Result};
pub use matcher::DuplicatePair;
pub use store::{CollectionId, IndexStore};
