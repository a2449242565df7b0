// longbox: resolves free-text comic metadata queries against the ComicVine
// catalog API and returns ranked, fully populated metadata records.

pub mod client;
pub mod collection;
pub mod config;
pub mod error;
pub mod identify;
pub mod models;
pub mod rank;
pub mod rate_limit;
pub mod resource;
pub mod schema;
pub mod search;
pub mod session;
pub mod title;
pub mod types;

pub use config::Config;
pub use error::ApiError;
pub use models::{IdentifyRequest, Metadata, ScoredResult};
pub use session::Session;
