//! Publishing rendered clips to YouTube Shorts.
//!
//! Uploads rotate round-robin over a pool of linked accounts; a failed
//! upload moves on to the next account until every account was tried once.

pub mod config;
pub mod error;
pub mod metadata;
pub mod platform;
pub mod pool;
pub mod uploader;

pub use config::PublishConfig;
pub use error::{PublishError, PublishResult};
pub use metadata::ClipMetadata;
pub use platform::{OAuthTokens, VideoPlatform, YouTubeClient};
pub use pool::{AccountPool, AccountStats};
pub use uploader::{PublishedVideo, Uploader};
