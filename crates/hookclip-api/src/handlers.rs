//! Request handlers.

pub mod admin;
pub mod clips;
pub mod health;
pub mod jobs;
pub mod upload;

pub use admin::*;
pub use clips::*;
pub use health::*;
pub use jobs::*;
pub use upload::*;
