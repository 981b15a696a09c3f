//! Local storage for HookClip.
//!
//! - Directory layout for downloaded sources and rendered clips
//! - Byte-range file reads for clip streaming
//! - HMAC-signed delivery tokens
//! - Output retention and the periodic sweeper

pub mod cleanup;
pub mod delivery;
pub mod error;
pub mod layout;
pub mod operations;

pub use cleanup::{schedule_delete, sweep_dir, RetentionConfig, SweepReport, Sweeper};
pub use delivery::{DeliveryConfig, DeliverySigner, DeliveryToken};
pub use error::{StorageError, StorageResult, TokenError};
pub use layout::StorageLayout;
pub use operations::{delete_file, dir_size, open_file, parse_range, remove_dir, ByteRange, FileReader};
