//! On-disk layout of sources and rendered clips.
//!
//! ```text
//! {download_dir}/{job_id}.mp4
//! {output_dir}/{job_id}/clip_{i}.mp4
//! {output_dir}/{job_id}/clip_{i}.ass
//! ```

use std::path::{Path, PathBuf};

use hookclip_models::{clip_filename, JobId};

use crate::error::{StorageError, StorageResult};

/// Storage directories.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    pub download_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("./downloads"),
            output_dir: PathBuf::from("./output"),
        }
    }
}

impl StorageLayout {
    pub fn new(download_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            download_dir: download_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            download_dir: std::env::var("DOWNLOAD_DIR")
                .unwrap_or_else(|_| "./downloads".to_string())
                .into(),
            output_dir: std::env::var("OUTPUT_DIR")
                .unwrap_or_else(|_| "./output".to_string())
                .into(),
        }
    }

    /// Create both directories.
    pub async fn ensure_dirs(&self) -> StorageResult<()> {
        tokio::fs::create_dir_all(&self.download_dir).await?;
        tokio::fs::create_dir_all(&self.output_dir).await?;
        Ok(())
    }

    /// Where a remote source is downloaded to.
    pub fn source_path(&self, job_id: &JobId) -> PathBuf {
        self.download_dir.join(format!("{}.mp4", job_id))
    }

    pub fn job_dir(&self, job_id: &JobId) -> PathBuf {
        self.output_dir.join(job_id.as_str())
    }

    /// Rendered clip `index` (1-based).
    pub fn clip_path(&self, job_id: &JobId, index: u32) -> PathBuf {
        self.job_dir(job_id).join(clip_filename(index))
    }

    /// Caption track of clip `index` (1-based).
    pub fn subtitle_path(&self, job_id: &JobId, index: u32) -> PathBuf {
        self.job_dir(job_id).join(format!("clip_{}.ass", index))
    }

    /// Path of a file a client asked for, rejecting anything outside the job directory.
    pub fn resolve_output_file(&self, job_id: &JobId, filename: &str) -> StorageResult<PathBuf> {
        validate_component(job_id.as_str())?;
        validate_component(filename)?;
        Ok(self.job_dir(job_id).join(filename))
    }
}

fn validate_component(name: &str) -> StorageResult<()> {
    let ok = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
        && Path::new(name).components().count() == 1;
    if ok {
        Ok(())
    } else {
        Err(StorageError::invalid_key(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        let layout = StorageLayout::new("/d", "/o");
        let id = JobId::from_string("abc");
        assert_eq!(layout.source_path(&id), PathBuf::from("/d/abc.mp4"));
        assert_eq!(layout.clip_path(&id, 2), PathBuf::from("/o/abc/clip_2.mp4"));
        assert_eq!(layout.subtitle_path(&id, 2), PathBuf::from("/o/abc/clip_2.ass"));
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let layout = StorageLayout::new("/d", "/o");
        let id = JobId::from_string("abc");
        assert!(layout.resolve_output_file(&id, "clip_1.mp4").is_ok());
        for bad in ["../secret", "..", "a/b.mp4", "", "x\\y"] {
            assert!(layout.resolve_output_file(&id, bad).is_err(), "{}", bad);
        }
        assert!(layout
            .resolve_output_file(&JobId::from_string(".."), "clip_1.mp4")
            .is_err());
    }
}
