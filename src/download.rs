//! Saving the generated image.

use crate::error::Result;
use crate::image::EncodedImage;
use async_trait::async_trait;
use std::path::PathBuf;

/// File name used for every download.
pub const DOWNLOAD_FILENAME: &str = "cartoonified-image.png";

/// Destination for a downloaded image.
#[async_trait]
pub trait ImageSink: Send + Sync {
    /// Saves `image` under `filename`.
    async fn save(&self, filename: &str, image: &EncodedImage) -> Result<()>;
}

/// Writes downloads into a directory.
#[derive(Debug, Clone)]
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    /// Creates a sink writing into `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the path a download with `filename` lands at.
    pub fn path_for(&self, filename: &str) -> PathBuf {
        self.dir.join(filename)
    }
}

#[async_trait]
impl ImageSink for FileSink {
    async fn save(&self, filename: &str, image: &EncodedImage) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(filename);
        tokio::fs::write(&path, &image.data).await?;
        tracing::info!(path = %path.display(), size = image.size(), "saved image");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_sink_writes_exact_bytes() {
        let dir = tempdir().unwrap();
        let sink = FileSink::new(dir.path());
        let image = EncodedImage::new("image/png", vec![1, 2, 3, 4]);

        sink.save(DOWNLOAD_FILENAME, &image).await.unwrap();

        let written = std::fs::read(dir.path().join(DOWNLOAD_FILENAME)).unwrap();
        assert_eq!(written, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_file_sink_creates_missing_directory() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("out").join("images");
        let sink = FileSink::new(&nested);
        let image = EncodedImage::new("image/png", vec![9, 9]);

        sink.save(DOWNLOAD_FILENAME, &image).await.unwrap();

        assert_eq!(sink.path_for(DOWNLOAD_FILENAME), nested.join(DOWNLOAD_FILENAME));
        assert_eq!(std::fs::read(nested.join(DOWNLOAD_FILENAME)).unwrap(), vec![9, 9]);
    }
}
