/// Image file storage collaborator, rooted at the uploads directory.
use crate::error::{AppError, Result};
use std::path::{Path, PathBuf};

pub struct ImageStorage {
    root: PathBuf,
}

impl ImageStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub async fn ensure_root(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    pub fn path_for(&self, filename: &str) -> PathBuf {
        self.root.join(filename)
    }

    pub async fn save_file(&self, bytes: &[u8], filename: &str) -> Result<PathBuf> {
        self.ensure_root().await?;
        let path = self.path_for(filename);
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    pub async fn read_file(&self, filename: &str) -> Result<Vec<u8>> {
        let path = self.path_for(filename);
        tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::NotFound(format!("image file {filename} does not exist"))
            } else {
                e.into()
            }
        })
    }

    pub fn exists(&self, filename: &str) -> bool {
        self.path_for(filename).exists()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
