use std::path::{Path, PathBuf};

use anyhow::Result;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::info;
use uuid::Uuid;

/// On-disk store for uploaded attachments.
///
/// Files live flat under one directory. The stored name is prefixed with a
/// fresh UUID so two uploads sharing an original filename never collide.
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    pub async fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Upload storage directory: {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_path(&self, stored_name: &str) -> PathBuf {
        self.dir.join(stored_name)
    }

    /// Write the bytes to disk and return the collision-safe stored name.
    pub async fn save(&self, original_name: &str, data: &[u8]) -> Result<String> {
        let stored_name = format!("{}-{}", Uuid::new_v4(), sanitize(original_name));
        let path = self.file_path(&stored_name);

        let mut file = fs::File::create(&path).await?;
        file.write_all(data).await?;
        file.flush().await?;

        Ok(stored_name)
    }
}

/// Strip path components and anything outside a conservative character set,
/// so client-supplied filenames cannot escape the storage directory.
fn sanitize(name: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(name);

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.trim_matches(['.', '_']).is_empty() {
        "upload".to_owned()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("parley-store-test-{}", Uuid::new_v4()))
    }

    #[test]
    fn sanitize_strips_path_components() {
        assert_eq!(sanitize("../../etc/passwd"), "passwd");
        assert_eq!(sanitize(r"C:\temp\evil.png"), "evil.png");
        assert_eq!(sanitize("cat photo.png"), "cat_photo.png");
        assert_eq!(sanitize("..."), "upload");
    }

    #[tokio::test]
    async fn save_writes_bytes_under_unique_name() {
        let store = UploadStore::new(temp_dir()).await.unwrap();

        let first = store.save("cat.png", b"aaa").await.unwrap();
        let second = store.save("cat.png", b"bbb").await.unwrap();
        assert_ne!(first, second);
        assert!(first.ends_with("-cat.png"));

        let bytes = fs::read(store.file_path(&second)).await.unwrap();
        assert_eq!(bytes, b"bbb");

        fs::remove_dir_all(store.dir()).await.unwrap();
    }
}
