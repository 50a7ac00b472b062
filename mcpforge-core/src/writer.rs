//! C7 Output Writer: atomically writes the rendered artifact set into a
//! target directory, computing sha-256 integrity hashes as bytes are
//! written.

use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::model::{Artifact, OutputDescriptor};

pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Normalizes `content` to end in a single trailing newline, then hashes
/// exactly those bytes, so `Artifact::content_hash` always matches what
/// `write_artifacts_to` later writes to disk.
pub fn make_artifact(relative_path: impl Into<String>, mut content: Vec<u8>) -> Artifact {
    if !content.ends_with(b"\n") {
        content.push(b'\n');
    }
    let content_hash = hash_bytes(&content);
    Artifact {
        relative_path: relative_path.into(),
        content,
        content_hash,
    }
}

/// Writes `artifacts` into `target_dir`, atomically: all bytes land in a
/// sibling temp directory first, which is renamed into place only once
/// every artifact is fully written (I6).
pub async fn write_all(
    target_dir: &str,
    artifacts: &[Artifact],
    overwrite: bool,
    cancel: &CancellationToken,
) -> Result<OutputDescriptor> {
    let target = std::path::Path::new(target_dir);
    if target.exists() && !overwrite {
        return Err(Error::OutputExists(target_dir.to_string()));
    }

    let parent = target
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| std::path::PathBuf::from("."));
    let dir_name = target
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("output");
    let temp_dir = parent.join(format!(".{dir_name}.tmp-{}", uuid::Uuid::new_v4()));

    if let Err(e) = write_artifacts_to(&temp_dir, artifacts, cancel).await {
        let _ = tokio::fs::remove_dir_all(&temp_dir).await;
        return Err(e);
    }

    if cancel.is_cancelled() {
        let _ = tokio::fs::remove_dir_all(&temp_dir).await;
        return Err(Error::Cancelled);
    }

    if overwrite && target.exists() {
        tokio::fs::remove_dir_all(target)
            .await
            .map_err(|e| Error::WriteError(e.to_string()))?;
    }

    match tokio::fs::rename(&temp_dir, target).await {
        Ok(()) => {}
        Err(_) => {
            // Cross-filesystem rename isn't atomic; fall back to a copy
            // then delete, with the same end state.
            copy_dir_recursive(&temp_dir, target)
                .await
                .map_err(|e| Error::AtomicRenameFailed(e.to_string()))?;
            tokio::fs::remove_dir_all(&temp_dir)
                .await
                .map_err(|e| Error::AtomicRenameFailed(e.to_string()))?;
        }
    }

    Ok(OutputDescriptor {
        target_dir: target_dir.to_string(),
        files: artifacts.iter().map(|a| a.relative_path.clone()).collect(),
        byte_sizes: artifacts.iter().map(|a| a.content.len() as u64).collect(),
        sha256: artifacts.iter().map(|a| a.content_hash.clone()).collect(),
    })
}

async fn write_artifacts_to(
    temp_dir: &std::path::Path,
    artifacts: &[Artifact],
    cancel: &CancellationToken,
) -> Result<()> {
    tokio::fs::create_dir_all(temp_dir)
        .await
        .map_err(|e| Error::WriteError(e.to_string()))?;

    for artifact in artifacts {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let path = temp_dir.join(&artifact.relative_path);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::WriteError(e.to_string()))?;
        }
        tokio::fs::write(&path, &artifact.content)
            .await
            .map_err(|e| Error::WriteError(e.to_string()))?;
    }
    Ok(())
}

fn copy_dir_recursive<'a>(
    from: &'a std::path::Path,
    to: &'a std::path::Path,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = std::io::Result<()>> + Send + 'a>> {
    Box::pin(async move {
        tokio::fs::create_dir_all(to).await?;
        let mut entries = tokio::fs::read_dir(from).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            let dest = to.join(entry.file_name());
            if file_type.is_dir() {
                copy_dir_recursive(&entry.path(), &dest).await?;
            } else {
                tokio::fs::copy(entry.path(), &dest).await?;
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_are_stable() {
        let a = hash_bytes(b"hello");
        let b = hash_bytes(b"hello");
        assert_eq!(a, b);
        assert_ne!(a, hash_bytes(b"world"));
    }

    #[tokio::test]
    async fn content_hash_matches_bytes_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out");
        let artifact = make_artifact("no-newline.txt", b"no trailing newline".to_vec());
        let expected_hash = artifact.content_hash.clone();
        let cancel = CancellationToken::new();
        let descriptor = write_all(target.to_str().unwrap(), &[artifact], false, &cancel)
            .await
            .unwrap();

        let on_disk = tokio::fs::read(target.join("no-newline.txt")).await.unwrap();
        assert_eq!(hash_bytes(&on_disk), expected_hash);
        assert_eq!(descriptor.sha256[0], expected_hash);
        assert!(on_disk.ends_with(b"\n"));
    }

    #[tokio::test]
    async fn writes_artifacts_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out");
        let artifacts = vec![
            make_artifact("manifest.json", b"{}".to_vec()),
            make_artifact("src/main.rs", b"fn main() {}".to_vec()),
        ];
        let cancel = CancellationToken::new();
        let descriptor = write_all(target.to_str().unwrap(), &artifacts, false, &cancel)
            .await
            .unwrap();
        assert_eq!(descriptor.files.len(), 2);
        assert!(target.join("manifest.json").exists());
        assert!(target.join("src/main.rs").exists());
    }

    #[tokio::test]
    async fn refuses_existing_output_without_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out");
        tokio::fs::create_dir_all(&target).await.unwrap();
        let cancel = CancellationToken::new();
        let err = write_all(target.to_str().unwrap(), &[], false, &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "OUTPUT_EXISTS");
    }

    #[tokio::test]
    async fn cancellation_leaves_no_target_directory() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let artifacts = vec![make_artifact("a.txt", b"x".to_vec())];
        let err = write_all(target.to_str().unwrap(), &artifacts, false, &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CANCELLED");
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn failed_write_leaves_no_target_and_no_temp_dir() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out");
        let cancel = CancellationToken::new();

        // "manifest" lands as a plain file; "manifest/extra.json" then needs
        // its parent to be a directory, which create_dir_all cannot make it.
        let artifacts = vec![
            make_artifact("manifest", b"{}".to_vec()),
            make_artifact("manifest/extra.json", b"{}".to_vec()),
        ];

        let err = write_all(target.to_str().unwrap(), &artifacts, false, &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "WRITE_ERROR");
        assert!(!target.exists());

        let leftover = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .any(|e| e.file_name().to_string_lossy().starts_with(".out.tmp-"));
        assert!(!leftover, "temp directory must be removed after a failed write");
    }
}
