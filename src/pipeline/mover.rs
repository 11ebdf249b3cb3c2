//! File moves that never overwrite.

use std::io;
use std::path::Path;

use tracing::debug;

/// Moves `from` to `to`, creating parent folders.
///
/// Falls back to copy-then-remove when a rename crosses filesystems. An
/// existing file at `to` is an error.
pub async fn relocate(from: &Path, to: &Path) -> io::Result<()> {
    if let Some(parent) = to.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    if tokio::fs::try_exists(to).await? {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("destination exists: {}", to.display()),
        ));
    }

    match tokio::fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Err(error),
        Err(error) => {
            debug!(error = %error, "rename failed; copying instead");
            tokio::fs::copy(from, to).await?;
            if let Err(remove_error) = tokio::fs::remove_file(from).await {
                let _ = tokio::fs::remove_file(to).await;
                return Err(remove_error);
            }
            Ok(())
        }
    }
}
