//! Shared stored-file removal used by the avatar and post-image flows.

use rf_core::{MediaApi, StoredFile};
use std::sync::Arc;

/// Best-effort delete of the stored file behind a public url: resolve the
/// record by url, then delete by id. Returns whether the file is gone;
/// every failure is logged and absorbed.
pub(crate) async fn delete_stored_file_by_url(media: &Arc<dyn MediaApi>, url: &str) -> bool {
    match media.find_by_url(url).await {
        Ok(Some(StoredFile {
            id: Some(file_id), ..
        })) => match media.delete(&file_id).await {
            Ok(()) => true,
            Err(err) => {
                log::warn!("failed to delete stored file {file_id} ({url}): {err}");
                false
            }
        },
        Ok(Some(_)) => {
            log::warn!("stored file record for {url} has no id; cannot delete it");
            false
        }
        Ok(None) => {
            log::warn!("no stored file record found for {url}");
            false
        }
        Err(err) => {
            log::warn!("stored file lookup failed for {url}: {err}");
            false
        }
    }
}
