use std::sync::atomic::{AtomicU64, Ordering};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;

/// Moves an unreadable database aside so the next open starts fresh.
/// Returns the quarantine path, or `None` if there was nothing to move.
pub fn quarantine_corrupt_file(path: &Utf8Path) -> std::io::Result<Option<Utf8PathBuf>> {
    if !path.exists() {
        return Ok(None);
    }
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let stamp = Utc::now().format("%Y%m%dT%H%M%S").to_string();
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let target = path.with_file_name(format!(
        "{}.corrupt.{stamp}.{}.{seq}",
        path.file_name().unwrap_or(crate::ROLLCALL_REDB_FILENAME),
        std::process::id()
    ));
    tracing::warn!("Log store unreadable, moving it to {}", target);
    std::fs::rename(path, &target)?;
    Ok(Some(target))
}
