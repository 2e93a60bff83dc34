use anyhow::Result;
use std::path::Path;

pub fn check_spool(spool_dir: &str, max_mb: u64) -> Result<()> {
    anyhow::ensure!(!spool_dir.trim().is_empty(), "sink.spool_dir is empty");
    let p = Path::new(spool_dir);
    if p.exists() {
        anyhow::ensure!(p.is_dir(), "sink.spool_dir is not a dir: {}", spool_dir);
    }
    anyhow::ensure!(max_mb >= 1, "sink.spool_max_mb too small; set >= 1MB");
    Ok(())
}
