use std::{path::Path, thread, time::Instant};

use crate::errors::{Error, Result};
use tokio::time::Duration;

/// cloud-init touches this when the first-boot run is done.
const BOOT_FINISHED_PATH: &str = "/var/lib/cloud/instance/boot-finished";

/// Blocks until the host's first-boot initialization service reports
/// completion. Package installs race with cloud-init's own apt usage
/// otherwise.
pub fn wait_for_cloud_init(timeout: Duration, interval: Duration) -> Result<()> {
    wait_for_path(BOOT_FINISHED_PATH, timeout, interval)
}

pub fn wait_for_path(path: &str, timeout: Duration, interval: Duration) -> Result<()> {
    log::info!(
        "waiting for '{path}' with timeout {:?} and interval {:?}",
        timeout,
        interval
    );

    let start = Instant::now();
    let mut cnt: u128 = 0;
    loop {
        let elapsed = start.elapsed();
        if elapsed.gt(&timeout) {
            break;
        }

        let itv = {
            if cnt == 0 {
                // first poll with no wait
                Duration::from_millis(100)
            } else {
                interval
            }
        };
        thread::sleep(itv);

        if Path::new(path).exists() {
            log::info!("'{path}' present (elapsed {:?})", start.elapsed());
            return Ok(());
        }

        cnt += 1;
    }

    Err(Error::Install {
        message: format!("'{path}' did not appear in time"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_for_path() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("boot-finished");
        std::fs::write(&p, b"done").unwrap();
        wait_for_path(
            &p.display().to_string(),
            Duration::from_secs(1),
            Duration::from_millis(10),
        )
        .unwrap();

        let missing = dir.path().join("never");
        let err = wait_for_path(
            &missing.display().to_string(),
            Duration::from_millis(200),
            Duration::from_millis(50),
        )
        .unwrap_err();
        assert!(err.message().contains("did not appear"));
    }
}
