use std::fs;

use super::{sh, write_file_as_root};
use crate::errors::{Error, Result};

const CHRONY_CONF_PATH: &str = "/etc/chrony/chrony.conf";

/// Link-local Amazon Time Sync endpoint, reachable from any instance.
/// ref. https://docs.aws.amazon.com/AWSEC2/latest/UserGuide/set-time.html
const AMAZON_TIME_SYNC_SERVER: &str =
    "server 169.254.169.123 prefer iburst minpoll 4 maxpoll 4";

const CURRENT_CLOCK_SOURCE_PATH: &str =
    "/sys/devices/system/clocksource/clocksource0/current_clocksource";
const AVAILABLE_CLOCK_SOURCE_PATH: &str =
    "/sys/devices/system/clocksource/clocksource0/available_clocksource";

/// Points chrony at the Amazon Time Sync endpoint and switches the
/// kernel clock source off xen when tsc is available.
pub fn configure() -> Result<()> {
    sh("sudo timedatectl set-ntp on")?;

    let contents = fs::read_to_string(CHRONY_CONF_PATH).map_err(|e| Error::Install {
        message: format!("failed to read {CHRONY_CONF_PATH} {}", e),
    })?;
    match amend_chrony_conf(&contents) {
        Some(amended) => write_file_as_root(&amended, CHRONY_CONF_PATH, "0644")?,
        None => log::warn!("chrony already points at the Amazon Time Sync endpoint, skipping"),
    }

    sh("sudo systemctl enable chrony")?;
    sh("sudo systemctl restart chrony")?;

    // If current clocksource is xen, switch to tsc
    let current = fs::read_to_string(CURRENT_CLOCK_SOURCE_PATH).unwrap_or_default();
    let available = fs::read_to_string(AVAILABLE_CLOCK_SOURCE_PATH).unwrap_or_default();
    if current.contains("xen") && available.contains("tsc") {
        sh(&format!(
            "echo tsc | sudo tee {CURRENT_CLOCK_SOURCE_PATH}"
        ))?;
    } else {
        log::info!("tsc as a clock source is not applicable, skipping");
    }

    Ok(())
}

/// Returns the amended config, or "None" when the endpoint line is
/// already present.
fn amend_chrony_conf(contents: &str) -> Option<String> {
    if contents.contains("169.254.169.123") {
        return None;
    }

    let mut amended = String::from(contents);
    if !amended.ends_with('\n') {
        amended.push('\n');
    }
    amended.push_str(AMAZON_TIME_SYNC_SERVER);
    amended.push('\n');
    Some(amended)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amend_chrony_conf() {
        let amended = amend_chrony_conf("pool ntp.ubuntu.com iburst").unwrap();
        assert!(amended.starts_with("pool ntp.ubuntu.com iburst\n"));
        assert!(amended.ends_with(&format!("{AMAZON_TIME_SYNC_SERVER}\n")));

        // repeated amends converge
        assert!(amend_chrony_conf(&amended).is_none());
        assert!(amend_chrony_conf("server 169.254.169.123 prefer iburst\n").is_none());
    }
}
