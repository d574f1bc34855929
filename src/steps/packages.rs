use super::sh;
use crate::errors::Result;

/// Fixed list the worker node needs on top of the base image. chrony is
/// here so the time-sync step only has to configure it; the gnupg and
/// ca-certificates pair is for the container runtime apt repository.
const PACKAGES: &[&str] = &[
    "apt-transport-https",
    "ca-certificates",
    "chrony",
    "conntrack",
    "curl",
    "gnupg",
    "ipvsadm",
    "jq",
    "nfs-common",
    "socat",
    "unzip",
    "wget",
];

/// Installs the base OS packages, non-interactive.
pub fn install() -> Result<()> {
    log::info!("installing {} base packages", PACKAGES.len());

    sh("sudo DEBIAN_FRONTEND=noninteractive apt-get update -yq")?;
    sh(&format!(
        "sudo DEBIAN_FRONTEND=noninteractive apt-get install -yq {}",
        PACKAGES.join(" ")
    ))?;
    sh("sudo apt-get clean")?;

    Ok(())
}
