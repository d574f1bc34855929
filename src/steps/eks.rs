use super::{sh, stage_template};
use crate::{config::BuildConfig, errors::Result};

pub const EKS_DIR: &str = "/etc/eks";

/// Stages the node bootstrap script and the per-instance-type max-pods
/// table. The bootstrap script joins the machine to a cluster at boot;
/// this build only places it.
pub fn install(cfg: &BuildConfig) -> Result<()> {
    log::info!("staging EKS bootstrap artifacts into {EKS_DIR}");

    sh(&format!("sudo mkdir -p {EKS_DIR}"))?;

    stage_template(cfg, "bootstrap.sh", "/etc/eks/bootstrap.sh")?;
    sh("sudo chmod +x /etc/eks/bootstrap.sh")?;

    stage_template(cfg, "eni-max-pods.txt", "/etc/eks/eni-max-pods.txt")?;

    sh(&format!("sudo chown -R root:root {EKS_DIR}"))?;

    Ok(())
}
