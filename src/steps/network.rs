use super::{sh, stage_template, write_file_as_root};
use crate::{config::BuildConfig, errors::Result};

const SYSCTL_CONF_PATH: &str = "/etc/sysctl.d/99-kubernetes-cri.conf";
const SYSCTL_CONF: &str = "net.bridge.bridge-nf-call-ip6tables = 1
net.bridge.bridge-nf-call-iptables = 1
net.ipv4.ip_forward = 1
";

/// Where the restore-on-boot unit expects the persisted rules.
const IPTABLES_RULES_PATH: &str = "/etc/sysconfig/iptables";
const IPTABLES_RESTORE_UNIT_PATH: &str = "/etc/systemd/system/iptables-restore.service";

/// Enables forwarding, persists the current firewall rules, and
/// installs the restore-on-boot unit staged by the orchestrator.
pub fn configure(cfg: &BuildConfig) -> Result<()> {
    log::info!("configuring forwarding and the iptables restore unit");

    write_file_as_root(SYSCTL_CONF, SYSCTL_CONF_PATH, "0644")?;
    sh("sudo sysctl --system")?;

    let (rules, _) = sh("sudo iptables-save")?;
    write_file_as_root(&rules, IPTABLES_RULES_PATH, "0644")?;

    stage_template(cfg, "iptables-restore.service", IPTABLES_RESTORE_UNIT_PATH)?;
    sh("sudo systemctl daemon-reload")?;
    sh("sudo systemctl enable iptables-restore")?;

    Ok(())
}
