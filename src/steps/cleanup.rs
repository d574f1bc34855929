use std::{fs, io, path::Path};

use super::sh;
use crate::errors::{Error, Result};

/// Removal targets, relative to the filesystem root so the pass can be
/// exercised against a scratch tree. Order does not matter and nothing
/// here is required to exist.
const CLEANUP_PATHS: &[&str] = &[
    "etc/hostname",
    "etc/resolv.conf",
    "home/ubuntu/.ssh/authorized_keys",
    "root/.ssh/authorized_keys",
    "home/ubuntu/.aws",
    "home/ubuntu/.bash_history",
    "root/.bash_history",
    "var/lib/cloud/data",
    "var/lib/cloud/instance",
    "var/lib/cloud/instances",
    "var/lib/cloud/sem",
    "var/lib/dhcp",
    "var/lib/apt/lists",
    "var/log/cloud-init-output.log",
    "var/log/cloud-init.log",
    "var/log/auth.log",
    "var/log/wtmp",
];

const SSH_DIR: &str = "etc/ssh";
const SSH_HOST_KEY_PREFIX: &str = "ssh_host_";

const MACHINE_ID_PATH: &str = "etc/machine-id";

/// Scrubs build-time caches, host identity, and credential remnants so
/// the snapshotted image starts clean.
pub fn run() -> Result<()> {
    log::info!("cleaning up the image before snapshot");

    sh("sudo apt-get clean")?;
    scrub(Path::new("/"))?;
    sh("sudo rm -rf /tmp/*")?;

    Ok(())
}

/// The deletion pass itself, rooted at "root".
pub fn scrub(root: &Path) -> Result<()> {
    for rel in CLEANUP_PATHS.iter() {
        remove_any(&root.join(rel))?;
    }

    // host keys are regenerated on first boot of the new instance
    let ssh_dir = root.join(SSH_DIR);
    if ssh_dir.is_dir() {
        let entries = fs::read_dir(&ssh_dir).map_err(|e| Error::Install {
            message: format!("failed read_dir {}", e),
        })?;
        for entry in entries {
            let entry = entry.map_err(|e| Error::Install {
                message: format!("failed read_dir entry {}", e),
            })?;
            if entry
                .file_name()
                .to_string_lossy()
                .starts_with(SSH_HOST_KEY_PREFIX)
            {
                remove_any(&entry.path())?;
            }
        }
    }

    // an empty machine-id makes systemd mint a fresh one on first boot
    let machine_id = root.join(MACHINE_ID_PATH);
    remove_any(&machine_id)?;
    if let Some(parent) = machine_id.parent() {
        if parent.is_dir() {
            fs::write(&machine_id, b"").map_err(|e| Error::Install {
                message: format!("failed to recreate machine-id {}", e),
            })?;
        }
    }

    Ok(())
}

/// Removes a file or a directory tree; a missing target is fine.
fn remove_any(path: &Path) -> Result<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(Error::Install {
                message: format!("failed metadata for '{}' {}", path.display(), e),
            })
        }
    };

    log::info!("removing '{}'", path.display());
    let removed = if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match removed {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Install {
            message: format!("failed to remove '{}' {}", path.display(), e),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scrub_partial_tree() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        // half the targets present, half absent
        fs::create_dir_all(root.join("etc/ssh")).unwrap();
        fs::create_dir_all(root.join("home/ubuntu/.aws")).unwrap();
        fs::create_dir_all(root.join("var/lib/cloud/instances/i-0abc")).unwrap();
        fs::write(root.join("etc/hostname"), b"build-host").unwrap();
        fs::write(root.join("etc/machine-id"), b"0123456789abcdef").unwrap();
        fs::write(root.join("etc/ssh/ssh_host_rsa_key"), b"secret").unwrap();
        fs::write(root.join("etc/ssh/ssh_host_rsa_key.pub"), b"public").unwrap();
        fs::write(root.join("etc/ssh/sshd_config"), b"keep me").unwrap();
        fs::write(root.join("home/ubuntu/.aws/credentials"), b"aws key").unwrap();

        scrub(root).unwrap();

        assert!(!root.join("etc/hostname").exists());
        assert!(!root.join("etc/ssh/ssh_host_rsa_key").exists());
        assert!(!root.join("etc/ssh/ssh_host_rsa_key.pub").exists());
        assert!(!root.join("home/ubuntu/.aws").exists());
        assert!(!root.join("var/lib/cloud/instances").exists());

        // non-identity config survives
        assert!(root.join("etc/ssh/sshd_config").exists());

        // machine-id recreated empty
        assert_eq!(fs::read(root.join("etc/machine-id")).unwrap(), b"");

        // the pass is idempotent
        scrub(root).unwrap();
        scrub(root).unwrap();
    }
}
