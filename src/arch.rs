use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};

/// Defines the Arch type, as the release buckets spell it.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ArchType {
    #[serde(rename = "amd64")]
    Amd64,
    #[serde(rename = "arm64")]
    Arm64,
}

impl ArchType {
    /// Returns the `&str` value of the enum member.
    pub fn as_str(&self) -> &str {
        match self {
            ArchType::Amd64 => "amd64",
            ArchType::Arm64 => "arm64",
        }
    }

    /// Maps the kernel machine string ("uname -m") to the release arch.
    /// Anything other than x86_64/aarch64 fails the whole run.
    pub fn from_machine(machine: &str) -> Result<Self> {
        match machine.trim() {
            "x86_64" => Ok(ArchType::Amd64),
            "aarch64" => Ok(ArchType::Arm64),
            other => Err(Error::UnsupportedPlatform {
                machine: other.to_string(),
            }),
        }
    }
}

impl AsRef<str> for ArchType {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl std::fmt::Display for ArchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Detects the arch of the running host machine.
pub fn detect() -> Result<ArchType> {
    let (machine, _) = command_manager::run("uname -m")
        .map(|o| (o.stdout, o.stderr))
        .map_err(|e| Error::Install {
            message: format!("failed uname -m {}", e),
        })?;
    ArchType::from_machine(&machine)
}

/// RUST_LOG=debug cargo test --package eks-ami-provisioner --lib -- arch::test_from_machine --exact --show-output
#[test]
fn test_from_machine() {
    assert_eq!(ArchType::from_machine("x86_64").unwrap(), ArchType::Amd64);
    assert_eq!(ArchType::from_machine("aarch64").unwrap(), ArchType::Arm64);
    assert_eq!(ArchType::from_machine("x86_64\n").unwrap(), ArchType::Amd64);

    let err = ArchType::from_machine("riscv64").unwrap_err();
    assert!(!err.retryable());
    assert!(err.message().contains("riscv64"));
}
