use std::path::Path;

use crate::{
    errors::{Error, Result},
    source::ArtifactSource,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use tokio::{
    fs::{self, File},
    io::AsyncReadExt,
};

/// Digest algorithm of the sibling checksum file.
/// The release bucket publishes ".sha256" files next to each binary;
/// the CNI release tarballs ship ".sha512" files.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChecksumAlgorithm {
    #[serde(rename = "sha256")]
    Sha256,
    #[serde(rename = "sha512")]
    Sha512,
}

impl ChecksumAlgorithm {
    /// Returns the `&str` value of the enum member.
    pub fn as_str(&self) -> &str {
        match self {
            ChecksumAlgorithm::Sha256 => "sha256",
            ChecksumAlgorithm::Sha512 => "sha512",
        }
    }

    /// Computes the hex digest of the file at "file_path".
    pub async fn compute(&self, file_path: &str) -> Result<String> {
        let mut f = File::open(file_path).await.map_err(|e| Error::Install {
            message: format!("failed File::open {}", e),
        })?;
        let mut buf = vec![0u8; 64 * 1024];

        match self {
            ChecksumAlgorithm::Sha256 => {
                let mut h = Sha256::new();
                loop {
                    let n = f.read(&mut buf).await.map_err(|e| Error::Install {
                        message: format!("failed File.read {}", e),
                    })?;
                    if n == 0 {
                        break;
                    }
                    h.update(&buf[..n]);
                }
                Ok(hex::encode(h.finalize()))
            }
            ChecksumAlgorithm::Sha512 => {
                let mut h = Sha512::new();
                loop {
                    let n = f.read(&mut buf).await.map_err(|e| Error::Install {
                        message: format!("failed File.read {}", e),
                    })?;
                    if n == 0 {
                        break;
                    }
                    h.update(&buf[..n]);
                }
                Ok(hex::encode(h.finalize()))
            }
        }
    }
}

impl AsRef<str> for ChecksumAlgorithm {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// One artifact to fetch, verify, and install. Built from the build
/// configuration, consumed once.
#[derive(Debug, Clone)]
pub struct ArtifactSpec {
    /// File name under the source base (also the sibling checksum file
    /// name, minus the algorithm suffix).
    pub name: String,
    pub checksum: ChecksumAlgorithm,
    /// Directory the verified artifact lands in.
    pub dest_dir: String,
}

impl ArtifactSpec {
    pub fn new(name: &str, checksum: ChecksumAlgorithm, dest_dir: &str) -> Self {
        Self {
            name: name.to_string(),
            checksum,
            dest_dir: dest_dir.to_string(),
        }
    }
}

/// Fetches, verifies, and installs a single executable into the
/// destination directory, overwriting any prior version.
pub async fn install_executable(source: &ArtifactSource, spec: &ArtifactSpec) -> Result<()> {
    let tmp_path = fetch_verified(source, spec).await?;
    promote_executable(&tmp_path, &spec.dest_dir, &spec.name).await
}

/// Fetches and verifies a ".tgz" bundle, then unpacks it into the
/// destination directory (the shared CNI plugin directory).
pub async fn install_bundle(source: &ArtifactSource, spec: &ArtifactSpec) -> Result<()> {
    let tmp_path = fetch_verified(source, spec).await?;

    fs::create_dir_all(&spec.dest_dir)
        .await
        .map_err(|e| Error::Install {
            message: format!("failed create_dir_all {}", e),
        })?;

    log::info!("unpacking '{}' to '{}'", spec.name, spec.dest_dir);
    let unpacked = compress_manager::unpack_directory(
        &tmp_path,
        &spec.dest_dir,
        compress_manager::DirDecoder::TarGzip,
    )
    .map_err(|e| Error::Install {
        message: format!("failed unpack_directory {}", e),
    });

    // the archive is spent either way
    fs::remove_file(&tmp_path).await.ok();
    unpacked?;

    Ok(())
}

/// Downloads the artifact and its sibling checksum file to temporary
/// paths and compares digests. Returns the temporary path of the
/// verified artifact; on any failure both temporaries are gone and the
/// destination directory was never touched.
async fn fetch_verified(source: &ArtifactSource, spec: &ArtifactSpec) -> Result<String> {
    let tmp_path = random_manager::tmp_path(15, None).map_err(|e| Error::Install {
        message: format!("failed random_manager::tmp_path {}", e),
    })?;
    let tmp_checksum_path = format!("{}.{}", tmp_path, spec.checksum.as_str());

    let fetched = fetch_pair(source, spec, &tmp_path, &tmp_checksum_path).await;
    let verified = match fetched {
        Ok(expected) => verify(&tmp_path, &expected, spec).await,
        Err(e) => Err(e),
    };

    // never leave the checksum temporary behind, verified or not
    fs::remove_file(&tmp_checksum_path).await.ok();
    if let Err(e) = verified {
        fs::remove_file(&tmp_path).await.ok();
        return Err(e);
    }

    Ok(tmp_path)
}

async fn fetch_pair(
    source: &ArtifactSource,
    spec: &ArtifactSpec,
    tmp_path: &str,
    tmp_checksum_path: &str,
) -> Result<String> {
    source.fetch(&spec.name, tmp_path).await?;
    source
        .fetch(
            &format!("{}.{}", spec.name, spec.checksum.as_str()),
            tmp_checksum_path,
        )
        .await?;

    let contents = fs::read_to_string(tmp_checksum_path)
        .await
        .map_err(|e| Error::Install {
            message: format!("failed read_to_string {}", e),
        })?;
    parse_checksum_file(&contents).ok_or_else(|| Error::Fetch {
        message: format!(
            "checksum file for '{}' is empty or malformed",
            spec.name
        ),
        retryable: false,
    })
}

async fn verify(tmp_path: &str, expected: &str, spec: &ArtifactSpec) -> Result<()> {
    let computed = spec.checksum.compute(tmp_path).await?;
    if computed != expected {
        return Err(Error::Integrity {
            artifact: spec.name.clone(),
            expected: expected.to_string(),
            computed,
        });
    }
    log::info!(
        "verified '{}' ({} {})",
        spec.name,
        spec.checksum.as_str(),
        computed
    );
    Ok(())
}

/// First token of a "sha256sum"-style sibling file: `<digest>  <name>`.
fn parse_checksum_file(contents: &str) -> Option<String> {
    contents
        .split_whitespace()
        .next()
        .map(|s| s.to_ascii_lowercase())
}

/// Marks the verified temporary executable and moves it into place.
/// Copy + remove rather than rename; "/tmp" and the destination are
/// usually different filesystems.
async fn promote_executable(tmp_path: &str, dest_dir: &str, name: &str) -> Result<()> {
    fs::create_dir_all(dest_dir)
        .await
        .map_err(|e| Error::Install {
            message: format!("failed create_dir_all {}", e),
        })?;

    {
        let f = File::open(tmp_path).await.map_err(|e| Error::Install {
            message: format!("failed File::open {}", e),
        })?;
        f.set_permissions(std::os::unix::fs::PermissionsExt::from_mode(0o755))
            .await
            .map_err(|e| Error::Install {
                message: format!("failed File::set_permissions {}", e),
            })?;
    }

    let target_file_path = Path::new(dest_dir).join(name);
    let target_file_path = target_file_path.display().to_string();
    log::info!("copying '{tmp_path}' to '{target_file_path}'");
    fs::copy(tmp_path, &target_file_path)
        .await
        .map_err(|e| Error::Install {
            message: format!("failed fs::copy {}", e),
        })?;
    fs::remove_file(tmp_path).await.map_err(|e| Error::Install {
        message: format!("failed fs::remove_file {}", e),
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn test_parse_checksum_file() {
        assert_eq!(
            parse_checksum_file("2CF24DBA5FB0A30E  kubelet\n").unwrap(),
            "2cf24dba5fb0a30e"
        );
        assert_eq!(parse_checksum_file("abc123").unwrap(), "abc123");
        assert!(parse_checksum_file("").is_none());
        assert!(parse_checksum_file("   \n").is_none());
    }

    #[tokio::test]
    async fn test_compute() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("artifact");
        std::fs::write(&p, b"hello").unwrap();
        let p = p.display().to_string();

        assert_eq!(
            ChecksumAlgorithm::Sha256.compute(&p).await.unwrap(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(
            ChecksumAlgorithm::Sha512.compute(&p).await.unwrap(),
            "9b71d224bd62f3785d96d46ad3ea3d73319bfbc2890caadae2dff72519673ca72323c3d99ba5c11d7c7acc6e14b8c5da0c4663475c2e5c3adef46f73bcdec043"
        );
    }

    #[tokio::test]
    async fn test_verify_mismatch_leaves_destination_alone() {
        let dir = tempfile::tempdir().unwrap();
        let tmp = dir.path().join("downloaded");
        std::fs::write(&tmp, b"corrupted bytes").unwrap();
        let tmp = tmp.display().to_string();

        let dest_dir = dir.path().join("bin");
        std::fs::create_dir_all(&dest_dir).unwrap();
        let prior = dest_dir.join("kubelet");
        std::fs::write(&prior, b"prior version").unwrap();

        let spec = ArtifactSpec::new(
            "kubelet",
            ChecksumAlgorithm::Sha256,
            &dest_dir.display().to_string(),
        );
        let err = verify(
            &tmp,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824",
            &spec,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Integrity { .. }));

        // abort happened before any chmod/move
        assert_eq!(std::fs::read(&prior).unwrap(), b"prior version");
    }

    #[tokio::test]
    async fn test_verify_match_is_repeatable() {
        let dir = tempfile::tempdir().unwrap();
        let tmp = dir.path().join("downloaded");
        std::fs::write(&tmp, b"hello").unwrap();
        let tmp = tmp.display().to_string();

        let spec = ArtifactSpec::new("aws-iam-authenticator", ChecksumAlgorithm::Sha256, "/usr/bin");
        let expected = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";
        verify(&tmp, expected, &spec).await.unwrap();
        verify(&tmp, expected, &spec).await.unwrap();
    }

    /// Serves a release layout over loopback HTTP and runs the whole
    /// fetch-verify-install flow against it.
    #[tokio::test]
    async fn test_install_executable_via_http() {
        use crate::source::ArtifactSource;

        // sha256 of b"hello"
        const GOOD: &[u8] =
            b"2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824  aws-iam-authenticator\n";

        let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
        let port = server.server_addr().to_ip().unwrap().port();
        std::thread::spawn(move || {
            for req in server.incoming_requests() {
                let body: Vec<u8> = if req.url().ends_with(".sha256") {
                    GOOD.to_vec()
                } else if req.url().ends_with("/corrupted") {
                    b"not the expected bytes".to_vec()
                } else {
                    b"hello".to_vec()
                };
                req.respond(tiny_http::Response::from_data(body)).ok();
            }
        });

        let dir = tempfile::tempdir().unwrap();
        let dest_dir = dir.path().join("bin");
        let source = ArtifactSource::http(&format!(
            "http://127.0.0.1:{port}/1.21.2/2021-07-31/bin/linux/amd64"
        ));

        let spec = ArtifactSpec::new(
            "aws-iam-authenticator",
            ChecksumAlgorithm::Sha256,
            &dest_dir.display().to_string(),
        );
        install_executable(&source, &spec).await.unwrap();

        let installed = dest_dir.join("aws-iam-authenticator");
        assert_eq!(std::fs::read(&installed).unwrap(), b"hello");
        let mode = std::fs::metadata(&installed).unwrap().permissions().mode();
        assert_ne!(mode & 0o111, 0);

        // re-running installs the same bytes
        install_executable(&source, &spec).await.unwrap();
        assert_eq!(std::fs::read(&installed).unwrap(), b"hello");

        // a corrupted download aborts and never reaches the destination
        let spec = ArtifactSpec::new(
            "corrupted",
            ChecksumAlgorithm::Sha256,
            &dest_dir.display().to_string(),
        );
        let err = install_executable(&source, &spec).await.unwrap_err();
        assert!(matches!(err, Error::Integrity { .. }));
        assert!(!dest_dir.join("corrupted").exists());
    }

    #[tokio::test]
    async fn test_promote_executable_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let tmp = dir.path().join("downloaded");
        std::fs::write(&tmp, b"new version").unwrap();

        let dest_dir = dir.path().join("bin");
        std::fs::create_dir_all(&dest_dir).unwrap();
        std::fs::write(dest_dir.join("kubectl"), b"old version").unwrap();

        promote_executable(
            &tmp.display().to_string(),
            &dest_dir.display().to_string(),
            "kubectl",
        )
        .await
        .unwrap();

        let installed = dest_dir.join("kubectl");
        assert_eq!(std::fs::read(&installed).unwrap(), b"new version");
        let mode = std::fs::metadata(&installed).unwrap().permissions().mode();
        assert_eq!(mode & 0o755, 0o755);
        // the temporary is consumed by the move
        assert!(!tmp.exists());
    }
}
