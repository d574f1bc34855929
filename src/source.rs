use crate::{
    arch::ArchType,
    config::BuildConfig,
    errors::{Error, Result},
    s3,
};
use reqwest::ClientBuilder;
use tokio::{fs::File, io::AsyncWriteExt, time::Duration};

/// Where release artifacts are fetched from. Selected exactly once at
/// startup; every artifact in a run goes through the same variant.
#[derive(Debug, Clone)]
pub enum ArtifactSource {
    /// Authenticated object-storage API; works for private buckets.
    ObjectStore {
        manager: s3::Manager,
        bucket: String,
        key_prefix: String,
    },
    /// Anonymous HTTPS; public buckets (and public release hosts) only.
    Http { url_base: String },
}

impl ArtifactSource {
    /// Picks the source for the release binary bucket. With ambient
    /// credentials present the private-capable object-storage client is
    /// used; without them, plain anonymous fetches against the public
    /// bucket endpoint.
    pub async fn for_bucket(cfg: &BuildConfig, arch: ArchType) -> Self {
        if cfg.aws_credentials {
            log::info!("access key present; fetching binaries via the object-storage API");
            let shared_config = s3::load_config(&cfg.binary_bucket_region).await;
            ArtifactSource::ObjectStore {
                manager: s3::Manager::new(&shared_config),
                bucket: cfg.binary_bucket_name.clone(),
                key_prefix: cfg.binary_key_prefix(arch),
            }
        } else {
            log::info!("no access key; fetching binaries anonymously (public bucket only)");
            ArtifactSource::Http {
                url_base: cfg.public_url_base(arch),
            }
        }
    }

    /// An anonymous source rooted at "url_base", for artifacts that are
    /// public regardless of credentials (the CNI release tarballs).
    pub fn http(url_base: &str) -> Self {
        ArtifactSource::Http {
            url_base: url_base.to_string(),
        }
    }

    /// Returns the `&str` name of the variant.
    pub fn as_str(&self) -> &str {
        match self {
            ArtifactSource::ObjectStore { .. } => "object-store",
            ArtifactSource::Http { .. } => "http",
        }
    }

    /// Fetches the named artifact into "file_path".
    pub async fn fetch(&self, name: &str, file_path: &str) -> Result<()> {
        match self {
            ArtifactSource::ObjectStore {
                manager,
                bucket,
                key_prefix,
            } => {
                let key = format!("{key_prefix}/{name}");
                log::info!("fetching 's3://{bucket}/{key}' to '{file_path}'");
                manager.get_object(bucket, &key, file_path).await
            }
            ArtifactSource::Http { url_base } => {
                let url = format!("{url_base}/{name}");
                http_get_to_file(&url, file_path).await
            }
        }
    }
}

impl AsRef<str> for ArtifactSource {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Streams an anonymous GET response into "file_path".
pub(crate) async fn http_get_to_file(url: &str, file_path: &str) -> Result<()> {
    log::info!("fetching '{url}' to '{file_path}'");

    let cli = ClientBuilder::new()
        .user_agent(env!("CARGO_PKG_NAME"))
        .timeout(Duration::from_secs(300))
        .build()
        .map_err(|e| Error::Fetch {
            message: format!("failed ClientBuilder build {:?}", e),
            retryable: false,
        })?;
    let mut resp = cli.get(url).send().await.map_err(|e| Error::Fetch {
        message: format!("failed GET {url} {:?}", e),
        retryable: e.is_timeout() || e.is_connect(),
    })?;
    if !resp.status().is_success() {
        return Err(Error::Fetch {
            message: format!("GET {url} returned status {}", resp.status()),
            retryable: resp.status().is_server_error(),
        });
    }

    let mut file = File::create(file_path).await.map_err(|e| Error::Install {
        message: format!("failed File::create {}", e),
    })?;
    let mut written: f64 = 0.0;
    while let Some(chunk) = resp.chunk().await.map_err(|e| Error::Fetch {
        message: format!("failed to read chunk {:?}", e),
        retryable: false,
    })? {
        written += chunk.len() as f64;
        file.write_all(&chunk).await.map_err(|e| Error::Install {
            message: format!("failed File.write_all {}", e),
        })?;
    }
    file.flush().await.map_err(|e| Error::Install {
        message: format!("failed File.flush {}", e),
    })?;

    log::info!("downloaded {} from '{url}'", human_readable::bytes(written));
    Ok(())
}
