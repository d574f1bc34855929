use crate::errors::{Error, Result};
use reqwest::ClientBuilder;
use tokio::time::Duration;

/// Fetches the AMI id the host instance was launched from.
/// ref. https://docs.aws.amazon.com/AWSEC2/latest/UserGuide/instancedata-data-categories.html
pub async fn fetch_ami_id() -> Result<String> {
    fetch_metadata_by_path("ami-id").await
}

/// Fetches instance metadata service v2 with the "path".
/// ref. https://docs.aws.amazon.com/AWSEC2/latest/UserGuide/instancedata-data-retrieval.html
/// ref. https://docs.aws.amazon.com/AWSEC2/latest/UserGuide/configuring-instance-metadata-service.html
/// e.g., curl -H "X-aws-ec2-metadata-token: $TOKEN" -v http://169.254.169.254/latest/meta-data/ami-id
pub async fn fetch_metadata_by_path(path: &str) -> Result<String> {
    log::info!("fetching meta-data/{}", path);

    let token = fetch_token().await?;

    let uri = format!("http://169.254.169.254/latest/meta-data/{}", path);
    let cli = ClientBuilder::new()
        .user_agent(env!("CARGO_PKG_NAME"))
        .timeout(Duration::from_secs(15))
        .build()
        .map_err(|e| Error::Fetch {
            message: format!("failed ClientBuilder build {:?}", e),
            retryable: false,
        })?;
    let resp = cli
        .get(&uri)
        .header("X-aws-ec2-metadata-token", token)
        .send()
        .await
        .map_err(|e| Error::Fetch {
            message: format!("failed GET meta-data/{} {:?}", path, e),
            retryable: e.is_timeout() || e.is_connect(),
        })?;
    let out = resp.bytes().await.map_err(|e| Error::Fetch {
        message: format!("failed to read bytes {:?}", e),
        retryable: false,
    })?;
    let out: Vec<u8> = out.into();

    match String::from_utf8(out) {
        Ok(text) => Ok(text),
        Err(e) => Err(Error::Fetch {
            message: format!("GET meta-data/{} failed String::from_utf8 ({})", path, e),
            retryable: false,
        }),
    }
}

/// Serves session token for instance metadata service v2.
/// ref. https://docs.aws.amazon.com/AWSEC2/latest/UserGuide/configuring-instance-metadata-service.html
/// e.g., curl -X PUT "http://169.254.169.254/latest/api/token" -H "X-aws-ec2-metadata-token-ttl-seconds: 21600"
const IMDS_V2_SESSION_TOKEN_URI: &str = "http://169.254.169.254/latest/api/token";

/// Fetches the IMDS v2 token.
async fn fetch_token() -> Result<String> {
    log::info!("fetching IMDS v2 token");

    let cli = ClientBuilder::new()
        .user_agent(env!("CARGO_PKG_NAME"))
        .timeout(Duration::from_secs(15))
        .build()
        .map_err(|e| Error::Fetch {
            message: format!("failed ClientBuilder build {:?}", e),
            retryable: false,
        })?;
    let resp = cli
        .put(IMDS_V2_SESSION_TOKEN_URI)
        .header("X-aws-ec2-metadata-token-ttl-seconds", "21600")
        .send()
        .await
        .map_err(|e| Error::Fetch {
            message: format!("failed PUT api/token {:?}", e),
            retryable: e.is_timeout() || e.is_connect(),
        })?;
    let out = resp.bytes().await.map_err(|e| Error::Fetch {
        message: format!("failed to read bytes {:?}", e),
        retryable: false,
    })?;
    let out: Vec<u8> = out.into();

    match String::from_utf8(out) {
        Ok(text) => Ok(text),
        Err(e) => Err(Error::Fetch {
            message: format!("PUT api/token failed String::from_utf8 ({})", e),
            retryable: false,
        }),
    }
}
