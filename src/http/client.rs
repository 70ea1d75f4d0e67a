//! Shared HTTP client construction

use std::path::Path;

use reqwest::{Certificate, Identity};

use crate::config::{ClientConfig, ConfigError, DEFAULT_TIMEOUT};

/// Build the HTTP client shared by every test and alerter of a configuration
/// generation.
pub fn build_client(config: &ClientConfig) -> Result<reqwest::Client, ConfigError> {
    let mut builder = reqwest::Client::builder().timeout(config.timeout.unwrap_or(DEFAULT_TIMEOUT));

    if let Some(ca) = &config.ca {
        let pem = read(ca)?;
        let cert = Certificate::from_pem(&pem)
            .map_err(|e| ConfigError::Client(format!("invalid CA '{}': {}", ca.display(), e)))?;
        builder = builder.add_root_certificate(cert);
    }

    match (&config.cert, &config.key) {
        (Some(cert), Some(key)) => {
            let mut pem = read(cert)?;
            pem.push(b'\n');
            pem.extend(read(key)?);
            let identity = Identity::from_pem(&pem)
                .map_err(|e| ConfigError::Client(format!("invalid client certificate: {}", e)))?;
            builder = builder.identity(identity);
        }
        (None, None) => {}
        _ => {
            return Err(ConfigError::Client(
                "cert and key must be set together".to_string(),
            ))
        }
    }

    builder
        .build()
        .map_err(|e| ConfigError::Client(e.to_string()))
}

fn read(path: &Path) -> Result<Vec<u8>, ConfigError> {
    std::fs::read(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_default_client() {
        assert!(build_client(&ClientConfig::default()).is_ok());
    }

    #[test]
    fn test_cert_without_key() {
        let config = ClientConfig {
            cert: Some("/tmp/client.pem".into()),
            ..Default::default()
        };
        assert!(matches!(build_client(&config), Err(ConfigError::Client(_))));
    }

    #[test]
    fn test_missing_ca_file() {
        let config = ClientConfig {
            timeout: Some(Duration::from_secs(1)),
            ca: Some("/definitely/not/here.pem".into()),
            ..Default::default()
        };
        assert!(matches!(build_client(&config), Err(ConfigError::Io { .. })));
    }
}
