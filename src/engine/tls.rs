//! TLS certificate and key loading.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::{self, ServerConfig};

/// Error type for TLS material loading.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("Failed to read certificate file {path:?}: {source}")]
    CertificateRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read private key file {path:?}: {source}")]
    KeyRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("No certificates found in {path:?}")]
    NoCertificates { path: PathBuf },

    #[error("No private key found in {path:?}")]
    NoPrivateKey { path: PathBuf },

    #[error("Invalid certificate or key: {0}")]
    Config(#[from] rustls::Error),
}

/// Load a rustls server configuration from PEM certificate and key files,
/// advertising h2 and http/1.1 over ALPN.
pub(crate) async fn load_server_config(cert: &Path, key: &Path) -> Result<ServerConfig, TlsError> {
    let cert_pem = tokio::fs::read(cert)
        .await
        .map_err(|e| TlsError::CertificateRead {
            path: cert.to_path_buf(),
            source: e,
        })?;
    let key_pem = tokio::fs::read(key).await.map_err(|e| TlsError::KeyRead {
        path: key.to_path_buf(),
        source: e,
    })?;

    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut cert_pem.as_slice())
        .collect::<Result<_, _>>()
        .map_err(|e| TlsError::CertificateRead {
            path: cert.to_path_buf(),
            source: e,
        })?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates {
            path: cert.to_path_buf(),
        });
    }

    let private_key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut key_pem.as_slice())
        .map_err(|e| TlsError::KeyRead {
            path: key.to_path_buf(),
            source: e,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey {
            path: key.to_path_buf(),
        })?;

    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, private_key)?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    Ok(config)
}
