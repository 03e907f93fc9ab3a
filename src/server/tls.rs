//! TLS material loading.
//!
//! The server presents a certificate chain and private key read from PEM
//! files. Clients are not asked for certificates.

use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio_rustls::TlsAcceptor;

/// Errors loading certificates or building the TLS configuration.
#[derive(Debug, Error)]
pub enum TlsError {
    /// A PEM file could not be read or decoded
    #[error("failed to read PEM file {path}: {source}")]
    Pem {
        path: PathBuf,
        #[source]
        source: rustls::pki_types::pem::Error,
    },

    /// The certificate file held no certificates
    #[error("no certificates found in {0}")]
    NoCertificates(PathBuf),

    /// rustls rejected the certificate or key
    #[error("invalid TLS configuration: {0}")]
    Config(#[from] rustls::Error),
}

/// Reads every certificate in a PEM file, in order.
pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let pem_error = |source| TlsError::Pem {
        path: path.to_path_buf(),
        source,
    };

    let certs = CertificateDer::pem_file_iter(path)
        .map_err(pem_error)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(pem_error)?;

    if certs.is_empty() {
        return Err(TlsError::NoCertificates(path.to_path_buf()));
    }
    Ok(certs)
}

/// Reads the first private key (PKCS#8, PKCS#1 or SEC1) in a PEM file.
pub fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    PrivateKeyDer::from_pem_file(path).map_err(|source| TlsError::Pem {
        path: path.to_path_buf(),
        source,
    })
}

/// Builds the acceptor from a certificate chain file and a key file.
pub fn load_acceptor(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor, TlsError> {
    let certs = load_certs(cert_path)?;
    let key = load_key(key_path)?;
    acceptor_from_der(certs, key)
}

/// Builds the acceptor from already decoded certificate and key.
pub fn acceptor_from_der(
    certs: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
) -> Result<TlsAcceptor, TlsError> {
    let config = rustls::ServerConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()?
    .with_no_client_auth()
    .with_single_cert(certs, key)?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}


#[cfg(test)]
mod tests {
    use super::testing::self_signed;
    use super::*;

    #[test]
    fn test_load_acceptor_from_pem_files() {
        let dir = tempfile::tempdir().unwrap();
        let cert_path = dir.path().join("server.crt");
        let key_path = dir.path().join("server.key");

        let test_cert = self_signed();
        std::fs::write(&cert_path, &test_cert.cert_pem).unwrap();
        std::fs::write(&key_path, &test_cert.key_pem).unwrap();

        assert!(load_acceptor(&cert_path, &key_path).is_ok());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.crt");

        assert!(matches!(load_certs(&missing), Err(TlsError::Pem { .. })));
        assert!(matches!(load_key(&missing), Err(TlsError::Pem { .. })));
    }

    #[test]
    fn test_empty_certificate_file() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.crt");
        std::fs::write(&empty, "").unwrap();

        assert!(matches!(load_certs(&empty), Err(TlsError::NoCertificates(_))));
    }
}
