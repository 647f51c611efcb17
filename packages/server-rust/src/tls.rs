//! TLS configuration: the API gateway admin client and the MP1 listener.
//!
//! Both are built once at start-up and shared immutably afterwards.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::crypto::{ring, CryptoProvider};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{CipherSuite, ClientConfig, RootCertStore, ServerConfig, SupportedCipherSuite};
use tracing::{debug, error};

use crate::appconf::GatewaySettings;

const MAX_SERVER_NAME_LEN: usize = 253;

/// Letters, digits, dots and hyphens, starting with a letter or digit.
fn is_host_name(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_alphanumeric())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-'))
}

/// TLS 1.2 suites that may be named in `ssl_ciphers`.
const CIPHER_ALLOW_LIST: [(&str, CipherSuite); 2] = [
    (
        "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256",
        CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
    ),
    (
        "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384",
        CipherSuite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
    ),
];

#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("apigw_cacert configuration is not set")]
    MissingCaPath,
    #[error("unable to read certificate {path}: {source}")]
    ReadCa {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode cert file {path}: {detail}")]
    DecodeCa { path: PathBuf, detail: String },
    #[error("no certificate found in {path}")]
    NoCertificates { path: PathBuf },
    #[error("server or host name validation failed: {name:?}")]
    InvalidServerName { name: String },
    #[error("TLS cipher configuration is not recommended or invalid: {name}")]
    UnknownCipher { name: String },
    #[error("TLS cipher configuration is not recommended or invalid")]
    NoCiphers,
    #[error("failed to load server certificate {path}: {detail}")]
    ServerCert { path: PathBuf, detail: String },
    #[error("failed to load server private key {path}: {detail}")]
    ServerKey { path: PathBuf, detail: String },
    #[error(transparent)]
    Rustls(#[from] rustls::Error),
}

/// Checks `name` against the host-name rules used for SNI.
///
/// # Errors
///
/// Returns [`TlsError::InvalidServerName`] if the name is empty, longer than
/// 253 characters, or not a DNS name.
pub fn validate_server_name(name: &str) -> Result<ServerName<'static>, TlsError> {
    let invalid = || TlsError::InvalidServerName {
        name: name.to_string(),
    };
    if name.len() > MAX_SERVER_NAME_LEN || !is_host_name(name) {
        return Err(invalid());
    }
    ServerName::try_from(name.to_string()).map_err(|_| invalid())
}

/// Resolves a comma-separated cipher list against the allow-list.
///
/// # Errors
///
/// Returns [`TlsError::UnknownCipher`] for a name outside the allow-list and
/// [`TlsError::NoCiphers`] when the list names nothing.
pub fn parse_cipher_suites(list: &str) -> Result<Vec<CipherSuite>, TlsError> {
    let mut suites = Vec::new();
    for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        let Some((_, suite)) = CIPHER_ALLOW_LIST.iter().find(|(known, _)| *known == name) else {
            error!(cipher = name, "not recommended cipher suite");
            return Err(TlsError::UnknownCipher {
                name: name.to_string(),
            });
        };
        suites.push(*suite);
    }
    if suites.is_empty() {
        return Err(TlsError::NoCiphers);
    }
    Ok(suites)
}

fn load_roots(path: &str) -> Result<RootCertStore, TlsError> {
    if path.is_empty() {
        return Err(TlsError::MissingCaPath);
    }
    let path = PathBuf::from(path);
    let pem = std::fs::read(&path).map_err(|source| TlsError::ReadCa {
        path: path.clone(),
        source,
    })?;

    let mut roots = RootCertStore::empty();
    for cert in CertificateDer::pem_slice_iter(&pem) {
        let cert = cert.map_err(|e| TlsError::DecodeCa {
            path: path.clone(),
            detail: format!("{e:?}"),
        })?;
        roots.add(cert)?;
    }
    if roots.is_empty() {
        return Err(TlsError::NoCertificates { path });
    }
    Ok(roots)
}

/// Builds the gateway client TLS configuration.
///
/// TLS 1.2 is the minimum version and TLS 1.3 is allowed. The TLS 1.2
/// suites are exactly those named in `ssl_ciphers`.
///
/// # Errors
///
/// Returns [`TlsError`] for a missing or unusable CA file, an invalid
/// `server_name`, or a cipher list that is empty or names an unknown suite.
pub fn build_client_tls(settings: &GatewaySettings) -> Result<Arc<ClientConfig>, TlsError> {
    let roots = load_roots(&settings.apigw_cacert)?;
    validate_server_name(&settings.server_name)?;
    let wanted = parse_cipher_suites(&settings.ssl_ciphers)?;

    let base = ring::default_provider();
    let cipher_suites = base
        .cipher_suites
        .iter()
        .copied()
        .filter(|suite| match suite {
            SupportedCipherSuite::Tls13(_) => true,
            SupportedCipherSuite::Tls12(_) => wanted.contains(&suite.suite()),
        })
        .collect();
    let provider = CryptoProvider {
        cipher_suites,
        ..base
    };

    let config = ClientConfig::builder_with_provider(Arc::new(provider))
        .with_protocol_versions(&[&rustls::version::TLS12, &rustls::version::TLS13])?
        .with_root_certificates(roots)
        .with_no_client_auth();

    debug!(server_name = %settings.server_name, "gateway client TLS configured");
    Ok(Arc::new(config))
}

/// Builds the MP1 listener TLS configuration from PEM files.
///
/// # Errors
///
/// Returns [`TlsError`] if the certificate chain or key cannot be read, or
/// rustls rejects the pair.
pub fn build_server_tls(cert_path: &Path, key_path: &Path) -> Result<Arc<ServerConfig>, TlsError> {
    let cert_err = |detail: String| TlsError::ServerCert {
        path: cert_path.to_path_buf(),
        detail,
    };
    let certs = CertificateDer::pem_file_iter(cert_path)
        .map_err(|e| cert_err(format!("{e:?}")))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| cert_err(format!("{e:?}")))?;
    if certs.is_empty() {
        return Err(cert_err("no certificate found".to_string()));
    }
    let key = PrivateKeyDer::from_pem_file(key_path).map_err(|e| TlsError::ServerKey {
        path: key_path.to_path_buf(),
        detail: format!("{e:?}"),
    })?;

    let mut config = ServerConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_protocol_versions(&[&rustls::version::TLS12, &rustls::version::TLS13])?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    debug!(cert = %cert_path.display(), "listener TLS configured");
    Ok(Arc::new(config))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
