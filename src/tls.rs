//! Mutual-TLS configuration for both ends of the transport, grounded on
//! the original `nugg/client/tls.go`. The curve and cipher-suite
//! preferences from spec.md §6 are narrowed to what the `aws-lc-rs`
//! `rustls` crypto provider actually exposes; the substitution is recorded
//! in DESIGN.md.

use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::crypto::aws_lc_rs::{cipher_suite, kx_group};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{ClientConfig, RootCertStore, ServerConfig};

/// Errors raised while assembling a [`ClientConfig`] or [`ServerConfig`]
/// from certificate material on disk.
#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    /// The PEM file contained no certificates, or no private key.
    EmptyPem(&'static str),
    Rustls(rustls::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "io error reading certificate material: {e}"),
            Error::EmptyPem(what) => write!(f, "no {what} found in PEM file"),
            Error::Rustls(e) => write!(f, "tls configuration error: {e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<rustls::Error> for Error {
    fn from(e: rustls::Error) -> Self {
        Error::Rustls(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let mut reader = BufReader::new(std::fs::File::open(path)?);
    let certs: std::result::Result<Vec<_>, _> = rustls_pemfile::certs(&mut reader).collect();
    let certs = certs.map_err(Error::Io)?;
    if certs.is_empty() {
        return Err(Error::EmptyPem("certificates"));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let mut reader = BufReader::new(std::fs::File::open(path)?);
    rustls_pemfile::private_key(&mut reader)?.ok_or(Error::EmptyPem("private key"))
}

/// The key-exchange groups and cipher suites spec.md §6 asks for, reduced
/// to the subset the `aws-lc-rs` provider implements: P-521 is dropped
/// (not exposed by this provider) and CBC suites are dropped (`rustls`
/// does not offer non-AEAD ciphers at all).
fn crypto_provider() -> CryptoProvider {
    let mut provider = rustls::crypto::aws_lc_rs::default_provider();
    provider.kx_groups = vec![kx_group::SECP384R1, kx_group::SECP256R1];
    provider.cipher_suites = vec![
        cipher_suite::TLS13_AES_256_GCM_SHA384,
        cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
        cipher_suite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
    ];
    provider
}

fn root_store(ca_cert_path: &Path) -> Result<RootCertStore> {
    let mut store = RootCertStore::empty();
    for cert in load_certs(ca_cert_path)? {
        store.add(cert).map_err(Error::Rustls)?;
    }
    Ok(store)
}

/// Builds a client-side TLS config: validates the server's certificate
/// against `ca_cert_path` and presents `cert_path`/`key_path` for the
/// server's mutual-auth check.
pub fn client_config(cert_path: &Path, key_path: &Path, ca_cert_path: &Path) -> Result<ClientConfig> {
    let provider = Arc::new(crypto_provider());
    let roots = root_store(ca_cert_path)?;
    let certs = load_certs(cert_path)?;
    let key = load_private_key(key_path)?;

    let config = ClientConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS12, &rustls::version::TLS13])?
        .with_root_certificates(roots)
        .with_client_auth_cert(certs, key)?;
    Ok(config)
}

/// Builds a server-side TLS config: requires and verifies a client
/// certificate against `ca_cert_path`, presenting `cert_path`/`key_path`
/// as the server's own identity.
pub fn server_config(cert_path: &Path, key_path: &Path, ca_cert_path: &Path) -> Result<ServerConfig> {
    let provider = Arc::new(crypto_provider());
    let roots = Arc::new(root_store(ca_cert_path)?);
    let certs = load_certs(cert_path)?;
    let key = load_private_key(key_path)?;

    let client_verifier = WebPkiClientVerifier::builder(roots).build().map_err(|e| {
        Error::Rustls(rustls::Error::General(format!("client verifier setup failed: {e}")))
    })?;

    let config = ServerConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS12, &rustls::version::TLS13])?
        .with_client_cert_verifier(client_verifier)
        .with_single_cert(certs, key)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Writes a self-signed cert/key pair usable as both an end-entity
    /// certificate and its own CA root, for loopback TLS tests.
    fn write_test_identity(dir: &Path, name: &str) -> (std::path::PathBuf, std::path::PathBuf) {
        let cert = rcgen::generate_simple_self_signed(vec!["localhost".into()]).unwrap();
        let cert_path = dir.join(format!("{name}.crt"));
        let key_path = dir.join(format!("{name}.key"));
        std::fs::File::create(&cert_path).unwrap().write_all(cert.cert.pem().as_bytes()).unwrap();
        std::fs::File::create(&key_path).unwrap().write_all(cert.key_pair.serialize_pem().as_bytes()).unwrap();
        (cert_path, key_path)
    }

    #[test]
    fn server_config_builds_from_self_signed_material() {
        let dir = tempfile::tempdir().unwrap();
        let (cert, key) = write_test_identity(dir.path(), "server");
        server_config(&cert, &key, &cert).unwrap();
    }

    #[test]
    fn client_config_builds_from_self_signed_material() {
        let dir = tempfile::tempdir().unwrap();
        let (cert, key) = write_test_identity(dir.path(), "client");
        client_config(&cert, &key, &cert).unwrap();
    }

    #[test]
    fn missing_cert_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.crt");
        assert!(matches!(load_certs(&missing), Err(Error::Io(_))));
    }
}
