// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Mutual TLS configuration.
//!
//! Both sides pin TLS 1.3. A server with a CA file requires and verifies
//! client certificates; a client with a CA file trusts only that root.

use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("IO error reading {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse certificates from {0:?}")]
    NoCertificates(PathBuf),
    #[error("no private key found in {0:?}")]
    NoPrivateKey(PathBuf),
    #[error("server TLS needs both cert_file and key_file")]
    MissingIdentity,
    #[error("TLS error: {0}")]
    Rustls(#[from] rustls::Error),
    #[error("client verifier error: {0}")]
    Verifier(#[from] rustls::server::VerifierBuilderError),
}

#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
    pub ca_file: Option<PathBuf>,
    /// Name the server certificate must carry (client side only).
    pub server_address: Option<String>,
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

pub fn setup_server_tls(cfg: &TlsConfig) -> Result<ServerConfig, TlsError> {
    let provider = provider();
    let builder = ServerConfig::builder_with_provider(provider.clone())
        .with_protocol_versions(&[&rustls::version::TLS13])?;

    let builder = match &cfg.ca_file {
        Some(ca_file) => {
            let roots = load_roots(ca_file)?;
            let verifier =
                WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider).build()?;
            builder.with_client_cert_verifier(verifier)
        }
        None => builder.with_no_client_auth(),
    };

    let (certs, key) = load_identity(cfg)?.ok_or(TlsError::MissingIdentity)?;
    Ok(builder.with_single_cert(certs, key)?)
}

pub fn setup_client_tls(cfg: &TlsConfig) -> Result<ClientConfig, TlsError> {
    let builder = ClientConfig::builder_with_provider(provider())
        .with_protocol_versions(&[&rustls::version::TLS13])?;

    let roots = match &cfg.ca_file {
        Some(ca_file) => load_roots(ca_file)?,
        None => RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        },
    };
    let builder = builder.with_root_certificates(roots);

    match load_identity(cfg)? {
        Some((certs, key)) => Ok(builder.with_client_auth_cert(certs, key)?),
        None => Ok(builder.with_no_client_auth()),
    }
}

fn open(path: &Path) -> Result<BufReader<File>, TlsError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| TlsError::Io { path: path.to_path_buf(), source })
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let certs = rustls_pemfile::certs(&mut open(path)?)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Io { path: path.to_path_buf(), source })?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates(path.to_path_buf()));
    }
    Ok(certs)
}

fn load_roots(path: &Path) -> Result<RootCertStore, TlsError> {
    let mut roots = RootCertStore::empty();
    let (added, _ignored) = roots.add_parsable_certificates(load_certs(path)?);
    if added == 0 {
        return Err(TlsError::NoCertificates(path.to_path_buf()));
    }
    Ok(roots)
}

fn load_identity(
    cfg: &TlsConfig,
) -> Result<Option<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)>, TlsError> {
    let (Some(cert_file), Some(key_file)) = (&cfg.cert_file, &cfg.key_file) else {
        return Ok(None);
    };

    let certs = load_certs(cert_file)?;
    let key = rustls_pemfile::private_key(&mut open(key_file)?)
        .map_err(|source| TlsError::Io { path: key_file.clone(), source })?
        .ok_or_else(|| TlsError::NoPrivateKey(key_file.clone()))?;
    Ok(Some((certs, key)))
}
