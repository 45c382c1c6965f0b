// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Caller identity.
//!
//! The listener attaches a [`PeerInfo`] to every request of a connection.
//! [`authenticate`] turns it into a [`Subject`] (the common name of the
//! verified client certificate) before any handler runs.

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use rustls::pki_types::CertificateDer;
use std::net::SocketAddr;

use crate::errors::NodeError;

/// Transport facts about the connection a request arrived on.
#[derive(Debug, Clone)]
pub struct PeerInfo {
    pub remote_addr: SocketAddr,
    /// `None` for plaintext connections.
    pub tls: Option<TlsInfo>,
}

#[derive(Debug, Clone, Default)]
pub struct TlsInfo {
    /// Certificate chains the handshake verified, leaf first. Empty when the
    /// server does not ask for client certificates.
    pub verified_chains: Vec<Vec<CertificateDer<'static>>>,
}

/// Authorization principal for the current request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subject(pub String);

impl Subject {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

pub fn subject_from_peer(peer: Option<&PeerInfo>) -> Result<Subject, NodeError> {
    let peer = peer.ok_or_else(|| NodeError::Unauthenticated("couldn't find peer info".into()))?;

    let Some(tls) = &peer.tls else {
        return Ok(Subject::default());
    };

    match tls.verified_chains.first().and_then(|chain| chain.first()) {
        Some(leaf) => common_name(leaf).map(Subject),
        None => Ok(Subject::default()),
    }
}

fn common_name(der: &CertificateDer<'_>) -> Result<String, NodeError> {
    let (_, cert) = x509_parser::parse_x509_certificate(der.as_ref())
        .map_err(|e| NodeError::Unauthenticated(format!("invalid peer certificate: {}", e)))?;

    let cn = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .unwrap_or_default();
    Ok(cn.to_string())
}

/// Middleware run ahead of every route, unary and streaming alike.
pub async fn authenticate(mut req: Request, next: Next) -> Result<Response, NodeError> {
    let subject = subject_from_peer(req.extensions().get::<PeerInfo>())?;
    tracing::debug!(subject = subject.as_str(), "request authenticated");
    req.extensions_mut().insert(subject);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{CertificateParams, DnType, KeyPair};

    fn cert_with_cn(cn: &str) -> CertificateDer<'static> {
        let mut params = CertificateParams::new(vec!["localhost".to_string()]).unwrap();
        params.distinguished_name.push(DnType::CommonName, cn);
        let key = KeyPair::generate().unwrap();
        params.self_signed(&key).unwrap().der().clone()
    }

    fn addr() -> SocketAddr {
        "127.0.0.1:4000".parse().unwrap()
    }

    #[test]
    fn test_subject_is_leaf_common_name() {
        let peer = PeerInfo {
            remote_addr: addr(),
            tls: Some(TlsInfo {
                verified_chains: vec![vec![cert_with_cn("root-client"), cert_with_cn("ca")]],
            }),
        };
        let subject = subject_from_peer(Some(&peer)).unwrap();
        assert_eq!(subject, Subject("root-client".to_string()));
    }

    #[test]
    fn test_missing_peer_info_is_unauthenticated() {
        let err = subject_from_peer(None).unwrap_err();
        assert!(matches!(err, NodeError::Unauthenticated(_)));
        assert_eq!(err.to_string(), "couldn't find peer info");
    }

    #[test]
    fn test_plaintext_and_unverified_tls_yield_empty_subject() {
        let plain = PeerInfo { remote_addr: addr(), tls: None };
        assert_eq!(subject_from_peer(Some(&plain)).unwrap().as_str(), "");

        let no_chains = PeerInfo { remote_addr: addr(), tls: Some(TlsInfo::default()) };
        assert_eq!(subject_from_peer(Some(&no_chains)).unwrap().as_str(), "");
    }

    #[test]
    fn test_garbage_certificate_is_rejected() {
        let peer = PeerInfo {
            remote_addr: addr(),
            tls: Some(TlsInfo {
                verified_chains: vec![vec![CertificateDer::from(vec![1u8, 2, 3])]],
            }),
        };
        assert!(matches!(
            subject_from_peer(Some(&peer)),
            Err(NodeError::Unauthenticated(_))
        ));
    }
}
