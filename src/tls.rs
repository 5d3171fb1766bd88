//! TLS accept path.
//!
//! Chain validation is rustls/webpki's job; this module adds the leaf-only
//! check the session contract needs (the peer certificate's names must
//! cover the peer address) and extracts the common name the session
//! exposes as [`TransportInfo::client_common_name`].
//!
//! Handshake failure is silent at the session layer: [`accept`] returns
//! the error to the caller (logged at `debug!` only), and no session is
//! ever constructed.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use log::debug;
use rustls::RootCertStore;
use rustls::ServerConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::TlsAcceptor;
use tokio_rustls::server::TlsStream;
use x509_parser::prelude::{FromDer, GeneralName, X509Certificate};

use crate::session::TransportInfo;

/// Errors from building the acceptor or accepting a connection.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TlsError {
    /// The server certificate or key was rejected.
    #[error("TLS configuration rejected: {0}")]
    Config(#[from] rustls::Error),

    /// The client-certificate verifier could not be built.
    #[error("client verifier rejected: {0}")]
    Verifier(#[from] rustls::server::VerifierBuilderError),

    /// The handshake failed.
    #[error("TLS handshake failed: {0}")]
    Handshake(#[source] std::io::Error),

    /// The peer's leaf certificate does not cover the peer address.
    #[error("peer certificate names do not match the peer address")]
    PeerCertificateInvalid,
}

/// Build an acceptor for the session's TLS path.
///
/// When `client_roots` is provided, client certificates are verified
/// against it (unauthenticated clients are still admitted; the session
/// simply carries no common name for them).
///
/// # Errors
///
/// Returns a [`TlsError`] when the certificate, key, or root store is
/// unusable.
pub fn acceptor(
    cert_chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
    client_roots: Option<RootCertStore>,
) -> Result<TlsAcceptor, TlsError> {
    let builder = ServerConfig::builder();
    let config = match client_roots {
        Some(roots) => {
            let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
                .allow_unauthenticated()
                .build()?;
            builder
                .with_client_cert_verifier(verifier)
                .with_single_cert(cert_chain, key)?
        }
        None => builder
            .with_no_client_auth()
            .with_single_cert(cert_chain, key)?,
    };
    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Accept a TLS connection and derive the session's transport identity.
///
/// Only the leaf certificate is inspected here; everything above it in
/// the chain was already judged by the verifier during the handshake.
///
/// # Errors
///
/// Returns [`TlsError::Handshake`] when the handshake fails and
/// [`TlsError::PeerCertificateInvalid`] when the peer presented a
/// certificate whose names do not cover `peer_addr`.
pub async fn accept<IO>(
    acceptor: &TlsAcceptor,
    io: IO,
    peer_addr: SocketAddr,
) -> Result<(TlsStream<IO>, TransportInfo), TlsError>
where
    IO: AsyncRead + AsyncWrite + Unpin,
{
    let stream = acceptor.accept(io).await.map_err(|err| {
        debug!("TLS handshake failed: peer={peer_addr}, error={err}");
        TlsError::Handshake(err)
    })?;

    let mut info = TransportInfo::plain(peer_addr);
    let (_, conn) = stream.get_ref();
    if let Some(leaf) = conn.peer_certificates().and_then(|chain| chain.first()) {
        let names = PeerCertNames::from_der(leaf).ok_or(TlsError::PeerCertificateInvalid)?;
        if !names.matches_addr(peer_addr.ip()) {
            debug!("peer certificate rejected: peer={peer_addr}");
            return Err(TlsError::PeerCertificateInvalid);
        }
        info.client_common_name = names.common_name;
    }
    Ok((stream, info))
}

/// Names extracted from a peer's leaf certificate.
struct PeerCertNames {
    common_name: Option<String>,
    dns_names: Vec<String>,
    ip_addrs: Vec<IpAddr>,
}

impl PeerCertNames {
    fn from_der(der: &CertificateDer<'_>) -> Option<Self> {
        let (_, cert) = X509Certificate::from_der(der.as_ref()).ok()?;

        let common_name = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|attr| attr.as_str().ok())
            .map(str::to_owned);

        let mut dns_names = Vec::new();
        let mut ip_addrs = Vec::new();
        if let Ok(Some(san)) = cert.subject_alternative_name() {
            for name in &san.value.general_names {
                match name {
                    GeneralName::DNSName(dns) => dns_names.push((*dns).to_owned()),
                    GeneralName::IPAddress(bytes) => {
                        if let Some(ip) = ip_from_bytes(bytes) {
                            ip_addrs.push(ip);
                        }
                    }
                    _ => {}
                }
            }
        }

        Some(Self {
            common_name,
            dns_names,
            ip_addrs,
        })
    }

    /// SAN entries are authoritative when present; the common name is
    /// only consulted for legacy certificates without one.
    fn matches_addr(&self, ip: IpAddr) -> bool {
        if !self.ip_addrs.is_empty() || !self.dns_names.is_empty() {
            return self.ip_addrs.contains(&ip)
                || self
                    .dns_names
                    .iter()
                    .any(|name| name.parse::<IpAddr>().is_ok_and(|parsed| parsed == ip));
        }
        self.common_name
            .as_deref()
            .and_then(|cn| cn.parse::<IpAddr>().ok())
            .is_some_and(|parsed| parsed == ip)
    }
}

fn ip_from_bytes(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => {
            let octets: [u8; 4] = bytes.try_into().ok()?;
            Some(IpAddr::from(octets))
        }
        16 => {
            let octets: [u8; 16] = bytes.try_into().ok()?;
            Some(IpAddr::from(octets))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(
        common_name: Option<&str>,
        dns_names: &[&str],
        ip_addrs: &[IpAddr],
    ) -> PeerCertNames {
        PeerCertNames {
            common_name: common_name.map(str::to_owned),
            dns_names: dns_names.iter().map(|s| (*s).to_owned()).collect(),
            ip_addrs: ip_addrs.to_vec(),
        }
    }

    #[test]
    fn san_ip_entry_matches() {
        let peer: IpAddr = "10.1.2.3".parse().unwrap();
        assert!(names(None, &[], &[peer]).matches_addr(peer));
        assert!(!names(None, &[], &[peer]).matches_addr("10.9.9.9".parse().unwrap()));
    }

    #[test]
    fn san_dns_entry_carrying_an_ip_matches() {
        let peer: IpAddr = "192.168.0.7".parse().unwrap();
        assert!(names(None, &["192.168.0.7"], &[]).matches_addr(peer));
    }

    #[test]
    fn common_name_is_fallback_only() {
        let peer: IpAddr = "10.0.0.1".parse().unwrap();
        // Without SAN entries the CN decides.
        assert!(names(Some("10.0.0.1"), &[], &[]).matches_addr(peer));
        // With SAN entries present, a matching CN no longer rescues.
        assert!(
            !names(Some("10.0.0.1"), &["other.example"], &[]).matches_addr(peer)
        );
    }

    #[test]
    fn ip_bytes_decode_v4_and_v6() {
        assert_eq!(
            ip_from_bytes(&[127, 0, 0, 1]),
            Some("127.0.0.1".parse().unwrap())
        );
        assert_eq!(ip_from_bytes(&[0u8; 16]), Some("::".parse().unwrap()));
        assert_eq!(ip_from_bytes(&[1, 2, 3]), None);
    }
}
