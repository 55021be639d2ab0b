// SPDX-License-Identifier: AGPL-3.0-or-later

//! TCP+TLS dialing with Vantage's three verification modes (spec §4.A).
//!
//! Vantage controllers present self-signed certificates out of the box, so
//! unlike a typical TLS client this one treats "don't verify the chain" as
//! a first-class, explicitly chosen mode rather than an escape hatch.

use std::{
    io,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

use rustls::{
    ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme,
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    pki_types::{CertificateDer, ServerName, UnixTime},
};
use tokio::{
    io::{AsyncRead, AsyncWrite, ReadBuf},
    net::TcpStream,
    time::timeout,
};
use tokio_rustls::{TlsConnector, client::TlsStream as RustlsStream};

use crate::{
    cfg::enums::{SslMode, Transport},
    error::{ConnectError, Result},
};

/// Either half of a dialed connection: encrypted or, when `Transport::Plain`
/// was requested, a bare TCP socket to the fallback port.
pub enum TlsStream {
    Tls(Box<RustlsStream<TcpStream>>),
    Plain(TcpStream),
}

impl AsyncRead for TlsStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            TlsStream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
            TlsStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for TlsStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            TlsStream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
            TlsStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            TlsStream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
            TlsStream::Plain(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            TlsStream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
            TlsStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

/// Dials `host:port`, establishing TLS unless `transport` is `Plain`.
pub async fn dial(
    host: &str,
    port: u16,
    transport: Transport,
    verify: SslMode,
    connect_timeout: Duration,
) -> Result<TlsStream> {
    let addr = format!("{host}:{port}");
    let tcp = timeout(connect_timeout, TcpStream::connect(&addr))
        .await
        .map_err(|_| ConnectError::Tcp {
            addr: addr.clone(),
            source: io::Error::new(io::ErrorKind::TimedOut, "connect timed out"),
        })?
        .map_err(|source| ConnectError::Tcp { addr: addr.clone(), source })?;
    tcp.set_nodelay(true).map_err(|source| ConnectError::Tcp { addr: addr.clone(), source })?;

    if transport == Transport::Plain {
        return Ok(TlsStream::Plain(tcp));
    }

    let config = client_config(verify);
    let connector = TlsConnector::from(Arc::new(config));
    let server_name = ServerName::try_from(host.to_string()).map_err(|_| ConnectError::TlsHandshake {
        host: host.to_string(),
        source: io::Error::new(io::ErrorKind::InvalidInput, "invalid server name"),
    })?;

    let tls = timeout(connect_timeout, connector.connect(server_name, tcp))
        .await
        .map_err(|_| ConnectError::TlsHandshake {
            host: host.to_string(),
            source: io::Error::new(io::ErrorKind::TimedOut, "handshake timed out"),
        })?
        .map_err(|source| ConnectError::TlsHandshake { host: host.to_string(), source })?;

    Ok(TlsStream::Tls(Box::new(tls)))
}

fn client_config(verify: SslMode) -> ClientConfig {
    match verify {
        SslMode::Strict => {
            let mut roots = RootCertStore::empty();
            for cert in rustls_native_certs::load_native_certs().certs {
                let _ = roots.add(cert);
            }
            ClientConfig::builder().with_root_certificates(roots).with_no_client_auth()
        },
        SslMode::HostnameOnly => ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(HostnameOnlyVerifier))
            .with_no_client_auth(),
        SslMode::None => ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyVerifier))
            .with_no_client_auth(),
    }
}

/// Accepts any certificate without validating the chain or the hostname.
/// The link is still encrypted; the peer is not authenticated.
#[derive(Debug)]
struct AcceptAnyVerifier;

impl ServerCertVerifier for AcceptAnyVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        all_schemes()
    }
}

/// Skips chain-of-trust validation but still checks the presented leaf
/// certificate's subject alternative names against the requested hostname.
#[derive(Debug)]
struct HostnameOnlyVerifier;

impl ServerCertVerifier for HostnameOnlyVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        let ServerName::DnsName(dns) = server_name else {
            return Err(rustls::Error::General(
                "hostname-only verification requires a DNS name, not an IP address".into(),
            ));
        };
        let (_, cert) = x509_parser::parse_x509_certificate(end_entity.as_ref())
            .map_err(|e| rustls::Error::General(format!("failed to parse leaf certificate: {e}")))?;

        let host = dns.as_ref();
        let matches_san = cert
            .subject_alternative_name()
            .ok()
            .flatten()
            .map(|ext| {
                ext.value.general_names.iter().any(|name| match name {
                    x509_parser::extensions::GeneralName::DNSName(san) => san_matches(san, host),
                    _ => false,
                })
            })
            .unwrap_or(false);

        if matches_san {
            Ok(ServerCertVerified::assertion())
        } else {
            Err(rustls::Error::General(format!(
                "certificate subject alternative names do not include {host}"
            )))
        }
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        all_schemes()
    }
}

fn san_matches(pattern: &str, host: &str) -> bool {
    let pattern = pattern.to_ascii_lowercase();
    let host = host.to_ascii_lowercase();
    if let Some(rest) = pattern.strip_prefix("*.") {
        host.split_once('.').map(|(_, suffix)| suffix == rest).unwrap_or(false)
    } else {
        pattern == host
    }
}

fn all_schemes() -> Vec<SignatureScheme> {
    vec![
        SignatureScheme::RSA_PKCS1_SHA1,
        SignatureScheme::ECDSA_SHA1_Legacy,
        SignatureScheme::RSA_PKCS1_SHA256,
        SignatureScheme::ECDSA_NISTP256_SHA256,
        SignatureScheme::RSA_PKCS1_SHA384,
        SignatureScheme::ECDSA_NISTP384_SHA384,
        SignatureScheme::RSA_PKCS1_SHA512,
        SignatureScheme::ECDSA_NISTP521_SHA512,
        SignatureScheme::RSA_PSS_SHA256,
        SignatureScheme::RSA_PSS_SHA384,
        SignatureScheme::RSA_PSS_SHA512,
        SignatureScheme::ED25519,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_san_matches_subdomain() {
        assert!(san_matches("*.vantage.local", "controller.vantage.local"));
        assert!(!san_matches("*.vantage.local", "vantage.local"));
    }

    #[test]
    fn exact_san_matches_case_insensitively() {
        assert!(san_matches("Vantage.Local", "vantage.local"));
        assert!(!san_matches("vantage.local", "other.local"));
    }
}
