//! QUIC endpoint construction.
//!
//! The endpoint both listens and dials. QUIC's TLS layer only provides
//! transport encryption and multiplexing here: certificates are throwaway
//! self-signed ones and the client skips verification. Peer identity is
//! established per stream by the security upgrade in [`crate::upgrade`].

use std::sync::Arc;

use quinn::{ClientConfig, Endpoint, ServerConfig, TransportConfig as QuinnTransportConfig};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tracing::info;

use crate::transport::{HostConfig, TransportError};

/// Server name presented when dialing.
pub(crate) const SERVER_NAME: &str = "strand";

/// Binds a QUIC endpoint that accepts and initiates connections.
pub(crate) fn bind_endpoint(config: &HostConfig) -> Result<Endpoint, TransportError> {
    let (cert, key) = generate_self_signed_cert()?;

    let mut server_config = ServerConfig::with_single_cert(vec![cert], key)
        .map_err(|e| TransportError::Tls(format!("Server config error: {}", e)))?;
    server_config.transport_config(transport_config(config)?);

    let mut endpoint = Endpoint::server(server_config, config.listen_addr)?;
    endpoint.set_default_client_config(client_config(config)?);

    info!(addr = %endpoint.local_addr()?, "QUIC endpoint bound");
    Ok(endpoint)
}

fn transport_config(config: &HostConfig) -> Result<Arc<QuinnTransportConfig>, TransportError> {
    let idle = config
        .idle_timeout
        .try_into()
        .map_err(|_| TransportError::InvalidParameter(format!("idle timeout {:?}", config.idle_timeout)))?;
    let mut transport = QuinnTransportConfig::default();
    transport.max_idle_timeout(Some(idle));
    transport.keep_alive_interval(Some(config.keep_alive));
    Ok(Arc::new(transport))
}

fn client_config(config: &HostConfig) -> Result<ClientConfig, TransportError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let crypto = rustls::ClientConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS13])
        .map_err(|e| TransportError::Tls(e.to_string()))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(SkipServerVerification))
        .with_no_client_auth();

    let mut client = ClientConfig::new(Arc::new(
        quinn::crypto::rustls::QuicClientConfig::try_from(crypto)
            .map_err(|e| TransportError::Tls(format!("Client crypto config error: {}", e)))?,
    ));
    client.transport_config(transport_config(config)?);
    Ok(client)
}

/// Generates a self-signed certificate for the endpoint.
fn generate_self_signed_cert(
) -> Result<(CertificateDer<'static>, PrivateKeyDer<'static>), TransportError> {
    let cert = rcgen::generate_simple_self_signed(vec![SERVER_NAME.to_string()])
        .map_err(|e| TransportError::Tls(format!("Failed to generate cert: {}", e)))?;
    let key = PrivatePkcs8KeyDer::from(cert.key_pair.serialize_der());
    let cert = CertificateDer::from(cert.cert);
    Ok((cert, key.into()))
}

/// Accepts any server certificate; identities are checked per stream.
#[derive(Debug)]
struct SkipServerVerification;

impl rustls::client::danger::ServerCertVerifier for SkipServerVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
