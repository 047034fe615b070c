//! QUIC transport driver.
//!
//! A thin I/O layer bridging frames between channels and QUIC streams.
//! Protocol logic stays in the Sans-IO [`crate::SyncClient`]; this module
//! only moves bytes. Outbound frames each open a short-lived bidirectional
//! stream; server pushes arrive on unidirectional streams.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use bytes::BytesMut;
use parley_proto::{Frame, FrameHeader};
use quinn::{ClientConfig, Endpoint, RecvStream, SendStream};
use thiserror::Error;
use tokio::sync::mpsc;

/// ALPN protocol identifier; must match the server's.
const ALPN: &[u8] = b"parley";

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Stream error.
    #[error("stream error: {0}")]
    Stream(String),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Handle to an open QUIC connection.
///
/// Frames flow through the channels; an internal task owns the QUIC I/O.
pub struct ConnectedTransport {
    /// Send frames to the server.
    pub to_server: mpsc::Sender<Frame>,
    /// Receive frames from the server.
    pub from_server: mpsc::Receiver<Frame>,
    abort_handle: tokio::task::AbortHandle,
}

impl ConnectedTransport {
    /// Stop the connection task.
    pub fn stop(&self) {
        self.abort_handle.abort();
    }
}

/// Open a QUIC connection to the sync server.
///
/// # Errors
///
/// - [`TransportError::Connection`] if the address is invalid or the QUIC
///   handshake fails
pub async fn connect(server_addr: &str) -> Result<ConnectedTransport, TransportError> {
    let addr: SocketAddr = server_addr
        .parse()
        .map_err(|e| TransportError::Connection(format!("invalid address: {e}")))?;

    let bind_addr: SocketAddr = "0.0.0.0:0"
        .parse()
        .map_err(|e| TransportError::Connection(format!("invalid bind address: {e}")))?;

    let client_config = insecure_client_config()?;
    let mut endpoint = Endpoint::client(bind_addr)
        .map_err(|e| TransportError::Connection(format!("endpoint creation failed: {e}")))?;
    endpoint.set_default_client_config(client_config);

    let connection = endpoint
        .connect(addr, "localhost")
        .map_err(|e| TransportError::Connection(format!("connect failed: {e}")))?
        .await
        .map_err(|e| TransportError::Connection(format!("connection failed: {e}")))?;

    let (to_server_tx, to_server_rx) = mpsc::channel::<Frame>(32);
    let (from_server_tx, from_server_rx) = mpsc::channel::<Frame>(32);

    let handle = tokio::spawn(run_connection(connection, to_server_rx, from_server_tx));

    Ok(ConnectedTransport {
        to_server: to_server_tx,
        from_server: from_server_rx,
        abort_handle: handle.abort_handle(),
    })
}

/// Run the connection, bridging between channels and QUIC.
async fn run_connection(
    connection: quinn::Connection,
    mut to_server: mpsc::Receiver<Frame>,
    from_server: mpsc::Sender<Frame>,
) {
    let conn_recv = connection.clone();
    let from_server_clone = from_server.clone();
    let recv_handle = tokio::spawn(async move {
        loop {
            match conn_recv.accept_uni().await {
                Ok(recv) => {
                    let tx = from_server_clone.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_incoming_stream(recv, tx).await {
                            tracing::warn!(error = %e, "incoming stream error");
                        }
                    });
                },
                Err(e) => {
                    tracing::debug!(error = %e, "connection closed");
                    break;
                },
            }
        }
    });

    while let Some(frame) = to_server.recv().await {
        if let Ok((send, _recv)) = connection.open_bi().await {
            if let Err(e) = send_frame(send, &frame).await {
                tracing::warn!(error = %e, "send error");
            }
        }
    }

    recv_handle.abort();
}

/// Handle an incoming unidirectional stream (server to client).
async fn handle_incoming_stream(
    mut recv: RecvStream,
    tx: mpsc::Sender<Frame>,
) -> Result<(), TransportError> {
    let mut buf = BytesMut::with_capacity(65536);

    buf.resize(FrameHeader::SIZE, 0);
    recv.read_exact(&mut buf[..FrameHeader::SIZE])
        .await
        .map_err(|e| TransportError::Stream(format!("header read failed: {e}")))?;

    let header = FrameHeader::from_bytes(&buf[..FrameHeader::SIZE])
        .map_err(|e| TransportError::Protocol(format!("invalid header: {e}")))?;

    let payload_size = header.payload_size() as usize;

    if payload_size > 0 {
        buf.resize(FrameHeader::SIZE + payload_size, 0);
        recv.read_exact(&mut buf[FrameHeader::SIZE..])
            .await
            .map_err(|e| TransportError::Stream(format!("payload read failed: {e}")))?;
    }

    let frame = Frame::decode(&buf)
        .map_err(|e| TransportError::Protocol(format!("frame decode failed: {e}")))?;

    tx.send(frame)
        .await
        .map_err(|e| TransportError::Stream(format!("channel send failed: {e}")))?;

    Ok(())
}

/// Send a frame on a stream.
async fn send_frame(mut send: SendStream, frame: &Frame) -> Result<(), TransportError> {
    let mut buf = Vec::new();
    frame.encode(&mut buf).map_err(|e| TransportError::Protocol(format!("encode failed: {e}")))?;

    send.write_all(&buf).await.map_err(|e| TransportError::Stream(format!("write failed: {e}")))?;

    send.finish().map_err(|e| TransportError::Stream(format!("finish failed: {e}")))?;

    Ok(())
}

/// Create an insecure client config that accepts any certificate.
///
/// WARNING: Development only. Production should verify certificates.
fn insecure_client_config() -> Result<ClientConfig, TransportError> {
    let mut crypto = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(InsecureCertVerifier))
        .with_no_client_auth();

    crypto.alpn_protocols = vec![ALPN.to_vec()];

    let quic_crypto = quinn::crypto::rustls::QuicClientConfig::try_from(crypto)
        .map_err(|e| TransportError::Connection(format!("tls config invalid: {e}")))?;
    let mut config = ClientConfig::new(Arc::new(quic_crypto));

    let mut transport = quinn::TransportConfig::default();
    let idle = quinn::IdleTimeout::try_from(Duration::from_secs(30))
        .map_err(|e| TransportError::Connection(format!("idle timeout invalid: {e}")))?;
    transport.max_idle_timeout(Some(idle));
    config.transport_config(Arc::new(transport));

    Ok(config)
}

/// Certificate verifier that accepts any certificate (insecure, for
/// development).
#[derive(Debug)]
struct InsecureCertVerifier;

impl rustls::client::danger::ServerCertVerifier for InsecureCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}
