//! POP3 mailbox client
//!
//! A minimal POP3 (RFC 1939) client covering exactly the verbs the
//! relay needs: USER/PASS authentication, LIST, RETR, DELE, QUIT.
//! Connects over plain TCP or implicit TLS. Certificate verification is
//! skipped: the mailboxes this job drains sit behind self-signed
//! stunnel-style endpoints.

use crate::config::{AccountConfig, TransportMode};
use crate::mailbox::{Mailbox, MailboxError, MailboxSession, MessageId};
use async_trait::async_trait;
use rustls::pki_types::ServerName;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, info};

/// Byte stream a session runs over; plain TCP or TLS.
trait Pop3Stream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<S: AsyncRead + AsyncWrite + Unpin + Send> Pop3Stream for S {}

/// POP3 implementation of [`Mailbox`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Pop3Mailbox;

#[async_trait]
impl Mailbox for Pop3Mailbox {
    async fn connect(
        &self,
        account: &AccountConfig,
    ) -> Result<Box<dyn MailboxSession>, MailboxError> {
        if account.transport == TransportMode::StartTls {
            return Err(MailboxError::Connect(
                "starttls transport is not supported".to_string(),
            ));
        }

        let addr = format!("{}:{}", account.host, account.port);
        debug!("Connecting to {}", addr);

        let tcp = TcpStream::connect(&addr)
            .await
            .map_err(|e| MailboxError::Connect(format!("{addr}: {e}")))?;

        let stream: Box<dyn Pop3Stream> = if account.transport == TransportMode::ImplicitTls {
            let connector = tls_connector();
            let server_name = ServerName::try_from(account.host.clone())
                .map_err(|e| MailboxError::Connect(format!("Invalid server name: {e}")))?;
            let tls = connector
                .connect(server_name, tcp)
                .await
                .map_err(|e| MailboxError::Connect(format!("TLS handshake failed: {e}")))?;
            Box::new(tls)
        } else {
            Box::new(tcp)
        };

        let mut session = Pop3Session {
            stream: BufReader::new(stream),
        };

        let greeting = session.read_reply().await?;
        if !greeting.ok {
            return Err(MailboxError::Protocol(format!(
                "Server refused connection: {}",
                greeting.detail
            )));
        }

        let user = session
            .exchange(&format!("USER {}", account.username))
            .await?;
        if !user.ok {
            return Err(MailboxError::Auth(user.detail));
        }

        let pass = session
            .exchange(&format!("PASS {}", account.password))
            .await?;
        if !pass.ok {
            return Err(MailboxError::Auth(pass.detail));
        }

        info!("Connected to {}", account.host);
        Ok(Box::new(session))
    }
}

/// A server status line, split into its `+OK`/`-ERR` verdict and the
/// human-readable remainder.
struct Reply {
    ok: bool,
    detail: String,
}

struct Pop3Session {
    stream: BufReader<Box<dyn Pop3Stream>>,
}

impl Pop3Session {
    async fn exchange(&mut self, line: &str) -> Result<Reply, MailboxError> {
        if line.starts_with("PASS ") {
            debug!("C: PASS ****");
        } else {
            debug!("C: {}", line);
        }

        let stream = self.stream.get_mut();
        stream
            .write_all(line.as_bytes())
            .await
            .map_err(|e| MailboxError::Protocol(format!("Write failed: {e}")))?;
        stream
            .write_all(b"\r\n")
            .await
            .map_err(|e| MailboxError::Protocol(format!("Write failed: {e}")))?;
        stream
            .flush()
            .await
            .map_err(|e| MailboxError::Protocol(format!("Write failed: {e}")))?;

        self.read_reply().await
    }

    async fn expect_ok(&mut self, line: &str) -> Result<String, MailboxError> {
        let reply = self.exchange(line).await?;
        if reply.ok {
            Ok(reply.detail)
        } else {
            Err(MailboxError::Protocol(reply.detail))
        }
    }

    async fn read_reply(&mut self) -> Result<Reply, MailboxError> {
        let mut line = String::new();
        let n = self
            .stream
            .read_line(&mut line)
            .await
            .map_err(|e| MailboxError::Protocol(format!("Read failed: {e}")))?;
        if n == 0 {
            return Err(MailboxError::Protocol("Connection closed".to_string()));
        }

        let line = line.trim_end_matches(['\r', '\n']);
        debug!("S: {}", line);

        if let Some(rest) = line.strip_prefix("+OK") {
            return Ok(Reply {
                ok: true,
                detail: rest.trim_start().to_string(),
            });
        }
        if let Some(rest) = line.strip_prefix("-ERR") {
            return Ok(Reply {
                ok: false,
                detail: rest.trim_start().to_string(),
            });
        }
        Err(MailboxError::Protocol(format!("Unexpected reply: {line}")))
    }

    /// Read a multi-line data block up to the lone-dot terminator,
    /// undoing the doubled leading dots the wire format requires.
    async fn read_data(&mut self) -> Result<Vec<u8>, MailboxError> {
        let mut body = Vec::new();
        loop {
            let mut line = Vec::new();
            let n = self
                .stream
                .read_until(b'\n', &mut line)
                .await
                .map_err(|e| MailboxError::Protocol(format!("Read failed: {e}")))?;
            if n == 0 {
                return Err(MailboxError::Protocol(
                    "Connection closed mid-transfer".to_string(),
                ));
            }
            if line.as_slice() == b".\r\n" || line.as_slice() == b".\n" {
                return Ok(body);
            }
            let stuffed = usize::from(line.first() == Some(&b'.'));
            body.extend_from_slice(&line[stuffed..]);
        }
    }
}

#[async_trait]
impl MailboxSession for Pop3Session {
    async fn list_pending(&mut self) -> Result<Vec<MessageId>, MailboxError> {
        self.expect_ok("LIST").await?;

        let listing = self.read_data().await?;
        let mut ids = Vec::new();
        for line in String::from_utf8_lossy(&listing).lines() {
            let id = line
                .split_whitespace()
                .next()
                .and_then(|token| token.parse().ok())
                .ok_or_else(|| MailboxError::Protocol(format!("Bad LIST line: {line}")))?;
            ids.push(id);
        }
        Ok(ids)
    }

    async fn fetch(&mut self, id: MessageId) -> Result<Vec<u8>, MailboxError> {
        self.expect_ok(&format!("RETR {id}")).await?;
        self.read_data().await
    }

    async fn delete(&mut self, id: MessageId) -> Result<(), MailboxError> {
        self.expect_ok(&format!("DELE {id}")).await.map(drop)
    }

    async fn quit(&mut self) -> Result<(), MailboxError> {
        self.expect_ok("QUIT").await.map(drop)
    }
}

/// Build a TLS connector that accepts all certificates.
///
/// The remote endpoints use self-signed certificates, so verification
/// is skipped entirely.
fn tls_connector() -> TlsConnector {
    let config = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(DangerousVerifier))
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

/// Certificate verifier that accepts all certificates
/// (for self-signed mailbox endpoints).
#[derive(Debug)]
struct DangerousVerifier;

impl rustls::client::danger::ServerCertVerifier for DangerousVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
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
