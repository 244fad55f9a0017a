//! In-process fake POP3 server for integration testing
//!
//! # How POP3 works (educational overview)
//!
//! POP3 (Post Office Protocol version 3, RFC 1939) is a line-based
//! text protocol for draining a remote maildrop. Unlike IMAP there are
//! no folders, flags, or server-side search: the client lists what is
//! waiting, downloads it, and usually deletes it.
//!
//! ## Connection lifecycle
//!
//! ```text
//!   Client connects via TCP (or TLS for POP3S)
//!       |
//!   Server sends greeting: "+OK server ready\r\n"
//!       |
//!   Client authenticates: USER name, then PASS secret
//!       |
//!   Client issues commands: LIST, RETR n, DELE n, ...
//!       |
//!   Client sends QUIT; the server commits deletions
//! ```
//!
//! ## Response format
//!
//! Every reply starts with a status indicator, `+OK` or `-ERR`,
//! optionally followed by human-readable detail:
//!
//! ```text
//!   Client:  USER testuser
//!   Server:  +OK send PASS
//!   Client:  PASS wrong
//!   Server:  -ERR invalid credentials
//! ```
//!
//! ## Multi-line responses and dot-stuffing
//!
//! LIST and RETR replies are multi-line: after the `+OK` status the
//! server streams lines and terminates with a line containing only a
//! dot. A message line that itself starts with a dot is sent with the
//! dot doubled so it cannot be mistaken for the terminator; the client
//! removes the extra dot on receipt:
//!
//!   `+OK message follows` / `<dot-stuffed message lines>` / `.`

use super::io::{write_bytes, write_line};
use super::maildrop::Maildrop;
use rcgen::generate_simple_self_signed;
use rustls::pki_types::PrivatePkcs8KeyDer;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;

/// A fake POP3 server on localhost with an OS-assigned port.
///
/// Runs until dropped. Deletions requested by clients are recorded in
/// shared state so tests can assert on them after the session ends.
pub struct FakePop3Server {
    port: u16,
    deleted: Arc<Mutex<Vec<u32>>>,
    /// Handle to the background task so it lives as long as the server.
    _handle: tokio::task::JoinHandle<()>,
}

impl FakePop3Server {
    /// Start a plain-TCP server with the given maildrop state.
    pub async fn start(maildrop: Maildrop) -> Self {
        Self::spawn(maildrop, None).await
    }

    /// Start a TLS (POP3S) server. The certificate is self-signed via
    /// `rcgen`, matching the accept-all verifier on the client side.
    pub async fn start_tls(maildrop: Maildrop) -> Self {
        // Ensure the ring crypto provider is installed process-wide.
        // Multiple tests may race to install it, so the error is
        // ignored if it is already set.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let cert = generate_simple_self_signed(vec!["127.0.0.1".to_string()])
            .expect("generate self-signed cert");

        let cert_der = cert.cert.der().clone();
        let key_der = PrivatePkcs8KeyDer::from(cert.key_pair.serialize_der());

        let tls_config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(vec![cert_der], key_der.into())
            .expect("build server TLS config");

        Self::spawn(maildrop, Some(TlsAcceptor::from(Arc::new(tls_config)))).await
    }

    async fn spawn(maildrop: Maildrop, acceptor: Option<TlsAcceptor>) -> Self {
        // Bind to any available port on localhost.
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind to ephemeral port");
        let port = listener.local_addr().unwrap().port();

        let deleted = Arc::new(Mutex::new(Vec::new()));
        let maildrop = Arc::new(maildrop);

        let deleted_in_server = Arc::clone(&deleted);
        let handle = tokio::spawn(async move {
            loop {
                let Ok((stream, _addr)) = listener.accept().await else {
                    break;
                };
                let maildrop = Arc::clone(&maildrop);
                let deleted = Arc::clone(&deleted_in_server);
                let acceptor = acceptor.clone();
                tokio::spawn(async move {
                    handle_connection(stream, acceptor, &maildrop, &deleted).await;
                });
            }
        });

        Self {
            port,
            deleted,
            _handle: handle,
        }
    }

    /// The port the server is listening on.
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Message numbers clients deleted, in deletion order.
    pub fn deleted(&self) -> Vec<u32> {
        self.deleted.lock().unwrap().clone()
    }
}

/// Handle one client connection, upgrading to TLS first when the
/// server was started in TLS mode.
async fn handle_connection(
    stream: TcpStream,
    acceptor: Option<TlsAcceptor>,
    maildrop: &Maildrop,
    deleted: &Mutex<Vec<u32>>,
) {
    if let Some(acceptor) = acceptor {
        let Ok(tls_stream) = acceptor.accept(stream).await else {
            return;
        };
        serve(tls_stream, maildrop, deleted).await;
    } else {
        serve(stream, maildrop, deleted).await;
    }
}

/// Run the POP3 command loop over an established stream.
async fn serve<S: AsyncRead + AsyncWrite + Unpin>(
    stream: S,
    maildrop: &Maildrop,
    deleted: &Mutex<Vec<u32>>,
) {
    let mut reader = BufReader::new(stream);

    if write_line(&mut reader, "+OK fake POP3 server ready\r\n")
        .await
        .is_err()
    {
        return;
    }

    let mut user_matches = false;
    let mut authed = false;
    let mut session_deleted: HashSet<u32> = HashSet::new();

    loop {
        let mut line = String::new();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        let line = line.trim_end_matches(['\r', '\n']);
        let (verb, arg) = line.split_once(' ').unwrap_or((line, ""));

        let response = match verb.to_ascii_uppercase().as_str() {
            "USER" => {
                user_matches = arg == maildrop.username;
                "+OK send PASS\r\n".to_string()
            }
            "PASS" => {
                if let Some(deny) = &maildrop.auth_deny {
                    format!("-ERR {deny}\r\n")
                } else if user_matches && arg == maildrop.password {
                    authed = true;
                    "+OK maildrop locked and ready\r\n".to_string()
                } else {
                    "-ERR invalid credentials\r\n".to_string()
                }
            }
            "LIST" if authed => {
                let mut listing = format!("+OK {} messages\r\n", maildrop.messages.len());
                for (number, raw) in numbered(maildrop) {
                    if !session_deleted.contains(&number) {
                        listing.push_str(&format!("{number} {}\r\n", raw.len()));
                    }
                }
                listing.push_str(".\r\n");
                listing
            }
            "RETR" if authed => match lookup(maildrop, &session_deleted, arg) {
                Some(raw) => {
                    if write_line(&mut reader, "+OK message follows\r\n")
                        .await
                        .is_err()
                    {
                        return;
                    }
                    if write_bytes(&mut reader, &dot_stuffed(raw)).await.is_err() {
                        return;
                    }
                    continue;
                }
                None => "-ERR no such message\r\n".to_string(),
            },
            "DELE" if authed => match lookup(maildrop, &session_deleted, arg) {
                Some(_) => {
                    let number = arg.parse().unwrap();
                    session_deleted.insert(number);
                    deleted.lock().unwrap().push(number);
                    "+OK marked for deletion\r\n".to_string()
                }
                None => "-ERR no such message\r\n".to_string(),
            },
            "QUIT" => {
                let _ = write_line(&mut reader, "+OK bye\r\n").await;
                return;
            }
            _ => "-ERR unsupported command\r\n".to_string(),
        };

        if write_line(&mut reader, &response).await.is_err() {
            return;
        }
    }
}

/// Messages paired with their 1-based POP3 numbers.
fn numbered(maildrop: &Maildrop) -> impl Iterator<Item = (u32, &Vec<u8>)> {
    maildrop
        .messages
        .iter()
        .enumerate()
        .map(|(index, raw)| (u32::try_from(index).unwrap() + 1, raw))
}

/// Resolve a message-number argument, honoring session deletions.
fn lookup<'a>(
    maildrop: &'a Maildrop,
    session_deleted: &HashSet<u32>,
    arg: &str,
) -> Option<&'a [u8]> {
    let number: u32 = arg.parse().ok()?;
    if number == 0 || session_deleted.contains(&number) {
        return None;
    }
    maildrop
        .messages
        .get(usize::try_from(number).ok()? - 1)
        .map(Vec::as_slice)
}

/// Encode a message for the wire: CRLF line endings, leading dots
/// doubled, and the lone-dot terminator appended.
fn dot_stuffed(raw: &[u8]) -> Vec<u8> {
    let mut lines: Vec<&[u8]> = raw
        .split(|b| *b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .collect();
    // A trailing newline does not produce an empty final line.
    if raw.ends_with(b"\n") {
        lines.pop();
    }

    let mut wire = Vec::with_capacity(raw.len() + 8);
    for line in lines {
        if line.first() == Some(&b'.') {
            wire.push(b'.');
        }
        wire.extend_from_slice(line);
        wire.extend_from_slice(b"\r\n");
    }
    wire.extend_from_slice(b".\r\n");
    wire
}
