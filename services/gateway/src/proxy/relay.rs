//! Backend dialing and bidirectional byte relay.
//!
//! Once a session has a routing decision, the relay dials the backend,
//! forwards the replayed handshake bytes, and then copies bytes in both
//! directions until either side terminates. The backend always sees the
//! handshake bytes first, then the verbatim continuation of the client
//! stream.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Default timeout for dialing a backend.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Copy buffer size per relay direction.
const BUFFER_SIZE: usize = 8192;

/// Dial a backend address with a connect timeout.
pub async fn connect_backend(addr: &str, connect_timeout: Duration) -> io::Result<TcpStream> {
    match timeout(connect_timeout, TcpStream::connect(addr)).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "connect timeout")),
    }
}

/// Splice two established connections until either direction finishes.
///
/// Each direction copies until its source reaches EOF or errors, then
/// shuts down the peer's write side so the far end observes EOF. Both
/// directions are awaited; the first error is returned, and a late error
/// on the surviving leg is logged only. Returns
/// `(bytes_to_backend, bytes_from_backend)` on clean completion.
///
/// Neither socket is closed here; both are dropped (and thereby closed)
/// by the session on every exit path.
pub async fn splice(client: &mut TcpStream, backend: &mut TcpStream) -> io::Result<(u64, u64)> {
    let (mut client_read, mut client_write) = client.split();
    let (mut backend_read, mut backend_write) = backend.split();

    let client_to_backend = async {
        let mut total = 0u64;
        let mut buf = vec![0u8; BUFFER_SIZE];
        loop {
            match client_read.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    backend_write.write_all(&buf[..n]).await?;
                    total += n as u64;
                }
                Err(e) => return Err(e),
            }
        }
        backend_write.shutdown().await?;
        Ok(total)
    };

    let backend_to_client = async {
        let mut total = 0u64;
        let mut buf = vec![0u8; BUFFER_SIZE];
        loop {
            match backend_read.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    client_write.write_all(&buf[..n]).await?;
                    total += n as u64;
                }
                Err(e) => return Err(e),
            }
        }
        client_write.shutdown().await?;
        Ok(total)
    };

    let (to_backend, from_backend) = tokio::join!(client_to_backend, backend_to_client);

    match (to_backend, from_backend) {
        (Ok(to_backend), Ok(from_backend)) => Ok((to_backend, from_backend)),
        (Err(e), Ok(n)) => {
            debug!(bytes_from_backend = n, "Client-to-backend leg failed");
            Err(e)
        }
        (Ok(n), Err(e)) => {
            debug!(bytes_to_backend = n, "Backend-to-client leg failed");
            Err(e)
        }
        (Err(e), Err(late)) => {
            debug!(error = %late, "Both relay legs failed");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn connect_times_out_against_unroutable_addr() {
        // RFC 5737 TEST-NET-1, nothing listens there.
        let result = connect_backend("192.0.2.1:25565", Duration::from_millis(100)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn splice_relays_both_directions() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Backend: read everything, echo it back uppercased, then close.
        let backend_task = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 16];
            let n = stream.read(&mut buf).await.unwrap();
            let reply: Vec<u8> = buf[..n].iter().map(u8::to_ascii_uppercase).collect();
            stream.write_all(&reply).await.unwrap();
        });

        // Client side of the pair being spliced.
        let client_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client_addr = client_listener.local_addr().unwrap();
        let client_task = tokio::spawn(async move {
            let mut stream = TcpStream::connect(client_addr).await.unwrap();
            stream.write_all(b"ping").await.unwrap();
            stream.shutdown().await.unwrap();
            let mut reply = Vec::new();
            stream.read_to_end(&mut reply).await.unwrap();
            reply
        });

        let (mut client, _) = client_listener.accept().await.unwrap();
        let mut backend = connect_backend(&addr.to_string(), DEFAULT_CONNECT_TIMEOUT)
            .await
            .unwrap();

        let (to_backend, from_backend) = splice(&mut client, &mut backend).await.unwrap();
        assert_eq!(to_backend, 4);
        assert_eq!(from_backend, 4);

        backend_task.await.unwrap();
        assert_eq!(client_task.await.unwrap(), b"PING");
    }
}
