//! Loopback proxy servers for exercising the reqwest transport in tests

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Target URL that never needs DNS; loopback proxies answer for it
pub(crate) const TARGET_URL: &str = "http://127.0.0.1:9/";

const OK_RESPONSE: &str = "HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

/// A running loopback proxy and what it has received so far
pub(crate) struct LoopbackProxy {
    pub(crate) addr: SocketAddr,
    seen: Arc<Mutex<Vec<String>>>,
}

impl LoopbackProxy {
    pub(crate) fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Request heads (HTTP) or handshake notes (SOCKS5), in arrival order
    pub(crate) fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }

    fn spawn<F>(handler: F) -> Self
    where
        F: Fn(&mut TcpStream, &Mutex<Vec<String>>) -> io::Result<()> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);

        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { continue };
                let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
                let _ = handler(&mut stream, &log);
            }
        });

        Self { addr, seen }
    }
}

/// HTTP proxy answering every request with `status_line` (e.g. `HTTP/1.1 200 OK`)
pub(crate) fn http_proxy(status_line: &'static str) -> LoopbackProxy {
    LoopbackProxy::spawn(move |stream, log| {
        let head = read_head(stream)?;
        log.lock().unwrap().push(head);
        let response = format!(
            "{}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            status_line
        );
        stream.write_all(response.as_bytes())
    })
}

/// SOCKS5 server that accepts CONNECT and answers the tunnelled request with 200.
///
/// With `credentials`, only username/password auth is offered and the pair
/// received is logged as `auth <login>:<password>`.
pub(crate) fn socks5_proxy(credentials: Option<(&'static str, &'static str)>) -> LoopbackProxy {
    LoopbackProxy::spawn(move |stream, log| {
        let mut greeting = [0u8; 2];
        stream.read_exact(&mut greeting)?;
        let mut methods = vec![0u8; greeting[1] as usize];
        stream.read_exact(&mut methods)?;

        match credentials {
            Some((login, password)) => {
                stream.write_all(&[5, 2])?;
                let mut header = [0u8; 2];
                stream.read_exact(&mut header)?;
                let mut user = vec![0u8; header[1] as usize];
                stream.read_exact(&mut user)?;
                let mut len = [0u8; 1];
                stream.read_exact(&mut len)?;
                let mut pass = vec![0u8; len[0] as usize];
                stream.read_exact(&mut pass)?;

                let user = String::from_utf8_lossy(&user).into_owned();
                let pass = String::from_utf8_lossy(&pass).into_owned();
                log.lock().unwrap().push(format!("auth {}:{}", user, pass));

                let accepted = user == login && pass == password;
                stream.write_all(&[1, if accepted { 0 } else { 1 }])?;
                if !accepted {
                    return Ok(());
                }
            }
            None => stream.write_all(&[5, 0])?,
        }

        let mut request = [0u8; 4];
        stream.read_exact(&mut request)?;
        let addr_len = match request[3] {
            1 => 4,
            4 => 16,
            _ => {
                let mut len = [0u8; 1];
                stream.read_exact(&mut len)?;
                len[0] as usize
            }
        };
        let mut rest = vec![0u8; addr_len + 2];
        stream.read_exact(&mut rest)?;
        log.lock().unwrap().push("connect".to_string());
        stream.write_all(&[5, 0, 0, 1, 0, 0, 0, 0, 0, 0])?;

        let head = read_head(stream)?;
        log.lock().unwrap().push(head);
        stream.write_all(OK_RESPONSE.as_bytes())
    })
}

/// A loopback port with nothing listening on it
pub(crate) fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn read_head(stream: &mut TcpStream) -> io::Result<String> {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        if stream.read(&mut byte)? == 0 {
            break;
        }
        head.push(byte[0]);
    }
    Ok(String::from_utf8_lossy(&head).into_owned())
}
