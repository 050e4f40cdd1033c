//! Minimal HTTP/1.1 server for downloader integration tests.
//!
//! Serves fixed responses per path and records the User-Agent of each request.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum Route {
    /// 200 with this body.
    Body(Vec<u8>),
    /// Bare status line, no body.
    Status(u16),
    /// 302 to another path on this server.
    Redirect(&'static str),
    /// Wait before answering 200 with the body.
    Slow(Duration, Vec<u8>),
}

pub struct ImageServer {
    pub base: String,
    user_agents: Arc<Mutex<Vec<String>>>,
}

impl ImageServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path.trim_start_matches('/'))
    }

    pub fn user_agents(&self) -> Vec<String> {
        self.user_agents.lock().unwrap().clone()
    }
}

/// Starts the server on a background thread; it runs until the process exits.
pub fn start(routes: Vec<(&'static str, Route)>) -> ImageServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let routes: Arc<HashMap<&'static str, Route>> = Arc::new(routes.into_iter().collect());
    let user_agents = Arc::new(Mutex::new(Vec::new()));
    let agents = Arc::clone(&user_agents);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let routes = Arc::clone(&routes);
            let agents = Arc::clone(&agents);
            thread::spawn(move || handle(stream, &routes, &agents));
        }
    });
    ImageServer {
        base: format!("http://127.0.0.1:{}/", port),
        user_agents,
    }
}

fn handle(
    mut stream: std::net::TcpStream,
    routes: &HashMap<&'static str, Route>,
    agents: &Mutex<Vec<String>>,
) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let Ok(request) = std::str::from_utf8(&buf[..n]) else {
        return;
    };
    let (path, user_agent) = parse_request(request);
    if let Some(ua) = user_agent {
        agents.lock().unwrap().push(ua.to_string());
    }

    let response: (String, &[u8]) = match routes.get(path) {
        Some(Route::Body(body)) => (ok_head(body.len()), body),
        Some(Route::Slow(delay, body)) => {
            thread::sleep(*delay);
            (ok_head(body.len()), body)
        }
        Some(Route::Status(code)) => (
            format!("HTTP/1.1 {} Status\r\nContent-Length: 0\r\n\r\n", code),
            &[],
        ),
        Some(Route::Redirect(to)) => (
            format!("HTTP/1.1 302 Found\r\nLocation: {}\r\nContent-Length: 0\r\n\r\n", to),
            &[],
        ),
        None => (
            "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n".to_string(),
            &[],
        ),
    };
    let _ = stream.write_all(response.0.as_bytes());
    let _ = stream.write_all(response.1);
}

fn ok_head(len: usize) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        len
    )
}

/// Returns (path, optional User-Agent).
fn parse_request(request: &str) -> (&str, Option<&str>) {
    let mut lines = request.lines();
    let path = lines
        .next()
        .and_then(|l| l.split_whitespace().nth(1))
        .unwrap_or("/");
    let user_agent = lines
        .take_while(|l| !l.trim().is_empty())
        .filter_map(|l| l.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("user-agent"))
        .map(|(_, v)| v.trim());
    (path, user_agent)
}
