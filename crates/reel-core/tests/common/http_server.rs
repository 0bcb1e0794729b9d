//! Minimal HTTP/1.1 server for integration tests.
//!
//! Serves one static body with HEAD and ranged GET, and accepts ranged PUTs
//! into an in-memory sink. Failure injection makes the first N requests for
//! each range offset answer 503; a GET without a usable range counts as
//! offset 0.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct ServerOptions {
    /// If false, HEAD returns 405 (servers that block HEAD).
    pub head_allowed: bool,
    /// If false, GET ignores Range and always returns 200 with the full body.
    pub support_ranges: bool,
    /// Requests for each range offset that fail with 503 before one succeeds.
    pub fail_first: u32,
    /// Status for accepted PUT chunks.
    pub put_status: u16,
    /// Zero bytes appended to every 206 body beyond the requested range.
    pub pad_ranges: usize,
    /// If true, HEAD and full-body GET responses carry no Content-Length.
    pub omit_length: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            head_allowed: true,
            support_ranges: true,
            fail_first: 0,
            put_status: 200,
            pad_ranges: 0,
            omit_length: false,
        }
    }
}

/// Handle to a running server. The server lives until the process exits.
#[derive(Clone)]
pub struct TestServer {
    pub url: String,
    /// Bytes received through PUT, placed at their Content-Range offsets.
    pub uploaded: Arc<Mutex<Vec<u8>>>,
    /// GET requests served (failed ones included).
    pub gets: Arc<AtomicUsize>,
    /// PUT requests received (failed ones included).
    pub puts: Arc<AtomicUsize>,
}

struct Shared {
    body: Vec<u8>,
    opts: ServerOptions,
    failures: Mutex<HashMap<u64, u32>>,
    uploaded: Arc<Mutex<Vec<u8>>>,
    gets: Arc<AtomicUsize>,
    puts: Arc<AtomicUsize>,
}

pub fn start(body: Vec<u8>) -> TestServer {
    start_with_options(body, ServerOptions::default())
}

pub fn start_with_options(body: Vec<u8>, opts: ServerOptions) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let shared = Arc::new(Shared {
        body,
        opts,
        failures: Mutex::new(HashMap::new()),
        uploaded: Arc::new(Mutex::new(Vec::new())),
        gets: Arc::new(AtomicUsize::new(0)),
        puts: Arc::new(AtomicUsize::new(0)),
    });
    let server = TestServer {
        url: format!("http://127.0.0.1:{}/media/clip.mp4", port),
        uploaded: Arc::clone(&shared.uploaded),
        gets: Arc::clone(&shared.gets),
        puts: Arc::clone(&shared.puts),
    };
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let shared = Arc::clone(&shared);
            thread::spawn(move || handle(stream, &shared));
        }
    });
    server
}

struct Request {
    method: String,
    range: Option<(u64, u64)>,
    content_range: Option<(u64, u64)>,
    body: Vec<u8>,
}

fn handle(mut stream: TcpStream, shared: &Shared) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(5)));
    let Some(req) = read_request(&mut stream) else {
        return;
    };
    let total = shared.body.len() as u64;

    if req.method.eq_ignore_ascii_case("HEAD") {
        if !shared.opts.head_allowed {
            respond(&mut stream, "405 Method Not Allowed", &[], &[]);
            return;
        }
        let len = total.to_string();
        let mut headers = vec![("Content-Type", "video/mp4")];
        if !shared.opts.omit_length {
            headers.push(("Content-Length", len.as_str()));
        }
        if shared.opts.support_ranges {
            headers.push(("Accept-Ranges", "bytes"));
        }
        respond_head(&mut stream, "200 OK", &headers);
        return;
    }

    if req.method.eq_ignore_ascii_case("GET") {
        shared.gets.fetch_add(1, Ordering::SeqCst);
        let range = req.range.filter(|_| shared.opts.support_ranges);
        if should_fail(shared, range.map(|r| r.0).unwrap_or(0)) {
            respond(&mut stream, "503 Service Unavailable", &[], &[]);
            return;
        }
        match range {
            Some((start, end_incl)) => {
                let end_incl = end_incl.min(total.saturating_sub(1));
                if start > end_incl {
                    let cr = format!("bytes */{}", total);
                    respond(&mut stream, "416 Range Not Satisfiable", &[("Content-Range", &cr)], &[]);
                    return;
                }
                let mut slice = shared.body[start as usize..=end_incl as usize].to_vec();
                slice.resize(slice.len() + shared.opts.pad_ranges, 0);
                let cr = format!("bytes {}-{}/{}", start, end_incl, total);
                respond(
                    &mut stream,
                    "206 Partial Content",
                    &[("Content-Range", &cr), ("Content-Type", "video/mp4")],
                    &slice,
                );
            }
            None if shared.opts.omit_length => {
                // Body delimited by connection close.
                let head = "HTTP/1.1 200 OK\r\nConnection: close\r\nContent-Type: video/mp4\r\n\r\n";
                let _ = stream.write_all(head.as_bytes());
                let _ = stream.write_all(&shared.body);
            }
            None => respond(&mut stream, "200 OK", &[("Content-Type", "video/mp4")], &shared.body),
        }
        return;
    }

    if req.method.eq_ignore_ascii_case("PUT") {
        shared.puts.fetch_add(1, Ordering::SeqCst);
        let start = req.content_range.map(|r| r.0).unwrap_or(0);
        if should_fail(shared, start) {
            respond(&mut stream, "503 Service Unavailable", &[], &[]);
            return;
        }
        if let Some((start, total)) = req.content_range {
            let mut sink = shared.uploaded.lock().unwrap();
            if sink.len() < total as usize {
                sink.resize(total as usize, 0);
            }
            let end = start as usize + req.body.len();
            if end <= sink.len() {
                sink[start as usize..end].copy_from_slice(&req.body);
            }
        }
        let status = match shared.opts.put_status {
            308 => "308 Resume Incomplete",
            201 => "201 Created",
            _ => "200 OK",
        };
        respond(&mut stream, status, &[], &[]);
        return;
    }

    respond(&mut stream, "405 Method Not Allowed", &[], &[]);
}

fn should_fail(shared: &Shared, offset: u64) -> bool {
    if shared.opts.fail_first == 0 {
        return false;
    }
    let mut failures = shared.failures.lock().unwrap();
    let seen = failures.entry(offset).or_insert(0);
    if *seen < shared.opts.fail_first {
        *seen += 1;
        true
    } else {
        false
    }
}

fn respond(stream: &mut TcpStream, status: &str, headers: &[(&str, &str)], body: &[u8]) {
    let mut head = format!("HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n", status, body.len());
    for (name, value) in headers {
        head.push_str(&format!("{}: {}\r\n", name, value));
    }
    head.push_str("\r\n");
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(body);
}

fn respond_head(stream: &mut TcpStream, status: &str, headers: &[(&str, &str)]) {
    let mut head = format!("HTTP/1.1 {}\r\nConnection: close\r\n", status);
    for (name, value) in headers {
        head.push_str(&format!("{}: {}\r\n", name, value));
    }
    head.push_str("\r\n");
    let _ = stream.write_all(head.as_bytes());
}

fn read_request(stream: &mut TcpStream) -> Option<Request> {
    let mut data = Vec::new();
    let mut buf = [0u8; 8192];
    let header_end = loop {
        if let Some(pos) = find(&data, b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut buf).ok()?;
        if n == 0 {
            return None;
        }
        data.extend_from_slice(&buf[..n]);
    };
    let head = std::str::from_utf8(&data[..header_end]).ok()?.to_string();

    let mut lines = head.lines();
    let method = lines.next()?.split_whitespace().next()?.to_string();
    let mut range = None;
    let mut content_range = None;
    let mut content_length = 0usize;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        let value = value.trim();
        if name.eq_ignore_ascii_case("range") {
            range = parse_range(value);
        } else if name.eq_ignore_ascii_case("content-range") {
            content_range = parse_content_range(value);
        } else if name.eq_ignore_ascii_case("content-length") {
            content_length = value.parse().unwrap_or(0);
        }
    }

    let mut body = data[header_end..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut buf).ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&buf[..n]);
    }
    body.truncate(content_length);
    Some(Request {
        method,
        range,
        content_range,
        body,
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// `bytes=X-Y` or `bytes=X-` as (start, end_inclusive).
fn parse_range(value: &str) -> Option<(u64, u64)> {
    let spec = value.strip_prefix("bytes=")?;
    let (a, b) = spec.split_once('-')?;
    let start = a.trim().parse().ok()?;
    let end = match b.trim() {
        "" => u64::MAX,
        e => e.parse().ok()?,
    };
    Some((start, end))
}

/// `bytes a-b/total` as (start, total); `bytes */0` as (0, 0).
fn parse_content_range(value: &str) -> Option<(u64, u64)> {
    let rest = value.strip_prefix("bytes ")?;
    let (span, total) = rest.split_once('/')?;
    let total = total.trim().parse().ok()?;
    if span.trim() == "*" {
        return Some((0, total));
    }
    let (a, _) = span.split_once('-')?;
    Some((a.trim().parse().ok()?, total))
}
