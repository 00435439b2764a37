use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::time::{Duration, Instant};
use anyhow::{bail, Context, Result};

/// Upper bound on an accepted SDP body
const MAX_BODY_LEN: usize = 64 * 1024;
/// Upper bound on the status line and on each header line
const MAX_LINE_LEN: usize = 4096;
const MAX_HEADERS: usize = 64;

const USER_AGENT: &str = concat!("source-browserd/", env!("CARGO_PKG_VERSION"));

/// Metadata returned by a successful probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescription {
    pub url: String,
    pub sdp: String,
    pub session_name: Option<String>,
}

impl SourceDescription {
    pub fn new(url: impl Into<String>, sdp: impl Into<String>) -> Self {
        let sdp = sdp.into();
        let session_name = sdp
            .lines()
            .find_map(|line| line.strip_prefix("s="))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty() && s != "-");
        Self {
            url: url.into(),
            sdp,
            session_name,
        }
    }
}

/// Probe protocol client: fetches a source description from a resolved endpoint.
/// Implementations must bound the time spent in `describe`.
pub trait Describe: Send + Sync {
    fn describe(&self, path: &str, address: Ipv4Addr, port: u16) -> Result<SourceDescription>;
}

/// Blocking RTSP client issuing a single DESCRIBE per connection.
///
/// A whole exchange is bounded by the connect timeout plus the I/O timeout,
/// however slowly the peer answers.
#[derive(Debug, Clone)]
pub struct RtspClient {
    connect_timeout: Duration,
    io_timeout: Duration,
}

impl RtspClient {
    pub fn new(connect_timeout: Duration, io_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            io_timeout,
        }
    }
}

impl Describe for RtspClient {
    fn describe(&self, path: &str, address: Ipv4Addr, port: u16) -> Result<SourceDescription> {
        let url = format!("rtsp://{}:{}{}", address, port, path);
        let addr = SocketAddr::from((address, port));
        let deadline = Instant::now() + self.connect_timeout + self.io_timeout;

        let mut stream = TcpStream::connect_timeout(&addr, self.connect_timeout)
            .with_context(|| format!("Failed to connect to {}", addr))?;
        stream.set_write_timeout(Some(remaining(deadline)?))?;

        let request = format!(
            "DESCRIBE {} RTSP/1.0\r\nCSeq: 1\r\nUser-Agent: {}\r\nAccept: application/sdp\r\n\r\n",
            url, USER_AGENT
        );
        stream
            .write_all(request.as_bytes())
            .with_context(|| format!("Failed to send DESCRIBE to {}", url))?;

        let response = read_response(BufReader::new(DeadlineReader { stream, deadline }))
            .with_context(|| format!("Bad DESCRIBE response from {}", url))?;

        let url = response.content_base.unwrap_or(url);
        Ok(SourceDescription::new(url, response.body))
    }
}

fn remaining(deadline: Instant) -> io::Result<Duration> {
    let left = deadline.saturating_duration_since(Instant::now());
    if left.is_zero() {
        return Err(io::Error::new(io::ErrorKind::TimedOut, "DESCRIBE deadline exceeded"));
    }
    Ok(left)
}

/// Socket reader that fails every read once `deadline` has passed
struct DeadlineReader {
    stream: TcpStream,
    deadline: Instant,
}

impl Read for DeadlineReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.set_read_timeout(Some(remaining(self.deadline)?))?;
        self.stream.read(buf)
    }
}

struct Response {
    content_base: Option<String>,
    body: String,
}

fn read_line(reader: &mut impl BufRead) -> Result<String> {
    let mut line = String::new();
    reader.by_ref().take(MAX_LINE_LEN as u64).read_line(&mut line)?;
    if line.len() >= MAX_LINE_LEN && !line.ends_with('\n') {
        bail!("line longer than {} bytes", MAX_LINE_LEN);
    }
    Ok(line)
}

fn read_response(mut reader: impl BufRead) -> Result<Response> {
    let status_line = read_line(&mut reader)?;
    let mut parts = status_line.split_whitespace();
    let version = parts.next().unwrap_or_default();
    let code = parts.next().unwrap_or_default();
    if !version.starts_with("RTSP/") {
        bail!("not an RTSP response: {:?}", status_line.trim_end());
    }
    if code != "200" {
        bail!("unexpected status: {}", status_line.trim_end());
    }

    let mut content_length = 0usize;
    let mut content_base = None;
    let mut headers = 0;
    loop {
        let line = read_line(&mut reader)?;
        if line.is_empty() {
            bail!("connection closed inside headers");
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        headers += 1;
        if headers > MAX_HEADERS {
            bail!("more than {} headers", MAX_HEADERS);
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if key.eq_ignore_ascii_case("content-length") {
            content_length = value
                .parse()
                .with_context(|| format!("invalid Content-Length: {}", value))?;
        } else if key.eq_ignore_ascii_case("content-base") {
            content_base = Some(value.trim_end_matches('/').to_string());
        }
    }

    if content_length == 0 {
        bail!("empty session description");
    }
    if content_length > MAX_BODY_LEN {
        bail!("session description too large: {} bytes", content_length);
    }

    let mut body = vec![0u8; content_length];
    reader
        .read_exact(&mut body)
        .context("truncated session description")?;
    let body = String::from_utf8(body).context("session description is not UTF-8")?;

    Ok(Response { content_base, body })
}
