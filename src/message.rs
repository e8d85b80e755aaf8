//! Request and response framing inside one stream.
//!
//! A message is a head of CRLF-terminated lines ended by an empty line, followed by the body.
//! The body ends where the sender closes its direction of the stream.
//!
//! ```text
//! GET /status\r\n            200 OK\r\n
//! Accept: text/plain\r\n     Content-Type: text/plain\r\n
//! \r\n                       \r\n
//! <body>                     <body>
//! ```

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader, ReadBuf};
use crate::error::{Error, Result};
use crate::mux::{StreamId, StreamReader, StreamState};

pub const MAX_HEAD_SIZE: usize = 64 * 1024;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Headers { entries: Vec::new() }
    }

    /// Appends a header; repeated names are kept in order.
    pub fn insert<N: Into<String>, V: Into<String>>(&mut self, name: N, value: V) {
        self.entries.push((name.into(), value.into()));
    }

    /// First value for `name`, compared case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn encode_into(&self, out: &mut Vec<u8>) -> Result<()> {
        for (name, value) in &self.entries {
            if !is_token(name) {
                return Err(Error::MalformedMessage(format!("invalid header name {:?}", name)));
            }
            if value.bytes().any(|b| b == b'\r' || b == b'\n') {
                return Err(Error::MalformedMessage(format!("invalid value for header {}", name)));
            }
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"\r\n");
        Ok(())
    }

    fn parse(lines: &[String]) -> Result<Headers> {
        let mut headers = Headers::new();
        for line in lines {
            let (name, value) = line.split_once(':')
                .ok_or_else(|| Error::MalformedMessage(format!("bad header line {:?}", line)))?;
            if !is_token(name) {
                return Err(Error::MalformedMessage(format!("invalid header name {:?}", name)));
            }
            headers.insert(name, value.trim());
        }
        Ok(headers)
    }
}

fn is_token(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_graphic() && b != b':')
}

fn is_target(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_graphic())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    pub path: String,
    pub headers: Headers,
}

impl RequestHead {
    pub fn new<M: Into<String>, P: Into<String>>(method: M, path: P) -> Self {
        RequestHead {
            method: method.into(),
            path: path.into(),
            headers: Headers::new(),
        }
    }

    pub fn get<P: Into<String>>(path: P) -> Self {
        Self::new("GET", path)
    }

    pub fn post<P: Into<String>>(path: P) -> Self {
        Self::new("POST", path)
    }

    pub fn header<N: Into<String>, V: Into<String>>(mut self, name: N, value: V) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        if !is_token(&self.method) {
            return Err(Error::MalformedMessage(format!("invalid method {:?}", self.method)));
        }
        if !is_target(&self.path) {
            return Err(Error::MalformedMessage(format!("invalid path {:?}", self.path)));
        }
        let mut out = Vec::new();
        out.extend_from_slice(self.method.as_bytes());
        out.push(b' ');
        out.extend_from_slice(self.path.as_bytes());
        out.extend_from_slice(b"\r\n");
        self.headers.encode_into(&mut out)?;
        Ok(out)
    }

    fn parse(lines: &[String]) -> Result<RequestHead> {
        let (first, rest) = lines.split_first()
            .ok_or_else(|| Error::MalformedMessage(String::from("empty request head")))?;
        let (method, path) = first.split_once(' ')
            .ok_or_else(|| Error::MalformedMessage(format!("bad request line {:?}", first)))?;
        if !is_token(method) || !is_target(path) {
            return Err(Error::MalformedMessage(format!("bad request line {:?}", first)));
        }
        Ok(RequestHead {
            method: String::from(method),
            path: String::from(path),
            headers: Headers::parse(rest)?,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    pub reason: String,
    pub headers: Headers,
}

impl ResponseHead {
    pub fn new(status: u16) -> Self {
        ResponseHead {
            status,
            reason: String::from(canonical_reason(status)),
            headers: Headers::new(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        if !(100..=999).contains(&self.status) {
            return Err(Error::MalformedMessage(format!("invalid status {}", self.status)));
        }
        if self.reason.bytes().any(|b| b == b'\r' || b == b'\n') {
            return Err(Error::MalformedMessage(String::from("invalid reason phrase")));
        }
        let mut out = format!("{} {}\r\n", self.status, self.reason).into_bytes();
        self.headers.encode_into(&mut out)?;
        Ok(out)
    }

    fn parse(lines: &[String]) -> Result<ResponseHead> {
        let (first, rest) = lines.split_first()
            .ok_or_else(|| Error::MalformedMessage(String::from("empty response head")))?;
        let (status, reason) = first.split_once(' ').unwrap_or((first.as_str(), ""));
        let status: u16 = match status.parse() {
            Ok(s) if status.len() == 3 && (100..=999).contains(&s) => s,
            _ => return Err(Error::MalformedMessage(format!("bad status line {:?}", first))),
        };
        Ok(ResponseHead {
            status,
            reason: String::from(reason),
            headers: Headers::parse(rest)?,
        })
    }
}

impl Default for ResponseHead {
    fn default() -> Self {
        Self::new(200)
    }
}

pub fn canonical_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        503 => "Service Unavailable",
        _ => "",
    }
}

async fn read_head_lines(reader: &mut BufReader<StreamReader>) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    let mut total = 0;
    loop {
        let mut line: Vec<u8> = Vec::new();
        let limit = (MAX_HEAD_SIZE - total) as u64;
        let n = (&mut *reader).take(limit).read_until(b'\n', &mut line).await
            .map_err(Error::from_io)?;
        total += n;
        if line.last() != Some(&b'\n') {
            if total >= MAX_HEAD_SIZE {
                return Err(Error::MalformedMessage(format!("message head exceeds {} bytes", MAX_HEAD_SIZE)));
            }
            return Err(Error::MalformedMessage(String::from("stream ended inside message head")));
        }
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        if line.is_empty() {
            return Ok(lines);
        }
        let line = String::from_utf8(line)
            .map_err(|_| Error::MalformedMessage(String::from("message head is not UTF-8")))?;
        lines.push(line);
    }
}

pub(crate) async fn read_request_head(reader: &mut BufReader<StreamReader>) -> Result<RequestHead> {
    RequestHead::parse(&read_head_lines(reader).await?)
}

pub(crate) async fn read_response_head(reader: &mut BufReader<StreamReader>) -> Result<ResponseHead> {
    ResponseHead::parse(&read_head_lines(reader).await?)
}

/// The body of a received message, read incrementally from its stream.
pub struct Body {
    reader: BufReader<StreamReader>,
}

impl Body {
    pub(crate) fn new(reader: BufReader<StreamReader>) -> Self {
        Body { reader }
    }

    pub fn stream_id(&self) -> StreamId {
        self.reader.get_ref().id()
    }

    pub fn stream_state(&self) -> StreamState {
        self.reader.get_ref().state()
    }

    /// Reads the rest of the body, up to the sender's end-of-body.
    pub async fn bytes(&mut self) -> Result<Bytes> {
        let mut data = Vec::new();
        self.reader.read_to_end(&mut data).await.map_err(Error::from_io)?;
        Ok(Bytes::from(data))
    }

    /// Abandons the exchange; the peer sees the stream reset.
    pub fn reset(&self) {
        self.reader.get_ref().reset();
    }
}

impl AsyncRead for Body {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut Pin::into_inner(self).reader).poll_read(cx, buf)
    }
}

/// A request as seen by a handler.
pub struct Request {
    pub head: RequestHead,
    pub body: Body,
}

impl Request {
    pub fn method(&self) -> &str {
        &self.head.method
    }

    pub fn path(&self) -> &str {
        &self.head.path
    }

    pub fn headers(&self) -> &Headers {
        &self.head.headers
    }
}

/// A response as seen by the originator of a request.
pub struct Response {
    pub head: ResponseHead,
    pub body: Body,
}

impl Response {
    pub fn status(&self) -> u16 {
        self.head.status
    }

    pub fn headers(&self) -> &Headers {
        &self.head.headers
    }
}
