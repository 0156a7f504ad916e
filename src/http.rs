//! Response building for the one-shot protocol.
//!
//! The event loop does not interpret requests. It hands the bytes it read to
//! a [`Respond`] implementation and writes back whatever comes out.

/// Turns the bytes read from a client into the bytes sent back.
///
/// There is no failure path: every request, well-formed or not, gets a
/// response.
pub trait Respond {
    fn respond(&mut self, request: &[u8]) -> Vec<u8>;
}

impl<F> Respond for F
where
    F: FnMut(&[u8]) -> Vec<u8>,
{
    fn respond(&mut self, request: &[u8]) -> Vec<u8> {
        self(request)
    }
}

pub const DEFAULT_BODY: &str = "Hello world!";

/// Answers every request with `200 OK` and a fixed plain-text body.
#[derive(Debug, Clone)]
pub struct StaticResponse {
    rendered: Vec<u8>,
}

impl StaticResponse {
    pub fn new(body: impl AsRef<str>) -> Self {
        let body = body.as_ref();
        let rendered = format!(
            "HTTP/1.1 200 OK\r\n\
             Content-Type: text/plain\r\n\
             Content-Length: {}\r\n\
             Connection: close\r\n\
             \r\n\
             {}",
            body.len(),
            body
        );

        Self {
            rendered: rendered.into_bytes(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.rendered
    }
}

impl Default for StaticResponse {
    fn default() -> Self {
        Self::new(DEFAULT_BODY)
    }
}

impl Respond for StaticResponse {
    fn respond(&mut self, _request: &[u8]) -> Vec<u8> {
        self.rendered.clone()
    }
}

/// First line of a request, for logs. Invalid UTF-8 is replaced.
pub fn request_line(request: &[u8]) -> String {
    let end = request
        .iter()
        .position(|&b| b == b'\n')
        .unwrap_or(request.len());

    String::from_utf8_lossy(&request[..end]).trim().to_string()
}
