#![forbid(unsafe_code)]

use crate::jsonrpc::{JsonRpcRequest, json_rpc_error};
use crate::server::ApiServer;
use serde_json::Value;
use std::io::{BufRead, BufReader, Error, ErrorKind, Write};

const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Wire framing for one stdio session, sniffed from the first non-empty
/// line and kept for the rest of the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Framing {
    /// One JSON document per line.
    Lines,
    /// LSP-style: Content-Length headers, a blank line, a JSON body.
    Headers,
}

impl Framing {
    fn sniff(first_line: &str) -> Option<Self> {
        let start = first_line.trim_start();
        if start.starts_with('{') || start.starts_with('[') {
            Some(Self::Lines)
        } else if start.to_ascii_lowercase().starts_with("content-") {
            Some(Self::Headers)
        } else {
            None
        }
    }

    fn write_frame(self, out: &mut impl Write, reply: &Value) -> std::io::Result<()> {
        let body = serde_json::to_vec(reply).map_err(Error::other)?;
        match self {
            Self::Lines => {
                out.write_all(&body)?;
                out.write_all(b"\n")?;
            }
            Self::Headers => {
                write!(out, "Content-Length: {}\r\n\r\n", body.len())?;
                out.write_all(&body)?;
            }
        }
        out.flush()
    }
}

pub fn run_stdio(server: &mut ApiServer) -> std::io::Result<()> {
    let stdin = std::io::stdin();
    let mut reader = BufReader::new(stdin.lock());
    let mut stdout = std::io::stdout().lock();
    serve(server, &mut reader, &mut stdout)
}

fn serve<R: BufRead, W: Write>(
    server: &mut ApiServer,
    reader: &mut R,
    out: &mut W,
) -> std::io::Result<()> {
    let mut framing: Option<Framing> = None;

    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Ok(());
        }
        if line.trim().is_empty() {
            continue;
        }

        let mode = match framing {
            Some(mode) => mode,
            None => match Framing::sniff(&line) {
                Some(mode) => {
                    framing = Some(mode);
                    mode
                }
                None => continue,
            },
        };

        let body = match mode {
            Framing::Lines => line.trim().as_bytes().to_vec(),
            Framing::Headers => match read_header_frame(reader, line)? {
                Some(body) => body,
                None => return Ok(()),
            },
        };

        let reply = match decode(&body) {
            Ok(request) => server.handle(request),
            Err(error_reply) => Some(error_reply),
        };
        if let Some(reply) = reply {
            mode.write_frame(out, &reply)?;
        }
    }
}

/// Reads the remaining headers and the body of one header-framed
/// request. `first_header` is the line the session loop already
/// consumed. `None` means EOF mid-frame.
fn read_header_frame(
    reader: &mut impl BufRead,
    first_header: String,
) -> std::io::Result<Option<Vec<u8>>> {
    let mut declared_len: Option<usize> = None;
    let mut line = first_header;
    loop {
        if declared_len.is_none() {
            declared_len = content_length(&line);
        }
        if line.trim_end().is_empty() {
            break;
        }
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
    }

    let len = declared_len
        .ok_or_else(|| Error::new(ErrorKind::InvalidData, "missing Content-Length header"))?;
    if len > MAX_FRAME_BYTES {
        return Err(Error::new(
            ErrorKind::InvalidData,
            "Content-Length exceeds the frame cap",
        ));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;
    Ok(Some(body))
}

fn content_length(line: &str) -> Option<usize> {
    let (name, value) = line.split_once(':')?;
    if !name.trim().eq_ignore_ascii_case("content-length") {
        return None;
    }
    value.trim().parse().ok()
}

fn decode(body: &[u8]) -> Result<JsonRpcRequest, Value> {
    let data: Value = serde_json::from_slice(body)
        .map_err(|e| json_rpc_error(None, -32700, &format!("Parse error: {e}")))?;
    if !data.is_object() {
        return Err(json_rpc_error(None, -32600, "Invalid Request"));
    }
    let id = data.get("id").cloned();
    if data.get("method").is_none() {
        return Err(json_rpc_error(id, -32600, "Invalid Request"));
    }
    serde_json::from_value(data)
        .map_err(|e| json_rpc_error(id, -32600, &format!("Invalid Request: {e}")))
}
