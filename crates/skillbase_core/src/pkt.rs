//! Pkt-line framing, side-band multiplexing, and the upload-pack request
//! grammar.
//!
//! A pkt-line is `<4 hex digits><payload>` where the length includes the
//! four header bytes; `0000` is a flush marker carrying no payload.

use crate::error::GitError;
use crate::oid::Oid;

/// Largest payload of one side-band-64k frame: a pkt-line carries at most
/// 65,516 bytes of data, one of which is the band byte.
pub const MAX_SIDE_BAND_DATA: usize = 65_515;

/// Side-band channel carrying pack data.
pub const BAND_PACK: u8 = 1;

/// One parsed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PktLine {
    /// The `0000` marker.
    Flush,
    /// A data frame's payload.
    Data(Vec<u8>),
}

fn proto(msg: impl Into<String>) -> GitError {
    GitError::Protocol(msg.into())
}

/// Split a request body into pkt-line frames.
pub fn parse_pkt_lines(body: &[u8]) -> Result<Vec<PktLine>, GitError> {
    let mut frames = Vec::new();
    let mut rest = body;
    while !rest.is_empty() {
        if rest.len() < 4 {
            return Err(proto("truncated pkt-line length"));
        }
        let len_str = std::str::from_utf8(&rest[..4])
            .map_err(|_| proto("non-ascii pkt-line length"))?;
        let len = usize::from_str_radix(len_str, 16)
            .map_err(|_| proto(format!("bad pkt-line length {len_str:?}")))?;
        if len == 0 {
            frames.push(PktLine::Flush);
            rest = &rest[4..];
            continue;
        }
        if len < 4 {
            return Err(proto(format!("pkt-line length {len} below header size")));
        }
        if rest.len() < len {
            return Err(proto("pkt-line payload truncated"));
        }
        frames.push(PktLine::Data(rest[4..len].to_vec()));
        rest = &rest[len..];
    }
    Ok(frames)
}

/// Append one data pkt, length prefix included.
pub fn write_pkt_line(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(format!("{:04x}", data.len() + 4).as_bytes());
    out.extend_from_slice(data);
}

/// Append a flush marker.
pub fn write_flush(out: &mut Vec<u8>) {
    out.extend_from_slice(b"0000");
}

/// Multiplex `data` onto a side-band channel, splitting into capped frames.
pub fn write_side_band(out: &mut Vec<u8>, band: u8, data: &[u8]) {
    for chunk in data.chunks(MAX_SIDE_BAND_DATA) {
        let mut frame = Vec::with_capacity(chunk.len() + 1);
        frame.push(band);
        frame.extend_from_slice(chunk);
        write_pkt_line(out, &frame);
    }
}

/// A parsed upload-pack negotiation request.
#[derive(Debug, Default, Clone)]
pub struct UploadPackRequest {
    /// Requested tip commits.
    pub wants: Vec<Oid>,
    /// Objects the client already has; prune the closure walk at these.
    pub haves: Vec<Oid>,
    /// Requested shallow-clone depth, if any.
    pub deepen: Option<u32>,
    /// Whether the client ended negotiation.
    pub done: bool,
}

impl UploadPackRequest {
    /// Parse `want`/`have`/`deepen`/`done` lines out of a pkt-line body.
    ///
    /// The first `want` line may carry a capability list after the id; it is
    /// accepted and ignored, as are unrecognized lines such as `agent=`.
    pub fn parse(body: &[u8]) -> Result<Self, GitError> {
        let mut req = UploadPackRequest::default();
        for frame in parse_pkt_lines(body)? {
            let PktLine::Data(data) = frame else { continue };
            let line = std::str::from_utf8(&data)
                .map_err(|_| proto("non-utf8 negotiation line"))?;
            let line = line.trim_end_matches('\n');
            if let Some(rest) = line.strip_prefix("want ") {
                let id = rest.split(' ').next().unwrap_or(rest);
                req.wants
                    .push(id.parse().map_err(|_| proto(format!("bad want line {line:?}")))?);
            } else if let Some(rest) = line.strip_prefix("have ") {
                req.haves
                    .push(rest.trim().parse().map_err(|_| proto(format!("bad have line {line:?}")))?);
            } else if let Some(rest) = line.strip_prefix("deepen ") {
                let depth = rest
                    .trim()
                    .parse::<u32>()
                    .map_err(|_| proto(format!("bad deepen depth {rest:?}")))?;
                req.deepen = Some(depth);
            } else if line == "done" {
                req.done = true;
            }
        }
        Ok(req)
    }
}
