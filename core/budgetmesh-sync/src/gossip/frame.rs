//! Datagram framing.
//!
//! ```text
//! "BM" ‖ kind(u8) ‖ body
//! ```
//!
//! `kind` 1 carries an encrypted envelope; `kind` 2 is a heartbeat whose
//! body is the sender's 8-byte instance tag, which lets a node recognise
//! its own multicast loopback.

/// Leading magic of every frame.
pub const MAGIC: &[u8; 2] = b"BM";

const KIND_DATA: u8 = 1;
const KIND_HEARTBEAT: u8 = 2;

/// A decoded frame borrowing from the receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame<'a> {
    Data(&'a [u8]),
    Heartbeat { instance: u64 },
}

impl Frame<'_> {
    /// Serializes the frame.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Frame::Data(body) => {
                let mut out = Vec::with_capacity(MAGIC.len() + 1 + body.len());
                out.extend_from_slice(MAGIC);
                out.push(KIND_DATA);
                out.extend_from_slice(body);
                out
            }
            Frame::Heartbeat { instance } => {
                let mut out = Vec::with_capacity(MAGIC.len() + 1 + 8);
                out.extend_from_slice(MAGIC);
                out.push(KIND_HEARTBEAT);
                out.extend_from_slice(&instance.to_be_bytes());
                out
            }
        }
    }
}

/// Parses a datagram. Anything that is not a well-formed frame is `None`.
pub fn decode(datagram: &[u8]) -> Option<Frame<'_>> {
    let rest = datagram.strip_prefix(MAGIC.as_slice())?;
    let (&kind, body) = rest.split_first()?;
    match kind {
        KIND_DATA if !body.is_empty() => Some(Frame::Data(body)),
        KIND_HEARTBEAT => {
            let instance: [u8; 8] = body.try_into().ok()?;
            Some(Frame::Heartbeat {
                instance: u64::from_be_bytes(instance),
            })
        }
        _ => None,
    }
}
