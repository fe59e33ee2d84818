//! Shared error type for the routing pipeline.
//!
//! Errors that one rank detects while its peers are healthy are carried
//! across the grid as a compact wire form (kind byte + message), so that
//! every rank observes the same failure and aborts together.

use thiserror::Error;

/// Errors raised by the routing pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The `.fai` sidecar could not be opened or parsed on rank 0.
    #[error("FASTA index unavailable: {0}")]
    IndexUnavailable(String),
    /// Opening, mapping, or reading the FASTA file failed.
    #[error("FASTA I/O error: {0}")]
    FastaIo(String),
    /// Bad input detected past the parsing layer: empty record slice,
    /// empty derived byte range, or a zero-length/zero-width record.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
    /// A per-pair payload exceeds the transport's element-count limit.
    #[error("oversized message: {0}")]
    OversizedMessage(String),
    /// Other I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Encode as a status payload: kind byte followed by the message.
    pub(crate) fn wire_encode(&self) -> Vec<u8> {
        let (code, msg) = match self {
            PipelineError::IndexUnavailable(m) => (1u8, m.clone()),
            PipelineError::FastaIo(m) => (2, m.clone()),
            PipelineError::InvariantViolation(m) => (3, m.clone()),
            PipelineError::OversizedMessage(m) => (4, m.clone()),
            PipelineError::Io(e) => (5, e.to_string()),
        };
        let mut buf = Vec::with_capacity(1 + msg.len());
        buf.push(code);
        buf.extend_from_slice(msg.as_bytes());
        buf
    }

    /// Decode a status payload produced by [`wire_encode`].
    ///
    /// [`wire_encode`]: PipelineError::wire_encode
    pub(crate) fn wire_decode(buf: &[u8]) -> Self {
        let msg = String::from_utf8_lossy(&buf[1..]).into_owned();
        match buf[0] {
            1 => PipelineError::IndexUnavailable(msg),
            2 => PipelineError::FastaIo(msg),
            3 => PipelineError::InvariantViolation(msg),
            4 => PipelineError::OversizedMessage(msg),
            _ => PipelineError::Io(std::io::Error::other(msg)),
        }
    }
}
