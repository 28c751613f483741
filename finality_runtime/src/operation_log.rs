//! Append-only operation log, binary protobuf frames.
//!
//! Storage format: length-prefixed protobuf frames.
//!   [4-byte LE length][protobuf bytes][4-byte LE length][protobuf bytes]...
//!
//! Rules:
//!   - strict append only, no mutation, deletion or reordering
//!   - fsync after every write
//!   - sequence strictly increasing (validated on append)

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use prost::Message;
use tracing::debug;

use finality_kernel::OperationEnvelope;

use crate::error::{RuntimeError, RuntimeResult};
use crate::proto_bridge::{operation_to_proto, proto_to_operation};
use crate::proto_types::ProtoOperationEnvelope;

/// Largest frame accepted on read.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

pub struct OperationLog {
    path: PathBuf,
    last_sequence: u64,
}

impl OperationLog {
    /// Open or create the log at `path`.
    /// Reads existing frames to determine the last sequence number.
    pub fn open(path: &Path) -> RuntimeResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let last_sequence = if path.exists() {
            read_log(path)?.last().map(|e| e.sequence).unwrap_or(0)
        } else {
            0
        };

        Ok(Self {
            path: path.to_path_buf(),
            last_sequence,
        })
    }

    /// Append one committed operation and fsync.
    pub fn append(&mut self, envelope: &OperationEnvelope) -> RuntimeResult<()> {
        let expected = self.last_sequence + 1;
        if envelope.sequence != expected {
            return Err(RuntimeError::LogSequence {
                expected,
                got: envelope.sequence,
            });
        }

        let buf = operation_to_proto(envelope).encode_to_vec();
        let len = u32::try_from(buf.len()).map_err(|_| RuntimeError::FrameLength(buf.len()))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        {
            let mut writer = BufWriter::new(&mut file);
            writer.write_all(&len.to_le_bytes())?;
            writer.write_all(&buf)?;
            writer.flush()?;
        }
        file.sync_all()?;

        self.last_sequence = envelope.sequence;
        debug!(sequence = envelope.sequence, bytes = buf.len(), "Operation appended");
        Ok(())
    }

    /// All operations in log order.
    pub fn load_all(&self) -> RuntimeResult<Vec<OperationEnvelope>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        read_log(&self.path)
    }

    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Read every frame of a log file, validating frame integrity.
pub fn read_log(path: &Path) -> RuntimeResult<Vec<OperationEnvelope>> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut envelopes = Vec::new();
    let mut len_buf = [0u8; 4];

    loop {
        match reader.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }

        let len = u32::from_le_bytes(len_buf) as usize;
        if len == 0 || len > MAX_FRAME_LEN {
            return Err(RuntimeError::FrameLength(len));
        }

        let mut frame = vec![0u8; len];
        reader
            .read_exact(&mut frame)
            .map_err(RuntimeError::TruncatedFrame)?;

        let proto = ProtoOperationEnvelope::decode(frame.as_slice())?;
        envelopes.push(proto_to_operation(&proto)?);
    }

    Ok(envelopes)
}
