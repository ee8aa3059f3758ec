//! Messages exchanged between a sync source and its target

use crate::error::CodecError;
use crate::task::UpdateTask;
use box_core::{DataInput, DataOutput};
use box_graph::Checksum;
use bytes::Bytes;

const TAG_UPDATES: u8 = 0;
const TAG_CHECKSUM: u8 = 1;
const TAG_SNAPSHOT: u8 = 2;
const TAG_REQUEST_SNAPSHOT: u8 = 3;

/// One unit on the sync channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncMessage {
    /// Tasks of one committed transaction, applied atomically
    Updates(Vec<UpdateTask>),
    /// Source checksum after the preceding batches
    Checksum(Checksum),
    /// Full graph state
    Snapshot(Bytes),
    /// Sent by a target that has diverged
    RequestSnapshot,
}

impl SyncMessage {
    /// Short name for logs
    #[inline]
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Updates(_) => "updates",
            Self::Checksum(_) => "checksum",
            Self::Snapshot(_) => "snapshot",
            Self::RequestSnapshot => "request-snapshot",
        }
    }

    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut out = DataOutput::new();
        match self {
            Self::Updates(tasks) => {
                out.write_u8(TAG_UPDATES);
                out.write_u32(u32::try_from(tasks.len()).unwrap_or(u32::MAX));
                for task in tasks {
                    task.write(&mut out);
                }
            }
            Self::Checksum(checksum) => {
                out.write_u8(TAG_CHECKSUM);
                out.write_raw(checksum.as_bytes());
            }
            Self::Snapshot(bytes) => {
                out.write_u8(TAG_SNAPSHOT);
                out.write_bytes(bytes);
            }
            Self::RequestSnapshot => out.write_u8(TAG_REQUEST_SNAPSHOT),
        }
        out.into_bytes()
    }

    /// Decode one complete message
    ///
    /// # Errors
    /// Returns [`CodecError`] on unknown tags, truncation or trailing bytes
    pub fn decode(bytes: Bytes) -> Result<Self, CodecError> {
        let mut input = DataInput::new(bytes);
        let message = match input.read_u8()? {
            TAG_UPDATES => {
                let count = input.read_u32()?;
                let mut tasks = Vec::with_capacity(count.min(1024) as usize);
                for _ in 0..count {
                    tasks.push(UpdateTask::read(&mut input)?);
                }
                Self::Updates(tasks)
            }
            TAG_CHECKSUM => {
                let raw = input.read_raw(32)?;
                let mut digest = [0u8; 32];
                digest.copy_from_slice(&raw);
                Self::Checksum(Checksum(digest))
            }
            TAG_SNAPSHOT => Self::Snapshot(input.read_bytes()?),
            TAG_REQUEST_SNAPSHOT => Self::RequestSnapshot,
            tag => return Err(CodecError::UnknownTag { kind: "message", tag }),
        };
        if !input.is_empty() {
            return Err(CodecError::Trailing(input.remaining()));
        }
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use box_core::{Address, BoxId, PrimitiveValue};
    use pretty_assertions::assert_eq;

    #[test]
    fn updates_message_keeps_task_order() {
        let id = BoxId::random();
        let message = SyncMessage::Updates(vec![
            UpdateTask::New {
                name: "Track".into(),
                uuid: id,
                snapshot: Bytes::from_static(&[0, 0, 0, 0]),
            },
            UpdateTask::Primitive {
                address: Address::compose(id, &[2]),
                value: PrimitiveValue::Int32(7),
            },
            UpdateTask::Delete { uuid: id },
        ]);
        assert_eq!(SyncMessage::decode(message.encode()).unwrap(), message);
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = SyncMessage::RequestSnapshot.encode().to_vec();
        bytes.push(0);
        assert!(matches!(
            SyncMessage::decode(Bytes::from(bytes)),
            Err(CodecError::Trailing(1))
        ));
    }

    #[test]
    fn empty_input_is_truncated() {
        assert!(matches!(
            SyncMessage::decode(Bytes::new()),
            Err(CodecError::Io(_))
        ));
    }
}
