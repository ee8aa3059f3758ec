//! The outbound half of a sync connection

use crate::error::SyncError;
use crate::message::SyncMessage;
use crate::task::UpdateTask;
use box_graph::Checksum;
use bytes::Bytes;

/// Delivers source-side output to a target
///
/// Implementations must preserve call order end to end.
pub trait Synchronization: Send {
    /// Deliver the tasks of one committed transaction
    ///
    /// # Errors
    /// Returns the transport error
    fn send_updates(&mut self, tasks: Vec<UpdateTask>) -> Result<(), SyncError>;

    /// Deliver the source checksum after all previously sent batches
    ///
    /// # Errors
    /// Returns the transport error
    fn checksum(&mut self, checksum: Checksum) -> Result<(), SyncError>;

    /// Deliver a full snapshot replacing the target's state
    ///
    /// # Errors
    /// Returns the transport error
    fn snapshot(&mut self, snapshot: Bytes) -> Result<(), SyncError>;
}

/// Collects messages in memory
impl Synchronization for Vec<SyncMessage> {
    fn send_updates(&mut self, tasks: Vec<UpdateTask>) -> Result<(), SyncError> {
        self.push(SyncMessage::Updates(tasks));
        Ok(())
    }

    fn checksum(&mut self, checksum: Checksum) -> Result<(), SyncError> {
        self.push(SyncMessage::Checksum(checksum));
        Ok(())
    }

    fn snapshot(&mut self, snapshot: Bytes) -> Result<(), SyncError> {
        self.push(SyncMessage::Snapshot(snapshot));
        Ok(())
    }
}
