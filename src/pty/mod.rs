mod manager;
mod stream;

pub use manager::{SpawnRequest, StreamManager, StreamProvider};
pub use stream::{ByteStream, InstanceId, PauseGate, StreamEvent, STREAM_QUEUE_SIZE};

#[cfg(test)]
pub(crate) use stream::mock;
