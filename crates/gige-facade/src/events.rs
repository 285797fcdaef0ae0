//! Event channel used by the streaming surface to decouple frame delivery
//! from any particular front end (CLI, GUI, test harness).

use gige::gvsp_client::AssembledFrame;
use tokio::sync::mpsc;

/// Events emitted by a running [`crate::stream::StreamHandle`].
#[derive(Debug)]
pub enum Event {
    /// A full frame was assembled.
    FrameReceived(AssembledFrame),
    /// A frame was dropped (block id mismatch between trailer and leader).
    FrameDropped { block_id: u16 },
}

/// Sender/receiver pair for [`Event`]s.
pub struct EventChannel {
    pub tx: mpsc::Sender<Event>,
    pub rx: mpsc::Receiver<Event>,
}

impl EventChannel {
    /// Create a bounded channel with the given buffer size.
    pub fn new(buffer: usize) -> Self {
        let (tx, rx) = mpsc::channel(buffer);
        EventChannel { tx, rx }
    }
}
