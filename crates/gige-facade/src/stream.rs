//! Builder for a receiving stream session, generalised from this
//! workspace's existing stream-construction pattern.

use std::net::Ipv4Addr;
use std::time::Duration;

use gige::gvsp_client::GvspReceiver;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::FacadeError;
use crate::events::Event;

/// Builds a [`StreamHandle`] that receives and reassembles a GVSP stream,
/// forwarding completed frames as [`Event`]s.
pub struct StreamBuilder {
    bind_ip: Ipv4Addr,
    port: u16,
    frame_timeout: Duration,
}

impl StreamBuilder {
    /// Start building a stream session bound to `bind_ip`.
    pub fn new(bind_ip: Ipv4Addr) -> Self {
        StreamBuilder {
            bind_ip,
            port: 0,
            frame_timeout: Duration::from_secs(5),
        }
    }

    /// Bind to a specific local UDP port instead of an ephemeral one.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Per-frame assembly timeout.
    pub fn frame_timeout(mut self, timeout: Duration) -> Self {
        self.frame_timeout = timeout;
        self
    }

    /// Bind the receiver socket and spawn the reassembly loop.
    pub async fn build(self) -> Result<StreamHandle, FacadeError> {
        let receiver = GvspReceiver::bind(self.bind_ip, self.port).await?;
        let local_addr = receiver.local_addr().map_err(gige::GigeError::from)?;
        let (tx, rx) = mpsc::channel(16);
        let handle = spawn_loop(receiver, self.frame_timeout, tx);
        Ok(StreamHandle {
            local_addr,
            events: rx,
            task: handle,
        })
    }
}

fn spawn_loop(
    mut receiver: GvspReceiver,
    frame_timeout: Duration,
    tx: mpsc::Sender<Event>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match receiver.recv_frame(frame_timeout).await {
                Ok(frame) => {
                    if tx.send(Event::FrameReceived(frame)).await.is_err() {
                        break;
                    }
                }
                Err(_) => continue,
            }
        }
    })
}

/// A running stream-receiving session.
pub struct StreamHandle {
    local_addr: std::net::SocketAddr,
    events: mpsc::Receiver<Event>,
    task: JoinHandle<()>,
}

impl StreamHandle {
    /// The local address the receiver is bound to (tell the camera to send here).
    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.local_addr
    }

    /// Receive the next event.
    pub async fn next(&mut self) -> Option<Event> {
        self.events.recv().await
    }

    /// Stop the reassembly loop.
    pub fn abort(&self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builder_binds_ephemeral_port_by_default() {
        let handle = StreamBuilder::new(Ipv4Addr::LOCALHOST)
            .build()
            .await
            .expect("build");
        assert_ne!(handle.local_addr().port(), 0);
        handle.abort();
    }
}
