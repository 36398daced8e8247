use std::sync::Arc;
use std::time::Duration;

use mflow_core::{Message, RawFrame, Registry};
use mflow_transport::Transport;
use tokio::sync::mpsc;

use crate::live_flag::LiveFlag;

/// Pulls frames from the transport, decodes them, pushes onto the bounded
/// data queue. Sets `live_flag` once its transport connection is open and
/// it has reached its main loop; clears it on unrecoverable failure or on
/// being asked to stop.
///
/// Receive timeouts are normal empty polls, not errors. Decode failures
/// drop the offending frame (via the registry's own logging) and continue.
/// A transport failure logs and clears `live_flag` without retrying —
/// supervision is the manager's job.
pub async fn run(
    live_flag: LiveFlag,
    data_tx: mpsc::Sender<Message>,
    registry: Arc<Registry>,
    transport: Transport,
    receive_timeout: Duration,
) {
    live_flag.set();
    tracing::debug!("receiver worker entered main loop");

    while live_flag.is_set() {
        match transport.recv_frame(receive_timeout).await {
            Ok(None) => continue,
            Ok(Some(parts)) => match RawFrame::from_parts(parts) {
                Ok(raw) => {
                    if let Some(message) = registry.decode(&raw) {
                        if data_tx.send(message).await.is_err() {
                            tracing::debug!("data queue consumer gone, stopping receiver");
                            break;
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "dropping malformed frame");
                }
            },
            Err(e) => {
                tracing::error!(error = %e, "receiver transport failed, stopping");
                break;
            }
        }
    }

    transport.close();
    live_flag.clear();
    tracing::debug!("receiver worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use mflow_transport::MemTransport;

    #[tokio::test]
    async fn decodes_known_frames_and_drops_unknown_ones() {
        let (local, remote) = MemTransport::pair();
        let registry = Arc::new(Registry::standard());
        let live_flag = LiveFlag::new();
        let (tx, mut rx) = mpsc::channel(16);

        let worker_flag = live_flag.clone();
        let handle = tokio::spawn(run(
            worker_flag,
            tx,
            registry,
            Transport::Mem(local),
            Duration::from_millis(50),
        ));

        // Wait for the worker to signal it has entered its main loop.
        assert!(live_flag.wait_until_set(Duration::from_secs(1)).await);

        remote
            .send_frame(vec![
                Bytes::from_static(br#"{"htype":"array-1.0","frame":1,"shape":[1],"type":"u8"}"#),
                Bytes::from_static(b"x"),
            ])
            .await
            .unwrap();
        remote
            .send_frame(vec![Bytes::from_static(br#"{"htype":"nope-1.0"}"#)])
            .await
            .unwrap();

        let first = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.frame_index(), 1);

        live_flag.clear();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
