//! Live Visit Collector (§4.E): event relay listener, dispatch, and the
//! owner-task actor that mutates per-system visit histograms.

pub mod actor;
pub mod events;
pub mod transport;

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

pub use actor::{spawn, ActivityBucket, BusyError, CollectorHandle, SystemStatEntry};
pub use events::{DispatchedEvent, DockedEvent, FsdJumpEvent};
pub use transport::{EventTransport, ListenerStatus};

const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// Drives one `EventTransport` end to end: dial, subscribe, decode frames,
/// dispatch, and reconnect with backoff on any error — the listener state
/// machine of §4.E (`Idle -> Dialing -> Subscribed -> Recv* -> (error) Dialing
/// -> Closed`).
pub async fn run_listener(
    mut transport: impl EventTransport,
    handle: CollectorHandle,
    status: Arc<ListenerStatus>,
) {
    loop {
        if status.is_closing() {
            break;
        }
        if let Err(e) = transport.connect().await {
            warn!("relay connect failed: {e}; retrying in {:?}", RECONNECT_BACKOFF);
            tokio::time::sleep(RECONNECT_BACKOFF).await;
            continue;
        }

        loop {
            if status.is_closing() {
                return;
            }
            match transport.recv_frame().await {
                Ok(frame) => match transport::decode_frame(&frame) {
                    Ok(envelope) => match events::dispatch(&envelope.message) {
                        DispatchedEvent::FsdJump(ev) => {
                            if let Err(e) = handle.note_fsd_jump(ev) {
                                warn!("dropping FSDJump: {e}");
                            }
                        }
                        DispatchedEvent::Docked(ev) => {
                            if let Err(e) = handle.note_docked(ev) {
                                warn!("dropping Docked: {e}");
                            }
                        }
                        DispatchedEvent::Ignored => {}
                    },
                    Err(e) => warn!("dropping malformed relay frame: {e}"),
                },
                Err(e) => {
                    warn!("relay receive failed: {e}; reconnecting in {:?}", RECONNECT_BACKOFF);
                    tokio::time::sleep(RECONNECT_BACKOFF).await;
                    break;
                }
            }
        }
    }
}

/// Spawns the listener task against `transport`, returning the shared status
/// flag (used to request a close) and the task's join handle.
pub fn spawn_listener<T: EventTransport + 'static>(
    transport: T,
    handle: CollectorHandle,
) -> (Arc<ListenerStatus>, tokio::task::JoinHandle<()>) {
    let status = Arc::new(ListenerStatus::new());
    status.try_start();
    let status_for_task = status.clone();
    let task = tokio::spawn(run_listener(transport, handle, status_for_task));
    (status, task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::transport::{compress_for_test, ScriptedTransport};
    use crate::geometry::Point3D;

    #[tokio::test]
    async fn listener_dispatches_scripted_frames_into_the_actor() {
        let (handle, actor_task) = spawn();

        let frame = compress_for_test(&serde_json::json!({
            "message": {
                "event": "FSDJump",
                "StarSystem": "Sol",
                "StarPos": [0.0, 0.0, 0.0],
                "timestamp": "2024-01-01T00:00:00Z",
            }
        }));
        let transport = ScriptedTransport::new(vec![frame]);
        let (status, listener_task) = spawn_listener(transport, handle.clone());

        // Give the listener a moment to dial, receive, and dispatch.
        for _ in 0..50 {
            let (entries, _) = handle.get_system_stat(Point3D::new(0.0, 0.0, 0.0), 10.0).await;
            if !entries.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let (entries, _) = handle.get_system_stat(Point3D::new(0.0, 0.0, 0.0), 10.0).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "Sol");

        status.request_close();
        let _ = listener_task.await;
        handle.exit().await;
        actor_task.await.unwrap();
    }
}
