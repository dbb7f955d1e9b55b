use crate::math::{T, TV};
use crate::statistics::StatisticsSummary;
use crate::MpmSimulation;
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{sync_channel, Receiver, TryRecvError};
use std::thread::JoinHandle;

/// Number of finished frames the simulation thread may run ahead of the consumer.
const FRAME_BUFFER: usize = 4;

/// What a display sink needs to draw one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Number of frames completed when the snapshot was taken.
    pub index: usize,
    pub time: T,
    pub positions: Vec<TV>,
    /// Group of every particle, parallel to `positions`.
    pub group_ids: Vec<usize>,
}

fn stop_requested(stop_rx: &Receiver<()>) -> bool {
    !matches!(stop_rx.try_recv(), Err(TryRecvError::Empty))
}

/// Runs `sim` on its own thread, sending a snapshot after every completed frame.
///
/// The simulation stops, between substeps, once anything is sent on `stop_rx` or its sender is
/// dropped, and also once the returned frame receiver is dropped. At most `FRAME_BUFFER` frames
/// are queued; a thread waiting for room only notices the stop request once the receiver is
/// dropped. Joining the handle yields the final statistics.
pub fn start_simulation(
    mut sim: MpmSimulation,
    stop_rx: Receiver<()>,
) -> (Receiver<Frame>, JoinHandle<StatisticsSummary>) {
    let (frame_tx, frame_rx) = sync_channel(FRAME_BUFFER);

    let handle = std::thread::spawn(move || {
        loop {
            let report = sim.advance_while(|| !stop_requested(&stop_rx));
            if !report.completed {
                break;
            }
            if frame_tx.send(sim.snapshot()).is_err() {
                tracing::debug!("Frame receiver dropped, stopping simulation");
                break;
            }
        }
        sim.shutdown()
    });

    (frame_rx, handle)
}
