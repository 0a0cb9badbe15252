//! OutputActor - serialized owner of the virtual devices
//!
//! All controller threads share one `UInput`. Instead of locking it, the
//! actor task owns it and the threads hand it whole frames over an unbounded
//! channel. A frame is applied and synced as one unit, so the kernel never
//! sees half of a controller tick.
//!
//! The actor also polls the kernel for force feedback requests and invokes
//! the callback registered for the requesting device.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace};

use super::collector::EmitterId;
use super::uinput::{ForceFeedbackEvent, UInput};
use super::DeviceId;

/// How often the kernel is asked for pending force feedback requests
const FF_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// One emitter write inside a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmitterWrite {
    pub emitter: EmitterId,
    pub value: i32,
}

impl EmitterWrite {
    pub fn new(emitter: EmitterId, value: i32) -> Self {
        Self { emitter, value }
    }
}

/// Called with `(strong, weak)` rumble magnitudes when the kernel plays an effect
pub type ForceFeedbackCallback = Box<dyn FnMut(u16, u16) + Send>;

/// Commands accepted by the OutputActor
pub enum OutputCommand {
    /// Apply the writes in order, then sync once
    Frame(Vec<EmitterWrite>),

    /// Install (or with `None`, remove) the rumble callback of a device
    SetForceFeedback {
        device: DeviceId,
        callback: Option<ForceFeedbackCallback>,
    },

    /// Answer once every command sent before this one is applied
    Flush(oneshot::Sender<()>),
}

impl std::fmt::Debug for OutputCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Frame(writes) => f.debug_tuple("Frame").field(&writes.len()).finish(),
            Self::SetForceFeedback { device, callback } => f
                .debug_struct("SetForceFeedback")
                .field("device", device)
                .field("installed", &callback.is_some())
                .finish(),
            Self::Flush(_) => f.write_str("Flush"),
        }
    }
}

/// The actor that owns the `UInput`
pub struct OutputActor {
    uinput: UInput,
    callbacks: HashMap<DeviceId, ForceFeedbackCallback>,
    rx: mpsc::UnboundedReceiver<OutputCommand>,
}

impl OutputActor {
    /// Spawn the actor on the current runtime
    ///
    /// The `uinput` must already be finished: every emitter the controller
    /// threads will ever use has been created.
    ///
    /// # Returns
    ///
    /// The handle for sending frames, and the task handle. The task ends once
    /// every `OutputHandle` clone is dropped, so threads can still zero their
    /// outputs after a shutdown was requested.
    pub fn spawn(uinput: UInput) -> (OutputHandle, JoinHandle<()>) {
        let (cmd_tx, rx) = mpsc::unbounded_channel();
        let actor = Self {
            uinput,
            callbacks: HashMap::new(),
            rx,
        };
        let task = tokio::spawn(actor.run());
        (OutputHandle::new(cmd_tx), task)
    }

    async fn run(mut self) {
        info!(devices = self.uinput.devices().len(), "output actor started");
        let mut ff_poll = tokio::time::interval(FF_POLL_INTERVAL);
        ff_poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                cmd = self.rx.recv() => match cmd {
                    Some(cmd) => self.handle(cmd),
                    None => break,
                },
                _ = ff_poll.tick() => self.poll_force_feedback(),
            }
        }

        info!("output actor stopped");
    }

    // =========================================================================
    // Command handling
    // =========================================================================

    fn handle(&mut self, cmd: OutputCommand) {
        match cmd {
            OutputCommand::Frame(writes) => self.apply_frame(writes),
            OutputCommand::SetForceFeedback { device, callback } => match callback {
                Some(callback) => {
                    debug!(device = %device, "force feedback callback installed");
                    self.callbacks.insert(device, callback);
                }
                None => {
                    debug!(device = %device, "force feedback callback removed");
                    self.callbacks.remove(&device);
                }
            },
            OutputCommand::Flush(done) => {
                let _ = done.send(());
            }
        }
    }

    fn apply_frame(&mut self, writes: Vec<EmitterWrite>) {
        trace!(writes = writes.len(), "frame");
        for write in writes {
            self.uinput.send(write.emitter, write.value);
        }
        if let Err(e) = self.uinput.sync() {
            error!(error = %e, "failed to sync virtual devices");
        }
    }

    fn poll_force_feedback(&mut self) {
        for (device, event) in self.uinput.poll_force_feedback() {
            let ForceFeedbackEvent::Rumble { strong, weak } = event;
            match self.callbacks.get_mut(&device) {
                Some(callback) => callback(strong, weak),
                None => trace!(device = %device, "force feedback without a callback"),
            }
        }
    }
}

/// Handle for sending work to the OutputActor
///
/// Cheap to clone. The send methods are plain synchronous calls, so
/// controller threads (which are not tokio tasks) use them directly.
#[derive(Clone)]
pub struct OutputHandle {
    cmd_tx: mpsc::UnboundedSender<OutputCommand>,
}

impl OutputHandle {
    pub fn new(cmd_tx: mpsc::UnboundedSender<OutputCommand>) -> Self {
        Self { cmd_tx }
    }

    /// Apply a frame. Fire-and-forget; empty frames are not sent.
    pub fn send_frame(&self, writes: Vec<EmitterWrite>) {
        if writes.is_empty() {
            return;
        }
        let _ = self.cmd_tx.send(OutputCommand::Frame(writes));
    }

    /// Install or remove the rumble callback for `device`
    pub fn set_force_feedback(&self, device: DeviceId, callback: Option<ForceFeedbackCallback>) {
        let _ = self.cmd_tx.send(OutputCommand::SetForceFeedback { device, callback });
    }

    /// Wait until every earlier command has been applied
    ///
    /// Returns `false` if the actor is gone.
    pub async fn flush(&self) -> bool {
        let (tx, rx) = oneshot::channel();
        if self.cmd_tx.send(OutputCommand::Flush(tx)).is_err() {
            return false;
        }
        rx.await.is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.cmd_tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::output::memory::MemoryInput;
    use crate::output::uinput::{AbsRange, DeviceIdentities, FieldSpec};
    use crate::output::{EventKind, MemoryLog};

    fn finished_uinput() -> (UInput, MemoryLog, EmitterId, EmitterId) {
        let (backend, log) = MemoryInput::new();
        let mut uinput = UInput::new(Box::new(backend), DeviceIdentities::new(), false);
        let device = DeviceId::joystick(0);
        let a = uinput.create_emitter(device, FieldSpec::key(0x130)).unwrap();
        let x = uinput
            .create_emitter(device, FieldSpec::abs(0, AbsRange::new(-32768, 32767)))
            .unwrap();
        uinput.finish().unwrap();
        (uinput, log, a, x)
    }

    #[tokio::test]
    async fn test_frame_is_applied_and_synced_once() {
        let (uinput, log, a, x) = finished_uinput();
        let (handle, _task) = OutputActor::spawn(uinput);

        handle.send_frame(vec![EmitterWrite::new(a, 1), EmitterWrite::new(x, 16000)]);
        assert!(handle.flush().await);

        let device = DeviceId::joystick(0);
        assert_eq!(
            log.take_values(),
            vec![(device, EventKind::Key, 0x130, 1), (device, EventKind::Abs, 0, 16000)]
        );
        assert_eq!(log.commits(), vec![device]);
    }

    #[tokio::test]
    async fn test_unchanged_frame_emits_nothing() {
        let (uinput, log, a, _) = finished_uinput();
        let (handle, _task) = OutputActor::spawn(uinput);

        handle.send_frame(vec![EmitterWrite::new(a, 1)]);
        handle.send_frame(vec![EmitterWrite::new(a, 1)]);
        assert!(handle.flush().await);
        assert_eq!(log.take_values().len(), 1);
    }

    #[tokio::test]
    async fn test_force_feedback_reaches_callback() {
        let (uinput, log, _, _) = finished_uinput();
        let (handle, _task) = OutputActor::spawn(uinput);
        let device = DeviceId::joystick(0);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        handle.set_force_feedback(device, Some(Box::new(move |strong, weak| sink.lock().push((strong, weak)))));
        assert!(handle.flush().await);

        log.push_force_feedback(device, ForceFeedbackEvent::Rumble { strong: 0x8000, weak: 0x100 });
        tokio::time::sleep(FF_POLL_INTERVAL * 5).await;
        assert_eq!(*seen.lock(), vec![(0x8000, 0x100)]);
    }

    #[tokio::test]
    async fn test_actor_stops_when_handles_are_dropped() {
        let (uinput, _, _, _) = finished_uinput();
        let (handle, task) = OutputActor::spawn(uinput);
        drop(handle);
        assert!(task.await.is_ok());
    }
}
