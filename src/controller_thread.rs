//! Worker thread binding one controller to one slot

use std::process::{Child, Command};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::processor::MessageProcessor;
use crate::slot::SlotId;
use crate::transport::{Controller, ControllerId, LinkState};

/// Lifecycle of a [`ControllerThread`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Idle,
    Running,
    Stopping,
    Joined,
}

/// Loop settings shared by every thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadSettings {
    pub timeout: Duration,
    /// Program and arguments started when the loop starts
    pub exec: Vec<String>,
}

impl Default for ThreadSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(10),
            exec: Vec::new(),
        }
    }
}

struct Worker {
    controller: Box<dyn Controller>,
    processor: MessageProcessor,
}

pub struct ControllerThread {
    id: ControllerId,
    slot: SlotId,
    state: ThreadState,
    link: Arc<LinkState>,
    usbpath: String,
    usbid: String,
    name: String,
    settings: ThreadSettings,
    cancel: CancellationToken,
    process: CancellationToken,
    worker: Option<Worker>,
    handle: Option<JoinHandle<Box<dyn Controller>>>,
}

impl ControllerThread {
    /// An idle thread; `process` is the daemon-wide shutdown token
    pub fn new(
        id: ControllerId,
        slot: SlotId,
        controller: Box<dyn Controller>,
        processor: MessageProcessor,
        settings: ThreadSettings,
        process: &CancellationToken,
    ) -> Self {
        Self {
            id,
            slot,
            state: ThreadState::Idle,
            link: controller.link(),
            usbpath: controller.usbpath().to_string(),
            usbid: controller.usbid().to_string(),
            name: controller.name().to_string(),
            settings,
            cancel: process.child_token(),
            process: process.clone(),
            worker: Some(Worker { controller, processor }),
            handle: None,
        }
    }

    pub fn start(&mut self) -> std::io::Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        let settings = self.settings.clone();
        let cancel = self.cancel.clone();
        let process = self.process.clone();
        let slot = self.slot;

        let handle = std::thread::Builder::new()
            .name(format!("slot-{}", slot))
            .spawn(move || run(slot, worker, settings, cancel, process))?;
        self.handle = Some(handle);
        self.state = ThreadState::Running;
        debug!(slot = %self.slot, usbpath = %self.usbpath, "controller thread started");
        Ok(())
    }

    /// Cancel and join, handing back the controller
    pub fn stop(&mut self) -> Option<Box<dyn Controller>> {
        if let Some(worker) = self.worker.take() {
            self.state = ThreadState::Joined;
            return Some(worker.controller);
        }
        self.state = ThreadState::Stopping;
        self.cancel.cancel();
        self.join()
    }

    /// Join only if the loop already ended
    pub fn try_join(&mut self) -> Option<Box<dyn Controller>> {
        if self.handle.as_ref().is_some_and(|h| h.is_finished()) {
            self.join()
        } else {
            None
        }
    }

    fn join(&mut self) -> Option<Box<dyn Controller>> {
        let handle = self.handle.take()?;
        self.state = ThreadState::Joined;
        match handle.join() {
            Ok(controller) => Some(controller),
            Err(_) => {
                error!(slot = %self.slot, "controller thread panicked");
                None
            }
        }
    }

    pub fn state(&self) -> ThreadState {
        self.state
    }

    pub fn id(&self) -> ControllerId {
        self.id
    }

    pub fn link(&self) -> &Arc<LinkState> {
        &self.link
    }

    pub fn usbpath(&self) -> &str {
        &self.usbpath
    }

    pub fn usbid(&self) -> &str {
        &self.usbid
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for ControllerThread {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop();
        }
    }
}

fn run(
    slot: SlotId,
    worker: Worker,
    settings: ThreadSettings,
    cancel: CancellationToken,
    process: CancellationToken,
) -> Box<dyn Controller> {
    let Worker {
        mut controller,
        mut processor,
    } = worker;

    processor.install_force_feedback();
    let mut child = spawn_child(&settings.exec);
    let mut msg = processor.blank_message();
    let mut last = Instant::now();

    while !cancel.is_cancelled() {
        // on timeout `msg` still holds the last real report
        if let Err(e) = controller.read(&mut msg, settings.timeout) {
            warn!(slot = %slot, usbpath = %controller.usbpath(), "controller read failed: {}", e);
            controller.link().mark_disconnected();
            break;
        }

        let now = Instant::now();
        let dt_ms = now.duration_since(last).as_millis().min(u32::MAX as u128) as u32;
        last = now;

        processor.send(&msg, dt_ms);

        if let Some((left, right)) = processor.take_rumble() {
            controller.set_rumble(left, right);
        }

        if let Some(running) = child.as_mut() {
            if watch_child(running, &process) {
                child = None;
            }
        }
    }

    if let Some(mut running) = child {
        if let Err(e) = running.kill() {
            debug!("child already gone: {}", e);
        }
        let _ = running.wait();
    }
    processor.remove_force_feedback();
    processor.reset();
    controller.set_rumble(0, 0);
    debug!(slot = %slot, "controller thread exiting");
    controller
}

fn spawn_child(exec: &[String]) -> Option<Child> {
    let (program, args) = exec.split_first()?;
    match Command::new(program).args(args).spawn() {
        Ok(child) => {
            info!(program = %program, pid = child.id(), "started child process");
            Some(child)
        }
        Err(e) => {
            error!(program = %program, "failed to start child process: {}", e);
            None
        }
    }
}

/// Returns `true` once the child has exited; its exit ends the daemon
fn watch_child(child: &mut Child, process: &CancellationToken) -> bool {
    match child.try_wait() {
        Ok(None) => false,
        Ok(Some(status)) => {
            if status.success() {
                info!("child process exited");
            } else if let Some(code) = status.code() {
                error!(code, "child process failed");
            } else {
                error!(%status, "child process killed by signal");
            }
            process.cancel();
            true
        }
        Err(e) => {
            error!("failed to wait for child process: {}", e);
            process.cancel();
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use parking_lot::Mutex;

    use super::*;
    use crate::config::compile_slot;
    use crate::config::options::SlotOptions;
    use crate::message::names::gamepad_descriptor;
    use crate::message::ControllerMessage;
    use crate::output::memory::Recorded;
    use crate::output::{DeviceIdentities, EventKind, MemoryInput, MemoryLog, OutputActor, UInput};
    use crate::processor::ProcessorOptions;
    use crate::transport::mock::{MockController, MockState};

    struct Fixture {
        thread: ControllerThread,
        state: Arc<Mutex<MockState>>,
        log: MemoryLog,
        process: CancellationToken,
    }

    fn fixture(exec: Vec<String>) -> Fixture {
        let (backend, log) = MemoryInput::new();
        let mut uinput = UInput::new(Box::new(backend), DeviceIdentities::new(), false);
        let set = compile_slot(0, &SlotOptions::default(), &mut uinput).unwrap();
        uinput.finish().unwrap();
        let (output, _task) = OutputActor::spawn(uinput);
        let processor = MessageProcessor::new(0, Arc::new(Mutex::new(set)), output, ProcessorOptions::default());

        let (controller, state, _) = MockController::new("001:004", "045e:028e", true);
        let process = CancellationToken::new();
        let settings = ThreadSettings {
            timeout: Duration::from_millis(5),
            exec,
        };
        let thread = ControllerThread::new(1, SlotId(0), Box::new(controller), processor, settings, &process);
        Fixture {
            thread,
            state,
            log,
            process,
        }
    }

    fn key_written(log: &MemoryLog, value: i32) -> bool {
        log.records().iter().any(|r| {
            matches!(r, Recorded::Event { kind: EventKind::Key, value: v, .. } if *v == value)
        })
    }

    async fn wait_for(mut done: impl FnMut() -> bool) {
        for _ in 0..200 {
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reports_reach_output_and_stop_releases() {
        let mut f = fixture(Vec::new());
        let (desc, names) = gamepad_descriptor();
        let mut report = ControllerMessage::new(&desc);
        report.set_key(names.a, true);
        f.state.lock().reports.push_back(report);

        assert_eq!(f.thread.state(), ThreadState::Idle);
        f.thread.start().unwrap();
        assert_eq!(f.thread.state(), ThreadState::Running);

        let log = f.log.clone();
        wait_for(|| key_written(&log, 1)).await;

        let controller = f.thread.stop();
        assert!(controller.is_some());
        assert_eq!(f.thread.state(), ThreadState::Joined);

        let log = f.log.clone();
        wait_for(|| key_written(&log, 0)).await;
        assert_eq!(f.state.lock().rumble.last(), Some(&(0, 0)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_read_error_ends_loop_and_try_join_returns_controller() {
        let mut f = fixture(Vec::new());
        f.thread.start().unwrap();
        assert!(f.thread.try_join().is_none());

        f.thread.link().mark_disconnected();
        let mut joined = None;
        for _ in 0..200 {
            joined = f.thread.try_join();
            if joined.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(joined.is_some());
        assert_eq!(f.thread.state(), ThreadState::Joined);
        assert!(!f.process.is_cancelled());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_child_exit_cancels_process() {
        let mut f = fixture(vec!["true".to_string()]);
        f.thread.start().unwrap();
        let process = f.process.clone();
        wait_for(|| process.is_cancelled()).await;
        assert!(f.thread.stop().is_some());
    }

    #[test]
    fn test_stop_before_start_returns_controller() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let _guard = rt.enter();
        let mut f = fixture(Vec::new());
        let controller = f.thread.stop();
        assert_eq!(controller.map(|c| c.usbpath().to_string()), Some("001:004".to_string()));
        assert_eq!(f.state.lock().reads, 0);
    }
}
