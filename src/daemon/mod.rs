//! Hot-plug event loop
//!
//! The daemon owns the slot arena. Discovery events open controllers through
//! a [`ControllerFactory`], active controllers are bound to free slots and
//! inactive ones are parked until their link reports them active. Every
//! bound slot runs its own [`ControllerThread`].

use std::collections::HashMap;

use anyhow::Result;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::controller_thread::{ControllerThread, ThreadSettings};
use crate::discovery::{DeviceInfo, DiscoveryEvent};
use crate::matching::DeviceProperties;
use crate::output::OutputHandle;
use crate::processor::MessageProcessor;
use crate::slot::{SlotArena, SlotId};
use crate::transport::{lookup, Controller, ControllerFactory, ControllerId, LinkNotice};

/// Device a controller came from
#[derive(Debug, Clone)]
struct Origin {
    syspath: String,
    props: DeviceProperties,
}

struct Parked {
    id: ControllerId,
    controller: Box<dyn Controller>,
}

pub struct Daemon {
    slots: SlotArena,
    factory: Box<dyn ControllerFactory>,
    output: OutputHandle,
    settings: ThreadSettings,
    on_connect: Option<String>,
    on_disconnect: Option<String>,
    cancel: CancellationToken,
    next_id: ControllerId,
    origins: HashMap<ControllerId, Origin>,
    parked: Vec<Parked>,
    notice_tx: mpsc::UnboundedSender<LinkNotice>,
    notice_rx: mpsc::UnboundedReceiver<LinkNotice>,
}

impl Daemon {
    pub fn new(
        config: &AppConfig,
        slots: SlotArena,
        factory: Box<dyn ControllerFactory>,
        output: OutputHandle,
        cancel: CancellationToken,
    ) -> Self {
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        Self {
            slots,
            factory,
            output,
            settings: ThreadSettings {
                timeout: config.daemon.timeout(),
                exec: config.daemon.exec.clone(),
            },
            on_connect: config.daemon.on_connect.clone(),
            on_disconnect: config.daemon.on_disconnect.clone(),
            cancel,
            next_id: 1,
            origins: HashMap::new(),
            parked: Vec::new(),
            notice_tx,
            notice_rx,
        }
    }

    /// Run until the cancellation token fires, then release every controller
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<DiscoveryEvent>) -> Result<()> {
        info!(slots = self.slots.len(), "daemon started, waiting for controllers");
        let mut discovery_open = true;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                event = events.recv(), if discovery_open => match event {
                    Some(event) => self.handle_discovery(event),
                    None => {
                        warn!("device discovery stopped, no further hot-plug events");
                        discovery_open = false;
                    }
                },
                Some(notice) = self.notice_rx.recv() => self.handle_notice(notice),
            }
        }

        if self.shutdown().await.is_err() {
            error!("controller teardown panicked");
        }
        Ok(())
    }

    /// The slot table, one line per slot
    pub fn status(&self) -> Vec<String> {
        self.slots.status_table()
    }

    pub fn slots(&self) -> &SlotArena {
        &self.slots
    }

    pub fn parked(&self) -> usize {
        self.parked.len()
    }

    pub fn handle_discovery(&mut self, event: DiscoveryEvent) {
        match event {
            DiscoveryEvent::Added(info) => self.on_device_added(info),
            DiscoveryEvent::Removed(info) => self.on_device_removed(&info),
        }
    }

    pub fn handle_notice(&mut self, notice: LinkNotice) {
        debug!(?notice, "link notice");
        match notice {
            LinkNotice::Disconnected { id } => self.remove_controller(id),
            LinkNotice::Activation { id, active: false } => {
                if let Some(slot) = self.slots.find_controller(id) {
                    info!(slot = %slot, "controller went inactive");
                    if let Some(controller) = self.disconnect(slot) {
                        self.park(id, controller);
                    }
                    self.fill_free_slots();
                }
            }
            LinkNotice::Activation { id, active: true } => {
                if let Some(index) = self.parked.iter().position(|p| p.id == id) {
                    let parked = self.parked.remove(index);
                    info!(id, "parked controller became active");
                    self.offer(parked.id, parked.controller);
                }
            }
        }
    }

    /// Apply every notice already queued
    pub fn drain_notices(&mut self) {
        while let Ok(notice) = self.notice_rx.try_recv() {
            self.handle_notice(notice);
        }
    }

    // =========================================================================
    // Hot-plug
    // =========================================================================

    fn on_device_added(&mut self, info: DeviceInfo) {
        let (Some(vendor), Some(product)) = (info.vendor(), info.product()) else {
            debug!(syspath = %info.syspath, "device without vendor/product ids");
            return;
        };
        let Some(device) = lookup(vendor, product) else {
            debug!(usbid = %format!("{:04x}:{:04x}", vendor, product), "ignoring unsupported device");
            return;
        };

        info!(
            usbid = %format!("{:04x}:{:04x}", vendor, product),
            family = %device.family,
            name = device.name,
            "supported device found"
        );

        let controllers = match self.factory.open(&info, device) {
            Ok(controllers) => controllers,
            Err(e) => {
                error!(syspath = %info.syspath, "failed to open {}: {}", device.name, e);
                return;
            }
        };

        for controller in controllers {
            let id = self.next_id;
            self.next_id += 1;
            controller.link().subscribe(id, self.notice_tx.clone());
            self.origins.insert(
                id,
                Origin {
                    syspath: info.syspath.clone(),
                    props: info.props.clone(),
                },
            );

            if controller.is_active() {
                self.offer(id, controller);
            } else {
                debug!(id, "controller inactive, parking");
                self.park(id, controller);
            }
        }
    }

    fn on_device_removed(&mut self, info: &DeviceInfo) {
        let ids: Vec<ControllerId> = self
            .origins
            .iter()
            .filter(|(_, origin)| origin.syspath == info.syspath)
            .map(|(id, _)| *id)
            .collect();
        for id in ids {
            self.remove_controller(id);
        }
    }

    /// Forget a controller for good
    fn remove_controller(&mut self, id: ControllerId) {
        if let Some(slot) = self.slots.find_controller(id) {
            info!(slot = %slot, "controller disconnected");
            if let Some(controller) = self.disconnect(slot) {
                release(vec![controller]);
            }
            self.fill_free_slots();
        } else if let Some(index) = self.parked.iter().position(|p| p.id == id) {
            debug!(id, "parked controller removed");
            release(vec![self.parked.remove(index).controller]);
        }
        self.origins.remove(&id);
    }

    fn offer(&mut self, id: ControllerId, controller: Box<dyn Controller>) {
        let slot = self
            .origins
            .get(&id)
            .and_then(|origin| self.slots.find_free_slot(&origin.props));
        match slot {
            Some(slot) => self.connect(slot, id, controller),
            None => {
                warn!(usbpath = %controller.usbpath(), "no free slot for controller");
                self.park(id, controller);
            }
        }
    }

    fn park(&mut self, id: ControllerId, controller: Box<dyn Controller>) {
        self.parked.push(Parked { id, controller });
    }

    /// Offer parked controllers that are active to slots freed since
    fn fill_free_slots(&mut self) {
        let mut index = 0;
        while index < self.parked.len() {
            let candidate = &self.parked[index];
            let fits = candidate.controller.is_active()
                && self
                    .origins
                    .get(&candidate.id)
                    .and_then(|origin| self.slots.find_free_slot(&origin.props))
                    .is_some();
            if fits {
                let parked = self.parked.remove(index);
                self.offer(parked.id, parked.controller);
            } else {
                index += 1;
            }
        }
    }

    // =========================================================================
    // Connect / disconnect
    // =========================================================================

    fn connect(&mut self, slot_id: SlotId, id: ControllerId, mut controller: Box<dyn Controller>) {
        let Some(slot) = self.slots.get_mut(slot_id) else {
            self.park(id, controller);
            return;
        };

        // input made while the controller had no slot is never replayed
        controller.discard_pending();
        controller.set_led(slot.led_status());
        let processor = MessageProcessor::new(
            slot_id.0,
            slot.config().clone(),
            self.output.clone(),
            slot.processor_options(),
        );
        let mut thread = ControllerThread::new(id, slot_id, controller, processor, self.settings.clone(), &self.cancel);
        if let Err(e) = thread.start() {
            error!(slot = %slot_id, "failed to start controller thread: {}", e);
            if let Some(controller) = thread.stop() {
                self.park(id, controller);
            }
            return;
        }

        info!(
            slot = %slot_id,
            usbpath = %thread.usbpath(),
            usbid = %thread.usbid(),
            name = %thread.name(),
            "controller connected"
        );
        let args = [thread.usbpath().to_string(), thread.usbid().to_string(), thread.name().to_string()];
        slot.connect(thread);

        if let Some(script) = &self.on_connect {
            run_script(script, &args);
        }
        self.log_status();
    }

    /// Stop the slot's thread and free the slot
    fn disconnect(&mut self, slot_id: SlotId) -> Option<Box<dyn Controller>> {
        let mut thread = self.slots.get_mut(slot_id)?.disconnect()?;
        let controller = thread.try_join().or_else(|| thread.stop());
        info!(slot = %slot_id, usbpath = %thread.usbpath(), "slot freed");

        if let Some(script) = &self.on_disconnect {
            run_script(script, &[thread.usbpath().to_string(), thread.usbid().to_string(), thread.name().to_string()]);
        }
        self.log_status();
        controller
    }

    /// Free every slot; the returned task finishes once all controllers are closed
    fn shutdown(&mut self) -> JoinHandle<()> {
        info!("shutting down controllers");
        let threads: Vec<ControllerThread> = self.slots.iter_mut().filter_map(|slot| slot.disconnect()).collect();
        let parked: Vec<Box<dyn Controller>> = self.parked.drain(..).map(|p| p.controller).collect();
        self.origins.clear();

        tokio::task::spawn_blocking(move || {
            for mut thread in threads {
                if let Some(mut controller) = thread.stop() {
                    controller.set_led(0);
                }
            }
            drop(parked);
        })
    }

    fn log_status(&self) {
        for line in self.status() {
            info!("{}", line);
        }
    }
}

/// Close controllers off the runtime; dropping one joins its reader thread
fn release(controllers: Vec<Box<dyn Controller>>) {
    tokio::task::spawn_blocking(move || drop(controllers));
}

/// Start `script` with `args`; its exit is only logged
fn run_script(script: &str, args: &[String]) {
    let mut command = Command::new(script);
    command.args(args).kill_on_drop(false);
    match command.spawn() {
        Ok(mut child) => {
            let script = script.to_string();
            tokio::spawn(async move {
                match child.wait().await {
                    Ok(status) if status.success() => debug!(script = %script, "script finished"),
                    Ok(status) => warn!(script = %script, %status, "script failed"),
                    Err(e) => warn!(script = %script, "failed to wait for script: {}", e),
                }
            });
        }
        Err(e) => error!(script = %script, "failed to run script: {}", e),
    }
}
