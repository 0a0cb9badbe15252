//! Scripted controllers and factory for tests

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::{Controller, ControllerFactory, LinkState, SupportedDevice, TransportError};
use crate::discovery::DeviceInfo;
use crate::message::ControllerMessage;

/// What a mock controller was asked to do, and what it will report
#[derive(Debug, Default)]
pub struct MockState {
    pub reports: VecDeque<ControllerMessage>,
    pub rumble: Vec<(u8, u8)>,
    pub leds: Vec<u8>,
    pub reads: usize,
}

pub struct MockController {
    state: Arc<Mutex<MockState>>,
    link: Arc<LinkState>,
    usbpath: String,
    usbid: String,
}

impl MockController {
    pub fn new(usbpath: &str, usbid: &str, active: bool) -> (Self, Arc<Mutex<MockState>>, Arc<LinkState>) {
        let state = Arc::new(Mutex::new(MockState::default()));
        let link = Arc::new(LinkState::new(active));
        (
            Self {
                state: state.clone(),
                link: link.clone(),
                usbpath: usbpath.to_string(),
                usbid: usbid.to_string(),
            },
            state,
            link,
        )
    }
}

impl Controller for MockController {
    fn read(&mut self, msg: &mut ControllerMessage, timeout: Duration) -> Result<bool, TransportError> {
        if self.link.is_disconnected() {
            return Err(TransportError::Disconnected);
        }
        let report = {
            let mut state = self.state.lock();
            state.reads += 1;
            state.reports.pop_front()
        };
        match report {
            Some(report) => {
                msg.assign_values(&report);
                Ok(true)
            }
            None => {
                std::thread::sleep(timeout);
                Ok(false)
            }
        }
    }

    fn discard_pending(&mut self) {
        self.state.lock().reports.clear();
    }

    fn set_rumble(&mut self, left: u8, right: u8) {
        self.state.lock().rumble.push((left, right));
    }

    fn set_led(&mut self, status: u8) {
        self.link.store_led(status);
        self.state.lock().leds.push(status);
    }

    fn link(&self) -> Arc<LinkState> {
        self.link.clone()
    }

    fn usbpath(&self) -> &str {
        &self.usbpath
    }

    fn usbid(&self) -> &str {
        &self.usbid
    }

    fn name(&self) -> &str {
        "Mock Pad"
    }
}

/// Handles to one controller the factory handed out
#[derive(Clone)]
pub struct Opened {
    pub usbpath: String,
    pub state: Arc<Mutex<MockState>>,
    pub link: Arc<LinkState>,
}

/// Opens `pads` mock controllers per device; the first `active` start active
#[derive(Clone, Default)]
pub struct MockFactory {
    pub pads: usize,
    pub active: usize,
    pub opened: Arc<Mutex<Vec<Opened>>>,
}

impl MockFactory {
    pub fn new(pads: usize, active: usize) -> Self {
        Self {
            pads,
            active,
            opened: Arc::default(),
        }
    }

    pub fn opened(&self) -> Vec<Opened> {
        self.opened.lock().clone()
    }
}

impl ControllerFactory for MockFactory {
    fn open(&mut self, info: &DeviceInfo, device: &SupportedDevice) -> Result<Vec<Box<dyn Controller>>, TransportError> {
        let usbpath = info.usbpath().ok_or_else(|| TransportError::NotFound(info.syspath.clone()))?;
        let usbid = format!("{:04x}:{:04x}", device.vendor, device.product);
        let mut controllers: Vec<Box<dyn Controller>> = Vec::new();
        for pad in 0..self.pads {
            let (controller, state, link) = MockController::new(&usbpath, &usbid, pad < self.active);
            self.opened.lock().push(Opened {
                usbpath: usbpath.clone(),
                state,
                link,
            });
            controllers.push(Box::new(controller));
        }
        Ok(controllers)
    }
}
