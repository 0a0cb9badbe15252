//! Physical controllers
//!
//! A [`Controller`] delivers decoded [`ControllerMessage`]s and accepts
//! rumble and LED commands. USB controllers are a [`usb::UsbLink`] plus a
//! family specific [`ReportParser`], read on their own [`reader::UsbReader`]
//! thread.
//!
//! Activation and disconnection are published through a shared
//! [`LinkState`], which notifies the daemon's event loop.

pub mod devices;
#[cfg(test)]
pub mod mock;
pub mod reader;
pub mod usb;
pub mod xbox;
pub mod xbox360;
pub mod xbox360_wireless;

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use crate::discovery::DeviceInfo;
use crate::message::ControllerMessage;

pub use devices::{lookup, ControllerFamily, SupportedDevice, SUPPORTED_DEVICES};
pub use reader::UsbController;
pub use usb::UsbLink;

/// Daemon-assigned identity of one controller
pub type ControllerId = u64;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("device disconnected")]
    Disconnected,

    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),

    #[error("no {direction} endpoint on interface class {class:02x}/{subclass:02x}/{protocol:02x}")]
    NoEndpoint {
        direction: &'static str,
        class: u8,
        subclass: u8,
        protocol: u8,
    },

    #[error("couldn't claim USB interface {interface}: {source} (unload xpad or enable detach_kernel_driver)")]
    Claim { interface: u8, source: rusb::Error },

    #[error("device {0} not found on the bus")]
    NotFound(String),

    #[error("unsupported device {0}")]
    Unsupported(String),

    #[error("reader thread failed: {0}")]
    Thread(#[from] std::io::Error),
}

/// Notice sent to the daemon when a link changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkNotice {
    Activation { id: ControllerId, active: bool },
    Disconnected { id: ControllerId },
}

/// Activation, disconnection and LED state shared between a controller, its
/// reader thread and the daemon
#[derive(Debug)]
pub struct LinkState {
    active: AtomicBool,
    disconnected: AtomicBool,
    led: AtomicU8,
    listener: Mutex<Option<(ControllerId, mpsc::UnboundedSender<LinkNotice>)>>,
}

impl LinkState {
    pub fn new(active: bool) -> Self {
        Self {
            active: AtomicBool::new(active),
            disconnected: AtomicBool::new(false),
            led: AtomicU8::new(0),
            listener: Mutex::new(None),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }

    /// Last LED status requested for this controller
    pub fn led(&self) -> u8 {
        self.led.load(Ordering::SeqCst)
    }

    pub fn store_led(&self, status: u8) -> u8 {
        self.led.swap(status, Ordering::SeqCst)
    }

    /// Route notices for this link to `tx`, tagged with `id`
    pub fn subscribe(&self, id: ControllerId, tx: mpsc::UnboundedSender<LinkNotice>) {
        *self.listener.lock() = Some((id, tx));
    }

    /// Only an actual change is announced
    pub fn set_active(&self, active: bool) {
        if self.active.swap(active, Ordering::SeqCst) != active {
            debug!(active, "link activation changed");
            self.notify(|id| LinkNotice::Activation { id, active });
        }
    }

    /// Announced once; later calls are no-ops
    pub fn mark_disconnected(&self) {
        if !self.disconnected.swap(true, Ordering::SeqCst) {
            debug!("link disconnected");
            self.notify(|id| LinkNotice::Disconnected { id });
        }
    }

    fn notify(&self, notice: impl FnOnce(ControllerId) -> LinkNotice) {
        if let Some((id, tx)) = self.listener.lock().as_ref() {
            let _ = tx.send(notice(*id));
        }
    }
}

/// A physical controller
pub trait Controller: Send {
    /// Wait up to `timeout` for the next report
    ///
    /// # Returns
    /// `true` when `msg` was updated, `false` on timeout
    fn read(&mut self, msg: &mut ControllerMessage, timeout: Duration) -> Result<bool, TransportError>;

    /// Drop reports received but not read yet
    fn discard_pending(&mut self);

    /// Motor strengths; repeated identical values are not resent
    fn set_rumble(&mut self, left: u8, right: u8);

    /// LED status; repeated identical values are not resent
    fn set_led(&mut self, status: u8);

    fn link(&self) -> Arc<LinkState>;

    /// `BUS:DEV`
    fn usbpath(&self) -> &str;

    /// `vvvv:pppp`
    fn usbid(&self) -> &str;

    fn name(&self) -> &str;

    fn is_active(&self) -> bool {
        self.link().is_active()
    }
}

/// Decoding and command encoding of one controller family
pub trait ReportParser: Send + 'static {
    /// Decode one interrupt report into `msg`
    fn parse(&mut self, data: &[u8], msg: &mut ControllerMessage, link: &LinkState) -> Parsed;

    /// Rumble command, `None` when the device has no motors
    fn rumble_packet(&self, left: u8, right: u8) -> Option<Vec<u8>>;

    /// LED command, `None` when the device has no LED
    fn led_packet(&self, status: u8) -> Option<Vec<u8>>;
}

/// What a report turned out to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parsed {
    /// `msg` holds a new state
    Message,
    /// Status, empty or unknown report; nothing to deliver
    Nothing,
    /// A wireless pad (re)connected; the LED has to be sent again
    Connected,
}

/// Opens the controllers behind a discovered device
pub trait ControllerFactory: Send {
    /// # Returns
    /// One controller per pad behind the device (four for a wireless receiver)
    fn open(&mut self, info: &DeviceInfo, device: &SupportedDevice) -> Result<Vec<Box<dyn Controller>>, TransportError>;
}

/// Factory for real USB hardware
#[derive(Debug, Clone)]
pub struct UsbControllerFactory {
    detach_kernel_driver: bool,
}

impl UsbControllerFactory {
    pub fn new(detach_kernel_driver: bool) -> Self {
        Self { detach_kernel_driver }
    }
}

impl ControllerFactory for UsbControllerFactory {
    fn open(&mut self, info: &DeviceInfo, device: &SupportedDevice) -> Result<Vec<Box<dyn Controller>>, TransportError> {
        let (bus, addr) = match (info.busnum(), info.devnum()) {
            (Some(bus), Some(addr)) => (bus, addr),
            _ => return Err(TransportError::NotFound(info.syspath.clone())),
        };
        let usb = usb::find_device(bus, addr)?;
        let detach = self.detach_kernel_driver;

        let controllers: Vec<Box<dyn Controller>> = match device.family {
            ControllerFamily::Xbox360 => {
                let link = Arc::new(UsbLink::open(usb, device.name)?);
                vec![Box::new(xbox360::open(link, detach)?)]
            }
            ControllerFamily::Xbox => {
                let link = Arc::new(UsbLink::open(usb, device.name)?);
                vec![Box::new(xbox::open(link, detach)?)]
            }
            ControllerFamily::Xbox360Wireless => {
                let link = Arc::new(UsbLink::open(usb, device.name)?);
                let mut pads: Vec<Box<dyn Controller>> = Vec::with_capacity(xbox360_wireless::PADS_PER_RECEIVER);
                for pad in 0..xbox360_wireless::PADS_PER_RECEIVER {
                    pads.push(Box::new(xbox360_wireless::open(link.clone(), pad, detach)?));
                }
                pads
            }
        };
        Ok(controllers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_notifies_only_on_change() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let link = LinkState::new(true);
        link.subscribe(7, tx);

        link.set_active(true);
        assert!(rx.try_recv().is_err());

        link.set_active(false);
        assert_eq!(rx.try_recv().ok(), Some(LinkNotice::Activation { id: 7, active: false }));
        assert!(!link.is_active());

        link.mark_disconnected();
        link.mark_disconnected();
        assert_eq!(rx.try_recv().ok(), Some(LinkNotice::Disconnected { id: 7 }));
        assert!(rx.try_recv().is_err());
        assert!(link.is_disconnected());
    }

    #[test]
    fn test_link_without_listener_is_silent() {
        let link = LinkState::new(false);
        link.set_active(true);
        link.mark_disconnected();
        assert!(link.is_active());
        assert_eq!(link.store_led(3), 0);
        assert_eq!(link.led(), 3);
    }
}
