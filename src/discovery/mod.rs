//! USB device discovery over udev
//!
//! Enumerates the `usb/usb_device` devices already present, then monitors
//! hot-plug events. udev handles are not `Send`, so everything runs on one
//! dedicated thread that forwards [`DiscoveryEvent`]s into a tokio channel.

use std::io;
use std::os::unix::io::AsRawFd;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::matching::{DeviceProperties, PROP_BUSNUM, PROP_DEVNUM, PROP_PRODUCT, PROP_VENDOR};

/// How long one poll on the monitor socket blocks before cancellation is checked
const MONITOR_POLL: Duration = Duration::from_millis(250);

/// A USB device as seen by udev
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub syspath: String,
    pub props: DeviceProperties,
}

impl DeviceInfo {
    pub fn new(syspath: impl Into<String>, props: DeviceProperties) -> Self {
        Self {
            syspath: syspath.into(),
            props,
        }
    }

    fn hex(&self, name: &str) -> Option<u16> {
        self.props.get(name).and_then(|v| u16::from_str_radix(v, 16).ok())
    }

    fn dec(&self, name: &str) -> Option<u8> {
        self.props.get(name).and_then(|v| v.parse().ok())
    }

    pub fn vendor(&self) -> Option<u16> {
        self.hex(PROP_VENDOR)
    }

    pub fn product(&self) -> Option<u16> {
        self.hex(PROP_PRODUCT)
    }

    pub fn busnum(&self) -> Option<u8> {
        self.dec(PROP_BUSNUM)
    }

    pub fn devnum(&self) -> Option<u8> {
        self.dec(PROP_DEVNUM)
    }

    /// `BUS:DEV`, zero padded, when both numbers are known
    pub fn usbpath(&self) -> Option<String> {
        Some(format!("{:03}:{:03}", self.busnum()?, self.devnum()?))
    }

    fn from_udev(device: &udev::Device) -> Self {
        let props = device
            .properties()
            .map(|entry| {
                (
                    entry.name().to_string_lossy().into_owned(),
                    entry.value().to_string_lossy().trim_matches('"').to_string(),
                )
            })
            .collect();
        Self::new(device.syspath().to_string_lossy(), props)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    Added(DeviceInfo),
    Removed(DeviceInfo),
}

/// udev enumerate + monitor, bridged into async
pub struct UdevDiscovery;

impl UdevDiscovery {
    /// Start the discovery thread
    ///
    /// Devices already present are reported as [`DiscoveryEvent::Added`]
    /// first. The thread stops when `cancel` fires or the receiver is dropped.
    ///
    /// # Returns
    /// Receiver of discovery events, or the error that kept udev from starting
    pub fn spawn(cancel: CancellationToken) -> Result<mpsc::UnboundedReceiver<DiscoveryEvent>> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = crossbeam::channel::bounded::<Result<()>>(1);

        std::thread::Builder::new()
            .name("udev-discovery".into())
            .spawn(move || {
                let socket = match Self::open(&event_tx) {
                    Ok(socket) => {
                        let _ = ready_tx.send(Ok(()));
                        socket
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                if let Err(e) = Self::monitor_blocking(socket, &event_tx, &cancel) {
                    warn!("udev monitor stopped: {:#}", e);
                }
                debug!("udev discovery thread exited");
            })
            .context("Failed to spawn udev discovery thread")?;

        ready_rx
            .recv()
            .context("udev discovery thread exited during startup")??;
        Ok(event_rx)
    }

    /// Open the monitor first so nothing plugged in during enumeration is lost
    fn open(event_tx: &mpsc::UnboundedSender<DiscoveryEvent>) -> Result<udev::MonitorSocket> {
        let socket = udev::MonitorBuilder::new()
            .context("Failed to create udev monitor")?
            .match_subsystem_devtype("usb", "usb_device")
            .context("Failed to filter udev monitor")?
            .listen()
            .context("Failed to listen on udev monitor")?;

        let mut enumerator = udev::Enumerator::new().context("Failed to create udev enumerator")?;
        enumerator.match_subsystem("usb").context("udev match_subsystem")?;
        enumerator
            .match_property("DEVTYPE", "usb_device")
            .context("udev match_property")?;

        let mut count = 0;
        for device in enumerator.scan_devices().context("Failed to scan USB devices")? {
            let _ = event_tx.send(DiscoveryEvent::Added(DeviceInfo::from_udev(&device)));
            count += 1;
        }
        info!("Enumerated {} USB device(s)", count);

        Ok(socket)
    }

    fn monitor_blocking(
        socket: udev::MonitorSocket,
        event_tx: &mpsc::UnboundedSender<DiscoveryEvent>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut fds = [libc::pollfd {
            fd: socket.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        }];

        while !cancel.is_cancelled() && !event_tx.is_closed() {
            // SAFETY: fds is a valid array of one pollfd for the whole call
            let ret = unsafe { libc::poll(fds.as_mut_ptr(), 1, MONITOR_POLL.as_millis() as libc::c_int) };
            if ret < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err).context("poll on udev monitor failed");
            }
            if ret == 0 {
                continue;
            }

            for event in socket.iter() {
                let info = DeviceInfo::from_udev(&event.device());
                let event = match event.event_type() {
                    udev::EventType::Add => DiscoveryEvent::Added(info),
                    udev::EventType::Remove => DiscoveryEvent::Removed(info),
                    _ => continue,
                };
                debug!(?event, "udev event");
                if event_tx.send(event).is_err() {
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(pairs: &[(&str, &str)]) -> DeviceInfo {
        DeviceInfo::new(
            "/sys/devices/pci0000:00/usb3/3-2",
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        )
    }

    #[test]
    fn test_device_info_accessors() {
        let dev = info(&[
            (PROP_VENDOR, "045e"),
            (PROP_PRODUCT, "028E"),
            (PROP_BUSNUM, "003"),
            (PROP_DEVNUM, "012"),
        ]);
        assert_eq!(dev.vendor(), Some(0x045e));
        assert_eq!(dev.product(), Some(0x028e));
        assert_eq!(dev.busnum(), Some(3));
        assert_eq!(dev.devnum(), Some(12));
        assert_eq!(dev.usbpath().as_deref(), Some("003:012"));
    }

    #[test]
    fn test_missing_properties() {
        let dev = info(&[(PROP_VENDOR, "nothex")]);
        assert_eq!(dev.vendor(), None);
        assert_eq!(dev.product(), None);
        assert_eq!(dev.usbpath(), None);
    }
}
