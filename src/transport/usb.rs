//! libusb access through rusb

use std::time::Duration;

use parking_lot::Mutex;
use rusb::{Device, DeviceHandle, Direction, GlobalContext, UsbContext};
use tracing::{debug, info, warn};

use super::TransportError;

/// Timeout of a single interrupt write
const WRITE_TIMEOUT: Duration = Duration::from_millis(100);

/// Find a device by bus number and address
pub fn find_device(bus: u8, address: u8) -> Result<Device<GlobalContext>, TransportError> {
    GlobalContext::default()
        .devices()?
        .iter()
        .find(|d| d.bus_number() == bus && d.address() == address)
        .ok_or_else(|| TransportError::NotFound(format!("{:03}:{:03}", bus, address)))
}

/// An opened USB device, shared by its controller and reader threads
///
/// Interfaces claimed through the link are released when it is dropped.
pub struct UsbLink {
    device: Device<GlobalContext>,
    handle: DeviceHandle<GlobalContext>,
    claimed: Mutex<Vec<u8>>,
    usbpath: String,
    usbid: String,
    name: String,
}

impl UsbLink {
    /// Open `device`; `fallback_name` is used when it has no product string
    pub fn open(device: Device<GlobalContext>, fallback_name: &str) -> Result<Self, TransportError> {
        let handle = device.open()?;
        let descriptor = device.device_descriptor()?;

        let usbpath = format!("{:03}:{:03}", device.bus_number(), device.address());
        let usbid = format!("{:04x}:{:04x}", descriptor.vendor_id(), descriptor.product_id());
        let name = handle
            .read_product_string_ascii(&descriptor)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| fallback_name.to_string());

        debug!(%usbpath, %usbid, %name, "opened USB device");
        Ok(Self {
            device,
            handle,
            claimed: Mutex::new(Vec::new()),
            usbpath,
            usbid,
            name,
        })
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

    /// Claim an interface, detaching a kernel driver that holds it if allowed
    pub fn claim_interface(&self, interface: u8, detach: bool) -> Result<(), TransportError> {
        let claim = |source| TransportError::Claim { interface, source };
        match self.handle.claim_interface(interface) {
            Ok(()) => {}
            Err(rusb::Error::Busy) if detach => {
                info!(interface, usbpath = %self.usbpath, "interface busy, detaching kernel driver");
                self.handle.detach_kernel_driver(interface).map_err(claim)?;
                self.handle.claim_interface(interface).map_err(claim)?;
            }
            Err(e) => return Err(claim(e)),
        }
        self.claimed.lock().push(interface);
        Ok(())
    }

    /// Address of the first endpoint with `direction` on an interface of the
    /// given class triple
    pub fn find_endpoint(
        &self,
        direction: Direction,
        class: u8,
        subclass: u8,
        protocol: u8,
    ) -> Result<u8, TransportError> {
        let config = self.device.config_descriptor(0)?;
        config
            .interfaces()
            .flat_map(|interface| interface.descriptors())
            .filter(|alt| {
                alt.class_code() == class && alt.sub_class_code() == subclass && alt.protocol_code() == protocol
            })
            .flat_map(|alt| alt.endpoint_descriptors().map(|ep| (ep.direction(), ep.address())).collect::<Vec<_>>())
            .find(|(dir, _)| *dir == direction)
            .map(|(_, address)| address)
            .ok_or(TransportError::NoEndpoint {
                direction: match direction {
                    Direction::In => "IN",
                    Direction::Out => "OUT",
                },
                class,
                subclass,
                protocol,
            })
    }

    /// One interrupt read
    pub fn read(&self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> Result<usize, rusb::Error> {
        self.handle.read_interrupt(endpoint, buf, timeout)
    }

    /// One interrupt write
    pub fn write(&self, endpoint: u8, data: &[u8]) -> Result<(), rusb::Error> {
        let written = self.handle.write_interrupt(endpoint, data, WRITE_TIMEOUT)?;
        if written != data.len() {
            warn!(endpoint, written, expected = data.len(), "short USB write");
        }
        Ok(())
    }
}

impl Drop for UsbLink {
    fn drop(&mut self) {
        for interface in self.claimed.lock().drain(..) {
            if let Err(e) = self.handle.release_interface(interface) {
                debug!(interface, "release_interface failed: {}", e);
            }
        }
    }
}

impl std::fmt::Debug for UsbLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsbLink")
            .field("usbpath", &self.usbpath)
            .field("usbid", &self.usbid)
            .field("name", &self.name)
            .finish()
    }
}
