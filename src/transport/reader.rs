//! Reader thread and the generic USB controller

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::usb::UsbLink;
use super::{Controller, LinkState, Parsed, ReportParser, TransportError};
use crate::message::names::gamepad_descriptor;
use crate::message::ControllerMessage;

/// Upper bound on how long the reader waits before checking cancellation
const READ_POLL: Duration = Duration::from_millis(100);

/// Largest report of any supported family
const REPORT_SIZE: usize = 32;

/// Endpoint pair of one controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoints {
    pub input: u8,
    pub output: u8,
}

/// Interrupt-read loop on its own thread
///
/// Decoded messages go to the controller through a one-slot crossbeam
/// channel holding only the latest report; older ones the controller has
/// not picked up are dropped. A fatal transfer error marks the link
/// disconnected and ends the thread, which closes the channel.
pub struct UsbReader {
    cancel: CancellationToken,
    thread: Option<JoinHandle<()>>,
}

impl UsbReader {
    pub fn spawn<P: ReportParser>(
        usb: Arc<UsbLink>,
        endpoints: Endpoints,
        parser: Arc<Mutex<P>>,
        link: Arc<LinkState>,
    ) -> Result<(Self, Receiver<ControllerMessage>), TransportError> {
        let (tx, rx) = channel::bounded(1);
        let stale = rx.clone();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let thread_name = format!("usb-read-{}", usb.usbpath());

        let thread = std::thread::Builder::new()
            .name(thread_name)
            .spawn(move || read_loop(usb, endpoints, parser, link, tx, stale, token))?;

        Ok((
            Self {
                cancel,
                thread: Some(thread),
            },
            rx,
        ))
    }

    /// Cancel and join
    pub fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("USB reader thread panicked");
            }
        }
    }
}

impl Drop for UsbReader {
    fn drop(&mut self) {
        self.stop();
    }
}

fn read_loop<P: ReportParser>(
    usb: Arc<UsbLink>,
    endpoints: Endpoints,
    parser: Arc<Mutex<P>>,
    link: Arc<LinkState>,
    tx: Sender<ControllerMessage>,
    stale: Receiver<ControllerMessage>,
    cancel: CancellationToken,
) {
    let (desc, _) = gamepad_descriptor();
    let mut msg = ControllerMessage::new(&desc);
    let mut buf = [0u8; REPORT_SIZE];

    while !cancel.is_cancelled() {
        let len = match usb.read(endpoints.input, &mut buf, READ_POLL) {
            Ok(len) => len,
            Err(rusb::Error::Timeout) | Err(rusb::Error::Interrupted) => continue,
            Err(rusb::Error::NoDevice) => {
                info!(usbpath = %usb.usbpath(), "USB device gone");
                link.mark_disconnected();
                break;
            }
            Err(e) => {
                error!(usbpath = %usb.usbpath(), "USB read failure: {}", e);
                link.mark_disconnected();
                break;
            }
        };

        let parsed = parser.lock().parse(&buf[..len], &mut msg, &link);
        match parsed {
            Parsed::Message => {
                if !publish(&tx, &stale, msg.clone()) {
                    break;
                }
            }
            Parsed::Connected => {
                let packet = parser.lock().led_packet(link.led());
                if let Some(packet) = packet {
                    if let Err(e) = usb.write(endpoints.output, &packet) {
                        warn!("failed to restore LED: {}", e);
                    }
                }
            }
            Parsed::Nothing => {}
        }
    }
    debug!(usbpath = %usb.usbpath(), "USB reader exiting");
}

/// Hand `msg` over, replacing a report nobody has read yet
fn publish(tx: &Sender<ControllerMessage>, stale: &Receiver<ControllerMessage>, mut msg: ControllerMessage) -> bool {
    loop {
        match tx.try_send(msg) {
            Ok(()) => return true,
            Err(TrySendError::Full(back)) => {
                let _ = stale.try_recv();
                msg = back;
            }
            Err(TrySendError::Disconnected(_)) => return false,
        }
    }
}

/// A controller backed by a USB link and a family parser
pub struct UsbController<P: ReportParser> {
    usb: Arc<UsbLink>,
    parser: Arc<Mutex<P>>,
    endpoints: Endpoints,
    link: Arc<LinkState>,
    _reader: UsbReader,
    rx: Receiver<ControllerMessage>,
    rumble: (u8, u8),
    led_sent: Option<u8>,
}

impl<P: ReportParser> UsbController<P> {
    /// Start reading `endpoints.input`; the interface must already be claimed
    pub fn start(usb: Arc<UsbLink>, endpoints: Endpoints, parser: P, active: bool) -> Result<Self, TransportError> {
        let parser = Arc::new(Mutex::new(parser));
        let link = Arc::new(LinkState::new(active));
        let (reader, rx) = UsbReader::spawn(usb.clone(), endpoints, parser.clone(), link.clone())?;
        Ok(Self {
            usb,
            parser,
            endpoints,
            link,
            _reader: reader,
            rx,
            rumble: (0, 0),
            led_sent: None,
        })
    }

    fn write(&self, packet: &[u8]) {
        match self.usb.write(self.endpoints.output, packet) {
            Ok(()) => {}
            Err(rusb::Error::NoDevice) => self.link.mark_disconnected(),
            Err(e) => warn!(usbpath = %self.usb.usbpath(), "USB write failure: {}", e),
        }
    }
}

impl<P: ReportParser> Controller for UsbController<P> {
    fn read(&mut self, msg: &mut ControllerMessage, timeout: Duration) -> Result<bool, TransportError> {
        match self.rx.recv_timeout(timeout) {
            Ok(received) => {
                msg.assign_values(&received);
                Ok(true)
            }
            Err(RecvTimeoutError::Timeout) if self.link.is_disconnected() => Err(TransportError::Disconnected),
            Err(RecvTimeoutError::Timeout) => Ok(false),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Disconnected),
        }
    }

    fn discard_pending(&mut self) {
        for _ in self.rx.try_iter() {}
    }

    fn set_rumble(&mut self, left: u8, right: u8) {
        if self.rumble == (left, right) {
            return;
        }
        self.rumble = (left, right);
        debug!(usbpath = %self.usb.usbpath(), left, right, "rumble changed");
        let packet = self.parser.lock().rumble_packet(left, right);
        if let Some(packet) = packet {
            self.write(&packet);
        }
    }

    fn set_led(&mut self, status: u8) {
        self.link.store_led(status);
        if self.led_sent == Some(status) {
            return;
        }
        self.led_sent = Some(status);
        debug!(usbpath = %self.usb.usbpath(), status, "LED changed");
        let packet = self.parser.lock().led_packet(status);
        if let Some(packet) = packet {
            self.write(&packet);
        }
    }

    fn link(&self) -> Arc<LinkState> {
        self.link.clone()
    }

    fn usbpath(&self) -> &str {
        self.usb.usbpath()
    }

    fn usbid(&self) -> &str {
        self.usb.usbid()
    }

    fn name(&self) -> &str {
        self.usb.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unread_report_is_replaced_by_newer() {
        let (desc, names) = gamepad_descriptor();
        let (tx, rx) = channel::bounded(1);
        let stale = rx.clone();

        let mut pressed = ControllerMessage::new(&desc);
        pressed.set_key(names.a, true);
        assert!(publish(&tx, &stale, pressed.clone()));
        for _ in 0..50 {
            assert!(publish(&tx, &stale, pressed.clone()));
        }
        assert!(publish(&tx, &stale, ControllerMessage::new(&desc)));

        let latest = rx.try_recv().unwrap();
        assert!(!latest.key(names.a));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_publish_fails_once_receiver_is_gone() {
        let (desc, _) = gamepad_descriptor();
        let (tx, rx) = channel::bounded::<ControllerMessage>(1);
        drop(rx);
        let (_, unrelated) = channel::bounded(1);
        assert!(!publish(&tx, &unrelated, ControllerMessage::new(&desc)));
    }
}
