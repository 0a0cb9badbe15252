//! In-memory virtual input, used for `--no-uinput` and in tests

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use super::codes::code_name;
use super::uinput::{DeviceIdentities, FieldSpec, ForceFeedbackEvent, VirtualInput};
use super::{DeviceId, EventKind, OutputError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    Event {
        device: DeviceId,
        kind: EventKind,
        code: u16,
        value: i32,
    },
    Commit(DeviceId),
}

#[derive(Debug, Default)]
struct Shared {
    fields: BTreeMap<DeviceId, Vec<FieldSpec>>,
    names: BTreeMap<DeviceId, String>,
    records: Vec<Recorded>,
    force_feedback: VecDeque<(DeviceId, ForceFeedbackEvent)>,
}

/// Observer half of a [`MemoryInput`]
#[derive(Debug, Clone, Default)]
pub struct MemoryLog {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryLog {
    /// Everything recorded so far, in order
    pub fn records(&self) -> Vec<Recorded> {
        self.shared.lock().records.clone()
    }

    /// Drain recorded events as `(device, kind, code, value)`, dropping commits
    pub fn take_values(&self) -> Vec<(DeviceId, EventKind, u16, i32)> {
        let mut shared = self.shared.lock();
        let values = shared
            .records
            .iter()
            .filter_map(|r| match r {
                Recorded::Event {
                    device,
                    kind,
                    code,
                    value,
                } => Some((*device, *kind, *code, *value)),
                Recorded::Commit(_) => None,
            })
            .collect();
        shared.records.clear();
        values
    }

    /// Devices committed so far, in order
    pub fn commits(&self) -> Vec<DeviceId> {
        self.shared
            .lock()
            .records
            .iter()
            .filter_map(|r| match r {
                Recorded::Commit(device) => Some(*device),
                Recorded::Event { .. } => None,
            })
            .collect()
    }

    pub fn fields(&self, device: DeviceId) -> Vec<FieldSpec> {
        self.shared.lock().fields.get(&device).cloned().unwrap_or_default()
    }

    pub fn device_name(&self, device: DeviceId) -> Option<String> {
        self.shared.lock().names.get(&device).cloned()
    }

    /// Queue a force feedback request as if the kernel had sent it
    pub fn push_force_feedback(&self, device: DeviceId, event: ForceFeedbackEvent) {
        self.shared.lock().force_feedback.push_back((device, event));
    }
}

/// Virtual input that records instead of talking to the kernel
#[derive(Debug)]
pub struct MemoryInput {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryInput {
    pub fn new() -> (Self, MemoryLog) {
        let log = MemoryLog::default();
        (
            Self {
                shared: log.shared.clone(),
            },
            log,
        )
    }
}

impl VirtualInput for MemoryInput {
    fn register(&mut self, device: DeviceId, field: &FieldSpec) -> Result<(), OutputError> {
        self.shared.lock().fields.entry(device).or_default().push(*field);
        Ok(())
    }

    fn finish(&mut self, identities: &DeviceIdentities) -> Result<(), OutputError> {
        let mut shared = self.shared.lock();
        let devices: Vec<DeviceId> = shared.fields.keys().copied().collect();
        for device in devices {
            let name = identities.name(device);
            info!(device = %device, name = %name, "created in-memory device");
            shared.names.insert(device, name);
        }
        Ok(())
    }

    fn emit(&mut self, device: DeviceId, kind: EventKind, code: u16, value: i32) -> Result<(), OutputError> {
        debug!(device = %device, event = %code_name(kind, code), value, "uinput");
        self.shared.lock().records.push(Recorded::Event {
            device,
            kind,
            code,
            value,
        });
        Ok(())
    }

    fn commit(&mut self, device: DeviceId) -> Result<(), OutputError> {
        self.shared.lock().records.push(Recorded::Commit(device));
        Ok(())
    }

    fn poll_force_feedback(&mut self) -> Vec<(DeviceId, ForceFeedbackEvent)> {
        self.shared.lock().force_feedback.drain(..).collect()
    }
}
