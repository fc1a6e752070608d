use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::camera::capabilities::Capabilities;
use crate::camera::device::{CameraDevice, DeviceState};
use crate::camera::error::{CameraError, Result};
use crate::camera::events::SessionEvent;
use crate::camera::session::CameraSession;
use crate::camera::source::VideoSource;
use crate::camera::types::DeviceId;
use crate::config::BridgeConfig;

/// A camera appeared or disappeared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityEvent {
    pub device_id: DeviceId,
    pub available: bool,
}

/// Explicit registry of bridged cameras.
///
/// Owned by the process entry point and injected into collaborators —
/// there is no ambient global instance. The registration layer registers a
/// video source per device id, watches availability, and opens sessions on
/// behalf of consumers.
pub struct CameraRegistry {
    config: BridgeConfig,
    devices: Mutex<BTreeMap<DeviceId, Arc<CameraDevice>>>,
    watchers: Mutex<Vec<flume::Sender<AvailabilityEvent>>>,
}

impl CameraRegistry {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            devices: Mutex::new(BTreeMap::new()),
            watchers: Mutex::new(Vec::new()),
        }
    }

    /// Register a camera under a stable id.
    ///
    /// The device is opened immediately; a source with no usable formats is
    /// rejected rather than registered in a permanently broken state.
    pub fn register(&self, id: DeviceId, source: Arc<dyn VideoSource>) -> Result<()> {
        let device = CameraDevice::open(id.clone(), source, self.config.clone());
        if device.state() == DeviceState::Error {
            return Err(CameraError::Internal(format!(
                "device {id} failed to open"
            )));
        }

        {
            let mut devices = self.devices.lock();
            if devices.contains_key(&id) {
                return Err(CameraError::InvalidArgument(format!(
                    "device {id} is already registered"
                )));
            }
            devices.insert(id.clone(), Arc::new(device));
        }

        info!("registered camera {id}");
        self.notify(AvailabilityEvent {
            device_id: id,
            available: true,
        });
        Ok(())
    }

    /// Unregister and close a camera.
    pub fn remove(&self, id: &DeviceId) -> Result<()> {
        let device = self
            .devices
            .lock()
            .remove(id)
            .ok_or_else(|| CameraError::InvalidArgument(format!("unknown device {id}")))?;
        device.close();

        info!("removed camera {id}");
        self.notify(AvailabilityEvent {
            device_id: id.clone(),
            available: false,
        });
        Ok(())
    }

    /// Ids of all registered cameras, in stable order.
    pub fn list_device_ids(&self) -> Vec<DeviceId> {
        self.devices.lock().keys().cloned().collect()
    }

    /// Capability table for one camera.
    pub fn capabilities(&self, id: &DeviceId) -> Result<Capabilities> {
        Ok(self.device(id)?.capabilities().clone())
    }

    /// Look up a registered device.
    pub fn device(&self, id: &DeviceId) -> Result<Arc<CameraDevice>> {
        self.devices
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| CameraError::InvalidArgument(format!("unknown device {id}")))
    }

    /// Open a capture session on a registered camera.
    ///
    /// Initialises the device on first use so callers going through the
    /// registry need no separate initialize step.
    pub fn open_session(
        &self,
        id: &DeviceId,
    ) -> Result<(CameraSession, flume::Receiver<SessionEvent>)> {
        let device = self.device(id)?;
        if device.state() == DeviceState::Opened {
            device.initialize()?;
        }
        device.open_session()
    }

    /// Subscribe to availability changes. Already-registered cameras are
    /// not replayed; list them separately.
    pub fn watch_availability(&self) -> flume::Receiver<AvailabilityEvent> {
        let (tx, rx) = flume::unbounded();
        self.watchers.lock().push(tx);
        rx
    }

    /// Close every device and notify watchers. The registry is empty but
    /// reusable afterwards.
    pub fn shutdown(&self) {
        let devices = std::mem::take(&mut *self.devices.lock());
        for (id, device) in devices {
            device.close();
            self.notify(AvailabilityEvent {
                device_id: id,
                available: false,
            });
        }
        self.watchers.lock().clear();
        info!("camera registry shut down");
    }

    fn notify(&self, event: AvailabilityEvent) {
        let mut watchers = self.watchers.lock();
        watchers.retain(|tx| {
            if tx.send(event.clone()).is_err() {
                warn!("dropping disconnected availability watcher");
                false
            } else {
                true
            }
        });
    }
}

impl Drop for CameraRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}
