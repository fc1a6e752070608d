use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{error, info};

use crate::camera::capabilities::Capabilities;
use crate::camera::error::{CameraError, Result};
use crate::camera::events::SessionEvent;
use crate::camera::session::{CameraSession, SessionCore};
use crate::camera::source::VideoSource;
use crate::camera::types::{DeviceId, FormatDescriptor, StreamConfig};
use crate::config::BridgeConfig;

/// Coarse device lifecycle. The session state machine drives the
/// `Configured`/`Streaming` legs; the device only tracks them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Closed,
    Opened,
    Ready,
    Configured,
    Streaming,
    Error,
}

struct DeviceStatus {
    state: DeviceState,
    session: Option<Weak<SessionCore>>,
}

/// State shared with the device's session so configure/close transitions
/// reflect back onto the device.
pub(crate) struct DeviceShared {
    status: Mutex<DeviceStatus>,
}

impl DeviceShared {
    fn running(state: DeviceState) -> bool {
        matches!(
            state,
            DeviceState::Ready | DeviceState::Configured | DeviceState::Streaming
        )
    }

    pub(crate) fn on_session_configured(&self) {
        let mut status = self.status.lock();
        if Self::running(status.state) {
            status.state = DeviceState::Configured;
        }
    }

    pub(crate) fn on_session_deconfigured(&self) {
        let mut status = self.status.lock();
        if Self::running(status.state) {
            status.state = DeviceState::Ready;
        }
    }

    pub(crate) fn on_session_streaming(&self) {
        let mut status = self.status.lock();
        if Self::running(status.state) {
            status.state = DeviceState::Streaming;
        }
    }

    pub(crate) fn on_session_closed(&self) {
        let mut status = self.status.lock();
        status.session = None;
        if Self::running(status.state) {
            status.state = DeviceState::Ready;
        }
    }
}

/// One bridged camera.
///
/// Wraps a [`VideoSource`], derives the advertised capability table from
/// its formats, and gates session creation: at most one active session per
/// device.
pub struct CameraDevice {
    id: DeviceId,
    source: Arc<dyn VideoSource>,
    config: BridgeConfig,
    capabilities: Arc<Capabilities>,
    formats: Arc<Vec<FormatDescriptor>>,
    shared: Arc<DeviceShared>,
}

impl CameraDevice {
    /// Open a device over a video source.
    ///
    /// A source that enumerates no formats (or fails to enumerate) yields a
    /// device in the `Error` state — constructed, but unusable.
    pub fn open(id: DeviceId, source: Arc<dyn VideoSource>, config: BridgeConfig) -> Self {
        let (state, formats) = match source.enumerate_formats() {
            Ok(formats) if !formats.is_empty() => (DeviceState::Opened, formats),
            Ok(_) => {
                error!("video source for {id} reports no supported formats");
                (DeviceState::Error, Vec::new())
            }
            Err(e) => {
                error!("format enumeration failed for {id}: {e}");
                (DeviceState::Error, Vec::new())
            }
        };

        let capabilities = Capabilities::from_formats(
            config.lens_facing,
            config.fixed_focus,
            config.pipeline_depth(),
            &formats,
        );
        info!(
            "camera device {id} opened in state {state:?} with {} source formats",
            formats.len()
        );

        Self {
            id,
            source,
            config,
            capabilities: Arc::new(capabilities),
            formats: Arc::new(formats),
            shared: Arc::new(DeviceShared {
                status: Mutex::new(DeviceStatus {
                    state,
                    session: None,
                }),
            }),
        }
    }

    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    pub fn state(&self) -> DeviceState {
        self.shared.status.lock().state
    }

    /// Prepare the device for session creation. Spawns nothing — just the
    /// `Opened` to `Ready` transition.
    pub fn initialize(&self) -> Result<()> {
        let mut status = self.shared.status.lock();
        match status.state {
            DeviceState::Opened => {
                status.state = DeviceState::Ready;
                Ok(())
            }
            state => Err(CameraError::WrongState(format!(
                "initialize called in state {state:?}"
            ))),
        }
    }

    /// The capability table the registration layer advertises for this
    /// device.
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Validate a candidate stream against the capability table without
    /// mutating any state.
    pub fn supports_stream(&self, config: &StreamConfig) -> bool {
        self.capabilities.supports(config)
    }

    /// Create the device's capture session and its event channel.
    ///
    /// Fails while another session is active, and before `initialize`.
    pub fn open_session(&self) -> Result<(CameraSession, flume::Receiver<SessionEvent>)> {
        let mut status = self.shared.status.lock();
        match status.state {
            DeviceState::Ready => {}
            DeviceState::Configured | DeviceState::Streaming => {
                return Err(CameraError::WrongState("camera is in use".into()));
            }
            state => {
                return Err(CameraError::WrongState(format!(
                    "open_session called in state {state:?}"
                )));
            }
        }
        if status
            .session
            .as_ref()
            .is_some_and(|weak| weak.upgrade().is_some())
        {
            return Err(CameraError::WrongState("camera is in use".into()));
        }

        let (session, receiver) = CameraSession::spawn(
            self.id.clone(),
            Arc::clone(&self.source),
            self.config.clone(),
            Arc::clone(&self.capabilities),
            Arc::clone(&self.formats),
            Arc::clone(&self.shared),
        );
        status.session = Some(Arc::downgrade(session.core()));
        info!("session opened for {}", self.id);
        Ok((session, receiver))
    }

    /// Close the device, tearing down any active session first. Idempotent.
    pub fn close(&self) {
        let session = {
            let mut status = self.shared.status.lock();
            if status.state == DeviceState::Closed {
                return;
            }
            status.session.take().and_then(|weak| weak.upgrade())
        };

        // Session teardown joins the worker and releases the pool, in that
        // order, before the device forgets about it.
        if let Some(core) = session {
            core.close();
        }

        self.shared.status.lock().state = DeviceState::Closed;
        info!("camera device {} closed", self.id);
    }
}
