use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, warn};

use crate::camera::capabilities::Capabilities;
use crate::camera::device::DeviceShared;
use crate::camera::error::{CameraError, Result};
use crate::camera::events::{self, CaptureResult, EventSender, SessionEvent};
use crate::camera::pool::{BufferPool, FrameLease, OutputBuffer, ReturnFn};
use crate::camera::queue::FrameQueue;
use crate::camera::source::VideoSource;
use crate::camera::types::{
    now_micros, BufferStatus, CaptureRequest, DeviceId, FormatDescriptor, RawFrame,
    SourcePixelFormat, StreamConfig, StreamSpec, StreamType, TargetPixelFormat, UsageFlags,
};
use crate::config::BridgeConfig;
use crate::convert::{self, PlaneMut};
use crate::diagnostics::stats::{PipelineSnapshot, PipelineStats};

/// The negotiated stream plus the wire format feeding it.
#[derive(Clone)]
struct ActiveStream {
    spec: StreamSpec,
    source_format: SourcePixelFormat,
}

/// All pipeline state behind the session mutex. Queue contents, pool
/// occupancy, the outstanding-request FIFO and the configured flag are
/// always observed together under one lock.
struct Pipeline {
    closing: bool,
    active: Option<ActiveStream>,
    queue: FrameQueue,
    pool: Option<BufferPool>,
    /// Bumped on every pool teardown so stale leases from a previous
    /// configuration cannot inject buffers into the new pool.
    pool_epoch: u64,
    /// Sequence numbers of accepted capture requests, consumed one-for-one
    /// by the worker as frames complete.
    pending: VecDeque<u64>,
    stats: PipelineStats,
    streaming_marked: bool,
}

impl Pipeline {
    /// Whether the worker can make progress right now.
    fn ready(&self) -> bool {
        !self.queue.is_empty()
            && self.active.is_some()
            && self.pool.as_ref().is_some_and(BufferPool::has_free)
            && !self.pending.is_empty()
    }
}

struct Shared {
    pipeline: Mutex<Pipeline>,
    frame_cv: Condvar,
}

/// One unit of work claimed by the worker under the lock.
struct Job {
    frame: RawFrame,
    stream: ActiveStream,
    slot: usize,
    buffer: OutputBuffer,
    epoch: u64,
}

pub(crate) struct SessionCore {
    device_id: DeviceId,
    source: Arc<dyn VideoSource>,
    config: BridgeConfig,
    capabilities: Arc<Capabilities>,
    formats: Arc<Vec<FormatDescriptor>>,
    shared: Arc<Shared>,
    events: EventSender,
    worker: Mutex<Option<JoinHandle<()>>>,
    device: Arc<DeviceShared>,
}

/// Active capture session for a single camera.
///
/// Owns the frame pipeline: the bounded queue fed by the video source, the
/// output buffer pool, and the worker thread that converts frames and
/// delivers capture results over the event channel.
pub struct CameraSession {
    core: Arc<SessionCore>,
}

impl std::fmt::Debug for CameraSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraSession").finish_non_exhaustive()
    }
}

impl CameraSession {
    /// Create the session and start its worker thread.
    pub(crate) fn spawn(
        device_id: DeviceId,
        source: Arc<dyn VideoSource>,
        config: BridgeConfig,
        capabilities: Arc<Capabilities>,
        formats: Arc<Vec<FormatDescriptor>>,
        device: Arc<DeviceShared>,
    ) -> (Self, flume::Receiver<SessionEvent>) {
        let shared = Arc::new(Shared {
            pipeline: Mutex::new(Pipeline {
                closing: false,
                active: None,
                queue: FrameQueue::new(config.queue_capacity()),
                pool: None,
                pool_epoch: 0,
                pending: VecDeque::new(),
                stats: PipelineStats::new(),
                streaming_marked: false,
            }),
            frame_cv: Condvar::new(),
        });

        let (events, receiver) = events::channel();

        // Leases hand buffers back through a weak reference so a consumer
        // holding a result after close cannot keep the pipeline alive.
        let shared_weak = Arc::downgrade(&shared);
        let return_fn: ReturnFn = Arc::new(move |epoch, slot, buffer| {
            release_to_pool(&shared_weak, epoch, slot, buffer);
        });

        let worker = {
            let shared = Arc::clone(&shared);
            let events = events.clone();
            let return_fn = Arc::clone(&return_fn);
            let id = device_id.clone();
            std::thread::Builder::new()
                .name(format!("frame-worker-{device_id}"))
                .spawn(move || frame_processing_loop(&id, &shared, &events, &return_fn))
                .expect("failed to spawn frame worker thread")
        };

        let core = Arc::new(SessionCore {
            device_id,
            source,
            config,
            capabilities,
            formats,
            shared,
            events,
            worker: Mutex::new(Some(worker)),
            device,
        });
        (Self { core }, receiver)
    }

    pub(crate) fn core(&self) -> &Arc<SessionCore> {
        &self.core
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.core.device_id
    }

    /// Negotiate the session's output stream.
    ///
    /// An empty list deconfigures the session and always succeeds. A single
    /// output stream matching the advertised capability table tears down
    /// any previous pool first, then allocates a fresh one; on allocation
    /// failure the session is left cleanly deconfigured. Validation
    /// failures leave prior configuration untouched.
    pub fn configure_streams(&self, streams: &[StreamConfig]) -> Result<()> {
        self.core.configure_streams(streams)
    }

    /// Accept a capture request against the configured stream.
    ///
    /// Emits the shutter notification synchronously before returning; pixel
    /// delivery follows asynchronously once the worker converts a matching
    /// frame.
    pub fn process_capture_request(&self, request: &CaptureRequest) -> Result<()> {
        self.core.process_capture_request(request)
    }

    /// Producer entry point — hand over a raw frame from the video source.
    ///
    /// Never blocks. Frames arriving while the session is closing or
    /// unconfigured are dropped and counted; a full queue drops the
    /// incoming frame in favour of the frames already waiting.
    pub fn push_new_frame(&self, frame: RawFrame) {
        self.core.push_new_frame(frame);
    }

    /// Discard all queued frames and fail every outstanding request.
    pub fn flush(&self) -> Result<()> {
        self.core.flush()
    }

    /// Tear the session down: stop and join the worker, release the pool,
    /// silence the event channel. Idempotent.
    pub fn close(&self) {
        self.core.close();
    }

    pub fn is_configured(&self) -> bool {
        self.core.shared.pipeline.lock().active.is_some()
    }

    /// The negotiated stream, if any.
    pub fn stream_spec(&self) -> Option<StreamSpec> {
        self.core
            .shared
            .pipeline
            .lock()
            .active
            .as_ref()
            .map(|active| active.spec.clone())
    }

    /// Take a snapshot of pipeline stats for this session.
    pub fn diagnostics(&self) -> PipelineSnapshot {
        self.core.shared.pipeline.lock().stats.snapshot()
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.core.close();
    }
}

impl SessionCore {
    fn configure_streams(&self, streams: &[StreamConfig]) -> Result<()> {
        let mut state = self.shared.pipeline.lock();
        if state.closing {
            return Err(CameraError::WrongState("session is closing".into()));
        }

        if streams.is_empty() {
            let flushed = deconfigure(&mut state);
            drop(state);
            self.fail_requests(flushed);
            self.device.on_session_deconfigured();
            info!("session deconfigured for {}", self.device_id);
            return Ok(());
        }

        if streams.len() > 1 {
            return Err(CameraError::InvalidArgument(format!(
                "{} streams requested, this bridge serves exactly one",
                streams.len()
            )));
        }

        let requested = &streams[0];
        if requested.stream_type != StreamType::Output {
            return Err(CameraError::InvalidArgument(
                "only output streams are supported".into(),
            ));
        }
        if !self.capabilities.supports(requested) {
            return Err(CameraError::Unsupported(format!(
                "{:?} {}x{} is not an advertised configuration",
                requested.format, requested.width, requested.height
            )));
        }
        let source_format = select_source_format(&self.formats, requested).ok_or_else(|| {
            CameraError::Unsupported(format!(
                "no wire format feeds {:?} at {}x{}",
                requested.format, requested.width, requested.height
            ))
        })?;

        // Validation passed — release the old configuration before
        // allocating the new pool so the two never overlap. A failure past
        // this point leaves the session cleanly deconfigured.
        let flushed = deconfigure(&mut state);

        let spec = StreamSpec {
            stream_id: requested.id,
            width: requested.width,
            height: requested.height,
            format: requested.format,
            buffer_count: self.config.stream_buffer_count,
        };
        let usage = UsageFlags::CPU_WRITE | UsageFlags::CAMERA_WRITE | UsageFlags::GPU_SAMPLED;
        let pool = self
            .source
            .negotiate_format(source_format, requested.width, requested.height)
            .and_then(|()| BufferPool::allocate(&spec, usage));
        let pool = match pool {
            Ok(pool) => pool,
            Err(e) => {
                drop(state);
                self.fail_requests(flushed);
                self.device.on_session_deconfigured();
                return Err(e);
            }
        };

        state.pool = Some(pool);
        state.active = Some(ActiveStream {
            spec,
            source_format,
        });
        state.queue = FrameQueue::new(self.config.queue_capacity());
        drop(state);

        self.fail_requests(flushed);
        self.shared.frame_cv.notify_one();
        self.device.on_session_configured();
        info!(
            "stream configured for {}: {:?} {}x{} over {}, {} buffers",
            self.device_id,
            requested.format,
            requested.width,
            requested.height,
            source_format.fourcc(),
            self.config.stream_buffer_count
        );
        Ok(())
    }

    fn process_capture_request(&self, request: &CaptureRequest) -> Result<()> {
        let mut state = self.shared.pipeline.lock();
        if state.closing {
            self.events.send(SessionEvent::RequestError {
                sequence: request.sequence,
            });
            return Err(CameraError::WrongState("session is closing".into()));
        }
        let Some(active) = state.active.as_ref() else {
            self.events.send(SessionEvent::RequestError {
                sequence: request.sequence,
            });
            return Err(CameraError::WrongState("no stream configured".into()));
        };
        if request.stream_ids.is_empty() {
            self.events.send(SessionEvent::RequestError {
                sequence: request.sequence,
            });
            return Err(CameraError::InvalidArgument(
                "request carries no output targets".into(),
            ));
        }
        if !request.stream_ids.contains(&active.spec.stream_id) {
            debug!(
                "request {} targets streams {:?}, serving configured stream {}",
                request.sequence, request.stream_ids, active.spec.stream_id
            );
        }

        // Shutter fires before the sequence becomes visible to the worker,
        // so the acknowledgment always precedes its result on the channel.
        self.events.send(SessionEvent::Shutter {
            sequence: request.sequence,
            timestamp_us: now_micros(),
        });
        state.pending.push_back(request.sequence);
        state.stats.record_request();
        if !state.streaming_marked {
            state.streaming_marked = true;
            self.device.on_session_streaming();
        }
        drop(state);

        self.shared.frame_cv.notify_one();
        Ok(())
    }

    fn push_new_frame(&self, frame: RawFrame) {
        let mut state = self.shared.pipeline.lock();
        if state.closing || state.active.is_none() {
            state.stats.record_dropped_unconfigured();
            return;
        }
        if !state.queue.try_push(frame) {
            state.stats.record_dropped_overflow();
            warn!(
                "frame queue full for {} ({} frames), dropping incoming frame",
                self.device_id,
                state.queue.len()
            );
            return;
        }
        drop(state);
        self.shared.frame_cv.notify_one();
    }

    fn flush(&self) -> Result<()> {
        let (discarded, flushed) = {
            let mut state = self.shared.pipeline.lock();
            if state.closing {
                return Err(CameraError::WrongState("session is closing".into()));
            }
            (state.queue.clear(), std::mem::take(&mut state.pending))
        };
        if discarded > 0 || !flushed.is_empty() {
            info!(
                "flushed {} frames and {} outstanding requests for {}",
                discarded,
                flushed.len(),
                self.device_id
            );
        }
        self.fail_requests(flushed);
        Ok(())
    }

    pub(crate) fn close(&self) {
        {
            let mut state = self.shared.pipeline.lock();
            if state.closing {
                debug!("session already closing for {}", self.device_id);
            }
            state.closing = true;
        }
        self.shared.frame_cv.notify_all();

        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                warn!(
                    "frame worker for {} panicked during shutdown",
                    self.device_id
                );
            }
        }

        // Worker is gone — now the pool can be torn down without it ever
        // touching freed buffers.
        {
            let mut state = self.shared.pipeline.lock();
            state.queue.clear();
            state.pool = None;
            state.pool_epoch += 1;
            state.active = None;
            state.pending.clear();
        }
        self.events.close();
        self.device.on_session_closed();
        info!("session closed for {}", self.device_id);
    }

    fn fail_requests(&self, sequences: VecDeque<u64>) {
        for sequence in sequences {
            self.events.send(SessionEvent::RequestError { sequence });
        }
    }
}

/// Tear down the active configuration, returning the request FIFO so the
/// caller can fail it outside the lock.
fn deconfigure(state: &mut Pipeline) -> VecDeque<u64> {
    state.active = None;
    state.pool = None;
    state.pool_epoch += 1;
    state.queue.clear();
    std::mem::take(&mut state.pending)
}

/// Pick the wire format that feeds a requested output stream. Packed 4:2:2
/// is preferred when both encodings are available at the size; semi-planar
/// output requires it.
fn select_source_format(
    formats: &[FormatDescriptor],
    requested: &StreamConfig,
) -> Option<SourcePixelFormat> {
    let at_size = |format: SourcePixelFormat| {
        formats
            .iter()
            .any(|f| f.pixel_format == format && f.width == requested.width && f.height == requested.height)
    };

    if at_size(SourcePixelFormat::Yuyv) {
        return Some(SourcePixelFormat::Yuyv);
    }
    if requested.format == TargetPixelFormat::I420 && at_size(SourcePixelFormat::Mjpeg) {
        return Some(SourcePixelFormat::Mjpeg);
    }
    None
}

fn release_to_pool(shared: &Weak<Shared>, epoch: u64, slot: usize, buffer: OutputBuffer) {
    let Some(shared) = shared.upgrade() else {
        return;
    };
    let mut state = shared.pipeline.lock();
    if state.pool_epoch != epoch {
        debug!("discarding lease from torn-down pool generation {epoch}");
        return;
    }
    if let Some(pool) = state.pool.as_mut() {
        pool.release(slot, buffer);
        drop(state);
        shared.frame_cv.notify_one();
    }
}

/// Single worker thread per session: drains the frame queue, converts into
/// pool buffers, and emits capture results matched against the
/// outstanding-request FIFO.
fn frame_processing_loop(
    device_id: &DeviceId,
    shared: &Arc<Shared>,
    events: &EventSender,
    return_fn: &ReturnFn,
) {
    info!("frame worker started for {device_id}");
    loop {
        let job = {
            let mut state = shared.pipeline.lock();
            loop {
                if state.ready() {
                    break;
                }
                if state.closing {
                    info!("frame worker exiting for {device_id}");
                    return;
                }
                shared.frame_cv.wait(&mut state);
            }
            take_job(&mut state)
        };
        let Some(mut job) = job else {
            continue;
        };

        // Conversion runs outside the lock — the producer keeps queueing
        // while pixels move.
        let converted = convert_job(&mut job);

        let mut state = shared.pipeline.lock();
        match converted {
            Ok(()) => {
                if state.pool_epoch != job.epoch {
                    // Reconfigured mid-conversion; the buffer belongs to a
                    // dead pool.
                    debug!("dropping converted frame from stale pool generation for {device_id}");
                    continue;
                }
                let Some(sequence) = state.pending.pop_front() else {
                    // Requests were flushed while converting.
                    if let Some(pool) = state.pool.as_mut() {
                        pool.release(job.slot, job.buffer);
                    }
                    continue;
                };
                state.stats.record_delivered();
                drop(state);

                let lease = FrameLease::new(job.buffer, job.epoch, job.slot, Arc::clone(return_fn));
                events.send(SessionEvent::Result(CaptureResult {
                    sequence,
                    buffer: lease,
                    timestamp_us: job.frame.timestamp_us,
                    status: BufferStatus::Ok,
                }));
            }
            Err(reason) => {
                error!("frame conversion failed for {device_id}: {reason}");
                state.stats.record_conversion_failure();
                if state.pool_epoch == job.epoch {
                    if let Some(pool) = state.pool.as_mut() {
                        pool.release(job.slot, job.buffer);
                    }
                }
            }
        }
    }
}

/// Claim a frame, a pool buffer and the stream description under the lock.
/// `Pipeline::ready` guarantees every piece is present.
fn take_job(state: &mut Pipeline) -> Option<Job> {
    let frame = state.queue.pop()?;
    let stream = state.active.clone()?;
    let epoch = state.pool_epoch;
    let (slot, buffer) = state.pool.as_mut()?.acquire()?;
    Some(Job {
        frame,
        stream,
        slot,
        buffer,
        epoch,
    })
}

/// Dispatch on the (source, target) encoding pair and convert the frame
/// into the claimed buffer.
fn convert_job(job: &mut Job) -> std::result::Result<(), String> {
    let spec = &job.stream.spec;
    if job.frame.width != spec.width || job.frame.height != spec.height {
        return Err(format!(
            "frame is {}x{}, stream negotiated {}x{}",
            job.frame.width, job.frame.height, spec.width, spec.height
        ));
    }
    if job.frame.format != job.stream.source_format {
        return Err(format!(
            "frame arrived as {}, stream negotiated {}",
            job.frame.format.fourcc(),
            job.stream.source_format.fourcc()
        ));
    }

    let stride = job.buffer.stride as usize;
    let height = spec.height as usize;
    match (job.frame.format, spec.format) {
        (SourcePixelFormat::Yuyv, TargetPixelFormat::I420) => {
            let (y, u, v) = split_i420(&mut job.buffer.data, stride, height);
            convert::yuyv_to_i420(
                &job.frame.data,
                spec.width,
                spec.height,
                &mut PlaneMut::new(y, stride),
                &mut PlaneMut::new(u, stride / 2),
                &mut PlaneMut::new(v, stride / 2),
            )
            .map_err(|e| e.to_string())
        }
        (SourcePixelFormat::Yuyv, TargetPixelFormat::Nv12) => {
            let (y, uv) = job.buffer.data.split_at_mut(stride * height);
            convert::yuyv_to_nv12(
                &job.frame.data,
                spec.width,
                spec.height,
                &mut PlaneMut::new(y, stride),
                &mut PlaneMut::new(uv, stride),
            )
            .map_err(|e| e.to_string())
        }
        (SourcePixelFormat::Mjpeg, TargetPixelFormat::I420) => {
            let (y, u, v) = split_i420(&mut job.buffer.data, stride, height);
            convert::mjpeg_to_i420(
                &job.frame.data,
                spec.width,
                spec.height,
                &mut PlaneMut::new(y, stride),
                &mut PlaneMut::new(u, stride / 2),
                &mut PlaneMut::new(v, stride / 2),
            )
            .map_err(|e| e.to_string())
        }
        (SourcePixelFormat::Mjpeg, TargetPixelFormat::Nv12) => {
            Err("no compressed to semi-planar conversion path".into())
        }
    }
}

/// Split an I420 buffer into its three planes at the pool's stride layout.
fn split_i420(data: &mut [u8], stride: usize, height: usize) -> (&mut [u8], &mut [u8], &mut [u8]) {
    let chroma_len = (stride / 2) * (height / 2);
    let (y, rest) = data.split_at_mut(stride * height);
    let (u, v) = rest.split_at_mut(chroma_len);
    (y, u, v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    use crate::camera::device::CameraDevice;
    use crate::camera::dummy::{self, DummySource};

    const TIMEOUT: Duration = Duration::from_secs(2);
    const SETTLE: Duration = Duration::from_millis(200);

    /// Source with an explicit format list and an optional negotiation
    /// failure, for driving the configure edge cases.
    struct ScriptedSource {
        formats: Vec<FormatDescriptor>,
        fail_negotiation: bool,
    }

    impl ScriptedSource {
        fn mjpeg_only(width: u32, height: u32) -> Self {
            Self {
                formats: vec![FormatDescriptor {
                    pixel_format: SourcePixelFormat::Mjpeg,
                    width,
                    height,
                    frame_rates: vec![30.0],
                }],
                fail_negotiation: false,
            }
        }
    }

    impl VideoSource for ScriptedSource {
        fn enumerate_formats(&self) -> Result<Vec<FormatDescriptor>> {
            Ok(self.formats.clone())
        }

        fn negotiate_format(
            &self,
            _format: SourcePixelFormat,
            _width: u32,
            _height: u32,
        ) -> Result<()> {
            if self.fail_negotiation {
                Err(CameraError::Internal("driver rejected format".into()))
            } else {
                Ok(())
            }
        }
    }

    fn open_with(
        source: Arc<dyn VideoSource>,
        config: BridgeConfig,
    ) -> (CameraDevice, CameraSession, flume::Receiver<SessionEvent>) {
        let device = CameraDevice::open(DeviceId::new("usb:1-1"), source, config);
        device.initialize().unwrap();
        let (session, events) = device.open_session().unwrap();
        (device, session, events)
    }

    fn open() -> (CameraDevice, CameraSession, flume::Receiver<SessionEvent>) {
        open_with(Arc::new(DummySource::new()), BridgeConfig::default())
    }

    fn vga_i420(id: i32) -> StreamConfig {
        StreamConfig {
            id,
            stream_type: StreamType::Output,
            width: 640,
            height: 480,
            format: TargetPixelFormat::I420,
        }
    }

    fn vga_frame(timestamp: u64) -> RawFrame {
        RawFrame::with_timestamp(
            dummy::yuyv_test_pattern(640, 480, 200, 90, 160),
            640,
            480,
            SourcePixelFormat::Yuyv,
            timestamp,
        )
    }

    /// Receive the next capture result, skipping other events.
    fn recv_result(events: &flume::Receiver<SessionEvent>) -> Option<CaptureResult> {
        let deadline = Instant::now() + TIMEOUT;
        loop {
            let remaining = deadline.checked_duration_since(Instant::now())?;
            match events.recv_timeout(remaining) {
                Ok(SessionEvent::Result(result)) => return Some(result),
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
    }

    /// Receive the next request error, skipping other events.
    fn recv_request_error(events: &flume::Receiver<SessionEvent>) -> Option<u64> {
        let deadline = Instant::now() + TIMEOUT;
        loop {
            let remaining = deadline.checked_duration_since(Instant::now())?;
            match events.recv_timeout(remaining) {
                Ok(SessionEvent::RequestError { sequence }) => return Some(sequence),
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
    }

    /// Poll until a condition holds or the timeout expires.
    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + TIMEOUT;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        condition()
    }

    #[test]
    fn configure_allocates_pool_at_requested_dimensions() {
        let (device, session, _events) = open();
        session.configure_streams(&[vga_i420(0)]).unwrap();

        let spec = session.stream_spec().unwrap();
        assert_eq!(spec.width, 640);
        assert_eq!(spec.height, 480);
        assert_eq!(spec.buffer_count, 4);
        assert_eq!(spec.format, TargetPixelFormat::I420);
        assert_eq!(device.state(), crate::camera::device::DeviceState::Configured);
    }

    #[test]
    fn configure_empty_list_deconfigures() {
        let (device, session, _events) = open();
        session.configure_streams(&[vga_i420(0)]).unwrap();
        session.configure_streams(&[]).unwrap();

        assert!(!session.is_configured());
        assert_eq!(device.state(), crate::camera::device::DeviceState::Ready);
    }

    #[test]
    fn configure_two_streams_fails_without_touching_prior_config() {
        let (_device, session, _events) = open();
        session.configure_streams(&[vga_i420(0)]).unwrap();

        let err = session
            .configure_streams(&[vga_i420(0), vga_i420(1)])
            .unwrap_err();
        assert!(matches!(err, CameraError::InvalidArgument(_)));
        assert_eq!(session.stream_spec().unwrap().width, 640);
    }

    #[test]
    fn configure_input_stream_is_invalid_argument() {
        let (_device, session, _events) = open();
        let config = StreamConfig {
            stream_type: StreamType::Input,
            ..vga_i420(0)
        };
        assert!(matches!(
            session.configure_streams(&[config]),
            Err(CameraError::InvalidArgument(_))
        ));
    }

    #[test]
    fn configure_unadvertised_size_is_unsupported() {
        let (_device, session, _events) = open();
        let config = StreamConfig {
            width: 320,
            height: 240,
            ..vga_i420(0)
        };
        assert!(matches!(
            session.configure_streams(&[config]),
            Err(CameraError::Unsupported(_))
        ));
        assert!(!session.is_configured());
    }

    #[test]
    fn semi_planar_without_packed_source_is_unsupported() {
        let (_device, session, _events) = open_with(
            Arc::new(ScriptedSource::mjpeg_only(640, 480)),
            BridgeConfig::default(),
        );
        let config = StreamConfig {
            format: TargetPixelFormat::Nv12,
            ..vga_i420(0)
        };
        assert!(matches!(
            session.configure_streams(&[config]),
            Err(CameraError::Unsupported(_))
        ));
    }

    #[test]
    fn negotiation_failure_leaves_session_deconfigured() {
        let source = ScriptedSource {
            formats: vec![FormatDescriptor {
                pixel_format: SourcePixelFormat::Yuyv,
                width: 640,
                height: 480,
                frame_rates: vec![30.0],
            }],
            fail_negotiation: true,
        };
        let (_device, session, _events) = open_with(Arc::new(source), BridgeConfig::default());

        assert!(session.configure_streams(&[vga_i420(0)]).is_err());
        assert!(!session.is_configured());
    }

    #[test]
    fn request_without_configuration_is_wrong_state() {
        let (_device, session, events) = open();
        let err = session
            .process_capture_request(&CaptureRequest::new(0, 0))
            .unwrap_err();
        assert!(matches!(err, CameraError::WrongState(_)));
        assert_eq!(recv_request_error(&events), Some(0));
    }

    #[test]
    fn request_without_targets_is_invalid_argument() {
        let (_device, session, events) = open();
        session.configure_streams(&[vga_i420(0)]).unwrap();

        let request = CaptureRequest {
            sequence: 5,
            stream_ids: vec![],
        };
        let err = session.process_capture_request(&request).unwrap_err();
        assert!(matches!(err, CameraError::InvalidArgument(_)));
        assert_eq!(recv_request_error(&events), Some(5));
    }

    #[test]
    fn shutter_fires_before_any_pixels_exist() {
        let (device, session, events) = open();
        session.configure_streams(&[vga_i420(0)]).unwrap();
        session
            .process_capture_request(&CaptureRequest::new(9, 0))
            .unwrap();

        match events.try_recv().unwrap() {
            SessionEvent::Shutter { sequence, .. } => assert_eq!(sequence, 9),
            _ => panic!("expected an immediate shutter event"),
        }
        assert_eq!(device.state(), crate::camera::device::DeviceState::Streaming);
    }

    #[test]
    fn frames_pushed_while_unconfigured_are_counted_and_dropped() {
        let (_device, session, events) = open();
        session.push_new_frame(vga_frame(1));
        session.push_new_frame(vga_frame(2));

        assert_eq!(session.diagnostics().dropped_unconfigured, 2);
        std::thread::sleep(SETTLE);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn queue_overflow_drops_newest_beyond_twice_pool_size() {
        let (_device, session, _events) = open();
        session.configure_streams(&[vga_i420(0)]).unwrap();

        // No outstanding requests — the worker leaves the queue alone.
        for t in 0..10 {
            session.push_new_frame(vga_frame(t));
        }

        let snapshot = session.diagnostics();
        assert_eq!(snapshot.dropped_overflow, 2);
        assert_eq!(snapshot.frames_delivered, 0);
    }

    #[test]
    fn results_follow_push_order_and_request_fifo() {
        let (_device, session, events) = open();
        session.configure_streams(&[vga_i420(0)]).unwrap();

        for sequence in [10, 11, 12] {
            session
                .process_capture_request(&CaptureRequest::new(sequence, 0))
                .unwrap();
        }
        for t in [100, 200, 300] {
            session.push_new_frame(vga_frame(t));
        }

        let first = recv_result(&events).expect("first result");
        let second = recv_result(&events).expect("second result");
        let third = recv_result(&events).expect("third result");

        assert_eq!(
            [first.sequence, second.sequence, third.sequence],
            [10, 11, 12]
        );
        assert_eq!(
            [first.timestamp_us, second.timestamp_us, third.timestamp_us],
            [100, 200, 300]
        );
        assert_eq!(first.status, BufferStatus::Ok);
    }

    #[test]
    fn delivered_buffer_carries_converted_planes() {
        let (_device, session, events) = open();
        session.configure_streams(&[vga_i420(0)]).unwrap();
        session
            .process_capture_request(&CaptureRequest::new(0, 0))
            .unwrap();
        session.push_new_frame(vga_frame(42));

        let result = recv_result(&events).expect("converted frame");
        let buffer = result.buffer.buffer();
        assert_eq!(buffer.stride, 640);

        let y_len = 640 * 480;
        let c_len = 320 * 240;
        assert!(buffer.data[..y_len].iter().all(|&b| b == 200));
        assert!(buffer.data[y_len..y_len + c_len].iter().all(|&b| b == 90));
        assert!(buffer.data[y_len + c_len..y_len + 2 * c_len]
            .iter()
            .all(|&b| b == 160));
    }

    #[test]
    fn mismatched_frame_is_dropped_and_request_survives() {
        let (_device, session, events) = open();
        session.configure_streams(&[vga_i420(0)]).unwrap();
        session
            .process_capture_request(&CaptureRequest::new(3, 0))
            .unwrap();

        // Wrong dimensions for the negotiated stream.
        session.push_new_frame(RawFrame::with_timestamp(
            dummy::yuyv_test_pattern(320, 240, 1, 2, 3),
            320,
            240,
            SourcePixelFormat::Yuyv,
            7,
        ));

        assert!(wait_until(|| session.diagnostics().conversion_failures == 1));
        // Only the shutter is on the channel — no result was produced.
        match events.try_recv() {
            Ok(SessionEvent::Shutter { .. }) => {}
            other => panic!("expected only a shutter, got {:?}", other.is_ok()),
        }
        assert!(events.try_recv().is_err());

        // The sequence was not consumed; the next good frame satisfies it.
        session.push_new_frame(vga_frame(8));
        let result = recv_result(&events).expect("recovery result");
        assert_eq!(result.sequence, 3);
        assert_eq!(result.timestamp_us, 8);
    }

    #[test]
    fn all_leases_held_stalls_delivery_until_release() {
        let config = BridgeConfig {
            stream_buffer_count: 1,
            ..BridgeConfig::default()
        };
        let (_device, session, events) = open_with(Arc::new(DummySource::new()), config);
        session.configure_streams(&[vga_i420(0)]).unwrap();

        for sequence in [0, 1] {
            session
                .process_capture_request(&CaptureRequest::new(sequence, 0))
                .unwrap();
        }
        session.push_new_frame(vga_frame(1));
        session.push_new_frame(vga_frame(2));

        let first = recv_result(&events).expect("first result");

        // The single pool buffer is leased out — nothing else can convert.
        std::thread::sleep(SETTLE);
        assert!(matches!(
            events.try_recv(),
            Err(flume::TryRecvError::Empty)
        ));

        drop(first);
        let second = recv_result(&events).expect("second result after release");
        assert_eq!(second.sequence, 1);
    }

    #[test]
    fn stale_lease_from_previous_pool_is_discarded_on_reconfigure() {
        let (_device, session, events) = open();
        session.configure_streams(&[vga_i420(0)]).unwrap();
        session
            .process_capture_request(&CaptureRequest::new(0, 0))
            .unwrap();
        session.push_new_frame(vga_frame(1));
        let old_result = recv_result(&events).expect("result from first pool");

        // Reconfigure while the old lease is still out.
        session.configure_streams(&[vga_i420(1)]).unwrap();
        drop(old_result);

        session
            .process_capture_request(&CaptureRequest::new(1, 1))
            .unwrap();
        session.push_new_frame(vga_frame(2));
        let result = recv_result(&events).expect("result from new pool");
        assert_eq!(result.sequence, 1);
    }

    #[test]
    fn deconfigure_fails_outstanding_requests() {
        let (_device, session, events) = open();
        session.configure_streams(&[vga_i420(0)]).unwrap();
        session
            .process_capture_request(&CaptureRequest::new(21, 0))
            .unwrap();

        session.configure_streams(&[]).unwrap();
        assert_eq!(recv_request_error(&events), Some(21));
    }

    #[test]
    fn flush_empties_queue_and_fails_requests() {
        let (_device, session, events) = open();
        session.configure_streams(&[vga_i420(0)]).unwrap();
        for sequence in [30, 31] {
            session
                .process_capture_request(&CaptureRequest::new(sequence, 0))
                .unwrap();
        }

        session.flush().unwrap();
        assert_eq!(recv_request_error(&events), Some(30));
        assert_eq!(recv_request_error(&events), Some(31));
    }

    #[test]
    fn close_is_idempotent() {
        let (_device, session, _events) = open();
        session.configure_streams(&[vga_i420(0)]).unwrap();
        session.close();
        session.close();
        assert!(!session.is_configured());
    }

    #[test]
    fn operations_after_close_fail_closed() {
        let (_device, session, _events) = open();
        session.configure_streams(&[vga_i420(0)]).unwrap();
        session.close();

        assert!(matches!(
            session.configure_streams(&[vga_i420(0)]),
            Err(CameraError::WrongState(_))
        ));
        assert!(matches!(
            session.process_capture_request(&CaptureRequest::new(0, 0)),
            Err(CameraError::WrongState(_))
        ));

        session.push_new_frame(vga_frame(1));
        assert_eq!(session.diagnostics().dropped_unconfigured, 1);
    }

    #[test]
    fn no_events_are_delivered_after_close() {
        let (_device, session, events) = open();
        session.configure_streams(&[vga_i420(0)]).unwrap();
        session.close();

        // Swallow anything emitted before the close finished.
        while events.try_recv().is_ok() {}

        let _ = session.process_capture_request(&CaptureRequest::new(0, 0));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn session_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CameraSession>();
    }
}
