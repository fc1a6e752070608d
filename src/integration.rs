//! End-to-end pipeline tests driven through the registry, the way the
//! registration layer uses the bridge.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::camera::dummy::{self, DummySource};
use crate::camera::events::SessionEvent;
use crate::camera::registry::CameraRegistry;
use crate::camera::types::{
    CaptureRequest, DeviceId, RawFrame, SourcePixelFormat, StreamConfig, StreamType,
    TargetPixelFormat,
};
use crate::config::BridgeConfig;

const TIMEOUT: Duration = Duration::from_secs(2);

fn vga_stream() -> StreamConfig {
    StreamConfig {
        id: 0,
        stream_type: StreamType::Output,
        width: 640,
        height: 480,
        format: TargetPixelFormat::I420,
    }
}

fn recv_result(events: &flume::Receiver<SessionEvent>) -> Option<(u64, u64, Vec<u8>)> {
    let deadline = Instant::now() + TIMEOUT;
    loop {
        let remaining = deadline.checked_duration_since(Instant::now())?;
        match events.recv_timeout(remaining) {
            Ok(SessionEvent::Result(result)) => {
                let data = result.buffer.buffer().data.clone();
                return Some((result.sequence, result.timestamp_us, data));
            }
            Ok(_) => continue,
            Err(_) => return None,
        }
    }
}

#[test]
fn capture_one_frame_then_reject_a_mismatched_one() {
    let registry = CameraRegistry::new(BridgeConfig::default());
    let id = DeviceId::new("usb:1-4");
    registry.register(id.clone(), Arc::new(DummySource::new())).unwrap();

    let (session, events) = registry.open_session(&id).unwrap();
    session.configure_streams(&[vga_stream()]).unwrap();

    // First request: one matching synthetic frame in, exactly one result out.
    session
        .process_capture_request(&CaptureRequest::new(0, 0))
        .unwrap();
    session.push_new_frame(RawFrame::with_timestamp(
        dummy::yuyv_test_pattern(640, 480, 120, 64, 192),
        640,
        480,
        SourcePixelFormat::Yuyv,
        5_000,
    ));

    let (sequence, timestamp_us, data) = recv_result(&events).expect("one capture result");
    assert_eq!(sequence, 0);
    assert_eq!(timestamp_us, 5_000);

    // Reference I420 layout for a uniform source: Y plane, then U, then V.
    let y_len = 640 * 480;
    let c_len = 320 * 240;
    assert_eq!(data.len(), y_len + 2 * c_len);
    assert!(data[..y_len].iter().all(|&b| b == 120));
    assert!(data[y_len..y_len + c_len].iter().all(|&b| b == 64));
    assert!(data[y_len + c_len..].iter().all(|&b| b == 192));

    // Second request, then a frame of the wrong dimensions: no further
    // result, one recorded conversion failure.
    session
        .process_capture_request(&CaptureRequest::new(1, 0))
        .unwrap();
    session.push_new_frame(RawFrame::with_timestamp(
        dummy::yuyv_test_pattern(320, 240, 1, 2, 3),
        320,
        240,
        SourcePixelFormat::Yuyv,
        6_000,
    ));

    let deadline = Instant::now() + TIMEOUT;
    while session.diagnostics().conversion_failures == 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    let snapshot = session.diagnostics();
    assert_eq!(snapshot.conversion_failures, 1);
    assert_eq!(snapshot.frames_delivered, 1);

    session.close();
    registry.shutdown();
}

#[test]
fn delivery_preserves_arrival_order_across_the_full_stack() {
    let registry = CameraRegistry::new(BridgeConfig::default());
    let id = DeviceId::new("usb:1-4");
    registry.register(id.clone(), Arc::new(DummySource::new())).unwrap();

    let (session, events) = registry.open_session(&id).unwrap();
    session.configure_streams(&[vga_stream()]).unwrap();

    for sequence in 0..3 {
        session
            .process_capture_request(&CaptureRequest::new(sequence, 0))
            .unwrap();
    }
    for timestamp in [1_000, 2_000, 3_000] {
        session.push_new_frame(RawFrame::with_timestamp(
            dummy::yuyv_test_pattern(640, 480, 50, 60, 70),
            640,
            480,
            SourcePixelFormat::Yuyv,
            timestamp,
        ));
    }

    let mut delivered = Vec::new();
    for _ in 0..3 {
        let (sequence, timestamp_us, _) = recv_result(&events).expect("result");
        delivered.push((sequence, timestamp_us));
    }
    assert_eq!(delivered, vec![(0, 1_000), (1, 2_000), (2, 3_000)]);
}

#[test]
fn shutter_precedes_result_for_each_sequence() {
    let registry = CameraRegistry::new(BridgeConfig::default());
    let id = DeviceId::new("usb:1-4");
    registry.register(id.clone(), Arc::new(DummySource::new())).unwrap();

    let (session, events) = registry.open_session(&id).unwrap();
    session.configure_streams(&[vga_stream()]).unwrap();

    session
        .process_capture_request(&CaptureRequest::new(0, 0))
        .unwrap();
    session.push_new_frame(RawFrame::with_timestamp(
        dummy::yuyv_test_pattern(640, 480, 10, 20, 30),
        640,
        480,
        SourcePixelFormat::Yuyv,
        1,
    ));

    let deadline = Instant::now() + TIMEOUT;
    let mut order = Vec::new();
    while order.len() < 2 {
        let remaining = deadline
            .checked_duration_since(Instant::now())
            .expect("events within timeout");
        match events.recv_timeout(remaining) {
            Ok(SessionEvent::Shutter { sequence, .. }) => order.push(format!("shutter {sequence}")),
            Ok(SessionEvent::Result(result)) => order.push(format!("result {}", result.sequence)),
            Ok(_) => {}
            Err(_) => break,
        }
    }
    assert_eq!(order, vec!["shutter 0", "result 0"]);
}
