use std::ffi::CString;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use evdev_bridge::publish::{AxisValues, ChannelPublisher};
use evdev_bridge::reader::input_event::{EV_ABS, EV_KEY, EV_REL, EV_SYN};
use evdev_bridge::reader::{EvdevReader, RawInputEvent, ReaderError, ReaderStatus, StopReason};
use evdev_bridge::router::AxisState;
use evdev_bridge::{BridgeError, Channel, DeviceConfig, EvdevBridge, Message};
use tokio::sync::mpsc::Receiver;

fn temp_path(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "evdev-bridge-{}-{}",
        std::process::id(),
        name
    ));
    let _ = fs::remove_file(&path);
    path
}

fn write_capture(path: &Path, events: &[RawInputEvent]) {
    let mut file = fs::File::create(path).unwrap();
    for event in events {
        file.write_all(&event.encode()).unwrap();
    }
}

fn make_fifo(path: &Path) {
    let c_path = CString::new(path.as_os_str().as_bytes()).unwrap();
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) };
    assert_eq!(rc, 0, "mkfifo failed: {}", std::io::Error::last_os_error());
}

fn drain(receiver: &mut Receiver<(Channel, Message)>) -> Vec<(Channel, Message)> {
    let mut messages = Vec::new();
    while let Ok(message) = receiver.try_recv() {
        messages.push(message);
    }
    messages
}

async fn next_on(receiver: &mut Receiver<(Channel, Message)>, channel: Channel) -> Message {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let (got, message) = receiver.recv().await.expect("publisher closed");
            if got == channel {
                return message;
            }
        }
    })
    .await
    .expect("no message on channel")
}

#[tokio::test]
async fn nonexistent_device_fails_construction() {
    let (publisher, _receiver) = ChannelPublisher::new(16);
    let config = DeviceConfig::new("/nonexistent/input/event42");

    let result = EvdevBridge::start(&config, Arc::new(publisher));
    assert!(matches!(
        result,
        Err(BridgeError::Reader(ReaderError::DeviceUnavailable { .. }))
    ));
}

#[tokio::test]
async fn replays_a_recorded_capture() {
    let path = temp_path("capture");
    let events = [
        RawInputEvent::new(EV_KEY, 272, 1),
        RawInputEvent::new(EV_ABS, 0, 100),
        RawInputEvent::new(EV_ABS, 1, 0),
        RawInputEvent::new(EV_REL, 8, 1),
        RawInputEvent::new(EV_REL, 8, 1),
        RawInputEvent::new(EV_SYN, 0, 0),
        RawInputEvent::new(EV_KEY, 272, 0),
    ];
    write_capture(&path, &events);

    let (publisher, mut receiver) = ChannelPublisher::new(256);
    let bridge = EvdevBridge::start(&DeviceConfig::new(&path), Arc::new(publisher)).unwrap();

    let mut status = bridge.reader().subscribe_status();
    status
        .wait_for(|s| *s == ReaderStatus::Stopped(StopReason::EndOfStream))
        .await
        .unwrap();
    assert!(!bridge.check_state());
    assert!(bridge.failure().is_none());

    // Let the publish loops tick after the last update
    tokio::time::sleep(Duration::from_millis(100)).await;
    bridge.stop().await;
    fs::remove_file(&path).unwrap();

    let messages = drain(&mut receiver);
    let on = |channel: Channel| -> Vec<Message> {
        messages
            .iter()
            .filter(|(c, _)| *c == channel)
            .map(|(_, m)| m.clone())
            .collect()
    };

    let raw: Vec<Message> = events.iter().copied().map(Message::Event).collect();
    assert_eq!(on(Channel::Raw), raw);
    assert_eq!(
        on(Channel::Key),
        vec![
            Message::Event(RawInputEvent::new(EV_KEY, 272, 1)),
            Message::Event(RawInputEvent::new(EV_KEY, 272, 0)),
        ]
    );

    // A flush may land between two records, so check the aggregate result
    assert_eq!(
        on(Channel::Abs).last(),
        Some(&Message::Axes(AxisValues::from([(0, 100)])))
    );
    let rel_total: i32 = on(Channel::Rel)
        .iter()
        .map(|message| match message {
            Message::Axes(values) => values.get(&8).copied().unwrap_or(0),
            Message::Event(_) => panic!("event on rel channel"),
        })
        .sum();
    assert_eq!(rel_total, 2);
}

#[tokio::test]
async fn rel_to_abs_capture_keeps_raw_untouched() {
    let path = temp_path("rel-to-abs");
    write_capture(&path, &[RawInputEvent::new(EV_REL, 0, 5)]);

    let mut config = DeviceConfig::new(&path);
    config.rel_to_abs = true;
    let (publisher, mut receiver) = ChannelPublisher::new(64);
    let bridge = EvdevBridge::start(&config, Arc::new(publisher)).unwrap();

    assert_eq!(
        next_on(&mut receiver, Channel::Abs).await,
        Message::Axes(AxisValues::from([(0, 5)]))
    );
    assert!(!bridge.router().rel_state().is_dirty());
    bridge.stop().await;
    fs::remove_file(&path).unwrap();

    let messages = drain(&mut receiver);
    assert!(messages.iter().all(|(channel, _)| *channel != Channel::Rel));
}

#[tokio::test]
async fn live_fifo_device_publishes_and_stops_cleanly() {
    let path = temp_path("fifo");
    make_fifo(&path);

    // The read end must exist before the writer can open without blocking
    let reader = EvdevReader::open(&path).unwrap();
    let mut writer = OpenOptions::new().write(true).open(&path).unwrap();

    let (publisher, mut receiver) = ChannelPublisher::new(64);
    let bridge =
        EvdevBridge::start_with_reader(&DeviceConfig::new(&path), reader, Arc::new(publisher))
            .unwrap();
    assert!(bridge.check_state());

    bridge.activate();
    assert_eq!(
        next_on(&mut receiver, Channel::Abs).await,
        Message::Axes(AxisValues::new())
    );

    let key = RawInputEvent::new(EV_KEY, 30, 1);
    writer.write_all(&key.encode()).unwrap();
    assert_eq!(next_on(&mut receiver, Channel::Key).await, Message::Event(key));

    writer.write_all(&RawInputEvent::new(EV_ABS, 2, 7).encode()).unwrap();
    assert_eq!(
        next_on(&mut receiver, Channel::Abs).await,
        Message::Axes(AxisValues::from([(2, 7)]))
    );
    bridge.activate();
    assert_eq!(
        next_on(&mut receiver, Channel::Abs).await,
        Message::Axes(AxisValues::from([(2, 7)]))
    );

    // Writer stays open, so the reader is blocked when we stop
    let reason = tokio::time::timeout(Duration::from_secs(2), bridge.stop())
        .await
        .expect("bridge did not stop");
    assert_eq!(reason, StopReason::Cancelled);

    drop(writer);
    fs::remove_file(&path).unwrap();
}
