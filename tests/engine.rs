//! Integration tests for the polling loop, scanner, and executor, driven
//! against a scripted in-memory bus.
//!
//! All timing-sensitive tests run with a paused tokio clock, so the
//! engine's fixed delays advance virtually and the pacing assertions are
//! deterministic.

use async_trait::async_trait;
use meterpoll::decode::Transform;
use meterpoll::error::TransportError;
use meterpoll::executor::QueryExecutor;
use meterpoll::poll::{DEVICE_SETTLE_DELAY, MAX_RETRY_COUNT, PollingLoop};
use meterpoll::producer::default_producers;
use meterpoll::scan::{BusScanner, SCAN_PROBE_TIMEOUT};
use meterpoll::session::BusTransport;
use meterpoll::snip::{ControlKind, ControlSnip, FunctionCode, QuerySnip};
use meterpoll::status::Status;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

const DEFAULT_TIMEOUT: Duration = Duration::from_millis(300);

/// One recorded bus access.
#[derive(Debug, Clone)]
struct Call {
    device_id: u8,
    at: Instant,
    timeout: Duration,
}

/// Scripted response for one (device, function, opcode) triple.
struct Script {
    remaining_failures: u32,
    words: Vec<u16>,
}

#[derive(Default)]
struct BusState {
    calls: Vec<Call>,
    scripts: HashMap<(u8, u8, u16), Script>,
    current_timeout: Duration,
}

/// In-memory bus: devices answer according to their script, everything else
/// times out.
struct MockBus {
    timeout: Duration,
    state: Arc<Mutex<BusState>>,
}

impl MockBus {
    fn new() -> (Self, Arc<Mutex<BusState>>) {
        let state = Arc::new(Mutex::new(BusState {
            current_timeout: DEFAULT_TIMEOUT,
            ..BusState::default()
        }));
        let bus = Self {
            timeout: DEFAULT_TIMEOUT,
            state: state.clone(),
        };
        (bus, state)
    }

    /// Script an immediate answer.
    fn respond(&self, device_id: u8, function: FunctionCode, op_code: u16, words: Vec<u16>) {
        self.respond_after(device_id, function, op_code, 0, words);
    }

    /// Script an answer that only arrives after `failures` failed attempts.
    fn respond_after(
        &self,
        device_id: u8,
        function: FunctionCode,
        op_code: u16,
        failures: u32,
        words: Vec<u16>,
    ) {
        self.state.lock().unwrap().scripts.insert(
            (device_id, function.code(), op_code),
            Script {
                remaining_failures: failures,
                words,
            },
        );
    }
}

#[async_trait]
impl BusTransport for MockBus {
    async fn read_registers(
        &mut self,
        device_id: u8,
        function: FunctionCode,
        start: u16,
        _count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call {
            device_id,
            at: Instant::now(),
            timeout: self.timeout,
        });

        match state.scripts.get_mut(&(device_id, function.code(), start)) {
            Some(script) if script.remaining_failures == 0 => Ok(script.words.clone()),
            Some(script) => {
                script.remaining_failures -= 1;
                Err(TransportError::link("no response"))
            }
            None => Err(TransportError::Timeout(self.timeout)),
        }
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn set_timeout(&mut self, timeout: Duration) -> Duration {
        self.state.lock().unwrap().current_timeout = timeout;
        std::mem::replace(&mut self.timeout, timeout)
    }
}

fn words_of_f32(value: f32) -> Vec<u16> {
    let bits = value.to_bits();
    vec![(bits >> 16) as u16, bits as u16]
}

fn voltage_snip(device_id: u8) -> QuerySnip {
    QuerySnip::new(device_id, FunctionCode::ReadInput, 0x0000, 2, Transform::Raw32)
}

/// Run the polling loop over the given requests and collect its output.
async fn run_poller(
    bus: MockBus,
    status: Arc<Status>,
    snips: Vec<QuerySnip>,
) -> (Vec<QuerySnip>, Vec<ControlSnip>) {
    let (request_tx, request_rx) = mpsc::channel(64);
    let (result_tx, mut result_rx) = mpsc::channel(64);
    let (control_tx, mut control_rx) = mpsc::channel(64);

    for snip in snips {
        request_tx.send(snip).await.unwrap();
    }
    drop(request_tx);

    let executor = QueryExecutor::new(bus, status.clone(), false);
    PollingLoop::new(executor, status)
        .run(request_rx, result_tx, control_tx)
        .await;

    let mut results = Vec::new();
    while let Some(snip) = result_rx.recv().await {
        results.push(snip);
    }
    let mut controls = Vec::new();
    while let Some(control) = control_rx.recv().await {
        controls.push(control);
    }

    (results, controls)
}

#[tokio::test(start_paused = true)]
async fn test_poll_success_on_first_attempt() {
    let (bus, _state) = MockBus::new();
    bus.respond(5, FunctionCode::ReadInput, 0x0000, words_of_f32(230.25));

    let status = Arc::new(Status::new());
    let (results, controls) = run_poller(bus, status.clone(), vec![voltage_snip(5)]).await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].value, Some(230.25));
    assert!(results[0].read_timestamp.is_some());

    assert_eq!(controls.len(), 1);
    assert_eq!(controls[0].device_id, 5);
    assert_eq!(controls[0].kind, ControlKind::Ok);

    assert_eq!(status.requests(), 1);
    assert_eq!(status.reconnects(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_poll_success_after_retries_counts_reconnects() {
    let (bus, _state) = MockBus::new();
    // Succeeds on the third attempt.
    bus.respond_after(9, FunctionCode::ReadInput, 0x0000, 2, words_of_f32(231.5));

    let status = Arc::new(Status::new());
    let (results, controls) = run_poller(bus, status.clone(), vec![voltage_snip(9)]).await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].value, Some(231.5));
    assert_eq!(controls.len(), 1);
    assert_eq!(controls[0].kind, ControlKind::Ok);

    // One request per attempt, one reconnect per failed attempt.
    assert_eq!(status.requests(), 3);
    assert_eq!(status.reconnects(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_poll_exhaustion_emits_single_error() {
    let (bus, _state) = MockBus::new();
    // Nothing scripted: device 3 never answers.

    let status = Arc::new(Status::new());
    let (results, controls) = run_poller(bus, status.clone(), vec![voltage_snip(3)]).await;

    assert!(results.is_empty());
    assert_eq!(controls.len(), 1);
    assert_eq!(controls[0].device_id, 3);
    assert_eq!(controls[0].kind, ControlKind::Error);
    assert!(controls[0].message.contains("Device 3"));

    assert_eq!(status.requests(), MAX_RETRY_COUNT as u64);
    assert_eq!(status.reconnects(), MAX_RETRY_COUNT as u64);
}

#[tokio::test(start_paused = true)]
async fn test_poll_paces_only_on_device_change() {
    let (bus, state) = MockBus::new();
    bus.respond(3, FunctionCode::ReadInput, 0x0000, words_of_f32(230.0));
    bus.respond(7, FunctionCode::ReadInput, 0x0000, words_of_f32(229.0));

    let status = Arc::new(Status::new());
    let snips = vec![voltage_snip(3), voltage_snip(3), voltage_snip(7)];
    let (results, _controls) = run_poller(bus, status, snips).await;
    assert_eq!(results.len(), 3);

    let calls = state.lock().unwrap().calls.clone();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0].device_id, 3);
    assert_eq!(calls[1].device_id, 3);
    assert_eq!(calls[2].device_id, 7);

    // Same device back-to-back: no enforced gap.
    let same_device_gap = calls[1].at.duration_since(calls[0].at);
    assert!(same_device_gap < DEVICE_SETTLE_DELAY);

    // Device switch: the bus settles first.
    let switch_gap = calls[2].at.duration_since(calls[1].at);
    assert!(switch_gap >= DEVICE_SETTLE_DELAY);
}

#[tokio::test(start_paused = true)]
async fn test_control_snips_follow_dequeue_order() {
    let (bus, _state) = MockBus::new();
    bus.respond(2, FunctionCode::ReadInput, 0x0000, words_of_f32(230.0));
    // Device 9 never answers.

    let status = Arc::new(Status::new());
    let snips = vec![voltage_snip(2), voltage_snip(9), voltage_snip(2)];
    let (results, controls) = run_poller(bus, status.clone(), snips).await;

    assert_eq!(results.len(), 2);
    assert_eq!(controls.len(), 3);
    assert_eq!(
        controls
            .iter()
            .map(|c| (c.device_id, c.kind))
            .collect::<Vec<_>>(),
        vec![
            (2, ControlKind::Ok),
            (9, ControlKind::Error),
            (2, ControlKind::Ok),
        ]
    );

    assert_eq!(status.requests(), 1 + MAX_RETRY_COUNT as u64 + 1);
}

#[tokio::test(start_paused = true)]
async fn test_scan_finds_only_responding_devices() {
    let (bus, state) = MockBus::new();
    // Only addresses 5 and 42 answer, both to the SDM probe.
    bus.respond(5, FunctionCode::ReadInput, 0x0000, words_of_f32(230.12));
    bus.respond(42, FunctionCode::ReadInput, 0x0000, words_of_f32(228.9));

    let status = Arc::new(Status::new());
    let mut executor = QueryExecutor::new(bus, status, false);
    let producers = default_producers();
    let report = BusScanner::new(&mut executor, &producers).scan().await;

    assert_eq!(report.devices.len(), 2);
    assert_eq!(report.devices[0].device_id, 5);
    assert_eq!(report.devices[0].meter_type, "SDM");
    assert_eq!(report.devices[1].device_id, 42);
    assert_eq!(report.devices[1].meter_type, "SDM");

    let state = state.lock().unwrap();

    // Every probed address stays inside the valid slave range, and every
    // address in the range is swept.
    assert!(state.calls.iter().all(|c| (1..=247).contains(&c.device_id)));
    let mut probed: Vec<u8> = state.calls.iter().map(|c| c.device_id).collect();
    probed.sort_unstable();
    probed.dedup();
    assert_eq!(probed.len(), 247);

    // First match wins: responders are probed once, absent addresses get
    // every producer's probe.
    let calls_for = |id: u8| state.calls.iter().filter(|c| c.device_id == id).count();
    assert_eq!(calls_for(5), 1);
    assert_eq!(calls_for(42), 1);
    assert_eq!(calls_for(10), 3);

    // The whole sweep ran with the shortened probe timeout.
    assert!(state.calls.iter().all(|c| c.timeout == SCAN_PROBE_TIMEOUT));
}

#[tokio::test(start_paused = true)]
async fn test_scan_restores_session_timeout() {
    let (bus, state) = MockBus::new();
    bus.respond(17, FunctionCode::ReadInput, 0x0000, words_of_f32(230.0));

    let status = Arc::new(Status::new());
    let mut executor = QueryExecutor::new(bus, status, false);
    let producers = default_producers();
    let report = BusScanner::new(&mut executor, &producers).scan().await;

    assert_eq!(report.devices.len(), 1);
    assert_eq!(state.lock().unwrap().current_timeout, DEFAULT_TIMEOUT);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_guard_restores_on_early_exit() {
    let (bus, state) = MockBus::new();
    bus.respond(1, FunctionCode::ReadInput, 0x0000, words_of_f32(230.0));

    let status = Arc::new(Status::new());
    let mut executor = QueryExecutor::new(bus, status, false);

    {
        let mut guard = executor.with_timeout(Duration::from_millis(50));
        assert_eq!(
            state.lock().unwrap().current_timeout,
            Duration::from_millis(50)
        );

        // Early exit out of the scope mid-work.
        if guard.query(&voltage_snip(1)).await.is_ok() {
            drop(guard);
        }
    }

    assert_eq!(state.lock().unwrap().current_timeout, DEFAULT_TIMEOUT);
}

#[tokio::test(start_paused = true)]
#[should_panic(expected = "invalid read length 0")]
async fn test_zero_read_length_aborts() {
    let (bus, _state) = MockBus::new();
    let status = Arc::new(Status::new());
    let mut executor = QueryExecutor::new(bus, status, false);

    let mut snip = voltage_snip(1);
    snip.read_len = 0;
    let _ = executor.query(&snip).await;
}
