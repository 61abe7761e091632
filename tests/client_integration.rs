//! End-to-end tests against a scripted TCP server standing in for the
//! serial bridge and battery.

use orionbms_lib::protocol;
use orionbms_lib::transport::{ConnectionStrategy, TcpTransport};
use orionbms_lib::{BmsClient, Error};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// A fake battery: accepts connections, parses request frames and answers
/// each command identifier with a canned reply frame.
struct FakeBms {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl FakeBms {
    fn start(responses: HashMap<u8, Vec<u8>>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind fake BMS");
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let responses = Arc::new(responses);
        let log = Arc::clone(&requests);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let responses = Arc::clone(&responses);
                let log = Arc::clone(&log);
                thread::spawn(move || serve(stream, responses, log));
            }
        });
        Self { addr, requests }
    }

    fn requests(&self) -> Vec<Vec<u8>> {
        self.requests.lock().unwrap().clone()
    }
}

fn serve(
    mut stream: TcpStream,
    responses: Arc<HashMap<u8, Vec<u8>>>,
    log: Arc<Mutex<Vec<Vec<u8>>>>,
) {
    loop {
        let mut header = [0u8; 4];
        if stream.read_exact(&mut header).is_err() {
            return;
        }
        let mut body = vec![0u8; header[3] as usize];
        if stream.read_exact(&mut body).is_err() {
            return;
        }
        let mut frame = header.to_vec();
        frame.extend_from_slice(&body);
        let cmd_lo = frame[5];
        log.lock().unwrap().push(frame);
        if let Some(reply) = responses.get(&cmd_lo) {
            if stream.write_all(reply).is_err() {
                return;
            }
        }
    }
}

fn client_for(server: &FakeBms) -> BmsClient {
    let transport = TcpTransport::new(server.addr.ip().to_string(), server.addr.port())
        .with_settle_time(Duration::from_millis(1))
        .with_read_timeout(Duration::from_millis(500));
    let client = BmsClient::new(transport);
    client.set_min_spacing(Duration::from_millis(1));
    client
}

fn voltage_reply() -> Vec<u8> {
    let mut payload = Vec::new();
    for i in 0..16u16 {
        payload.extend_from_slice(&(3124 + i).to_be_bytes());
    }
    payload.extend_from_slice(&[0x00, 0xFA, 0x00, 0xFB, 0x00, 0xFC, 0x02]);
    protocol::build_frame(0xD1, 0x01, 0xFF, 0x02, &payload).unwrap()
}

fn serial_reply() -> Vec<u8> {
    let mut payload = vec![0x08];
    payload.extend_from_slice(b"ORN1K-42");
    protocol::build_frame(0xD1, 0x01, 0xFF, 0x05, &payload).unwrap()
}

#[test]
fn voltage_read_end_to_end() {
    let server = FakeBms::start(HashMap::from([(0x02, voltage_reply())]));
    let client = client_for(&server);

    let resp = client.read_voltage_data().unwrap();
    assert_eq!(resp.cell_voltages.len(), 16);
    assert_eq!(resp.cell_voltages[0], 3.124);
    assert_eq!(resp.cell_voltages[15], 3.139);
    assert_eq!(resp.probe_temperatures, vec![25.0, 25.1, 25.2]);
    assert_eq!(resp.software_version, 2);

    let meta = resp.meta.expect("meta attached after success");
    assert!(meta.received_at >= meta.requested_at);
    assert_eq!(meta.endpoint, format!("{}:{}", server.addr.ip(), server.addr.port()));

    // The wire request is fixed by the protocol down to the checksum.
    assert_eq!(
        server.requests(),
        vec![vec![0xEA, 0xD1, 0x01, 0x04, 0xFF, 0x02, 0xF9, 0xF5]]
    );
}

#[test]
fn requests_are_spaced_apart() {
    let server = FakeBms::start(HashMap::from([(0x05, serial_reply())]));
    let client = client_for(&server);
    client.set_min_spacing(Duration::from_millis(100));

    client.read_serial_number().unwrap();
    let between = Instant::now();
    client.read_serial_number().unwrap();
    assert!(
        between.elapsed() >= Duration::from_millis(100),
        "second request was not delayed"
    );
    assert_eq!(server.requests().len(), 2);
}

#[test]
fn echo_mismatch_is_rejected() {
    // The fake answers the voltage command with a serial number frame.
    let server = FakeBms::start(HashMap::from([(0x02, serial_reply())]));
    let client = client_for(&server);

    let err = client.read_voltage_data().unwrap_err();
    match err {
        Error::ResponseMismatch { expected, received } => {
            assert_eq!(expected, 0xFF02);
            assert_eq!(received, 0xFF05);
        }
        other => panic!("expected ResponseMismatch, got {other:?}"),
    }
}

#[test]
fn corrupted_checksum_is_rejected() {
    let mut reply = serial_reply();
    let idx = reply.len() - 2;
    reply[idx] ^= 0xFF;
    let server = FakeBms::start(HashMap::from([(0x05, reply)]));
    let client = client_for(&server);

    assert!(matches!(
        client.read_serial_number().unwrap_err(),
        Error::Checksum { .. }
    ));
}

#[test]
fn mos_control_round_trip() {
    let ack = protocol::build_frame(0xD1, 0x01, 0xFF, 0x19, &[]).unwrap();
    let server = FakeBms::start(HashMap::from([(0x19, ack)]));
    let client = client_for(&server);

    let resp = client.allow_discharge().unwrap();
    assert_eq!(resp.command_id, 0x19);
    assert!(resp.meta.is_some());
}

#[test]
fn per_request_strategy_reconnects_between_requests() {
    let server = FakeBms::start(HashMap::from([(0x05, serial_reply())]));
    let transport = TcpTransport::new(server.addr.ip().to_string(), server.addr.port())
        .with_settle_time(Duration::from_millis(1))
        .with_read_timeout(Duration::from_millis(500))
        .with_strategy(ConnectionStrategy::PerRequest);
    let client = BmsClient::new(transport);
    client.set_min_spacing(Duration::from_millis(1));

    assert_eq!(client.read_serial_number().unwrap().serial_number, "ORN1K-42");
    assert_eq!(client.read_serial_number().unwrap().serial_number, "ORN1K-42");
}

#[test]
fn silent_device_times_out() {
    // No canned reply for the capacity command.
    let server = FakeBms::start(HashMap::from([(0x05, serial_reply())]));
    let transport = TcpTransport::new(server.addr.ip().to_string(), server.addr.port())
        .with_settle_time(Duration::from_millis(1))
        .with_read_timeout(Duration::from_millis(200));
    let client = BmsClient::new(transport);
    client.set_min_spacing(Duration::from_millis(1));

    let err = client.read_capacity_status().unwrap_err();
    assert!(err.is_timeout(), "expected timeout, got {err:?}");
}

#[test]
fn non_default_address_is_framed_into_requests() {
    let reply = protocol::build_frame(0xD1, 0x07, 0xFF, 0x05, &{
        let mut p = vec![0x02];
        p.extend_from_slice(b"A7");
        p
    })
    .unwrap();
    let server = FakeBms::start(HashMap::from([(0x05, reply)]));
    let client = client_for(&server);
    client.set_address(0x07);

    assert_eq!(client.read_serial_number().unwrap().serial_number, "A7");
    assert_eq!(server.requests()[0][2], 0x07);
}
