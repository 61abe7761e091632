use crate::commands::{
    lookup, AllowChargeRequest, AllowDischargeRequest, CapacityStatusRequest,
    CapacityStatusResponse, CurrentStatusRequest, CurrentStatusResponse, DisallowChargeRequest,
    DisallowDischargeRequest, MosControlResponse, Request, Response, ResponseMeta,
    SerialNumberRequest, SerialNumberResponse, VoltageRequest, VoltageResponse,
};
use crate::protocol::{self, ADDRESS_DEFAULT, COMMAND_HIGH, PRODUCT_ID_DEFAULT};
use crate::transport::TcpTransport;
use crate::Error;
use chrono::Utc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Minimum spacing between consecutive requests. The battery drops frames
/// that arrive while it is still answering the previous one.
pub const DEFAULT_MIN_SPACING: Duration = Duration::from_millis(100);

struct Inner {
    transport: TcpTransport,
    product_id: u8,
    address: u8,
    min_spacing: Duration,
    last_request: Option<Instant>,
}

/// High-level client: frames requests, enforces request spacing, verifies
/// the response echo and hands payloads to the command registry.
///
/// Interior locking makes all methods take `&self`, serializing concurrent
/// callers onto the single underlying connection.
pub struct BmsClient {
    inner: Mutex<Inner>,
}

impl BmsClient {
    pub fn new(transport: TcpTransport) -> Self {
        Self {
            inner: Mutex::new(Inner {
                transport,
                product_id: PRODUCT_ID_DEFAULT,
                address: ADDRESS_DEFAULT,
                min_spacing: DEFAULT_MIN_SPACING,
                last_request: None,
            }),
        }
    }

    /// Target a different device address on a shared bus.
    pub fn set_address(&self, address: u8) {
        self.lock().address = address;
    }

    pub fn set_min_spacing(&self, spacing: Duration) {
        self.lock().min_spacing = spacing;
    }

    /// Drop the connection. The next request reconnects transparently.
    pub fn close(&self) {
        self.lock().transport.force_close();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned mutex means a panic mid-request; the transport
        // reconnects on the next use, so the state is still safe.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Execute one request against the device and parse its typed response.
    ///
    /// The command must be registered; unknown identifiers are rejected
    /// before any I/O happens. On success the response carries
    /// [`ResponseMeta`] with the round-trip timestamps.
    pub fn request(&self, request: &dyn Request) -> Result<Response, Error> {
        let mut inner = self.lock();
        let command_id = request.command_id();
        let spec = lookup(command_id).ok_or(Error::UnsupportedCommand(command_id))?;

        if let Some(last) = inner.last_request {
            let elapsed = last.elapsed();
            if elapsed < inner.min_spacing {
                let wait = inner.min_spacing - elapsed;
                log::trace!("Delaying {}ms before '{}'", wait.as_millis(), spec.name);
                std::thread::sleep(wait);
            }
        }

        let frame = protocol::build_frame(
            inner.product_id,
            inner.address,
            COMMAND_HIGH,
            command_id,
            &request.to_payload(),
        )?;

        let requested_at = Utc::now();
        log::debug!("Sending '{}' command to {}", spec.name, inner.transport.endpoint());
        let raw = inner.transport.send_request(&frame)?;
        let received_at = Utc::now();

        let decoded = protocol::decode(&raw)?;
        let expected = u16::from_be_bytes([COMMAND_HIGH, command_id]);
        let received = u16::from_be_bytes([decoded.cmd_hi, decoded.cmd_lo]);
        if received != expected {
            return Err(Error::ResponseMismatch { expected, received });
        }

        // The registered parsers expect the echoed command bytes up front.
        let mut payload = Vec::with_capacity(2 + decoded.payload.len());
        payload.push(decoded.cmd_hi);
        payload.push(decoded.cmd_lo);
        payload.extend_from_slice(&decoded.payload);

        let mut response = (spec.parse)(&payload)?;
        response.attach_meta(ResponseMeta {
            requested_at,
            received_at,
            endpoint: inner.transport.endpoint(),
        });
        // Only a completed exchange counts for spacing; failures already
        // leave the bus quiet.
        inner.last_request = Some(Instant::now());
        Ok(response)
    }

    pub fn read_voltage_data(&self) -> Result<VoltageResponse, Error> {
        match self.request(&VoltageRequest)? {
            Response::Voltage(r) => Ok(r),
            other => Err(unexpected_variant("voltage", &other)),
        }
    }

    pub fn read_current_status(&self) -> Result<CurrentStatusResponse, Error> {
        match self.request(&CurrentStatusRequest)? {
            Response::CurrentStatus(r) => Ok(r),
            other => Err(unexpected_variant("current status", &other)),
        }
    }

    pub fn read_capacity_status(&self) -> Result<CapacityStatusResponse, Error> {
        match self.request(&CapacityStatusRequest)? {
            Response::CapacityStatus(r) => Ok(r),
            other => Err(unexpected_variant("capacity status", &other)),
        }
    }

    pub fn read_serial_number(&self) -> Result<SerialNumberResponse, Error> {
        match self.request(&SerialNumberRequest)? {
            Response::SerialNumber(r) => Ok(r),
            other => Err(unexpected_variant("serial number", &other)),
        }
    }

    pub fn allow_charge(&self) -> Result<MosControlResponse, Error> {
        self.mos_control(&AllowChargeRequest)
    }

    pub fn disallow_charge(&self) -> Result<MosControlResponse, Error> {
        self.mos_control(&DisallowChargeRequest)
    }

    pub fn allow_discharge(&self) -> Result<MosControlResponse, Error> {
        self.mos_control(&AllowDischargeRequest)
    }

    pub fn disallow_discharge(&self) -> Result<MosControlResponse, Error> {
        self.mos_control(&DisallowDischargeRequest)
    }

    fn mos_control(&self, request: &dyn Request) -> Result<MosControlResponse, Error> {
        match self.request(request)? {
            Response::MosControl(r) => Ok(r),
            other => Err(unexpected_variant("MOS control", &other)),
        }
    }
}

fn unexpected_variant(expected: &str, got: &Response) -> Error {
    Error::Parse(format!(
        "registry returned a non-{expected} response: {got:?}"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::cmd;

    struct RawRequest(u8);

    impl Request for RawRequest {
        fn command_id(&self) -> u8 {
            self.0
        }

        fn to_payload(&self) -> Vec<u8> {
            Vec::new()
        }
    }

    #[test]
    fn unregistered_command_is_rejected_without_io() {
        // Port 9 is unreachable in tests; the registry check must fire first.
        let client = BmsClient::new(TcpTransport::new("127.0.0.1", 9));
        let err = client.request(&RawRequest(0x7E)).unwrap_err();
        assert!(matches!(err, Error::UnsupportedCommand(0x7E)));
    }

    #[test]
    fn registry_covers_all_typed_methods() {
        for id in [
            cmd::VOLTAGE,
            cmd::CURRENT_STATUS,
            cmd::CAPACITY_STATUS,
            cmd::SERIAL_NUMBER,
            cmd::ALLOW_CHARGE,
            cmd::DISALLOW_CHARGE,
            cmd::ALLOW_DISCHARGE,
            cmd::DISALLOW_DISCHARGE,
        ] {
            assert!(lookup(id).is_some());
        }
    }
}
