use crate::Error;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

#[cfg(feature = "serde")]
use serde::Serialize;

/// Command identifiers (`cmd_lo` bytes). The command class byte (`cmd_hi`)
/// is always [`crate::protocol::COMMAND_HIGH`].
pub mod cmd {
    pub const VOLTAGE: u8 = 0x02;
    pub const CURRENT_STATUS: u8 = 0x03;
    pub const CAPACITY_STATUS: u8 = 0x04;
    pub const SERIAL_NUMBER: u8 = 0x05;
    pub const ALLOW_DISCHARGE: u8 = 0x19;
    pub const DISALLOW_DISCHARGE: u8 = 0x1A;
    pub const ALLOW_CHARGE: u8 = 0x1B;
    pub const DISALLOW_CHARGE: u8 = 0x1C;
}

macro_rules! read_bit {
    ($byte:expr,$position:expr) => {
        ($byte >> $position) & 1 != 0
    };
}

// --- parsing utilities ---

pub fn parse_be_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([data[offset], data[offset + 1]])
}

fn be_u16_or_zero(data: &[u8], offset: usize) -> u16 {
    if offset + 1 < data.len() {
        parse_be_u16(data, offset)
    } else {
        0
    }
}

/// Cell voltages arrive in millivolts.
pub fn millivolts_to_volts(raw: u16) -> f32 {
    raw as f32 / 1000.0
}

/// Pack voltage arrives in 10 mV units.
pub fn centivolts_to_volts(raw: u16) -> f32 {
    raw as f32 / 100.0
}

/// Pack current arrives in 10 mA units.
pub fn centiamps_to_amps(raw: u16) -> f32 {
    raw as f32 / 100.0
}

/// Some current readings arrive in 0.1 A units.
pub fn deciamps_to_amps(raw: u16) -> f32 {
    raw as f32 / 10.0
}

/// Probe temperatures in the voltage frame arrive in 0.1 °C units.
pub fn decicelsius_to_celsius(raw: u16) -> f32 {
    raw as f32 / 10.0
}

/// Byte temperatures are stored with a +40 offset to avoid negative values.
pub fn temperature_from_offset(raw: u8) -> f32 {
    raw as f32 - 40.0
}

/// One row of a tag table: a 1-byte tag mapped to a named field of a fixed
/// byte count.
#[derive(Debug, Clone, Copy)]
pub struct TagSpec {
    pub tag: u8,
    pub name: &'static str,
    pub len: usize,
}

/// A decoded tag value: 1- and 2-byte fields become integers, anything
/// longer is kept raw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagValue {
    U8(u8),
    U16(u16),
    Bytes(Vec<u8>),
}

impl TagValue {
    pub fn as_u16(&self) -> u16 {
        match self {
            TagValue::U8(v) => *v as u16,
            TagValue::U16(v) => *v,
            TagValue::Bytes(_) => 0,
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            TagValue::U8(v) => *v,
            TagValue::U16(v) => *v as u8,
            TagValue::Bytes(_) => 0,
        }
    }
}

/// Parse a tag-length-value section: read a 1-byte tag, look up its field
/// name and byte count, consume that many bytes as the value.
///
/// Unknown tags are skipped with a warning, advancing one byte before
/// rescanning. If an unknown tag actually carries a multi-byte value this
/// resynchronizes incorrectly and the rest of the section misparses; the
/// protocol documentation does not specify unknown-tag widths, so the lenient
/// behavior is deliberate.
pub fn parse_tagged_data(data: &[u8], table: &[TagSpec]) -> HashMap<&'static str, TagValue> {
    let mut result = HashMap::new();
    let mut offset = 0;
    while offset < data.len() {
        let tag = data[offset];
        offset += 1;
        match table.iter().find(|spec| spec.tag == tag) {
            Some(spec) => {
                if offset + spec.len > data.len() {
                    log::warn!("Insufficient data for tag {tag:#04x}");
                    break;
                }
                let value = match spec.len {
                    1 => TagValue::U8(data[offset]),
                    2 => TagValue::U16(parse_be_u16(data, offset)),
                    n => TagValue::Bytes(data[offset..offset + n].to_vec()),
                };
                result.insert(spec.name, value);
                offset += spec.len;
            }
            None => {
                log::warn!("Unknown tag {tag:#04x} at offset {}", offset - 1);
            }
        }
    }
    result
}

fn tag_u16(tags: &HashMap<&'static str, TagValue>, name: &str) -> u16 {
    tags.get(name).map(TagValue::as_u16).unwrap_or(0)
}

fn tag_u8(tags: &HashMap<&'static str, TagValue>, name: &str) -> u8 {
    tags.get(name).map(TagValue::as_u8).unwrap_or(0)
}

#[cfg(feature = "serde")]
fn serialize_hex<S: serde::Serializer>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error> {
    let hex: String = bytes.iter().map(|b| format!("{b:02X}")).collect();
    serializer.serialize_str(&hex)
}

// --- requests ---

/// A request that can be framed and sent to the device.
///
/// Implementors produce their command identifier and their argument bytes
/// (empty for all pure reads in the final protocol revision).
pub trait Request {
    fn command_id(&self) -> u8;
    fn to_payload(&self) -> Vec<u8>;
}

macro_rules! empty_request {
    ($(#[$doc:meta])* $name:ident, $id:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        impl Request for $name {
            fn command_id(&self) -> u8 {
                $id
            }

            fn to_payload(&self) -> Vec<u8> {
                Vec::new()
            }
        }
    };
}

empty_request!(
    /// Read all cell voltages and probe temperatures.
    VoltageRequest,
    cmd::VOLTAGE
);
empty_request!(
    /// Read pack current, protection status and temperatures.
    CurrentStatusRequest,
    cmd::CURRENT_STATUS
);
empty_request!(
    /// Read capacity, state of charge and related status.
    CapacityStatusRequest,
    cmd::CAPACITY_STATUS
);
empty_request!(
    /// Read the device serial number.
    SerialNumberRequest,
    cmd::SERIAL_NUMBER
);
empty_request!(
    /// Open the discharge MOS.
    AllowDischargeRequest,
    cmd::ALLOW_DISCHARGE
);
empty_request!(
    /// Close the discharge MOS.
    DisallowDischargeRequest,
    cmd::DISALLOW_DISCHARGE
);
empty_request!(
    /// Open the charge MOS.
    AllowChargeRequest,
    cmd::ALLOW_CHARGE
);
empty_request!(
    /// Close the charge MOS.
    DisallowChargeRequest,
    cmd::DISALLOW_CHARGE
);

// --- responses ---

/// Round-trip metadata attached by the client after a successful exchange.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ResponseMeta {
    pub requested_at: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
    /// `host:port` of the device server.
    pub endpoint: String,
}

/// Number of temperature probes reported in the voltage frame.
const VOLTAGE_TEMP_PROBES: usize = 3;
/// Probe temperatures plus the software version byte.
const VOLTAGE_TRAILER_LENGTH: usize = VOLTAGE_TEMP_PROBES * 2 + 1;

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct VoltageResponse {
    /// Per-cell voltages in volts.
    pub cell_voltages: Vec<f32>,
    /// Probe temperatures in °C.
    pub probe_temperatures: Vec<f32>,
    pub software_version: u8,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub meta: Option<ResponseMeta>,
}

impl VoltageResponse {
    /// Parse from the full payload including the two echoed command bytes.
    ///
    /// Layout after the command bytes: one big-endian u16 per cell in mV,
    /// then three probe temperatures (u16, 0.1 °C) and a version byte. The
    /// cell count is whatever the remaining length allows.
    pub fn from_payload(payload: &[u8]) -> Result<Self, Error> {
        // 2 cmd bytes + at least one cell + trailer
        let min = 2 + 2 + VOLTAGE_TRAILER_LENGTH;
        if payload.len() < min {
            return Err(Error::PayloadLength {
                command: "voltage",
                expected: min,
                actual: payload.len(),
            });
        }
        let data = &payload[2..];
        let voltage_bytes = data.len() - VOLTAGE_TRAILER_LENGTH;
        if voltage_bytes % 2 != 0 {
            return Err(Error::Parse(format!(
                "voltage payload not word aligned: {} cell bytes",
                voltage_bytes
            )));
        }

        let n_cells = voltage_bytes / 2;
        let mut cell_voltages = Vec::with_capacity(n_cells);
        for i in 0..n_cells {
            cell_voltages.push(millivolts_to_volts(parse_be_u16(data, i * 2)));
        }

        let mut probe_temperatures = Vec::with_capacity(VOLTAGE_TEMP_PROBES);
        for i in 0..VOLTAGE_TEMP_PROBES {
            let raw = parse_be_u16(data, voltage_bytes + i * 2);
            probe_temperatures.push(decicelsius_to_celsius(raw));
        }

        let software_version = data[data.len() - 1];
        log::debug!(
            "Parsed voltage response: {} cells, {} probes",
            n_cells,
            VOLTAGE_TEMP_PROBES
        );
        Ok(Self {
            cell_voltages,
            probe_temperatures,
            software_version,
            meta: None,
        })
    }
}

#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct StatusFlags {
    pub discharge_active: bool,
    pub charge_active: bool,
    pub mos_temp_present: bool,
    pub ambient_temp_present: bool,
}

impl StatusFlags {
    fn from_byte(byte: u8) -> Self {
        Self {
            discharge_active: read_bit!(byte, 0),
            charge_active: read_bit!(byte, 1),
            mos_temp_present: read_bit!(byte, 4),
            ambient_temp_present: read_bit!(byte, 5),
        }
    }
}

#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct OvervoltageProtection {
    pub cell_ov: bool,
    pub pack_ov: bool,
    pub full_charge_protection: bool,
}

impl OvervoltageProtection {
    fn from_byte(byte: u8) -> Self {
        Self {
            cell_ov: read_bit!(byte, 0),
            pack_ov: read_bit!(byte, 1),
            full_charge_protection: read_bit!(byte, 4),
        }
    }
}

#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct UndervoltageProtection {
    pub cell_uv: bool,
    pub pack_uv: bool,
}

impl UndervoltageProtection {
    fn from_byte(byte: u8) -> Self {
        Self {
            cell_uv: read_bit!(byte, 0),
            pack_uv: read_bit!(byte, 1),
        }
    }
}

#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct TemperatureProtection {
    pub charge_temp: bool,
    pub discharge_temp: bool,
    pub mos_over_temp: bool,
    pub high_temp: bool,
    pub low_temp: bool,
}

impl TemperatureProtection {
    fn from_byte(byte: u8) -> Self {
        Self {
            charge_temp: read_bit!(byte, 0),
            discharge_temp: read_bit!(byte, 1),
            mos_over_temp: read_bit!(byte, 2),
            high_temp: read_bit!(byte, 4),
            low_temp: read_bit!(byte, 5),
        }
    }
}

#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct GeneralProtection {
    pub discharge_short_circuit: bool,
    pub discharge_oc: bool,
    pub charge_oc: bool,
    pub ambient_high_temp: bool,
    pub ambient_low_temp: bool,
}

impl GeneralProtection {
    fn from_byte(byte: u8) -> Self {
        Self {
            discharge_short_circuit: read_bit!(byte, 0),
            discharge_oc: read_bit!(byte, 1),
            charge_oc: read_bit!(byte, 2),
            ambient_high_temp: read_bit!(byte, 4),
            ambient_low_temp: read_bit!(byte, 5),
        }
    }
}

#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct MosState {
    pub discharge_mos_on: bool,
    pub charge_mos_on: bool,
}

impl MosState {
    fn from_byte(byte: u8) -> Self {
        Self {
            discharge_mos_on: read_bit!(byte, 1),
            charge_mos_on: read_bit!(byte, 2),
        }
    }
}

#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct FailureStatus {
    pub temp_acquisition_fail: bool,
    pub voltage_acquisition_fail: bool,
    pub discharge_mos_fail: bool,
    pub charge_mos_fail: bool,
}

impl FailureStatus {
    fn from_byte(byte: u8) -> Self {
        Self {
            temp_acquisition_fail: read_bit!(byte, 0),
            voltage_acquisition_fail: read_bit!(byte, 1),
            discharge_mos_fail: read_bit!(byte, 2),
            charge_mos_fail: read_bit!(byte, 3),
        }
    }
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct CurrentStatusResponse {
    pub status: StatusFlags,
    /// Pack current in amperes.
    pub current: f32,
    pub overvoltage_protection: OvervoltageProtection,
    pub undervoltage_protection: UndervoltageProtection,
    pub temperature_protection: TemperatureProtection,
    pub general_protection: GeneralProtection,
    pub temp_probe_count: u8,
    /// Probe temperatures in °C.
    pub temperatures: Vec<f32>,
    pub software_version: u8,
    pub mos_state: MosState,
    pub failure_status: FailureStatus,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub meta: Option<ResponseMeta>,
}

impl CurrentStatusResponse {
    /// Fixed fields after the command bytes: status byte, u16 current
    /// (10 mA units), four protection bytes, probe count. Temperature bytes
    /// and the version/MOS/failure tail vary with the probe count; firmware
    /// older than the probe table omits the tail, which then reads as zero.
    pub fn from_payload(payload: &[u8]) -> Result<Self, Error> {
        const MIN: usize = 2 + 8;
        if payload.len() < MIN {
            return Err(Error::PayloadLength {
                command: "current status",
                expected: MIN,
                actual: payload.len(),
            });
        }
        let data = &payload[2..];

        let status = StatusFlags::from_byte(data[0]);
        let current = centiamps_to_amps(parse_be_u16(data, 1));
        let overvoltage_protection = OvervoltageProtection::from_byte(data[3]);
        let undervoltage_protection = UndervoltageProtection::from_byte(data[4]);
        let temperature_protection = TemperatureProtection::from_byte(data[5]);
        let general_protection = GeneralProtection::from_byte(data[6]);
        let temp_probe_count = data[7];

        let mut offset = 8;
        let mut temperatures = Vec::with_capacity(temp_probe_count as usize);
        for _ in 0..temp_probe_count {
            if offset >= data.len() {
                break;
            }
            temperatures.push(temperature_from_offset(data[offset]));
            offset += 1;
        }

        let software_version = data.get(offset).copied().unwrap_or(0);
        let mos_state = MosState::from_byte(data.get(offset + 1).copied().unwrap_or(0));
        let failure_status = FailureStatus::from_byte(data.get(offset + 2).copied().unwrap_or(0));

        log::debug!(
            "Parsed current status response: current={current:.2}A, {temp_probe_count} probes"
        );
        Ok(Self {
            status,
            current,
            overvoltage_protection,
            undervoltage_protection,
            temperature_protection,
            general_protection,
            temp_probe_count,
            temperatures,
            software_version,
            mos_state,
            failure_status,
            meta: None,
        })
    }
}

/// Tag table of the capacity/status response. Part of the protocol contract.
pub const CAPACITY_TAGS: &[TagSpec] = &[
    TagSpec { tag: 0x01, name: "soc", len: 1 },
    TagSpec { tag: 0x02, name: "cycle_count", len: 2 },
    TagSpec { tag: 0x03, name: "design_capacity_high", len: 2 },
    TagSpec { tag: 0x04, name: "design_capacity_low", len: 2 },
    TagSpec { tag: 0x05, name: "full_charge_capacity_high", len: 2 },
    TagSpec { tag: 0x06, name: "full_charge_capacity_low", len: 2 },
    TagSpec { tag: 0x07, name: "remaining_capacity_high", len: 2 },
    TagSpec { tag: 0x08, name: "remaining_capacity_low", len: 2 },
    TagSpec { tag: 0x09, name: "remaining_discharge_time", len: 2 },
    TagSpec { tag: 0x0A, name: "remaining_charge_time", len: 2 },
    // Two u16 values: current interval, max interval; rest reserved.
    TagSpec { tag: 0x0B, name: "charge_interval", len: 12 },
    TagSpec { tag: 0x0D, name: "hardware_version", len: 1 },
];

/// Length of the tagged sub-section at the start of the capacity data.
const CAPACITY_TAG_SECTION: usize = 30;
/// Offset of the fixed-position fields that follow the tagged section.
const CAPACITY_FIXED_OFFSET: usize = 42;

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct CapacityStatusResponse {
    /// State of charge in percent.
    pub soc: u8,
    pub cycle_count: u16,
    pub design_capacity_high: u16,
    pub design_capacity_low: u16,
    pub full_charge_capacity_high: u16,
    pub full_charge_capacity_low: u16,
    pub remaining_capacity_high: u16,
    pub remaining_capacity_low: u16,
    /// Remaining discharge time in minutes.
    pub remaining_discharge_time: u16,
    /// Remaining charge time in minutes.
    pub remaining_charge_time: u16,
    /// Hours since the last charge.
    pub charge_interval_current: u16,
    /// Maximum observed charge interval in hours.
    pub charge_interval_max: u16,
    /// Pack voltage in volts.
    pub pack_voltage: f32,
    /// Highest cell voltage in volts.
    pub max_cell_voltage: f32,
    /// Lowest cell voltage in volts.
    pub min_cell_voltage: f32,
    pub hardware_version: u8,
    pub scheme_id: u8,
    #[cfg_attr(feature = "serde", serde(serialize_with = "serialize_hex"))]
    pub reserved: Vec<u8>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub meta: Option<ResponseMeta>,
}

impl CapacityStatusResponse {
    /// The first 30 data bytes are a tag-length-value section; fixed-position
    /// fields (pack voltage in 10 mV, max/min cell voltage in mV, versions)
    /// follow from offset 42.
    pub fn from_payload(payload: &[u8]) -> Result<Self, Error> {
        const MIN: usize = 49;
        if payload.len() < MIN {
            return Err(Error::PayloadLength {
                command: "capacity status",
                expected: MIN,
                actual: payload.len(),
            });
        }
        let data = &payload[2..];

        let section = &data[..CAPACITY_TAG_SECTION.min(data.len())];
        let tags = parse_tagged_data(section, CAPACITY_TAGS);

        let interval = match tags.get("charge_interval") {
            Some(TagValue::Bytes(bytes)) => bytes.clone(),
            _ => vec![0; 12],
        };
        let charge_interval_current = be_u16_or_zero(&interval, 0);
        let charge_interval_max = be_u16_or_zero(&interval, 2);

        let mut offset = CAPACITY_FIXED_OFFSET;
        let pack_voltage = centivolts_to_volts(be_u16_or_zero(data, offset));
        offset += 2;
        let max_cell_voltage = millivolts_to_volts(be_u16_or_zero(data, offset));
        offset += 2;
        let min_cell_voltage = millivolts_to_volts(be_u16_or_zero(data, offset));
        offset += 2;
        // Hardware version repeats here; the tagged value wins.
        offset += 1;
        let scheme_id = data.get(offset).copied().unwrap_or(0);
        offset += 1;
        let reserved = if offset + 3 <= data.len() {
            data[offset..offset + 3].to_vec()
        } else {
            vec![0; 3]
        };

        let soc = tag_u8(&tags, "soc");
        log::debug!("Parsed capacity status response: SOC={soc}%, pack_voltage={pack_voltage:.2}V");
        Ok(Self {
            soc,
            cycle_count: tag_u16(&tags, "cycle_count"),
            design_capacity_high: tag_u16(&tags, "design_capacity_high"),
            design_capacity_low: tag_u16(&tags, "design_capacity_low"),
            full_charge_capacity_high: tag_u16(&tags, "full_charge_capacity_high"),
            full_charge_capacity_low: tag_u16(&tags, "full_charge_capacity_low"),
            remaining_capacity_high: tag_u16(&tags, "remaining_capacity_high"),
            remaining_capacity_low: tag_u16(&tags, "remaining_capacity_low"),
            remaining_discharge_time: tag_u16(&tags, "remaining_discharge_time"),
            remaining_charge_time: tag_u16(&tags, "remaining_charge_time"),
            charge_interval_current,
            charge_interval_max,
            pack_voltage,
            max_cell_voltage,
            min_cell_voltage,
            hardware_version: tag_u8(&tags, "hardware_version"),
            scheme_id,
            reserved,
            meta: None,
        })
    }
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct SerialNumberResponse {
    pub serial_number: String,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub meta: Option<ResponseMeta>,
}

impl SerialNumberResponse {
    /// One ASCII length byte follows the command bytes, then exactly that
    /// many identifier bytes.
    pub fn from_payload(payload: &[u8]) -> Result<Self, Error> {
        const MIN: usize = 3;
        if payload.len() < MIN {
            return Err(Error::PayloadLength {
                command: "serial number",
                expected: MIN,
                actual: payload.len(),
            });
        }
        let data = &payload[2..];
        let length = data[0] as usize;
        if data.len() < 1 + length {
            return Err(Error::Parse(format!(
                "insufficient data for serial number: expected {}, got {}",
                1 + length,
                data.len()
            )));
        }
        let serial_number = String::from_utf8_lossy(&data[1..1 + length]).into_owned();
        log::debug!("Parsed serial number: {serial_number}");
        Ok(Self {
            serial_number,
            meta: None,
        })
    }
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct MosControlResponse {
    /// The echoed command identifier.
    pub command_id: u8,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub meta: Option<ResponseMeta>,
}

impl MosControlResponse {
    /// MOS control acknowledgments carry no data: the payload is just the
    /// two echoed command bytes. A well-formed acknowledgment frame is the
    /// success signal; there is no status byte.
    pub fn from_payload(payload: &[u8]) -> Result<Self, Error> {
        if payload.len() != 2 {
            return Err(Error::PayloadLength {
                command: "MOS control",
                expected: 2,
                actual: payload.len(),
            });
        }
        Ok(Self {
            command_id: payload[1],
            meta: None,
        })
    }
}

/// A parsed response of any registered command.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum Response {
    Voltage(VoltageResponse),
    CurrentStatus(CurrentStatusResponse),
    CapacityStatus(CapacityStatusResponse),
    SerialNumber(SerialNumberResponse),
    MosControl(MosControlResponse),
}

impl Response {
    pub(crate) fn attach_meta(&mut self, meta: ResponseMeta) {
        match self {
            Response::Voltage(r) => r.meta = Some(meta),
            Response::CurrentStatus(r) => r.meta = Some(meta),
            Response::CapacityStatus(r) => r.meta = Some(meta),
            Response::SerialNumber(r) => r.meta = Some(meta),
            Response::MosControl(r) => r.meta = Some(meta),
        }
    }
}

/// A registered command: identifier plus the parser producing its typed
/// response. The parser receives the full payload including the two echoed
/// command bytes.
pub struct CommandSpec {
    pub id: u8,
    pub name: &'static str,
    pub parse: fn(&[u8]) -> Result<Response, Error>,
}

/// The command registry, constructed at compile time. Every identifier a
/// client call uses must appear here; anything else is rejected before I/O.
pub static COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        id: cmd::VOLTAGE,
        name: "voltage",
        parse: |p| VoltageResponse::from_payload(p).map(Response::Voltage),
    },
    CommandSpec {
        id: cmd::CURRENT_STATUS,
        name: "current status",
        parse: |p| CurrentStatusResponse::from_payload(p).map(Response::CurrentStatus),
    },
    CommandSpec {
        id: cmd::CAPACITY_STATUS,
        name: "capacity status",
        parse: |p| CapacityStatusResponse::from_payload(p).map(Response::CapacityStatus),
    },
    CommandSpec {
        id: cmd::SERIAL_NUMBER,
        name: "serial number",
        parse: |p| SerialNumberResponse::from_payload(p).map(Response::SerialNumber),
    },
    CommandSpec {
        id: cmd::ALLOW_DISCHARGE,
        name: "allow discharge",
        parse: |p| MosControlResponse::from_payload(p).map(Response::MosControl),
    },
    CommandSpec {
        id: cmd::DISALLOW_DISCHARGE,
        name: "disallow discharge",
        parse: |p| MosControlResponse::from_payload(p).map(Response::MosControl),
    },
    CommandSpec {
        id: cmd::ALLOW_CHARGE,
        name: "allow charge",
        parse: |p| MosControlResponse::from_payload(p).map(Response::MosControl),
    },
    CommandSpec {
        id: cmd::DISALLOW_CHARGE,
        name: "disallow charge",
        parse: |p| MosControlResponse::from_payload(p).map(Response::MosControl),
    },
];

/// Resolve a command identifier against the registry.
pub fn lookup(id: u8) -> Option<&'static CommandSpec> {
    COMMANDS.iter().find(|spec| spec.id == id)
}
