use crate::Error;

/// Fixed frame start sentinel.
pub const START_BYTE: u8 = 0xEA;
/// Fixed frame terminator.
pub const END_BYTE: u8 = 0xF5;
/// Device family byte for the Orion 1000.
pub const PRODUCT_ID_DEFAULT: u8 = 0xD1;
/// Command-class marker: every read/control command carries this `cmd_hi`.
pub const COMMAND_HIGH: u8 = 0xFF;
/// Default target device address.
pub const ADDRESS_DEFAULT: u8 = 0x01;

/// Bytes of frame overhead before the `cmd_hi` byte: start, product id,
/// address, data length.
pub const HEADER_LENGTH: usize = 4;
/// Smallest possible frame: header + cmd bytes + checksum + end.
pub const MIN_FRAME_LENGTH: usize = 8;
/// `data_len` counts cmd bytes + payload + checksum + end, so it can never
/// be below 4.
pub const MIN_DATA_LENGTH: u8 = 4;
/// Largest payload that still fits the one-byte `data_len` field with room
/// to spare for firmware growth.
pub const MAX_PAYLOAD_LENGTH: usize = 250;

/// XOR checksum over the covered byte range (`data_len` through the end of
/// the payload). Encode and decode must use this identical range.
pub fn xor_checksum(data: &[u8]) -> u8 {
    data.iter().fold(0, |acc, b| acc ^ b)
}

/// One complete framed message on the wire.
///
/// Constructed transiently per request/response and never mutated after
/// creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub start: u8,
    pub product_id: u8,
    pub address: u8,
    pub data_len: u8,
    pub cmd_hi: u8,
    pub cmd_lo: u8,
    pub payload: Vec<u8>,
    pub checksum: u8,
    pub end: u8,
}

/// Encode a request frame.
///
/// `data_len` covers the two command bytes, the payload, the checksum and
/// the end byte. The checksum covers `data_len` through the payload,
/// excluding start, product id and address.
pub fn build_frame(
    product_id: u8,
    address: u8,
    cmd_hi: u8,
    cmd_lo: u8,
    payload: &[u8],
) -> Result<Vec<u8>, Error> {
    if payload.len() > MAX_PAYLOAD_LENGTH {
        return Err(Error::Framing(format!(
            "payload too large: {} > {}",
            payload.len(),
            MAX_PAYLOAD_LENGTH
        )));
    }
    let data_len = (2 + payload.len() + 2) as u8;

    let mut frame = Vec::with_capacity(HEADER_LENGTH + data_len as usize);
    frame.push(START_BYTE);
    frame.push(product_id);
    frame.push(address);
    frame.push(data_len);
    frame.push(cmd_hi);
    frame.push(cmd_lo);
    frame.extend_from_slice(payload);

    let checksum = xor_checksum(&frame[3..]);
    frame.push(checksum);
    frame.push(END_BYTE);
    Ok(frame)
}

/// Decode and validate one frame.
///
/// Framing failures (shape) and checksum failures (corruption) are distinct
/// error kinds so callers can tell a protocol misunderstanding from damaged
/// bytes.
pub fn decode(raw: &[u8]) -> Result<Frame, Error> {
    if raw.len() < MIN_FRAME_LENGTH {
        log::warn!("Frame too short - received={} bytes", raw.len());
        return Err(Error::Framing(format!("frame too short: {} bytes", raw.len())));
    }
    if raw[0] != START_BYTE {
        log::warn!("Invalid start byte - received={:#04x}", raw[0]);
        return Err(Error::Framing(format!("invalid start byte: {:#04x}", raw[0])));
    }

    let data_len = raw[3];
    if data_len < MIN_DATA_LENGTH {
        return Err(Error::Framing(format!("data length too small: {data_len}")));
    }
    let expected_len = HEADER_LENGTH + data_len as usize;
    if raw.len() != expected_len {
        log::warn!(
            "Invalid frame length - received={} expected={}",
            raw.len(),
            expected_len
        );
        return Err(Error::Framing(format!(
            "invalid frame length: {} != {}",
            raw.len(),
            expected_len
        )));
    }

    let end = raw[expected_len - 1];
    if end != END_BYTE {
        log::warn!("Invalid end byte - received={end:#04x}");
        return Err(Error::Framing(format!("invalid end byte: {end:#04x}")));
    }

    // Same covered range as build_frame: data_len through payload.
    let checksum = raw[expected_len - 2];
    let calculated = xor_checksum(&raw[3..expected_len - 2]);
    if checksum != calculated {
        log::warn!(
            "Invalid checksum - calculated={calculated:02X?} received={checksum:02X?} frame={raw:02X?}"
        );
        return Err(Error::Checksum {
            calculated,
            received: checksum,
        });
    }

    Ok(Frame {
        start: raw[0],
        product_id: raw[1],
        address: raw[2],
        data_len,
        cmd_hi: raw[4],
        cmd_lo: raw[5],
        payload: raw[6..expected_len - 2].to_vec(),
        checksum,
        end,
    })
}
