//! Translates a decoded MC request into device-store operations and
//! produces the response payload and end code.

use mc_proto::{command, decode_device_field, encode_device_field, sub_command, DeviceKind, EndCode, ParsedRequest};

use crate::device_store::DeviceStore;
use crate::remote_state::RemoteState;

/// Result of dispatching one request: the end code and response payload
/// (empty on failure).
pub struct Dispatched {
    pub end_code: EndCode,
    pub payload: Vec<u8>,
}

impl Dispatched {
    fn ok(payload: Vec<u8>) -> Self {
        Dispatched { end_code: EndCode::Success, payload }
    }

    fn error(end_code: EndCode) -> Self {
        Dispatched { end_code, payload: Vec::new() }
    }
}

/// Dispatch a parsed request against `store`, mutating `remote` for
/// remote-control commands. `cpu_model` is returned verbatim for
/// [`command::CPU_MODEL_READ`].
pub fn dispatch(request: &ParsedRequest, store: &DeviceStore, remote: &RemoteState, cpu_model: &str) -> Dispatched {
    match request.command {
        command::BATCH_READ => batch_read(request, store),
        command::BATCH_WRITE => batch_write(request, store),
        command::RANDOM_READ => random_read(request, store),
        command::RANDOM_WRITE => random_write(request, store),
        command::REMOTE_RUN => {
            remote.run();
            Dispatched::ok(Vec::new())
        }
        command::REMOTE_STOP => {
            remote.stop();
            Dispatched::ok(Vec::new())
        }
        command::REMOTE_PAUSE => {
            remote.pause();
            Dispatched::ok(Vec::new())
        }
        command::REMOTE_RESET => {
            remote.reset();
            Dispatched::ok(Vec::new())
        }
        command::CPU_MODEL_READ => Dispatched::ok(cpu_model_payload(cpu_model)),
        _ => Dispatched::error(EndCode::CommandError),
    }
}

fn cpu_model_payload(cpu_model: &str) -> Vec<u8> {
    // 16-byte fixed model name field followed by a 2-byte model code, as
    // used by real CPU-model-read responses; the code is left at zero since
    // this implementation doesn't model per-model CPU codes.
    let mut name = cpu_model.as_bytes().to_vec();
    name.resize(16, 0x20);
    name.push(0x00);
    name.push(0x00);
    name
}

fn batch_read(request: &ParsedRequest, store: &DeviceStore) -> Dispatched {
    let data = &request.command_data;
    if data.len() < 6 {
        return Dispatched::error(EndCode::CommandError);
    }
    let device_field = [data[0], data[1], data[2], data[3]];
    let Some((device, start)) = decode_device_field(&device_field) else {
        return Dispatched::error(EndCode::DeviceSpecError);
    };
    // A count of 0 means 256 points, per the wire convention.
    let raw_count = u16::from_le_bytes([data[4], data[5]]);
    let count = if raw_count == 0 { 256 } else { raw_count as u32 };

    if request.sub_command == sub_command::BIT {
        if !store.validate_range(device, start, count) {
            return Dispatched::error(EndCode::DeviceRangeError);
        }
        let bits = store.get_bits(device, start, count);
        let mut payload = Vec::with_capacity((count as usize).div_ceil(2));
        for pair in bits.chunks(2) {
            let lo = pair[0] as u8;
            let hi = pair.get(1).copied().unwrap_or(false) as u8;
            payload.push(lo | (hi << 4));
        }
        Dispatched::ok(payload)
    } else if device.is_bit_device() {
        // WORD sub-command against a bit device: pack 16 bits per word.
        let span = count.saturating_mul(16);
        if !store.validate_range(device, start, span) {
            return Dispatched::error(EndCode::DeviceRangeError);
        }
        let mut payload = Vec::with_capacity(count as usize * 2);
        for i in 0..count {
            let word = store.get_bit_as_word(device, start + i * 16);
            payload.extend_from_slice(&word.to_le_bytes());
        }
        Dispatched::ok(payload)
    } else {
        if !store.validate_range(device, start, count) {
            return Dispatched::error(EndCode::DeviceRangeError);
        }
        let words = store.get_words(device, start, count);
        let mut payload = Vec::with_capacity(words.len() * 2);
        for word in words {
            payload.extend_from_slice(&word.to_le_bytes());
        }
        Dispatched::ok(payload)
    }
}

fn batch_write(request: &ParsedRequest, store: &DeviceStore) -> Dispatched {
    let data = &request.command_data;
    if data.len() < 6 {
        return Dispatched::error(EndCode::CommandError);
    }
    let device_field = [data[0], data[1], data[2], data[3]];
    let Some((device, start)) = decode_device_field(&device_field) else {
        return Dispatched::error(EndCode::DeviceSpecError);
    };
    let raw_count = u16::from_le_bytes([data[4], data[5]]);
    let count = if raw_count == 0 { 256 } else { raw_count as u32 };
    let body = &data[6..];

    if request.sub_command == sub_command::BIT {
        if (body.len() as u32) < count.div_ceil(2) {
            return Dispatched::error(EndCode::RequestLengthError);
        }
        if !store.validate_range(device, start, count) {
            return Dispatched::error(EndCode::DeviceRangeError);
        }
        let mut values = Vec::with_capacity(count as usize);
        for i in 0..count {
            let byte = body[(i / 2) as usize];
            let bit = if i % 2 == 0 { byte & 0x0F } else { byte >> 4 };
            values.push(bit != 0);
        }
        match store.set_bits(device, start, &values) {
            Ok(()) => Dispatched::ok(Vec::new()),
            Err(_) => Dispatched::error(EndCode::DeviceRangeError),
        }
    } else if device.is_bit_device() {
        // WORD sub-command against a bit device: 16 bits packed per word.
        if (body.len() as u32) < count * 2 {
            return Dispatched::error(EndCode::RequestLengthError);
        }
        let span = count.saturating_mul(16);
        if !store.validate_range(device, start, span) {
            return Dispatched::error(EndCode::DeviceRangeError);
        }
        for (i, chunk) in body.chunks_exact(2).take(count as usize).enumerate() {
            let word = u16::from_le_bytes([chunk[0], chunk[1]]);
            if store.set_bit_from_word(device, start + i as u32 * 16, word).is_err() {
                return Dispatched::error(EndCode::DeviceRangeError);
            }
        }
        Dispatched::ok(Vec::new())
    } else {
        if (body.len() as u32) < count * 2 {
            return Dispatched::error(EndCode::RequestLengthError);
        }
        if !store.validate_range(device, start, count) {
            return Dispatched::error(EndCode::DeviceRangeError);
        }
        let values: Vec<u16> = body
            .chunks_exact(2)
            .take(count as usize)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        match store.set_words(device, start, &values) {
            Ok(()) => Dispatched::ok(Vec::new()),
            Err(_) => Dispatched::error(EndCode::DeviceRangeError),
        }
    }
}

fn random_read(request: &ParsedRequest, store: &DeviceStore) -> Dispatched {
    let data = &request.command_data;
    if data.len() < 1 {
        return Dispatched::error(EndCode::CommandError);
    }
    let word_count = data[0] as usize;
    let dword_count = data.get(1).copied().unwrap_or(0) as usize;
    let mut pos = 2usize;
    let mut payload = Vec::new();
    for _ in 0..word_count {
        if pos + 4 > data.len() {
            return Dispatched::error(EndCode::RequestLengthError);
        }
        let field = [data[pos], data[pos + 1], data[pos + 2], data[pos + 3]];
        pos += 4;
        let Some((device, address)) = decode_device_field(&field) else {
            return Dispatched::error(EndCode::DeviceSpecError);
        };
        if !store.validate_address(device, address) {
            return Dispatched::error(EndCode::DeviceRangeError);
        }
        let value = match device.kind() {
            DeviceKind::Bit => store.get_bit_as_word(device, address),
            DeviceKind::Word => store.get_word(device, address),
        };
        payload.extend_from_slice(&value.to_le_bytes());
    }
    for _ in 0..dword_count {
        if pos + 4 > data.len() {
            return Dispatched::error(EndCode::RequestLengthError);
        }
        let field = [data[pos], data[pos + 1], data[pos + 2], data[pos + 3]];
        pos += 4;
        let Some((device, address)) = decode_device_field(&field) else {
            return Dispatched::error(EndCode::DeviceSpecError);
        };
        if !store.validate_range(device, address, 2) {
            return Dispatched::error(EndCode::DeviceRangeError);
        }
        let value = store.get_dword(device, address);
        payload.extend_from_slice(&value.to_le_bytes());
    }
    Dispatched::ok(payload)
}

fn random_write(request: &ParsedRequest, store: &DeviceStore) -> Dispatched {
    let data = &request.command_data;
    if data.len() < 2 {
        return Dispatched::error(EndCode::CommandError);
    }
    let word_count = data[0] as usize;
    let dword_count = data[1] as usize;
    let mut pos = 2usize;
    for _ in 0..word_count {
        if pos + 6 > data.len() {
            return Dispatched::error(EndCode::RequestLengthError);
        }
        let field = [data[pos], data[pos + 1], data[pos + 2], data[pos + 3]];
        let value = u16::from_le_bytes([data[pos + 4], data[pos + 5]]);
        pos += 6;
        let Some((device, address)) = decode_device_field(&field) else {
            return Dispatched::error(EndCode::DeviceSpecError);
        };
        let result = match device.kind() {
            DeviceKind::Bit => store.set_bit_from_word(device, address, value),
            DeviceKind::Word => store.set_word(device, address, value),
        };
        if result.is_err() {
            return Dispatched::error(EndCode::DeviceRangeError);
        }
    }
    for _ in 0..dword_count {
        if pos + 8 > data.len() {
            return Dispatched::error(EndCode::RequestLengthError);
        }
        let field = [data[pos], data[pos + 1], data[pos + 2], data[pos + 3]];
        let value = u32::from_le_bytes([data[pos + 4], data[pos + 5], data[pos + 6], data[pos + 7]]);
        pos += 8;
        let Some((device, address)) = decode_device_field(&field) else {
            return Dispatched::error(EndCode::DeviceSpecError);
        };
        if store.set_dword(device, address, value).is_err() {
            return Dispatched::error(EndCode::DeviceRangeError);
        }
    }
    Dispatched::ok(Vec::new())
}

/// Build the request-side command_data for a batch read, for use by clients.
pub fn encode_batch_read_data(device: mc_proto::DeviceType, start: u32, count: u16) -> Vec<u8> {
    let mut out = encode_device_field(device, start).to_vec();
    out.extend_from_slice(&count.to_le_bytes());
    out
}

/// Build the request-side command_data for a batch write of word values.
pub fn encode_batch_write_words(device: mc_proto::DeviceType, start: u32, values: &[u16]) -> Vec<u8> {
    let mut out = encode_device_field(device, start).to_vec();
    out.extend_from_slice(&(values.len() as u16).to_le_bytes());
    for value in values {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device_store::Series;
    use mc_proto::{FrameKind, ParsedRequest};
    use mc_proto::DeviceType;

    fn request(command: u16, sub_command: u16, command_data: Vec<u8>) -> ParsedRequest {
        ParsedRequest {
            frame: FrameKind::ThreeEBinary,
            command,
            sub_command,
            command_data: command_data.into(),
            network_no: 0,
            pc_no: 0xFF,
            serial_no: 0,
        }
    }

    #[test]
    fn batch_write_then_read_round_trips_words() {
        let store = DeviceStore::new(Series::Q);
        let remote = RemoteState::new();
        let write = request(
            command::BATCH_WRITE,
            sub_command::WORD,
            encode_batch_write_words(DeviceType::D, 0, &[10, 20, 30]),
        );
        let result = dispatch(&write, &store, &remote, "Q06UDV");
        assert!(result.end_code.is_success());

        let read = request(command::BATCH_READ, sub_command::WORD, encode_batch_read_data(DeviceType::D, 0, 3));
        let result = dispatch(&read, &store, &remote, "Q06UDV");
        assert!(result.end_code.is_success());
        assert_eq!(result.payload, vec![10, 0, 20, 0, 30, 0]);
    }

    #[test]
    fn batch_write_then_read_packs_bit_device_16_per_word_on_word_subcommand() {
        let store = DeviceStore::new(Series::Q);
        let remote = RemoteState::new();
        // M0..M31 as two words: 0x0001 and 0x8000.
        let write = request(
            command::BATCH_WRITE,
            sub_command::WORD,
            encode_batch_write_words(DeviceType::M, 0, &[0x0001, 0x8000]),
        );
        let result = dispatch(&write, &store, &remote, "Q06UDV");
        assert!(result.end_code.is_success());
        assert!(store.get_bit(DeviceType::M, 0));
        assert!(!store.get_bit(DeviceType::M, 1));
        assert!(store.get_bit(DeviceType::M, 31));

        let read = request(command::BATCH_READ, sub_command::WORD, encode_batch_read_data(DeviceType::M, 0, 2));
        let result = dispatch(&read, &store, &remote, "Q06UDV");
        assert!(result.end_code.is_success());
        assert_eq!(result.payload, vec![0x01, 0x00, 0x00, 0x80]);
    }

    #[test]
    fn batch_read_out_of_range_reports_device_range_error() {
        let store = DeviceStore::new(Series::Q);
        let remote = RemoteState::new();
        let read = request(command::BATCH_READ, sub_command::WORD, encode_batch_read_data(DeviceType::D, 99999, 1));
        let result = dispatch(&read, &store, &remote, "Q06UDV");
        assert_eq!(result.end_code, EndCode::DeviceRangeError);
    }

    #[test]
    fn unknown_command_reports_command_error() {
        let store = DeviceStore::new(Series::Q);
        let remote = RemoteState::new();
        let bogus = request(0xFFFF, 0, Vec::new());
        let result = dispatch(&bogus, &store, &remote, "Q06UDV");
        assert_eq!(result.end_code, EndCode::CommandError);
    }

    #[test]
    fn remote_run_updates_state() {
        let store = DeviceStore::new(Series::Q);
        let remote = RemoteState::new();
        let run = request(command::REMOTE_RUN, 0, Vec::new());
        let result = dispatch(&run, &store, &remote, "Q06UDV");
        assert!(result.end_code.is_success());
        assert!(remote.is_running());
    }
}
