//! Wire-level encode/decode for the Mitsubishi MELSEC-MC protocol: device
//! addressing, end codes, and the five request/response frame formats
//! (1E, 3E binary, 3E ASCII, 4E binary, 4E ASCII).

pub mod device;
pub mod end_code;
pub mod frame;

pub use device::{decode_device_field, encode_device_field, DeviceKind, DeviceType};
pub use end_code::EndCode;
pub use frame::{
    build_request, build_response, command, parse_request, parse_response, sub_command,
    FrameKind, McError, ParsedRequest,
};
