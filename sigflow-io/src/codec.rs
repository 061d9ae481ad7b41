//! Sample-format conversion shared by the WAV and raw-IQ blocks.
//!
//! `decode_*` turns a wire-level integer into `[-1.0, 1.0]`-ish float via
//! `(value - offset) / scale`; `encode_*` is the reverse, rounding and
//! saturating to the integer range.

pub fn decode_u8(byte: u8) -> f32 {
    (byte as f32 - 127.5) / 127.5
}

pub fn encode_u8(x: f32) -> u8 {
    ((x as f64) * 127.5 + 127.5).round().clamp(0.0, 255.0) as u8
}

pub fn decode_i8(byte: i8) -> f32 {
    byte as f32 / 127.5
}

pub fn encode_i8(x: f32) -> i8 {
    ((x as f64) * 127.5).round().clamp(i8::MIN as f64, i8::MAX as f64) as i8
}

pub fn decode_u16(v: u16) -> f32 {
    (v as f32 - 32767.5) / 32767.5
}

pub fn encode_u16(x: f32) -> u16 {
    ((x as f64) * 32767.5 + 32767.5).round().clamp(0.0, 65535.0) as u16
}

pub fn decode_i16(v: i16) -> f32 {
    v as f32 / 32767.5
}

pub fn encode_i16(x: f32) -> i16 {
    ((x as f64) * 32767.5).round().clamp(i16::MIN as f64, i16::MAX as f64) as i16
}

pub fn decode_u32(v: u32) -> f32 {
    ((v as f64 - 2_147_483_647.5) / 2_147_483_647.5) as f32
}

pub fn encode_u32(x: f32) -> u32 {
    ((x as f64) * 2_147_483_647.5 + 2_147_483_647.5).round().clamp(0.0, u32::MAX as f64) as u32
}

pub fn decode_i32(v: i32) -> f32 {
    (v as f64 / 2_147_483_647.5) as f32
}

pub fn encode_i32(x: f32) -> i32 {
    ((x as f64) * 2_147_483_647.5).round().clamp(i32::MIN as f64, i32::MAX as f64) as i32
}
