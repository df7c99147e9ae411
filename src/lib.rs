#![doc = include_str!("../README.md")]
mod builder;
mod error;
pub mod normalize;
pub mod parser;
mod protocol;

pub use builder::*;
pub use error::*;
pub use protocol::*;

/// CCITT-FALSE CRC16 Algorithm
///
/// Uses 0x1021 polynomial with a 0xFFFF initial register, no reflection and no final xor
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _bit in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

/// [`crc16`] rendered the way the BR Code carries it: 4 uppercase hex digits
pub fn crc16_hex(data: &[u8]) -> String {
    format!("{:04X}", crc16(data))
}
