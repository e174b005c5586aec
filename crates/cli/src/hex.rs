//! Intel HEX output for configuration words.
//!
//! PIC hex files use byte addresses, two per program word, low byte first.

use picblink_firmware::ConfigWord;
use std::fmt::Write;

const RECORD_DATA: u8 = 0x00;
const RECORD_EOF: u8 = 0x01;
const RECORD_EXTENDED_LINEAR: u8 = 0x04;

fn record(out: &mut String, address: u16, kind: u8, data: &[u8]) {
    let mut bytes = vec![data.len() as u8, (address >> 8) as u8, address as u8, kind];
    bytes.extend_from_slice(data);
    let sum = bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    bytes.push(sum.wrapping_neg());

    out.push(':');
    for b in bytes {
        let _ = write!(out, "{:02X}", b);
    }
    out.push('\n');
}

/// A complete hex file holding only `word`.
pub fn config_word_hex(word: ConfigWord) -> String {
    let byte_addr = (word.address as u32) * 2;
    let mut out = String::new();
    record(
        &mut out,
        0,
        RECORD_EXTENDED_LINEAR,
        &((byte_addr >> 16) as u16).to_be_bytes(),
    );
    record(
        &mut out,
        byte_addr as u16,
        RECORD_DATA,
        &word.value.to_le_bytes(),
    );
    record(&mut out, 0, RECORD_EOF, &[]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use picblink_firmware::{Pic16f1823, Pic16f628a, Target};

    #[test]
    fn test_pic16f1823_config_hex() {
        let hex = config_word_hex(Pic16f1823::CONFIG);
        assert_eq!(hex, ":020000040001F9\n:02000E00E73FCA\n:00000001FF\n");
    }

    #[test]
    fn test_pic16f628a_config_hex() {
        let hex = config_word_hex(Pic16f628a::CONFIG);
        assert_eq!(hex, ":020000040000FA\n:02400E00783FF9\n:00000001FF\n");
    }
}
