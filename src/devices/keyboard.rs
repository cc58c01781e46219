//! PS/2 scancode set 1 decoding.
//!
//! The keyboard interrupt hands raw scancodes to [`ScancodeDecoder`]; key
//! presses that map to a printable byte are pushed into the console input
//! queue, everything else (releases, modifiers, extended prefixes) only
//! updates decoder state.

const UNSHIFTED: [u8; 0x40] = [
    0, 0x1B, b'1', b'2', b'3', b'4', b'5', b'6', // 0x00
    b'7', b'8', b'9', b'0', b'-', b'=', 0x08, b'\t', // 0x08
    b'q', b'w', b'e', b'r', b't', b'y', b'u', b'i', // 0x10
    b'o', b'p', b'[', b']', b'\n', 0, b'a', b's', // 0x18
    b'd', b'f', b'g', b'h', b'j', b'k', b'l', b';', // 0x20
    b'\'', b'`', 0, b'\\', b'z', b'x', b'c', b'v', // 0x28
    b'b', b'n', b'm', b',', b'.', b'/', 0, b'*', // 0x30
    0, b' ', 0, 0, 0, 0, 0, 0, // 0x38
];

const SHIFTED: [u8; 0x40] = [
    0, 0x1B, b'!', b'@', b'#', b'$', b'%', b'^', // 0x00
    b'&', b'*', b'(', b')', b'_', b'+', 0x08, b'\t', // 0x08
    b'Q', b'W', b'E', b'R', b'T', b'Y', b'U', b'I', // 0x10
    b'O', b'P', b'{', b'}', b'\n', 0, b'A', b'S', // 0x18
    b'D', b'F', b'G', b'H', b'J', b'K', b'L', b':', // 0x20
    b'"', b'~', 0, b'|', b'Z', b'X', b'C', b'V', // 0x28
    b'B', b'N', b'M', b'<', b'>', b'?', 0, b'*', // 0x30
    0, b' ', 0, 0, 0, 0, 0, 0, // 0x38
];

pub struct ScancodeDecoder {
    extended: bool,
    shift: bool,
}

impl ScancodeDecoder {
    pub const fn new() -> Self {
        Self {
            extended: false,
            shift: false,
        }
    }

    /// Feeds one raw scancode; returns the decoded character for printable
    /// key presses.
    pub fn decode(&mut self, scancode: u8) -> Option<char> {
        if scancode == 0xE0 {
            self.extended = true;
            return None;
        }

        let release = scancode & 0x80 != 0;
        let code = scancode & 0x7F;
        let extended = core::mem::replace(&mut self.extended, false);

        // Left/right shift.
        if code == 0x2A || code == 0x36 {
            self.shift = !release;
            return None;
        }
        if release || extended {
            return None;
        }

        let table = if self.shift { &SHIFTED } else { &UNSHIFTED };
        match table.get(code as usize) {
            Some(&b) if b != 0 => Some(b as char),
            _ => None,
        }
    }
}

impl Default for ScancodeDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presses_decode_and_releases_do_not() {
        let mut d = ScancodeDecoder::new();
        assert_eq!(d.decode(0x1E), Some('a'));
        assert_eq!(d.decode(0x9E), None); // release of 'a'
        assert_eq!(d.decode(0x1C), Some('\n'));
    }

    #[test]
    fn shift_is_tracked_across_keys() {
        let mut d = ScancodeDecoder::new();
        assert_eq!(d.decode(0x2A), None); // shift down
        assert_eq!(d.decode(0x1E), Some('A'));
        assert_eq!(d.decode(0x03), Some('@'));
        assert_eq!(d.decode(0xAA), None); // shift up
        assert_eq!(d.decode(0x1E), Some('a'));
    }

    #[test]
    fn extended_sequences_are_swallowed() {
        let mut d = ScancodeDecoder::new();
        assert_eq!(d.decode(0xE0), None);
        assert_eq!(d.decode(0x48), None); // up arrow, not printable
        // Decoding resumes normally afterwards.
        assert_eq!(d.decode(0x10), Some('q'));
    }
}
