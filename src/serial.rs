//! USB serial number derived from the factory-programmed unique device ID.
//!
//! The serial number lives in a USB string descriptor: a two byte header followed by
//! twelve UTF-16LE characters. The first eight characters carry `id0 + id2` and the
//! last four the top half of `id1`, all as uppercase hex. A combined identifier of
//! zero means the ID could not be read, in which case the default string is kept.

/// Size of the serial number string descriptor in bytes.
pub const SERIAL_DESCRIPTOR_LEN: usize = 26;
/// Number of characters in the serial number.
pub const SERIAL_CHARS: usize = (SERIAL_DESCRIPTOR_LEN - 2) / 2;

const USB_STRING_DESCRIPTOR_TYPE: u8 = 0x03;

const COMBINED_OFFSET: usize = 2;
const COMBINED_DIGITS: usize = 8;
const ID1_OFFSET: usize = 18;
const ID1_DIGITS: usize = 4;

/// The three 32-bit words of the device unique ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(firmware_log, derive(defmt::Format))]
pub struct UniqueId {
    pub words: [u32; 3],
}

impl UniqueId {
    pub const fn new(id0: u32, id1: u32, id2: u32) -> Self {
        Self { words: [id0, id1, id2] }
    }

    /// Build from the 96-bit ID as it sits in memory (little-endian words).
    pub fn from_bytes(bytes: &[u8; 12]) -> Self {
        let word = |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
        Self::new(word(0), word(4), word(8))
    }

    /// `id0 + id2`, the value encoded into the first eight characters.
    pub const fn combined(&self) -> u32 {
        self.words[0].wrapping_add(self.words[2])
    }
}

/// Provider of the unique ID, so the encoder never touches memory-mapped I/O itself.
pub trait UniqueIdSource {
    fn unique_id(&self) -> UniqueId;
}

impl UniqueIdSource for UniqueId {
    fn unique_id(&self) -> UniqueId {
        *self
    }
}

/// Serial number string descriptor handed to the USB descriptor layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialNumberString {
    descriptor: [u8; SERIAL_DESCRIPTOR_LEN],
    derived: bool,
}

impl SerialNumberString {
    /// Descriptor holding `default` (ASCII, truncated to [`SERIAL_CHARS`]).
    pub const fn with_default(default: &[u8]) -> Self {
        let mut descriptor = [0u8; SERIAL_DESCRIPTOR_LEN];
        descriptor[0] = SERIAL_DESCRIPTOR_LEN as u8;
        descriptor[1] = USB_STRING_DESCRIPTOR_TYPE;

        let mut i = 0;
        while i < default.len() && i < SERIAL_CHARS {
            descriptor[2 + 2 * i] = default[i];
            i += 1;
        }

        Self {
            descriptor,
            derived: false,
        }
    }

    /// Raw descriptor bytes.
    pub fn as_bytes(&self) -> &[u8; SERIAL_DESCRIPTOR_LEN] {
        &self.descriptor
    }

    /// Whether the serial number has been derived from the unique ID this boot.
    pub fn is_derived(&self) -> bool {
        self.derived
    }

    /// Narrow the descriptor characters into `out` and return them as a string,
    /// stopping at the first NUL.
    pub fn to_ascii<'b>(&self, out: &'b mut [u8; SERIAL_CHARS]) -> &'b str {
        let mut len = 0;
        for (dst, wide) in out.iter_mut().zip(self.descriptor[2..].chunks_exact(2)) {
            if wide[0] == 0 || wide[1] != 0 {
                break;
            }
            *dst = wide[0];
            len += 1;
        }
        core::str::from_utf8(&out[..len]).unwrap_or("")
    }
}

impl Default for SerialNumberString {
    fn default() -> Self {
        Self::with_default(b"STM32")
    }
}

/// Write `digits` nibbles of `value`, most significant first, as wide hex characters.
///
/// Each character takes a two byte slot: the ASCII digit, then a zero byte. Slots
/// beyond the end of `out` are not written.
pub fn encode_wide_hex(mut value: u32, out: &mut [u8], digits: usize) {
    for slot in out.chunks_exact_mut(2).take(digits) {
        slot[0] = hex_digit((value >> 28) as u8);
        slot[1] = 0;
        value <<= 4;
    }
}

const fn hex_digit(nibble: u8) -> u8 {
    if nibble < 0xA {
        b'0' + nibble
    } else {
        b'A' + nibble - 10
    }
}

/// Derive the serial number from `source` into `serial`.
///
/// Returns `true` if the descriptor was written. Nothing is written when `id0 + id2`
/// is zero, or when the serial number was already derived.
pub fn compute_serial_number(source: &impl UniqueIdSource, serial: &mut SerialNumberString) -> bool {
    if serial.derived {
        return false;
    }

    let id = source.unique_id();
    let combined = id.combined();
    if combined == 0 {
        warn!("Unique ID unreadable, keeping default serial number");
        return false;
    }

    encode_wide_hex(combined, &mut serial.descriptor[COMBINED_OFFSET..ID1_OFFSET], COMBINED_DIGITS);
    encode_wide_hex(id.words[1], &mut serial.descriptor[ID1_OFFSET..], ID1_DIGITS);
    serial.derived = true;

    info!("Serial number derived: id0+id2 {:08x}, id1 {:08x}", combined, id.words[1]);
    true
}
