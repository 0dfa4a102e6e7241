//! Raw bus word decoding.
//!
//! A hardware sequencer samples the WPC power-driver bus on every strobe and
//! pushes one word per sample into its receive queue. The sequencer inverts
//! the lines before pushing (the bus is active low), so everything in this
//! module works on already-inverted data: a set bit means an asserted line.
//!
//! Word layout, as delivered by the sampler:
//!
//! ```text
//! bit 15    : zero-cross indicator (revision dependent, see [`Revision`])
//! bits 14-8 : address strobe lines, one line per target register
//! bits  7-0 : data byte
//! ```

/// Address code for the triac (GI dimming) register.
pub const ADDR_TRIACS: u8 = 0x01;
/// Address code for solenoid bank 1.
pub const ADDR_SOL1: u8 = 0x02;
/// Address code for solenoid bank 3 (the strobe lines are wired in pin
/// order, which is not bank order).
pub const ADDR_SOL3: u8 = 0x04;
/// Address code for solenoid bank 4.
pub const ADDR_SOL4: u8 = 0x08;
/// Address code for solenoid bank 2.
pub const ADDR_SOL2: u8 = 0x10;
/// Address code for the lamp column select register.
pub const ADDR_LCOL: u8 = 0x20;
/// Address code for the lamp row data register.
pub const ADDR_LROW: u8 = 0x40;

/// Sentinel stored in the column lookup table for bytes that are not one-hot.
const COL_INVALID: u8 = 0xFF;

/// Hardware sampler revision.
///
/// Observed sampler builds disagree on which bit of the raw word carries the
/// zero-cross indicator, so the bit assignment is selectable instead of
/// hard-coded.
///
/// - [`Revision::A`] delivers 15-bit words with no indicator bit; zero
///   crossings arrive exclusively through the dedicated marker queue.
/// - [`Revision::B`] additionally flags the crossing in bit 15 of the data
///   word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Revision {
    /// 15-bit data words, dedicated zero-cross queue only.
    #[default]
    A,
    /// Bit 15 of the data word carries the zero-cross indicator.
    B,
}

/// One register address on the power-driver bus.
///
/// Each address corresponds to one strobe line, so valid codes are one-hot.
/// Code 0 (no strobe captured) and multi-bit codes are bus noise and decode
/// to `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusAddress {
    /// Triac firing state for the general-illumination strings.
    Triacs,
    /// Solenoid bank 1.
    Sol1,
    /// Solenoid bank 2.
    Sol2,
    /// Solenoid bank 3.
    Sol3,
    /// Solenoid bank 4.
    Sol4,
    /// Lamp matrix column select (one-hot data byte).
    LampCol,
    /// Lamp matrix row data for the currently selected column.
    LampRow,
}

impl BusAddress {
    /// Map a raw address code to a bus address.
    ///
    /// Returns `None` for code 0 and for any code that is not exactly one of
    /// the seven known strobe lines.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            ADDR_TRIACS => Some(BusAddress::Triacs),
            ADDR_SOL1 => Some(BusAddress::Sol1),
            ADDR_SOL2 => Some(BusAddress::Sol2),
            ADDR_SOL3 => Some(BusAddress::Sol3),
            ADDR_SOL4 => Some(BusAddress::Sol4),
            ADDR_LCOL => Some(BusAddress::LampCol),
            ADDR_LROW => Some(BusAddress::LampRow),
            _ => None,
        }
    }

    /// Raw address code for this address.
    pub fn code(self) -> u8 {
        match self {
            BusAddress::Triacs => ADDR_TRIACS,
            BusAddress::Sol1 => ADDR_SOL1,
            BusAddress::Sol2 => ADDR_SOL2,
            BusAddress::Sol3 => ADDR_SOL3,
            BusAddress::Sol4 => ADDR_SOL4,
            BusAddress::LampCol => ADDR_LCOL,
            BusAddress::LampRow => ADDR_LROW,
        }
    }

    /// Solenoid bank index (0-3) for the four solenoid addresses.
    pub fn solenoid_bank(self) -> Option<usize> {
        match self {
            BusAddress::Sol1 => Some(0),
            BusAddress::Sol2 => Some(1),
            BusAddress::Sol3 => Some(2),
            BusAddress::Sol4 => Some(3),
            _ => None,
        }
    }
}

/// One decoded bus sample.
///
/// `address` is the raw 7-bit code; it is kept raw rather than as a
/// [`BusAddress`] so that invalid codes survive decoding and can be counted
/// by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusWord {
    /// Raw address code (bits 14-8 of the raw word).
    pub address: u8,
    /// Data byte (bits 7-0 of the raw word).
    pub data: u8,
    /// Zero-cross indicator, always `false` under [`Revision::A`].
    pub zero_cross: bool,
}

impl BusWord {
    /// Decode a raw sampler word.
    pub fn decode(raw: u16, revision: Revision) -> Self {
        BusWord {
            address: ((raw >> 8) & 0x7F) as u8,
            data: (raw & 0xFF) as u8,
            zero_cross: revision == Revision::B && raw & 0x8000 != 0,
        }
    }

    /// Build a raw sampler word from an address and data byte.
    ///
    /// Used by tests and the replay/simulation tools to synthesize bus
    /// traffic; real words come from the hardware sequencer.
    pub fn encode(address: BusAddress, data: u8) -> u16 {
        ((address.code() as u16) << 8) | data as u16
    }
}

// Table lookup instead of a bit scan per event, same trick the original
// firmware used on the hot path.
const COL_LOOKUP: [u8; 256] = build_col_lookup();

const fn build_col_lookup() -> [u8; 256] {
    let mut table = [COL_INVALID; 256];
    let mut i = 0usize;
    while i < 8 {
        table[1usize << i] = i as u8;
        i += 1;
    }
    table
}

/// Map a one-hot column select byte to a column index 0-7.
///
/// Returns `None` when the byte has zero or more than one bit set.
pub fn column_index(data: u8) -> Option<usize> {
    match COL_LOOKUP[data as usize] {
        COL_INVALID => None,
        col => Some(col as usize),
    }
}
