//! Raspberry Pi board revision table.
//!
//! Maps the `Revision` code from `/proc/cpuinfo` to a model label, the
//! number of pins on the GPIO header, and the BCM GPIO lines that header
//! exposes. Codes missing from the table resolve to [`UNSUPPORTED`].

/// Bumped whenever rows are added or changed.
pub const TABLE_VERSION: u32 = 3;

/// BCM lines on the original 26-pin header (Model B rev 1).
const HEADER_26_REV1: &[u8] = &[0, 1, 4, 7, 8, 9, 10, 11, 14, 15, 17, 18, 21, 22, 23, 24, 25];

/// BCM lines on the 26-pin header from Model B rev 2 onwards.
const HEADER_26_REV2: &[u8] = &[2, 3, 4, 7, 8, 9, 10, 11, 14, 15, 17, 18, 22, 23, 24, 25, 27];

/// BCM lines on the 40-pin header.
const HEADER_40: &[u8] = &[
    2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26,
    27,
];

/// One row of the revision table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardRevision {
    pub model: &'static str,
    pub pin_count: u8,
    pub gpio_lines: &'static [u8],
}

/// Placeholder for revisions the table does not know.
pub const UNSUPPORTED: BoardRevision = BoardRevision {
    model: "not supported",
    pin_count: 0,
    gpio_lines: &[],
};

const fn board(model: &'static str, pin_count: u8, gpio_lines: &'static [u8]) -> BoardRevision {
    BoardRevision {
        model,
        pin_count,
        gpio_lines,
    }
}

const MODEL_B_REV1: BoardRevision = board("Model B Rev 1", 26, HEADER_26_REV1);
const MODEL_B_REV2: BoardRevision = board("Model B Rev 2", 26, HEADER_26_REV2);
const MODEL_A: BoardRevision = board("Model A", 26, HEADER_26_REV2);
const MODEL_B_PLUS: BoardRevision = board("Model B+", 40, HEADER_40);
const MODEL_A_PLUS: BoardRevision = board("Model A+", 40, HEADER_40);
const PI2_B: BoardRevision = board("Pi 2 Model B", 40, HEADER_40);
const PI3_B: BoardRevision = board("Pi 3 Model B", 40, HEADER_40);
const PI3_B_PLUS: BoardRevision = board("Pi 3 Model B+", 40, HEADER_40);
const PI3_A_PLUS: BoardRevision = board("Pi 3 Model A+", 40, HEADER_40);
const PI4_B: BoardRevision = board("Pi 4 Model B", 40, HEADER_40);
const PI400: BoardRevision = board("Pi 400", 40, HEADER_40);
const PI5: BoardRevision = board("Pi 5", 40, HEADER_40);
const ZERO: BoardRevision = board("Pi Zero", 40, HEADER_40);
const ZERO_W: BoardRevision = board("Pi Zero W", 40, HEADER_40);
const ZERO_2_W: BoardRevision = board("Pi Zero 2 W", 40, HEADER_40);

/// Revision code → board. Codes are lowercase hex without the over-voltage
/// prefix.
static TABLE: &[(&str, BoardRevision)] = &[
    ("0002", MODEL_B_REV1),
    ("0003", MODEL_B_REV1),
    ("0004", MODEL_B_REV2),
    ("0005", MODEL_B_REV2),
    ("0006", MODEL_B_REV2),
    ("0007", MODEL_A),
    ("0008", MODEL_A),
    ("0009", MODEL_A),
    ("000d", MODEL_B_REV2),
    ("000e", MODEL_B_REV2),
    ("000f", MODEL_B_REV2),
    ("0010", MODEL_B_PLUS),
    ("0012", MODEL_A_PLUS),
    ("0013", MODEL_B_PLUS),
    ("0015", MODEL_A_PLUS),
    ("900021", MODEL_A_PLUS),
    ("900032", MODEL_B_PLUS),
    ("900092", ZERO),
    ("900093", ZERO),
    ("920093", ZERO),
    ("9000c1", ZERO_W),
    ("902120", ZERO_2_W),
    ("a01040", PI2_B),
    ("a01041", PI2_B),
    ("a21041", PI2_B),
    ("a22042", PI2_B),
    ("a02082", PI3_B),
    ("a22082", PI3_B),
    ("a32082", PI3_B),
    ("a52082", PI3_B),
    ("a22083", PI3_B),
    ("a020d3", PI3_B_PLUS),
    ("a020d4", PI3_B_PLUS),
    ("9020e0", PI3_A_PLUS),
    ("9020e1", PI3_A_PLUS),
    ("a03111", PI4_B),
    ("b03111", PI4_B),
    ("b03112", PI4_B),
    ("b03114", PI4_B),
    ("b03115", PI4_B),
    ("c03111", PI4_B),
    ("c03112", PI4_B),
    ("c03114", PI4_B),
    ("c03115", PI4_B),
    ("d03114", PI4_B),
    ("d03115", PI4_B),
    ("c03130", PI400),
    ("b04170", PI5),
    ("c04170", PI5),
    ("d04170", PI5),
];

/// Bit set in new-style (six-digit) revision codes.
const NEW_STYLE: u32 = 1 << 23;

/// Normalises a raw `Revision` value.
///
/// Lowercases and trims, then drops the warranty bits: old four-digit codes
/// gain `0x1000000` once the board has been over-volted (`1000002` → `0002`),
/// new-style codes gain bit 25 (`2a02082` → `a02082`). Values that are not
/// hex are returned as given.
pub fn normalize(raw: &str) -> String {
    let code = raw.trim().to_ascii_lowercase();
    match u32::from_str_radix(&code, 16) {
        Ok(value) if value & NEW_STYLE != 0 => format!("{:06x}", value & 0x00ff_ffff),
        Ok(value) => format!("{:04x}", value & 0xffff),
        Err(_) => code,
    }
}

/// Looks up a revision code, falling back to [`UNSUPPORTED`].
pub fn lookup(raw: &str) -> BoardRevision {
    let code = normalize(raw);
    TABLE
        .iter()
        .find(|(rev, _)| *rev == code)
        .map(|(_, board)| *board)
        .unwrap_or(UNSUPPORTED)
}
