//! Core types used throughout adsdr.

use std::fmt;
use std::str::FromStr;

/// A complex baseband sample.
///
/// Each component is a 12-bit two's-complement value held in a wider
/// signed register, so the meaningful range is `-2048..=2047`. Values are
/// produced by the RX decoder and consumed by the TX encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Sample {
    /// In-phase component.
    pub i: i16,
    /// Quadrature component.
    pub q: i16,
}

impl Sample {
    /// Smallest value representable by the 12-bit converters.
    pub const MIN: i16 = -2048;

    /// Largest value representable by the 12-bit converters.
    pub const MAX: i16 = 2047;

    /// The all-zero sample used to pad TX underruns.
    pub const ZERO: Sample = Sample { i: 0, q: 0 };

    /// Create a new sample from its in-phase and quadrature components.
    pub const fn new(i: i16, q: i16) -> Self {
        Sample { i, q }
    }
}

/// Direction of a sample stream or USB transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Device to host.
    Rx,
    /// Host to device.
    Tx,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Rx => write!(f, "RX"),
            Direction::Tx => write!(f, "TX"),
        }
    }
}

/// Run mode of the transceiver's enable state machine (ENSM).
///
/// The state is owned by the hardware. This library only ever requests
/// the WAIT <-> FDD transitions (see `SetDatapathEn`), but reports
/// whatever mode the chip is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnsmMode {
    /// Transmit only.
    Tx,
    /// Receive only.
    Rx,
    /// Synthesizers running, data paths idle.
    Alert,
    /// Full-duplex streaming.
    Fdd,
    /// Idle, synthesizers powered down.
    Wait,
    /// Low-power sleep.
    Sleep,
    /// Controlled by the ENABLE/TXNRX pins.
    PinCtrl,
    /// Pin-controlled FDD with independent RX/TX enables.
    PinCtrlFddIndep,
}

impl EnsmMode {
    /// Decode the raw mode value reported by the transceiver.
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(EnsmMode::Tx),
            1 => Some(EnsmMode::Rx),
            2 => Some(EnsmMode::Alert),
            3 => Some(EnsmMode::Fdd),
            4 => Some(EnsmMode::Wait),
            5 => Some(EnsmMode::Sleep),
            6 => Some(EnsmMode::PinCtrl),
            7 => Some(EnsmMode::PinCtrlFddIndep),
            _ => None,
        }
    }

    /// The raw mode value understood by the transceiver.
    pub fn as_raw(self) -> u32 {
        match self {
            EnsmMode::Tx => 0,
            EnsmMode::Rx => 1,
            EnsmMode::Alert => 2,
            EnsmMode::Fdd => 3,
            EnsmMode::Wait => 4,
            EnsmMode::Sleep => 5,
            EnsmMode::PinCtrl => 6,
            EnsmMode::PinCtrlFddIndep => 7,
        }
    }
}

impl fmt::Display for EnsmMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EnsmMode::Tx => "TX",
            EnsmMode::Rx => "RX",
            EnsmMode::Alert => "ALERT",
            EnsmMode::Fdd => "FDD",
            EnsmMode::Wait => "WAIT",
            EnsmMode::Sleep => "SLEEP",
            EnsmMode::PinCtrl => "PINCTRL",
            EnsmMode::PinCtrlFddIndep => "PINCTRL_FDD_INDEP",
        };
        write!(f, "{s}")
    }
}

/// Error returned when a string cannot be parsed into one of the enums in
/// this module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError(String);

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognized value: {}", self.0)
    }
}

impl std::error::Error for ParseEnumError {}

impl FromStr for EnsmMode {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "TX" => Ok(EnsmMode::Tx),
            "RX" => Ok(EnsmMode::Rx),
            "ALERT" => Ok(EnsmMode::Alert),
            "FDD" => Ok(EnsmMode::Fdd),
            "WAIT" => Ok(EnsmMode::Wait),
            "SLEEP" => Ok(EnsmMode::Sleep),
            "PINCTRL" => Ok(EnsmMode::PinCtrl),
            "PINCTRL_FDD_INDEP" => Ok(EnsmMode::PinCtrlFddIndep),
            _ => Err(ParseEnumError(s.to_string())),
        }
    }
}

/// TX RF output port of the transceiver front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxPort {
    /// Port A, wired for 3000-6000 MHz.
    A,
    /// Port B, wired for 70-3000 MHz.
    B,
}

impl TxPort {
    /// Port selector value understood by the transceiver.
    pub fn as_raw(self) -> i64 {
        match self {
            TxPort::A => 0,
            TxPort::B => 1,
        }
    }

    /// Decode a port selector value read back from the transceiver.
    pub fn from_raw(raw: i64) -> Option<Self> {
        match raw {
            0 => Some(TxPort::A),
            1 => Some(TxPort::B),
            _ => None,
        }
    }
}

impl fmt::Display for TxPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxPort::A => write!(f, "TX port A"),
            TxPort::B => write!(f, "TX port B"),
        }
    }
}

/// RX RF input port of the transceiver front end (balanced inputs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RxPort {
    /// Port A, wired for 3000-6000 MHz.
    A,
    /// Port B, wired for 1600-3000 MHz.
    B,
    /// Port C, wired for 70-1600 MHz.
    C,
}

impl RxPort {
    /// Port selector value understood by the transceiver.
    pub fn as_raw(self) -> i64 {
        match self {
            RxPort::A => 0,
            RxPort::B => 1,
            RxPort::C => 2,
        }
    }

    /// Decode a port selector value read back from the transceiver.
    pub fn from_raw(raw: i64) -> Option<Self> {
        match raw {
            0 => Some(RxPort::A),
            1 => Some(RxPort::B),
            2 => Some(RxPort::C),
            _ => None,
        }
    }
}

impl fmt::Display for RxPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RxPort::A => write!(f, "RX port A"),
            RxPort::B => write!(f, "RX port B"),
            RxPort::C => write!(f, "RX port C"),
        }
    }
}

/// FPGA design version reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FpgaVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl FpgaVersion {
    /// Unpack the version from a `GetVersion` result word.
    ///
    /// Major, minor, and patch occupy bytes 0, 1, and 2 of the
    /// little-endian result.
    pub fn from_result(result: u64) -> Self {
        let bytes = result.to_le_bytes();
        FpgaVersion {
            major: bytes[0],
            minor: bytes[1],
            patch: bytes[2],
        }
    }

    /// Pack the version into a `GetVersion` result word.
    pub fn to_result(self) -> u64 {
        u64::from_le_bytes([self.major, self.minor, self.patch, 0, 0, 0, 0, 0])
    }
}

impl fmt::Display for FpgaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_zero_is_default() {
        assert_eq!(Sample::ZERO, Sample::default());
        assert_eq!(Sample::new(-2048, 2047), Sample { i: -2048, q: 2047 });
    }

    #[test]
    fn ensm_raw_round_trip_for_every_mode() {
        for raw in 0..8 {
            let mode = EnsmMode::from_raw(raw).unwrap();
            assert_eq!(mode.as_raw(), raw);
        }
        assert_eq!(EnsmMode::from_raw(8), None);
    }

    #[test]
    fn ensm_display_and_parse() {
        assert_eq!(EnsmMode::Fdd.to_string(), "FDD");
        assert_eq!(EnsmMode::PinCtrlFddIndep.to_string(), "PINCTRL_FDD_INDEP");
        assert_eq!("wait".parse::<EnsmMode>().unwrap(), EnsmMode::Wait);
        assert!("idle".parse::<EnsmMode>().is_err());
    }

    #[test]
    fn port_raw_values() {
        assert_eq!(TxPort::from_raw(TxPort::B.as_raw()), Some(TxPort::B));
        assert_eq!(RxPort::from_raw(RxPort::C.as_raw()), Some(RxPort::C));
        assert_eq!(RxPort::from_raw(3), None);
    }

    #[test]
    fn fpga_version_from_result_bytes() {
        let result = u64::from_le_bytes([0, 3, 0, 0, 0, 0, 0, 0]);
        let v = FpgaVersion::from_result(result);
        assert_eq!(v, FpgaVersion { major: 0, minor: 3, patch: 0 });
        assert_eq!(v.to_string(), "0.3.0");
        assert_eq!(v.to_result(), result);
    }

    #[test]
    fn direction_display() {
        assert_eq!(Direction::Rx.to_string(), "RX");
        assert_eq!(Direction::Tx.to_string(), "TX");
    }
}
