//! Control protocol records.
//!
//! A [`Command`] is an identifier plus at most one 64-bit parameter; a
//! [`Response`] is the identifier, a [`CommandStatus`], and one 64-bit
//! result. Each identifier has a fixed value width ([`ValueWidth`]):
//! handlers read only the low bytes of the parameter that belong to that
//! width, and widen their result back the same way.
//!
//! Both records have a fixed 10-byte wire layout:
//!
//! ```text
//! Command:  [id] [param_count] [param: u64 LE]
//! Response: [id] [status]      [result: u64 LE]
//! ```

use std::fmt;
use std::str::FromStr;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

/// Size in bytes of an encoded [`Command`] or [`Response`].
pub const RECORD_LEN: usize = 10;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Command identifier. The discriminant is the wire value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandId {
    GetTxLoFreq = 0,
    SetTxLoFreq = 1,
    GetTxSampFreq = 2,
    SetTxSampFreq = 3,
    GetTxRfBandwidth = 4,
    SetTxRfBandwidth = 5,
    GetTxAttenuation = 6,
    SetTxAttenuation = 7,
    GetTxFirEn = 8,
    SetTxFirEn = 9,
    GetRxLoFreq = 10,
    SetRxLoFreq = 11,
    GetRxSampFreq = 12,
    SetRxSampFreq = 13,
    GetRxRfBandwidth = 14,
    SetRxRfBandwidth = 15,
    GetRxGcMode = 16,
    SetRxGcMode = 17,
    GetRxRfGain = 18,
    SetRxRfGain = 19,
    GetRxFirEn = 20,
    SetRxFirEn = 21,
    SetDatapathEn = 22,
    GetVersion = 23,
    SetLoopbackEn = 24,
}

impl CommandId {
    /// Number of identifiers in the dispatch table.
    pub const COUNT: usize = 25;

    /// Every identifier, ordered by wire value.
    pub const ALL: [CommandId; CommandId::COUNT] = [
        CommandId::GetTxLoFreq,
        CommandId::SetTxLoFreq,
        CommandId::GetTxSampFreq,
        CommandId::SetTxSampFreq,
        CommandId::GetTxRfBandwidth,
        CommandId::SetTxRfBandwidth,
        CommandId::GetTxAttenuation,
        CommandId::SetTxAttenuation,
        CommandId::GetTxFirEn,
        CommandId::SetTxFirEn,
        CommandId::GetRxLoFreq,
        CommandId::SetRxLoFreq,
        CommandId::GetRxSampFreq,
        CommandId::SetRxSampFreq,
        CommandId::GetRxRfBandwidth,
        CommandId::SetRxRfBandwidth,
        CommandId::GetRxGcMode,
        CommandId::SetRxGcMode,
        CommandId::GetRxRfGain,
        CommandId::SetRxRfGain,
        CommandId::GetRxFirEn,
        CommandId::SetRxFirEn,
        CommandId::SetDatapathEn,
        CommandId::GetVersion,
        CommandId::SetLoopbackEn,
    ];

    /// Position of this identifier in the dispatch table.
    ///
    /// Always `< CommandId::COUNT`, so table lookups through a validated
    /// identifier cannot go out of bounds.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Whether the command applies a value (and therefore requires a
    /// parameter).
    pub fn is_set(self) -> bool {
        matches!(
            self,
            CommandId::SetTxLoFreq
                | CommandId::SetTxSampFreq
                | CommandId::SetTxRfBandwidth
                | CommandId::SetTxAttenuation
                | CommandId::SetTxFirEn
                | CommandId::SetRxLoFreq
                | CommandId::SetRxSampFreq
                | CommandId::SetRxRfBandwidth
                | CommandId::SetRxGcMode
                | CommandId::SetRxRfGain
                | CommandId::SetRxFirEn
                | CommandId::SetDatapathEn
                | CommandId::SetLoopbackEn
        )
    }

    /// Width of the parameter and result values of this command.
    pub fn width(self) -> ValueWidth {
        match self {
            CommandId::GetTxLoFreq
            | CommandId::SetTxLoFreq
            | CommandId::GetRxLoFreq
            | CommandId::SetRxLoFreq
            | CommandId::GetVersion => ValueWidth::U64,
            CommandId::GetTxSampFreq
            | CommandId::SetTxSampFreq
            | CommandId::GetTxRfBandwidth
            | CommandId::SetTxRfBandwidth
            | CommandId::GetTxAttenuation
            | CommandId::SetTxAttenuation
            | CommandId::GetRxSampFreq
            | CommandId::SetRxSampFreq
            | CommandId::GetRxRfBandwidth
            | CommandId::SetRxRfBandwidth => ValueWidth::U32,
            CommandId::GetTxFirEn
            | CommandId::SetTxFirEn
            | CommandId::GetRxGcMode
            | CommandId::SetRxGcMode
            | CommandId::GetRxFirEn
            | CommandId::SetRxFirEn
            | CommandId::SetDatapathEn
            | CommandId::SetLoopbackEn => ValueWidth::U8,
            CommandId::GetRxRfGain | CommandId::SetRxRfGain => ValueWidth::I32,
        }
    }

    /// Snake-case name, as accepted by [`FromStr`].
    pub fn name(self) -> &'static str {
        match self {
            CommandId::GetTxLoFreq => "get_tx_lo_freq",
            CommandId::SetTxLoFreq => "set_tx_lo_freq",
            CommandId::GetTxSampFreq => "get_tx_samp_freq",
            CommandId::SetTxSampFreq => "set_tx_samp_freq",
            CommandId::GetTxRfBandwidth => "get_tx_rf_bandwidth",
            CommandId::SetTxRfBandwidth => "set_tx_rf_bandwidth",
            CommandId::GetTxAttenuation => "get_tx_attenuation",
            CommandId::SetTxAttenuation => "set_tx_attenuation",
            CommandId::GetTxFirEn => "get_tx_fir_en",
            CommandId::SetTxFirEn => "set_tx_fir_en",
            CommandId::GetRxLoFreq => "get_rx_lo_freq",
            CommandId::SetRxLoFreq => "set_rx_lo_freq",
            CommandId::GetRxSampFreq => "get_rx_samp_freq",
            CommandId::SetRxSampFreq => "set_rx_samp_freq",
            CommandId::GetRxRfBandwidth => "get_rx_rf_bandwidth",
            CommandId::SetRxRfBandwidth => "set_rx_rf_bandwidth",
            CommandId::GetRxGcMode => "get_rx_gc_mode",
            CommandId::SetRxGcMode => "set_rx_gc_mode",
            CommandId::GetRxRfGain => "get_rx_rf_gain",
            CommandId::SetRxRfGain => "set_rx_rf_gain",
            CommandId::GetRxFirEn => "get_rx_fir_en",
            CommandId::SetRxFirEn => "set_rx_fir_en",
            CommandId::SetDatapathEn => "set_datapath_en",
            CommandId::GetVersion => "get_version",
            CommandId::SetLoopbackEn => "set_loopback_en",
        }
    }
}

impl TryFrom<u8> for CommandId {
    type Error = Error;

    fn try_from(raw: u8) -> Result<Self> {
        CommandId::ALL
            .get(raw as usize)
            .copied()
            .ok_or(Error::UnknownCommand(raw))
    }
}

impl From<CommandId> for u8 {
    fn from(id: CommandId) -> u8 {
        id as u8
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for CommandId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.to_ascii_lowercase();
        CommandId::ALL
            .iter()
            .copied()
            .find(|id| id.name() == lower)
            .ok_or_else(|| Error::InvalidParameter(format!("unknown command name: {s}")))
    }
}

// ---------------------------------------------------------------------------
// Value widths
// ---------------------------------------------------------------------------

/// Width of a command's parameter and result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueWidth {
    U8,
    U32,
    I32,
    U64,
}

impl ValueWidth {
    /// Interpret the low bytes of a raw 64-bit field as a value of this
    /// width.
    pub fn read(self, raw: u64) -> i64 {
        match self {
            ValueWidth::U8 => raw as u8 as i64,
            ValueWidth::U32 => raw as u32 as i64,
            ValueWidth::I32 => raw as u32 as i32 as i64,
            ValueWidth::U64 => raw as i64,
        }
    }

    /// Store a value of this width in the low bytes of a 64-bit field.
    /// Upper bytes are zero.
    pub fn write(self, value: i64) -> u64 {
        match self {
            ValueWidth::U8 => value as u8 as u64,
            ValueWidth::U32 => value as u32 as u64,
            ValueWidth::I32 => value as i32 as u32 as u64,
            ValueWidth::U64 => value as u64,
        }
    }

    /// Convert an application value to this width, saturating at the
    /// width's bounds and truncating any fraction.
    pub fn encode_f64(self, value: f64) -> u64 {
        match self {
            ValueWidth::U8 => value as u8 as u64,
            ValueWidth::U32 => value as u32 as u64,
            ValueWidth::I32 => value as i32 as u32 as u64,
            ValueWidth::U64 => value as u64,
        }
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Per-command outcome carried in a [`Response`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandStatus {
    /// The command completed.
    Ok = 0,
    /// A set command was sent without a parameter. Hardware state is
    /// unchanged.
    InvalidParam = 1,
    /// The transceiver rejected a run-state or loopback transition.
    EnsmError = 2,
}

impl TryFrom<u8> for CommandStatus {
    type Error = Error;

    fn try_from(raw: u8) -> Result<Self> {
        match raw {
            0 => Ok(CommandStatus::Ok),
            1 => Ok(CommandStatus::InvalidParam),
            2 => Ok(CommandStatus::EnsmError),
            other => Err(Error::InvalidParameter(format!(
                "unknown response status: {other}"
            ))),
        }
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandStatus::Ok => write!(f, "OK"),
            CommandStatus::InvalidParam => write!(f, "invalid parameter"),
            CommandStatus::EnsmError => write!(f, "ENSM error"),
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A control command: an identifier and an optional raw parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub id: CommandId,
    pub param: Option<u64>,
}

impl Command {
    /// A command without a parameter.
    pub fn new(id: CommandId) -> Self {
        Command { id, param: None }
    }

    /// A command carrying a raw 64-bit parameter.
    pub fn with_param(id: CommandId, param: u64) -> Self {
        Command {
            id,
            param: Some(param),
        }
    }

    /// Build a set command from an application value, converting it to
    /// the command's parameter width.
    ///
    /// Fails with [`Error::InvalidParameter`] for commands that take no
    /// parameter.
    pub fn make(id: CommandId, value: f64) -> Result<Self> {
        if !id.is_set() {
            return Err(Error::InvalidParameter(format!(
                "{id} does not take a parameter"
            )));
        }
        Ok(Command::with_param(id, id.width().encode_f64(value)))
    }

    /// The parameter interpreted at the command's width.
    pub fn value(&self) -> Option<i64> {
        self.param.map(|raw| self.id.width().read(raw))
    }

    /// Encode into the 10-byte wire record.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(RECORD_LEN);
        buf.put_u8(self.id.into());
        buf.put_u8(u8::from(self.param.is_some()));
        buf.put_u64_le(self.param.unwrap_or(0));
        buf.freeze()
    }

    /// Decode a 10-byte wire record.
    pub fn from_bytes(mut data: &[u8]) -> Result<Self> {
        if data.len() < RECORD_LEN {
            return Err(Error::InvalidParameter(format!(
                "command record too short: {} bytes",
                data.len()
            )));
        }
        let id = CommandId::try_from(data.get_u8())?;
        let param_count = data.get_u8();
        let raw = data.get_u64_le();
        match param_count {
            0 => Ok(Command::new(id)),
            1 => Ok(Command::with_param(id, raw)),
            n => Err(Error::InvalidParameter(format!(
                "command carries {n} parameters, at most 1 allowed"
            ))),
        }
    }
}

/// The reply to a [`Command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response {
    pub id: CommandId,
    pub status: CommandStatus,
    pub result: u64,
}

impl Response {
    /// A successful response with a raw result.
    pub fn ok(id: CommandId, result: u64) -> Self {
        Response {
            id,
            status: CommandStatus::Ok,
            result,
        }
    }

    /// A response with an explicit status.
    pub fn with_status(id: CommandId, status: CommandStatus, result: u64) -> Self {
        Response { id, status, result }
    }

    pub fn is_ok(&self) -> bool {
        self.status == CommandStatus::Ok
    }

    /// The result interpreted at the command's width.
    pub fn value(&self) -> i64 {
        self.id.width().read(self.result)
    }

    /// Encode into the 10-byte wire record.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(RECORD_LEN);
        buf.put_u8(self.id.into());
        buf.put_u8(self.status as u8);
        buf.put_u64_le(self.result);
        buf.freeze()
    }

    /// Decode a 10-byte wire record.
    pub fn from_bytes(mut data: &[u8]) -> Result<Self> {
        if data.len() < RECORD_LEN {
            return Err(Error::InvalidParameter(format!(
                "response record too short: {} bytes",
                data.len()
            )));
        }
        let id = CommandId::try_from(data.get_u8())?;
        let status = CommandStatus::try_from(data.get_u8())?;
        let result = data.get_u64_le();
        Ok(Response { id, status, result })
    }
}
