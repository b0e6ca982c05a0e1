//! RF transceiver collaborator.
//!
//! The [`Transceiver`] trait is the narrow surface through which the
//! command dispatcher reads and writes the RF chip: one-time
//! initialization with an [`InitParams`] set, get/set of one named
//! [`Property`], and the enable-state-machine run mode. The chip's
//! calibration tables and internal algorithms live behind the
//! implementation.

use std::fmt;

use crate::error::Result;
use crate::types::EnsmMode;

/// A named transceiver property readable and writable through
/// [`Transceiver::property`] and [`Transceiver::set_property`].
///
/// Values are carried as `i64`. Frequencies are in Hz, attenuation in
/// milli-dB, gain in dB, and enables as 0/1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
    TxLoFreq,
    TxSampFreq,
    TxRfBandwidth,
    TxAttenuation,
    TxFirEn,
    TxRfPort,
    RxLoFreq,
    RxSampFreq,
    RxRfBandwidth,
    RxGcMode,
    RxRfGain,
    RxFirEn,
    RxRfPort,
}

impl Property {
    /// All properties, in a stable order.
    pub const ALL: [Property; 13] = [
        Property::TxLoFreq,
        Property::TxSampFreq,
        Property::TxRfBandwidth,
        Property::TxAttenuation,
        Property::TxFirEn,
        Property::TxRfPort,
        Property::RxLoFreq,
        Property::RxSampFreq,
        Property::RxRfBandwidth,
        Property::RxGcMode,
        Property::RxRfGain,
        Property::RxFirEn,
        Property::RxRfPort,
    ];
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Property::TxLoFreq => "tx_lo_freq",
            Property::TxSampFreq => "tx_samp_freq",
            Property::TxRfBandwidth => "tx_rf_bandwidth",
            Property::TxAttenuation => "tx_attenuation",
            Property::TxFirEn => "tx_fir_en",
            Property::TxRfPort => "tx_rf_port",
            Property::RxLoFreq => "rx_lo_freq",
            Property::RxSampFreq => "rx_samp_freq",
            Property::RxRfBandwidth => "rx_rf_bandwidth",
            Property::RxGcMode => "rx_gc_mode",
            Property::RxRfGain => "rx_rf_gain",
            Property::RxFirEn => "rx_fir_en",
            Property::RxRfPort => "rx_rf_port",
        };
        write!(f, "{s}")
    }
}

/// Parameter set consumed by [`Transceiver::init`].
///
/// Only the values the driver sets explicitly are modeled here. The
/// remaining calibration constants belong to the transceiver
/// implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitParams {
    /// Reference clock in Hz.
    pub reference_clk_rate: u32,
    /// Start in frequency-division duplex mode.
    pub frequency_division_duplex: bool,
    /// Use one RX and one TX channel only.
    pub single_channel: bool,
    /// Initial RX synthesizer frequency in Hz.
    pub rx_synthesizer_frequency: u64,
    /// Initial TX synthesizer frequency in Hz.
    pub tx_synthesizer_frequency: u64,
    /// Initial RX RF bandwidth in Hz.
    pub rf_rx_bandwidth: u32,
    /// Initial TX RF bandwidth in Hz.
    pub rf_tx_bandwidth: u32,
    /// Initial TX attenuation in milli-dB.
    pub tx_attenuation_mdb: u32,
    /// Initial RX gain-control mode (0 manual, 1 fast AGC, 2 slow AGC,
    /// 3 hybrid AGC).
    pub gc_mode: u8,
}

impl Default for InitParams {
    fn default() -> Self {
        InitParams {
            reference_clk_rate: 40_000_000,
            frequency_division_duplex: true,
            single_channel: true,
            rx_synthesizer_frequency: 2_400_000_000,
            tx_synthesizer_frequency: 2_400_000_000,
            rf_rx_bandwidth: 18_000_000,
            rf_tx_bandwidth: 18_000_000,
            tx_attenuation_mdb: 10_000,
            gc_mode: 2,
        }
    }
}

/// Hardware API of the RF transceiver.
///
/// Implementations are not required to be thread-safe; the dispatcher
/// serializes every call behind a mutex.
pub trait Transceiver: Send {
    /// Bring the chip up with the given parameter set.
    fn init(&mut self, params: &InitParams) -> Result<()>;

    /// Read one property back from hardware.
    fn property(&self, property: Property) -> Result<i64>;

    /// Apply one property. The hardware may clamp or round, so callers
    /// read the value back rather than assuming it took effect verbatim.
    fn set_property(&mut self, property: Property, value: i64) -> Result<()>;

    /// Current run mode of the enable state machine.
    fn ensm_mode(&self) -> Result<EnsmMode>;

    /// Request a run-mode transition.
    fn set_ensm_mode(&mut self, mode: EnsmMode) -> Result<()>;

    /// Enable or disable the built-in self-test loopback.
    fn set_bist_loopback(&mut self, enabled: bool) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_params_defaults() {
        let p = InitParams::default();
        assert_eq!(p.reference_clk_rate, 40_000_000);
        assert_eq!(p.rx_synthesizer_frequency, 2_400_000_000);
        assert_eq!(p.tx_synthesizer_frequency, 2_400_000_000);
        assert_eq!(p.rf_rx_bandwidth, 18_000_000);
        assert_eq!(p.tx_attenuation_mdb, 10_000);
        assert_eq!(p.gc_mode, 2);
        assert!(p.frequency_division_duplex);
        assert!(p.single_channel);
    }

    #[test]
    fn property_names_are_unique() {
        let names: std::collections::HashSet<String> =
            Property::ALL.iter().map(|p| p.to_string()).collect();
        assert_eq!(names.len(), Property::ALL.len());
    }
}
