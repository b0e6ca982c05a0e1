//! Mock RF transceiver for testing the command dispatcher.
//!
//! [`MockTransceiver`] keeps every [`Property`] in a map, optionally clamps
//! written values to a range (as real hardware rounds and limits), records
//! every write, and lets tests force ENSM or loopback transitions to fail.
//! Clones share state, so a test can keep a probe handle while the
//! dispatcher owns the boxed transceiver.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use adsdr_core::error::{Error, Result};
use adsdr_core::transceiver::{InitParams, Property, Transceiver};
use adsdr_core::types::EnsmMode;

#[derive(Debug)]
struct State {
    values: HashMap<Property, i64>,
    clamps: HashMap<Property, (i64, i64)>,
    writes: Vec<(Property, i64)>,
    ensm: EnsmMode,
    loopback: bool,
    init: Option<InitParams>,
    fail_ensm: bool,
    fail_loopback: bool,
    fail_reads: bool,
}

/// A mock [`Transceiver`] backed by an in-memory property store.
#[derive(Debug, Clone)]
pub struct MockTransceiver {
    state: Arc<Mutex<State>>,
}

impl MockTransceiver {
    /// Create a mock in the WAIT state with every property at zero.
    pub fn new() -> Self {
        MockTransceiver {
            state: Arc::new(Mutex::new(State {
                values: HashMap::new(),
                clamps: HashMap::new(),
                writes: Vec::new(),
                ensm: EnsmMode::Wait,
                loopback: false,
                init: None,
                fail_ensm: false,
                fail_loopback: false,
                fail_reads: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Limit future writes of `property` to `min..=max`.
    pub fn set_clamp(&self, property: Property, min: i64, max: i64) {
        self.lock().clamps.insert(property, (min, max));
    }

    /// Current stored value of `property` (zero if never written).
    pub fn value(&self, property: Property) -> i64 {
        self.lock().values.get(&property).copied().unwrap_or(0)
    }

    /// Every `set_property` call, in order, with the value after clamping.
    pub fn writes(&self) -> Vec<(Property, i64)> {
        self.lock().writes.clone()
    }

    /// Current ENSM mode.
    pub fn ensm(&self) -> EnsmMode {
        self.lock().ensm
    }

    /// Whether BIST loopback is enabled.
    pub fn loopback(&self) -> bool {
        self.lock().loopback
    }

    /// Parameters passed to the last `init` call.
    pub fn init_params(&self) -> Option<InitParams> {
        self.lock().init.clone()
    }

    /// Make ENSM transitions fail.
    pub fn fail_ensm_transitions(&self, fail: bool) {
        self.lock().fail_ensm = fail;
    }

    /// Make loopback changes fail.
    pub fn fail_loopback(&self, fail: bool) {
        self.lock().fail_loopback = fail;
    }

    /// Make property reads fail.
    pub fn fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }
}

impl Default for MockTransceiver {
    fn default() -> Self {
        Self::new()
    }
}

impl Transceiver for MockTransceiver {
    fn init(&mut self, params: &InitParams) -> Result<()> {
        let mut state = self.lock();
        let values = [
            (Property::TxLoFreq, params.tx_synthesizer_frequency as i64),
            (Property::RxLoFreq, params.rx_synthesizer_frequency as i64),
            (Property::TxRfBandwidth, i64::from(params.rf_tx_bandwidth)),
            (Property::RxRfBandwidth, i64::from(params.rf_rx_bandwidth)),
            (Property::TxAttenuation, i64::from(params.tx_attenuation_mdb)),
            (Property::RxGcMode, i64::from(params.gc_mode)),
        ];
        state.values.extend(values);
        state.ensm = if params.frequency_division_duplex {
            EnsmMode::Fdd
        } else {
            EnsmMode::Alert
        };
        state.init = Some(params.clone());
        Ok(())
    }

    fn property(&self, property: Property) -> Result<i64> {
        let state = self.lock();
        if state.fail_reads {
            return Err(Error::Transceiver(format!("read of {property} failed")));
        }
        Ok(state.values.get(&property).copied().unwrap_or(0))
    }

    fn set_property(&mut self, property: Property, value: i64) -> Result<()> {
        let mut state = self.lock();
        let value = match state.clamps.get(&property) {
            Some(&(min, max)) => value.clamp(min, max),
            None => value,
        };
        state.values.insert(property, value);
        state.writes.push((property, value));
        Ok(())
    }

    fn ensm_mode(&self) -> Result<EnsmMode> {
        Ok(self.lock().ensm)
    }

    fn set_ensm_mode(&mut self, mode: EnsmMode) -> Result<()> {
        let mut state = self.lock();
        if state.fail_ensm {
            return Err(Error::Transceiver(format!("ENSM transition to {mode} rejected")));
        }
        state.ensm = mode;
        Ok(())
    }

    fn set_bist_loopback(&mut self, enabled: bool) -> Result<()> {
        let mut state = self.lock();
        if state.fail_loopback {
            return Err(Error::Transceiver("BIST loopback rejected".into()));
        }
        state.loopback = enabled;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let probe = MockTransceiver::new();
        let mut owned = probe.clone();
        owned.set_property(Property::RxRfGain, 30).unwrap();
        assert_eq!(probe.value(Property::RxRfGain), 30);
        assert_eq!(probe.writes(), vec![(Property::RxRfGain, 30)]);
    }

    #[test]
    fn clamp_limits_writes() {
        let mut mock = MockTransceiver::new();
        mock.set_clamp(Property::TxAttenuation, 0, 89_750);
        mock.set_property(Property::TxAttenuation, 100_000).unwrap();
        assert_eq!(mock.property(Property::TxAttenuation).unwrap(), 89_750);
    }

    #[test]
    fn init_applies_parameters() {
        let mut mock = MockTransceiver::new();
        mock.init(&InitParams::default()).unwrap();
        assert_eq!(mock.value(Property::RxLoFreq), 2_400_000_000);
        assert_eq!(mock.ensm(), EnsmMode::Fdd);
        assert!(mock.init_params().is_some());
    }

    #[test]
    fn injected_failures() {
        let mut mock = MockTransceiver::new();
        mock.fail_ensm_transitions(true);
        assert!(mock.set_ensm_mode(EnsmMode::Fdd).is_err());
        assert_eq!(mock.ensm(), EnsmMode::Wait);

        mock.fail_loopback(true);
        assert!(mock.set_bist_loopback(true).is_err());
        assert!(!mock.loopback());

        mock.fail_reads(true);
        assert!(matches!(
            mock.property(Property::TxLoFreq),
            Err(Error::Transceiver(_))
        ));
    }
}
