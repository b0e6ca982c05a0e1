//! Command dispatcher.
//!
//! Owns the transceiver behind a mutex so commands from any task are
//! serialized, validates identifiers, and routes each command to its
//! handler. Wire records are decoded and encoded here for callers that
//! speak the 10-byte command protocol directly.

use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info, warn};

use adsdr_core::command::{Command, CommandId, Response};
use adsdr_core::error::{Error, Result};
use adsdr_core::transceiver::{InitParams, Transceiver};
use adsdr_core::types::EnsmMode;

use crate::handlers::handler;

/// Log the transceiver's current ENSM mode.
pub(crate) fn log_ensm_state(t: &dyn Transceiver) {
    match t.ensm_mode() {
        Ok(mode) => info!(%mode, "ENSM state"),
        Err(e) => warn!(error = %e, "could not read ENSM state"),
    }
}

/// Serializes configuration commands to a single transceiver.
pub struct CommandDispatcher {
    transceiver: Mutex<Box<dyn Transceiver>>,
}

impl CommandDispatcher {
    pub fn new(transceiver: Box<dyn Transceiver>) -> Self {
        CommandDispatcher {
            transceiver: Mutex::new(transceiver),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Box<dyn Transceiver>>> {
        self.transceiver
            .lock()
            .map_err(|_| Error::Transceiver("transceiver lock poisoned".into()))
    }

    /// Bring the transceiver up with `params` and report the resulting
    /// ENSM state.
    pub fn init(&self, params: &InitParams) -> Result<()> {
        let mut t = self.lock()?;
        t.init(params)?;
        info!(
            rx_lo = params.rx_synthesizer_frequency,
            tx_lo = params.tx_synthesizer_frequency,
            fdd = params.frequency_division_duplex,
            "transceiver initialized"
        );
        log_ensm_state(&**t);
        Ok(())
    }

    /// Execute one command and return the device's answer.
    pub fn dispatch(&self, cmd: Command) -> Result<Response> {
        let mut t = self.lock()?;
        let resp = handler(cmd.id)(&mut **t, cmd.id, cmd.param)?;
        debug!(
            cmd = %cmd.id,
            param = ?cmd.param,
            status = %resp.status,
            result = resp.result,
            "command dispatched"
        );
        Ok(resp)
    }

    /// Execute a command given as a raw identifier.
    ///
    /// Identifiers outside the table fail with [`Error::UnknownCommand`]
    /// before any handler runs.
    pub fn dispatch_raw(&self, id: u8, param: Option<u64>) -> Result<Response> {
        let id = CommandId::try_from(id)?;
        self.dispatch(Command { id, param })
    }

    /// Execute a command record and return the encoded response record.
    pub fn dispatch_record(&self, record: &[u8]) -> Result<Vec<u8>> {
        let cmd = Command::from_bytes(record)?;
        let resp = self.dispatch(cmd)?;
        Ok(resp.to_bytes().to_vec())
    }

    /// Current ENSM mode of the transceiver.
    pub fn ensm_mode(&self) -> Result<EnsmMode> {
        self.lock()?.ensm_mode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adsdr_core::command::{CommandStatus, RECORD_LEN};
    use adsdr_core::transceiver::Property;
    use adsdr_test_harness::MockTransceiver;
    use std::sync::Arc;

    fn dispatcher() -> (CommandDispatcher, MockTransceiver) {
        let mock = MockTransceiver::new();
        (CommandDispatcher::new(Box::new(mock.clone())), mock)
    }

    #[test]
    fn init_reaches_transceiver() {
        let (d, mock) = dispatcher();
        d.init(&InitParams::default()).unwrap();
        assert!(mock.init_params().is_some());
        assert_eq!(d.ensm_mode().unwrap(), EnsmMode::Fdd);
    }

    #[test]
    fn unknown_id_rejected() {
        let (d, mock) = dispatcher();
        let err = d.dispatch_raw(25, Some(1)).unwrap_err();
        assert!(matches!(err, Error::UnknownCommand(25)));
        assert!(d.dispatch_raw(255, None).is_err());
        assert!(mock.writes().is_empty());
    }

    #[test]
    fn dispatch_raw_set_then_get() {
        let (d, _mock) = dispatcher();
        let set = d.dispatch_raw(13, Some(30_720_000)).unwrap();
        assert_eq!(set.id, CommandId::SetRxSampFreq);
        assert_eq!(set.result, 30_720_000);

        let get = d.dispatch_raw(12, None).unwrap();
        assert_eq!(get.value(), 30_720_000);
    }

    #[test]
    fn record_round_trip() {
        let (d, mock) = dispatcher();
        let cmd = Command::with_param(CommandId::SetTxLoFreq, 5_000_000_000);
        let out = d.dispatch_record(&cmd.to_bytes()).unwrap();
        assert_eq!(out.len(), RECORD_LEN);

        let resp = Response::from_bytes(&out).unwrap();
        assert_eq!(resp.id, CommandId::SetTxLoFreq);
        assert_eq!(resp.status, CommandStatus::Ok);
        assert_eq!(resp.result, 5_000_000_000);
        assert_eq!(mock.value(Property::TxLoFreq), 5_000_000_000);
    }

    #[test]
    fn malformed_record_rejected() {
        let (d, _mock) = dispatcher();
        assert!(d.dispatch_record(&[0u8; 4]).is_err());
        let mut bad = Command::new(CommandId::GetVersion).to_bytes().to_vec();
        bad[0] = 40;
        assert!(matches!(
            d.dispatch_record(&bad),
            Err(Error::UnknownCommand(40))
        ));
    }

    #[test]
    fn concurrent_commands_serialize() {
        let (d, mock) = dispatcher();
        let d = Arc::new(d);
        let threads: Vec<_> = (0..4u64)
            .map(|n| {
                let d = Arc::clone(&d);
                std::thread::spawn(move || {
                    for k in 0..25u64 {
                        let cmd = Command::with_param(CommandId::SetRxRfGain, n * 100 + k);
                        d.dispatch(cmd).unwrap();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(mock.writes().len(), 100);
    }
}
