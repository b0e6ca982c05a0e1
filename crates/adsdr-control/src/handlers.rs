//! Per-command handlers.
//!
//! Every handler has the same shape ([`Handler`]) and is chosen by an
//! exhaustive match on a validated [`CommandId`], so there is no raw
//! index into a table. Set handlers without a parameter answer
//! `InvalidParam` and leave the hardware alone; otherwise they apply the
//! value and answer with what the hardware reads back.

use tracing::{debug, warn};

use adsdr_core::command::{CommandId, CommandStatus, Response};
use adsdr_core::error::Result;
use adsdr_core::transceiver::{Property, Transceiver};
use adsdr_core::types::{EnsmMode, FpgaVersion};

use crate::dispatcher::log_ensm_state;
use crate::ports::{rx_port_for, tx_port_for};

/// FPGA design version reported by `GetVersion`.
pub const FPGA_VERSION: FpgaVersion = FpgaVersion {
    major: 0,
    minor: 3,
    patch: 0,
};

/// Uniform handler contract: transceiver, identifier, optional raw
/// parameter.
pub type Handler = fn(&mut dyn Transceiver, CommandId, Option<u64>) -> Result<Response>;

/// Look up the handler for a command.
pub fn handler(id: CommandId) -> Handler {
    match id {
        CommandId::GetTxLoFreq
        | CommandId::GetTxSampFreq
        | CommandId::GetTxRfBandwidth
        | CommandId::GetTxAttenuation
        | CommandId::GetTxFirEn
        | CommandId::GetRxLoFreq
        | CommandId::GetRxSampFreq
        | CommandId::GetRxRfBandwidth
        | CommandId::GetRxGcMode
        | CommandId::GetRxRfGain
        | CommandId::GetRxFirEn => get_property,
        CommandId::SetTxSampFreq
        | CommandId::SetTxRfBandwidth
        | CommandId::SetTxAttenuation
        | CommandId::SetTxFirEn
        | CommandId::SetRxSampFreq
        | CommandId::SetRxRfBandwidth
        | CommandId::SetRxGcMode
        | CommandId::SetRxRfGain
        | CommandId::SetRxFirEn => set_property,
        CommandId::SetTxLoFreq => set_tx_lo_freq,
        CommandId::SetRxLoFreq => set_rx_lo_freq,
        CommandId::SetDatapathEn => set_datapath_en,
        CommandId::GetVersion => get_version,
        CommandId::SetLoopbackEn => set_loopback_en,
    }
}

/// The transceiver property a get/set command reads or writes.
pub fn property_of(id: CommandId) -> Option<Property> {
    match id {
        CommandId::GetTxLoFreq | CommandId::SetTxLoFreq => Some(Property::TxLoFreq),
        CommandId::GetTxSampFreq | CommandId::SetTxSampFreq => Some(Property::TxSampFreq),
        CommandId::GetTxRfBandwidth | CommandId::SetTxRfBandwidth => {
            Some(Property::TxRfBandwidth)
        }
        CommandId::GetTxAttenuation | CommandId::SetTxAttenuation => {
            Some(Property::TxAttenuation)
        }
        CommandId::GetTxFirEn | CommandId::SetTxFirEn => Some(Property::TxFirEn),
        CommandId::GetRxLoFreq | CommandId::SetRxLoFreq => Some(Property::RxLoFreq),
        CommandId::GetRxSampFreq | CommandId::SetRxSampFreq => Some(Property::RxSampFreq),
        CommandId::GetRxRfBandwidth | CommandId::SetRxRfBandwidth => {
            Some(Property::RxRfBandwidth)
        }
        CommandId::GetRxGcMode | CommandId::SetRxGcMode => Some(Property::RxGcMode),
        CommandId::GetRxRfGain | CommandId::SetRxRfGain => Some(Property::RxRfGain),
        CommandId::GetRxFirEn | CommandId::SetRxFirEn => Some(Property::RxFirEn),
        CommandId::SetDatapathEn | CommandId::GetVersion | CommandId::SetLoopbackEn => None,
    }
}

fn missing_param(id: CommandId) -> Response {
    debug!(cmd = %id, "set command without parameter");
    Response::with_status(id, CommandStatus::InvalidParam, 0)
}

fn read_back(t: &dyn Transceiver, id: CommandId, property: Property) -> Result<Response> {
    let value = t.property(property)?;
    Ok(Response::ok(id, id.width().write(value)))
}

fn get_property(t: &mut dyn Transceiver, id: CommandId, _param: Option<u64>) -> Result<Response> {
    match property_of(id) {
        Some(property) => read_back(t, id, property),
        None => Ok(Response::with_status(id, CommandStatus::InvalidParam, 0)),
    }
}

fn set_property(t: &mut dyn Transceiver, id: CommandId, param: Option<u64>) -> Result<Response> {
    let (Some(raw), Some(property)) = (param, property_of(id)) else {
        return Ok(missing_param(id));
    };
    let value = id.width().read(raw);
    t.set_property(property, value)?;
    read_back(t, id, property)
}

fn set_tx_lo_freq(t: &mut dyn Transceiver, id: CommandId, param: Option<u64>) -> Result<Response> {
    let Some(freq) = param else {
        return Ok(missing_param(id));
    };
    let port = tx_port_for(freq);
    t.set_property(Property::TxRfPort, port.as_raw())?;
    t.set_property(Property::TxLoFreq, freq as i64)?;
    debug!(freq, %port, "TX LO tuned");
    read_back(t, id, Property::TxLoFreq)
}

fn set_rx_lo_freq(t: &mut dyn Transceiver, id: CommandId, param: Option<u64>) -> Result<Response> {
    let Some(freq) = param else {
        return Ok(missing_param(id));
    };
    let port = rx_port_for(freq);
    t.set_property(Property::RxRfPort, port.as_raw())?;
    t.set_property(Property::RxLoFreq, freq as i64)?;
    debug!(freq, %port, "RX LO tuned");
    read_back(t, id, Property::RxLoFreq)
}

fn set_datapath_en(t: &mut dyn Transceiver, id: CommandId, param: Option<u64>) -> Result<Response> {
    let Some(raw) = param else {
        return Ok(missing_param(id));
    };
    let enable = id.width().read(raw);
    let mode = if enable == 1 {
        EnsmMode::Fdd
    } else {
        EnsmMode::Wait
    };
    let status = match t.set_ensm_mode(mode) {
        Ok(()) => CommandStatus::Ok,
        Err(e) => {
            warn!(%mode, error = %e, "ENSM transition failed");
            CommandStatus::EnsmError
        }
    };
    log_ensm_state(t);
    Ok(Response::with_status(id, status, id.width().write(enable)))
}

fn set_loopback_en(t: &mut dyn Transceiver, id: CommandId, param: Option<u64>) -> Result<Response> {
    let Some(raw) = param else {
        return Ok(missing_param(id));
    };
    let enable = id.width().read(raw);
    let status = match t.set_bist_loopback(enable == 1) {
        Ok(()) => CommandStatus::Ok,
        Err(e) => {
            warn!(error = %e, "BIST loopback change failed");
            CommandStatus::EnsmError
        }
    };
    Ok(Response::with_status(id, status, id.width().write(enable)))
}

fn get_version(_t: &mut dyn Transceiver, id: CommandId, _param: Option<u64>) -> Result<Response> {
    Ok(Response::ok(id, FPGA_VERSION.to_result()))
}
