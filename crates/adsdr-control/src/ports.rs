//! RF port routing by LO frequency.
//!
//! The front end wires each transceiver port to a band-specific matching
//! network, so the port must follow the tuned frequency. The thresholds
//! are inclusive lower bounds.

use adsdr_core::types::{RxPort, TxPort};

/// Lowest frequency routed to port A (TX and RX), in Hz.
pub const PORT_A_MIN_HZ: u64 = 3_000_000_000;

/// Lowest frequency routed to RX port B, in Hz.
pub const RX_PORT_B_MIN_HZ: u64 = 1_600_000_000;

/// TX port for an LO frequency: A from 3 GHz, B below.
pub fn tx_port_for(freq_hz: u64) -> TxPort {
    if freq_hz >= PORT_A_MIN_HZ {
        TxPort::A
    } else {
        TxPort::B
    }
}

/// RX port for an LO frequency: A from 3 GHz, B from 1.6 GHz, C below.
pub fn rx_port_for(freq_hz: u64) -> RxPort {
    if freq_hz >= PORT_A_MIN_HZ {
        RxPort::A
    } else if freq_hz >= RX_PORT_B_MIN_HZ {
        RxPort::B
    } else {
        RxPort::C
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tx_threshold_is_inclusive() {
        assert_eq!(tx_port_for(2_999_999_999), TxPort::B);
        assert_eq!(tx_port_for(3_000_000_000), TxPort::A);
        assert_eq!(tx_port_for(70_000_000), TxPort::B);
        assert_eq!(tx_port_for(6_000_000_000), TxPort::A);
    }

    #[test]
    fn rx_thresholds_are_inclusive() {
        assert_eq!(rx_port_for(2_999_999_999), RxPort::B);
        assert_eq!(rx_port_for(3_000_000_000), RxPort::A);
        assert_eq!(rx_port_for(1_599_999_999), RxPort::C);
        assert_eq!(rx_port_for(1_600_000_000), RxPort::B);
        assert_eq!(rx_port_for(70_000_000), RxPort::C);
    }
}
