// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! RS-232 transport.

use tokio_serial::{SerialPortBuilderExt, SerialStream};

use crate::error::ProtocolError;

/// Opens the projector's serial port: 8 data bits, no parity, one stop bit,
/// no flow control.
///
/// # Errors
///
/// Returns `ProtocolError::Serial` if the port cannot be opened.
pub fn open_port(path: &str, baud_rate: u32) -> Result<SerialStream, ProtocolError> {
    let port = tokio_serial::new(path, baud_rate)
        .data_bits(tokio_serial::DataBits::Eight)
        .parity(tokio_serial::Parity::None)
        .stop_bits(tokio_serial::StopBits::One)
        .flow_control(tokio_serial::FlowControl::None)
        .open_native_async()?;

    tracing::info!(port = %path, baud_rate, "Serial port opened");
    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_port_fails() {
        let result = open_port("/dev/optoma-bridge-does-not-exist", 9600);
        assert!(matches!(result, Err(ProtocolError::Serial(_))));
    }
}
