//! Recording bus for driver tests

use std::collections::VecDeque;
use std::vec::Vec;

use gnublin_hal::{BusError, I2cBus};

/// One transfer seen by [`MockBus`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transfer {
    Send {
        address: u8,
        register: Option<u8>,
        data: Vec<u8>,
    },
    Receive {
        address: u8,
        register: Option<u8>,
        len: usize,
    },
}

/// Bus that records every transfer and answers reads from a queue
#[derive(Debug, Default)]
pub struct MockBus {
    pub transfers: Vec<Transfer>,
    responses: VecDeque<Vec<u8>>,
    fail_send: Option<BusError>,
    fail_receive: Option<BusError>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the bytes returned by the next receive
    pub fn respond(&mut self, bytes: &[u8]) -> &mut Self {
        self.responses.push_back(bytes.to_vec());
        self
    }

    pub fn fail_sends(&mut self, error: BusError) {
        self.fail_send = Some(error);
    }

    pub fn fail_receives(&mut self, error: BusError) {
        self.fail_receive = Some(error);
    }

    /// Payloads of all sends, in order
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.transfers
            .iter()
            .filter_map(|t| match t {
                Transfer::Send { data, .. } => Some(data.clone()),
                Transfer::Receive { .. } => None,
            })
            .collect()
    }
}

impl I2cBus for MockBus {
    fn send(&mut self, address: u8, register: Option<u8>, data: &[u8]) -> Result<(), BusError> {
        if let Some(e) = self.fail_send {
            return Err(e);
        }
        self.transfers.push(Transfer::Send {
            address,
            register,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn receive(
        &mut self,
        address: u8,
        register: Option<u8>,
        buf: &mut [u8],
    ) -> Result<(), BusError> {
        if let Some(e) = self.fail_receive {
            return Err(e);
        }
        self.transfers.push(Transfer::Receive {
            address,
            register,
            len: buf.len(),
        });
        let response = self.responses.pop_front().ok_or(BusError::Nack)?;
        buf.copy_from_slice(&response[..buf.len()]);
        Ok(())
    }
}

/// GetFullStatus1 response with the given byte 5
pub fn status1_frame(byte5: u8) -> [u8; 8] {
    [0x81, 0xF0, 0x80, 0x00, 0x00, byte5, 0x00, 0x00]
}

/// GetFullStatus2 response reporting `position`
pub fn status2_frame(position: i16) -> [u8; 8] {
    let [hi, lo] = position.to_be_bytes();
    [0xFC, hi, lo, hi, lo, 0x00, 0x00, 0x00]
}
