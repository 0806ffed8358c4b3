//! Device port manager.
//!
//! Devices are numbered slots holding word-oriented channels. The Memory
//! stage moves exactly one 4-byte word per access; failures are logged
//! by the caller and never terminate the simulation.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::mpsc::{channel, Receiver, Sender};

use crate::common::PortError;

/// Number of device slots in the port table.
pub const MAX_PORTS: usize = 32;

/// A full-duplex channel that moves one 32-bit word at a time.
pub trait WordChannel: Send {
    fn read_word(&mut self) -> io::Result<i32>;
    fn write_word(&mut self, word: i32) -> io::Result<()>;
}

impl WordChannel for TcpStream {
    fn read_word(&mut self) -> io::Result<i32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(i32::from_le_bytes(buf))
    }

    fn write_word(&mut self, word: i32) -> io::Result<()> {
        self.write_all(&word.to_le_bytes())?;
        self.flush()
    }
}

/// One end of an in-memory channel pair. Stands in for a TCP device
/// endpoint in tests.
pub struct PipeChannel {
    tx: Sender<i32>,
    rx: Receiver<i32>,
}

/// Creates a connected pair of in-memory channels; words written to one
/// end are read from the other.
pub fn pipe_pair() -> (PipeChannel, PipeChannel) {
    let (tx_a, rx_b) = channel();
    let (tx_b, rx_a) = channel();
    (
        PipeChannel { tx: tx_a, rx: rx_a },
        PipeChannel { tx: tx_b, rx: rx_b },
    )
}

impl PipeChannel {
    /// Non-blocking read of the next queued word, if any.
    pub fn try_read_word(&self) -> Option<i32> {
        self.rx.try_recv().ok()
    }
}

impl WordChannel for PipeChannel {
    fn read_word(&mut self) -> io::Result<i32> {
        self.rx
            .recv()
            .map_err(|_| io::Error::new(io::ErrorKind::UnexpectedEof, "channel closed"))
    }

    fn write_word(&mut self, word: i32) -> io::Result<()> {
        self.tx
            .send(word)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "channel closed"))
    }
}

/// The device port table.
pub struct PortManager {
    slots: Vec<Option<Box<dyn WordChannel>>>,
}

impl Default for PortManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PortManager {
    pub fn new() -> Self {
        Self {
            slots: (0..MAX_PORTS).map(|_| None).collect(),
        }
    }

    fn slot_mut(&mut self, device: u32) -> Result<&mut Option<Box<dyn WordChannel>>, PortError> {
        self.slots
            .get_mut(device as usize)
            .ok_or(PortError::BadDevice(device))
    }

    /// Attaches a channel to an empty device slot.
    pub fn add_port(&mut self, device: u32, channel: Box<dyn WordChannel>) -> Result<(), PortError> {
        let slot = self.slot_mut(device)?;
        if slot.is_some() {
            return Err(PortError::SlotBusy(device));
        }
        *slot = Some(channel);
        Ok(())
    }

    /// Connects a device slot to a TCP endpoint.
    pub fn connect_tcp(&mut self, device: u32, host: &str, port: u16) -> Result<(), PortError> {
        let stream = TcpStream::connect((host, port))?;
        self.add_port(device, Box::new(stream))
    }

    pub fn remove_port(&mut self, device: u32) -> Result<(), PortError> {
        let slot = self.slot_mut(device)?;
        slot.take().map(|_| ()).ok_or(PortError::Unconnected(device))
    }

    /// Reads one word from the device.
    pub fn read(&mut self, device: u32) -> Result<i32, PortError> {
        match self.slot_mut(device)? {
            Some(channel) => Ok(channel.read_word()?),
            None => Err(PortError::Unconnected(device)),
        }
    }

    /// Writes one word to the device.
    pub fn write(&mut self, device: u32, word: i32) -> Result<(), PortError> {
        match self.slot_mut(device)? {
            Some(channel) => Ok(channel.write_word(word)?),
            None => Err(PortError::Unconnected(device)),
        }
    }

    /// Detaches every channel.
    pub fn teardown(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
    }
}
