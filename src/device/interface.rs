use flate2::read::GzDecoder;
use serialport::{ClearBuffer, SerialPort};

use std::{fs::File, io::Read};

/// [Interface] to the Ashtech stream
pub enum Interface {
    /// [Interface::ReadOnly] is dedicated to read only input, mainly File inputs.
    ReadOnly(Box<dyn Read + Send>),

    /// [Interface::Port] is used to connect to a physical port,
    /// and activately operate the receiver.
    Port(Box<dyn SerialPort>),
}

impl Interface {
    /// Creates a new [SerialPort] interface
    pub fn from_serial_port(port: Box<dyn SerialPort>) -> Self {
        Self::Port(port)
    }

    /// Creates a new Read-Only interface
    pub fn from_file_handle(handle: File) -> Self {
        Self::ReadOnly(Box::new(handle))
    }

    /// Creates a new Read-Only interface, from gzip compressed file
    pub fn from_gzip_file_handle(handle: File) -> Self {
        Self::ReadOnly(Box::new(GzDecoder::new(handle)))
    }

    /// Creates a new Read-Only interface from any byte source
    #[cfg(test)]
    pub fn from_reader<R: Read + Send + 'static>(reader: R) -> Self {
        Self::ReadOnly(Box::new(reader))
    }

    /// Appends a new file to be consumed once all previous content
    /// has been consumed. Has no effect on serial ports.
    pub fn stack_file_handle(&mut self, handle: File) {
        self.stack(Box::new(handle));
    }

    /// Appends a new gzip compressed file. Has no effect on serial ports.
    pub fn stack_gzip_file_handle(&mut self, handle: File) {
        self.stack(Box::new(GzDecoder::new(handle)));
    }

    fn stack(&mut self, next: Box<dyn Read + Send>) {
        if let Self::ReadOnly(r) = self {
            let previous = std::mem::replace(r, Box::new(std::io::empty()));
            *r = Box::new(previous.chain(next));
        }
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::ReadOnly(_))
    }

    /// Discards pending input bytes
    pub fn clear_input(&mut self) -> std::io::Result<()> {
        match self {
            Self::ReadOnly(_) => Ok(()),
            Self::Port(port) => port.clear(ClearBuffer::Input).map_err(std::io::Error::from),
        }
    }
}

impl std::io::Read for Interface {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Self::ReadOnly(r) => r.read(buf),
            Self::Port(port) => port.read(buf),
        }
    }
}

impl std::io::Write for Interface {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Self::ReadOnly(_) => Ok(buf.len()),
            Self::Port(port) => port.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Self::ReadOnly(_) => Ok(()),
            Self::Port(port) => port.flush(),
        }
    }
}
