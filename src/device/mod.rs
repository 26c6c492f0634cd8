use log::{debug, error, info, warn};

mod interface;

pub use interface::Interface;

use std::{
    fs::File,
    io::{ErrorKind, Read, Write},
    str::FromStr,
    time::{Duration, Instant},
};

use crate::runtime::{fix_rollover, parse_dal_week, parse_wkn_week};

/// Serial read timeout
const READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Pause between two configuration commands
const COMMAND_DELAY: Duration = Duration::from_secs(1);

/// Supported receiver families
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverModel {
    /// Z-12 and Z-FX
    #[default]
    Z12,
    /// µZ-CGRS
    UZ,
}

impl FromStr for ReceiverModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "Z12" | "Z-12" => Ok(Self::Z12),
            "UZ" | "UZ-12" => Ok(Self::UZ),
            other => Err(format!("unknown receiver model \"{}\"", other)),
        }
    }
}

pub struct Device {
    pub interface: Interface,

    /// Bytes read but not framed yet
    pending: Vec<u8>,

    /// Read buffer
    buffer: Vec<u8>,

    /// Read-Only interface fully consumed
    exhausted: bool,
}

impl Device {
    pub fn new(interface: Interface) -> Self {
        Self {
            interface,
            pending: Vec::with_capacity(1024),
            buffer: vec![0; 1024],
            exhausted: false,
        }
    }

    pub fn open_file(fullpath: &str) -> Self {
        let handle = File::open(fullpath).unwrap_or_else(|e| {
            panic!("Failed to open {}: {}", fullpath, e);
        });

        Self::new(if fullpath.ends_with(".gz") {
            Interface::from_gzip_file_handle(handle)
        } else {
            Interface::from_file_handle(handle)
        })
    }

    /// Stacks one more input file, to be consumed after all previous ones.
    pub fn stack_file(&mut self, fullpath: &str) {
        let handle = File::open(fullpath).unwrap_or_else(|e| {
            panic!("Failed to open {}: {}", fullpath, e);
        });

        if fullpath.ends_with(".gz") {
            self.interface.stack_gzip_file_handle(handle);
        } else {
            self.interface.stack_file_handle(handle);
        }
    }

    pub fn open_serial_port(port_str: &str, baud: u32) -> Self {
        // open port
        let port = serialport::new(port_str, baud)
            .timeout(READ_TIMEOUT)
            .open()
            .unwrap_or_else(|e| panic!("Failed to open {} port: {}", port_str, e));

        let mut device = Self::new(Interface::from_serial_port(port));

        // clear out garbage
        if let Err(e) = device.reset_input() {
            warn!("failed to clear {} input: {}", port_str, e);
        }

        device
    }

    pub fn is_read_only(&self) -> bool {
        self.interface.is_read_only()
    }

    /// True once a Read-Only interface has been fully consumed
    pub fn is_exhausted(&self) -> bool {
        self.exhausted && self.pending.is_empty()
    }

    pub fn write_all(&mut self, data: &[u8]) -> std::io::Result<()> {
        self.interface.write_all(data)?;
        self.interface.flush()
    }

    /// Sends one `$PASHS`/`$PASHQ` command, terminated by CRLF
    pub fn send_command(&mut self, command: &str) -> std::io::Result<()> {
        debug!("command: {}", command);
        self.write_all(format!("{}\r\n", command).as_bytes())
    }

    /// Discards all pending input
    pub fn reset_input(&mut self) -> std::io::Result<()> {
        self.pending.clear();
        self.interface.clear_input()
    }

    /// Returns the next chunk of bytes terminated by `delimiter`, delimiter included.
    ///
    /// ## Returns
    /// - Ok(None) when nothing was received before the timeout,
    ///   or once a Read-Only interface has been fully consumed
    /// - Ok(bytes) on new frame. The last frame of a Read-Only interface
    ///   may not be terminated.
    /// - Err(e) on I/O error
    pub fn read_frame(&mut self, delimiter: &[u8]) -> std::io::Result<Option<Vec<u8>>> {
        loop {
            if let Some(pos) = find(&self.pending, delimiter) {
                let frame = self.pending.drain(..pos + delimiter.len()).collect();
                return Ok(Some(frame));
            }

            if self.exhausted {
                if self.pending.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(std::mem::take(&mut self.pending)));
            }

            let mut buffer = std::mem::take(&mut self.buffer);
            let size = self.read_interface(&mut buffer);
            self.buffer = buffer;

            match size? {
                None => return Ok(None),
                Some(0) => {
                    if self.interface.is_read_only() {
                        self.exhausted = true;
                    } else {
                        return Ok(None);
                    }
                },
                Some(size) => {
                    self.pending.extend_from_slice(&self.buffer[..size]);
                },
            }
        }
    }

    /// Returns the next CRLF terminated line
    pub fn read_line(&mut self) -> std::io::Result<Option<Vec<u8>>> {
        self.read_frame(b"\r\n")
    }

    /// Starts the MBEN/PBEN binary stream on receiver port `hw_port`,
    /// with given recording interval (s).
    pub fn start_streaming(&mut self, hw_port: char, interval: u32) -> std::io::Result<()> {
        self.send_command(&format!("$PASHS,RCI,{}", interval))?;
        std::thread::sleep(COMMAND_DELAY);
        self.send_command(&format!("$PASHS,OUT,{},MBN,PBN,BIN", hw_port))?;
        info!("MBEN/PBEN streaming on port {} every {}s", hw_port, interval);
        Ok(())
    }

    /// Acquires the current GPS week from the receiver, corrected for
    /// rollover using `reference_week`. Returns None on timeout.
    pub fn acquire_week(
        &mut self,
        model: ReceiverModel,
        hw_port: char,
        reference_week: u32,
        timeout: Duration,
    ) -> std::io::Result<Option<u32>> {
        let raw = match model {
            ReceiverModel::UZ => {
                self.reset_input()?;
                self.send_command("$PASHQ,WKN")?;
                self.wait_for_line(timeout, parse_wkn_week)?
            },
            ReceiverModel::Z12 => {
                // the Z-12 has no week query: stream one DAL sentence,
                // slow enough to turn it off before being flooded.
                self.send_command(&format!("$PASHS,OUT,{},NMEA", hw_port))?;
                std::thread::sleep(COMMAND_DELAY);
                self.send_command("$PASHS,NME,PER,20")?;
                std::thread::sleep(COMMAND_DELAY);
                self.send_command(&format!("$PASHS,NME,DAL,{},ON", hw_port))?;
                std::thread::sleep(COMMAND_DELAY);

                self.reset_input()?;
                let raw = self.wait_for_line(timeout, parse_dal_week);

                self.send_command(&format!("$PASHS,NME,ALL,{},OFF", hw_port))?;
                self.reset_input()?;
                raw?
            },
        };

        match raw {
            Some(raw) => {
                let week = fix_rollover(raw, reference_week);
                debug!("raw GPS week: {}", raw);
                info!("GPS week: {}", week);
                Ok(Some(week))
            },
            None => {
                error!("GPS week acquisition timed out");
                Ok(None)
            },
        }
    }

    fn wait_for_line<F: Fn(&str) -> Option<u32>>(
        &mut self,
        timeout: Duration,
        parser: F,
    ) -> std::io::Result<Option<u32>> {
        let deadline = Instant::now() + timeout;

        while Instant::now() < deadline {
            if let Some(line) = self.read_line()? {
                let line = String::from_utf8_lossy(&line);
                if let Some(value) = parser(&line) {
                    return Ok(Some(value));
                }
            } else if self.is_exhausted() {
                break;
            }
        }

        Ok(None)
    }

    /// Reads internal [Interface], converting timeouts into "No Data Received" (None),
    /// which is most convenient for real-time perpertual hardware application like this one.
    /// Interrupted reads are retried. Some(0) is the end of a Read-Only stream.
    fn read_interface(&mut self, output: &mut [u8]) -> std::io::Result<Option<usize>> {
        loop {
            match self.interface.read(output) {
                Ok(b) => return Ok(Some(b)),
                Err(e) => match e.kind() {
                    ErrorKind::Interrupted => continue,
                    ErrorKind::TimedOut => return Ok(None),
                    _ => return Err(e),
                },
            }
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
