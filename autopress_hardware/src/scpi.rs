//! SCPI over a raw TCP socket (the "socket" port most LAN oscilloscopes
//! expose, 5025 by default).
//!
//! Only the waveform export path is touched: the session prepares export
//! settings once after connecting and then asks the instrument to write its
//! current buffer to a file on its own disk. Acquisition settings are left
//! alone.

use std::io::{BufRead, BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use autopress_traits::{BoxError, Instrument, InstrumentConnector, SaveRequest};
use tracing::{debug, trace};

use crate::error::{HwError, Result};
use crate::util::remaining;

pub const DEFAULT_SCPI_PORT: u16 = 5025;

/// Export preparation for an R&S RTO: fast raw export of C1W1 with time
/// values, no data logging.
pub fn default_export_setup() -> Vec<String> {
    [
        "EXPort:WAVeform:FASTexport ON",
        "EXPort:WAVeform:SOURce C1W1",
        "EXPort:WAVeform:SCOPe WFM",
        "EXPort:WAVeform:RAW ON",
        "EXPort:WAVeform:INCXvalues ON",
        "EXPort:WAVeform:DLOGging OFF",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}

#[derive(Debug, Clone)]
pub struct ScpiConnector {
    port: u16,
    export_setup: Vec<String>,
}

impl ScpiConnector {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            export_setup: default_export_setup(),
        }
    }

    pub fn with_export_setup(mut self, commands: Vec<String>) -> Self {
        self.export_setup = commands;
        self
    }
}

impl Default for ScpiConnector {
    fn default() -> Self {
        Self::new(DEFAULT_SCPI_PORT)
    }
}

impl InstrumentConnector for ScpiConnector {
    type Session = ScpiSession;

    fn connect(&mut self, address: &str, timeout: Duration) -> std::result::Result<ScpiSession, BoxError> {
        let mut session = ScpiSession::open(address, self.port, timeout)?;
        let deadline = Instant::now() + timeout;
        session.write_line("*CLS", remaining(deadline)?)?;
        for cmd in &self.export_setup {
            session.write_line(cmd, remaining(deadline)?)?;
        }
        session.check_error_queue(remaining(deadline)?)?;
        Ok(session)
    }
}

pub struct ScpiSession {
    peer: SocketAddr,
    writer: TcpStream,
    reader: BufReader<TcpStream>,
}

impl ScpiSession {
    /// Open the socket. `address` is a host name or IP, optionally with an
    /// explicit `:port` that overrides `default_port`.
    pub fn open(address: &str, default_port: u16, timeout: Duration) -> Result<Self> {
        let peer = resolve(address, default_port)?;
        debug!(%peer, "connecting to instrument");
        let writer = TcpStream::connect_timeout(&peer, timeout).map_err(HwError::from_socket)?;
        writer.set_nodelay(true)?;
        let reader = BufReader::new(writer.try_clone()?);
        Ok(Self {
            peer,
            writer,
            reader,
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn write_line(&mut self, command: &str, timeout: Duration) -> Result<()> {
        trace!(command, "scpi >");
        self.writer.set_write_timeout(Some(timeout))?;
        let mut line = String::with_capacity(command.len() + 1);
        line.push_str(command);
        line.push('\n');
        self.writer
            .write_all(line.as_bytes())
            .map_err(HwError::from_socket)?;
        self.writer.flush().map_err(HwError::from_socket)
    }

    pub fn query(&mut self, command: &str, timeout: Duration) -> Result<String> {
        let deadline = Instant::now() + timeout;
        self.write_line(command, timeout)?;
        let response = self.read_reply(deadline)?;
        trace!(command, response = %response, "scpi <");
        Ok(response)
    }

    /// Read up to the next newline. The socket timeout is re-armed before
    /// every read, so a peer trickling bytes still ends at `deadline`.
    fn read_reply(&mut self, deadline: Instant) -> Result<String> {
        let mut line = Vec::new();
        loop {
            self.reader
                .get_ref()
                .set_read_timeout(Some(remaining(deadline)?))?;
            let chunk = self.reader.fill_buf().map_err(HwError::from_socket)?;
            if chunk.is_empty() {
                return Err(HwError::Protocol("connection closed by instrument".into()));
            }
            match chunk.iter().position(|&b| b == b'\n') {
                Some(i) => {
                    line.extend_from_slice(&chunk[..i]);
                    self.reader.consume(i + 1);
                    break;
                }
                None => {
                    let n = chunk.len();
                    line.extend_from_slice(chunk);
                    self.reader.consume(n);
                }
            }
        }
        let line = String::from_utf8(line)
            .map_err(|_| HwError::Protocol("reply is not valid UTF-8".into()))?;
        Ok(line.trim().to_string())
    }

    /// Read one entry of the error queue; anything but code 0 is a rejection.
    fn check_error_queue(&mut self, timeout: Duration) -> Result<()> {
        let reply = self.query("SYSTem:ERRor?", timeout)?;
        let (code, message) = parse_error_reply(&reply)?;
        if code == 0 {
            Ok(())
        } else {
            Err(HwError::Rejected { code, message })
        }
    }
}

impl Instrument for ScpiSession {
    fn identify(&mut self, timeout: Duration) -> std::result::Result<String, BoxError> {
        Ok(self.query("*IDN?", timeout)?)
    }

    fn save_buffer(
        &mut self,
        request: &SaveRequest,
        timeout: Duration,
    ) -> std::result::Result<(), BoxError> {
        let deadline = Instant::now() + timeout;
        let name = request.file_path.replace('\'', "''");
        self.write_line(
            &format!("EXPort:WAVeform:NAME '{name}'"),
            remaining(deadline)?,
        )?;
        self.write_line("EXPort:WAVeform:SAVE", remaining(deadline)?)?;
        let opc = self.query("*OPC?", remaining(deadline)?)?;
        if opc != "1" {
            return Err(Box::new(HwError::Protocol(format!(
                "unexpected *OPC? reply '{opc}'"
            ))));
        }
        self.check_error_queue(remaining(deadline)?)?;
        debug!(peer = %self.peer, file = %request.file_path, "instrument saved waveform");
        Ok(())
    }

    fn close(&mut self) -> std::result::Result<(), BoxError> {
        match self.writer.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(Box::new(HwError::Io(e))),
        }
    }
}

fn resolve(address: &str, default_port: u16) -> Result<SocketAddr> {
    let address = address.trim();
    if let Ok(sa) = address.parse::<SocketAddr>() {
        return Ok(sa);
    }
    let mut addrs = match address.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => {
            let port: u16 = port
                .parse()
                .map_err(|_| HwError::Protocol(format!("invalid port in '{address}'")))?;
            (host, port).to_socket_addrs()?
        }
        _ => (address, default_port).to_socket_addrs()?,
    };
    addrs
        .next()
        .ok_or_else(|| HwError::Protocol(format!("'{address}' did not resolve")))
}

/// Parse a `SYSTem:ERRor?` reply such as `0,"No error"`.
pub fn parse_error_reply(reply: &str) -> Result<(i32, String)> {
    let (code, message) = reply.split_once(',').unwrap_or((reply, ""));
    let code = code
        .trim()
        .parse::<i32>()
        .map_err(|_| HwError::Protocol(format!("unparseable error reply '{reply}'")))?;
    Ok((code, message.trim().trim_matches('"').to_string()))
}
