//! The byte/line channel to a device.
//!
//! [`Transport`] is the seam between the binding engine and the physical
//! connection. [`StreamTransport`] runs the line protocol over anything that
//! is `Read + Write` (a serial port, a TCP socket), and [`FakeTransport`]
//! is an in-memory store used for offline instruments.

use std::io::{self, Read, Write};

use log::trace;

use crate::buffer::Buffer;
use crate::codec::split_values;
use crate::{Cast, ClosedSnafu, Result, Value};

/// Line based command/response channel.
///
/// Implementations are driven by one caller at a time; one exchange is in
/// flight at any moment.
pub trait Transport {
    /// Send one command. Does not wait for a response.
    fn write(&mut self, command: &str) -> Result<()>;

    /// Block until one response line is available and return it, without
    /// the line terminator.
    fn read_line(&mut self) -> Result<String>;

    /// Read the device status byte.
    fn read_status_byte(&mut self) -> Result<u8>;

    /// Release the session. Calling it again is a no-op.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    /// Send `command` and read one response line.
    fn ask(&mut self, command: &str) -> Result<String> {
        self.write(command)?;
        self.read_line()
    }

    /// Send `command`, read one response line and split it with
    /// [`split_values`].
    fn values(&mut self, command: &str, separator: &str, cast: Cast) -> Result<Vec<Value>> {
        let response = self.ask(command)?;
        Ok(split_values(&response, separator, cast))
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn write(&mut self, command: &str) -> Result<()> {
        (**self).write(command)
    }

    fn read_line(&mut self) -> Result<String> {
        (**self).read_line()
    }

    fn read_status_byte(&mut self) -> Result<u8> {
        (**self).read_status_byte()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, command: &str) -> Result<()> {
        (**self).write(command)
    }

    fn read_line(&mut self) -> Result<String> {
        (**self).read_line()
    }

    fn read_status_byte(&mut self) -> Result<u8> {
        (**self).read_status_byte()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// Line protocol over a byte stream.
///
/// Commands are sent with `write_termination` appended, responses are read up
/// to `read_termination`. The status byte is queried with `*STB?`, since
/// plain byte streams have no out-of-band status register.
///
/// ```
/// use scpi_fields::{StreamTransport, Transport};
/// use std::io::Cursor;
///
/// let mut transport = StreamTransport::new(Cursor::new(b"KEITHLEY,2000\n".to_vec()));
/// assert_eq!(transport.read_line().unwrap(), "KEITHLEY,2000");
/// ```
#[derive(Debug)]
pub struct StreamTransport<IO> {
    io: Option<IO>,
    buffer: Buffer,
    write_termination: String,
    read_termination: u8,
    status_query: String,
}

impl<IO> StreamTransport<IO>
where
    IO: Read + Write,
{
    pub fn new(io: IO) -> Self {
        Self {
            io: Some(io),
            buffer: Buffer::new(),
            write_termination: "\n".to_string(),
            read_termination: b'\n',
            status_query: "*STB?".to_string(),
        }
    }

    pub fn with_write_termination(mut self, termination: &str) -> Self {
        self.write_termination = termination.to_string();
        self
    }

    pub fn with_read_termination(mut self, termination: u8) -> Self {
        self.read_termination = termination;
        self
    }

    /// Command used by [`read_status_byte`](Transport::read_status_byte).
    pub fn with_status_query(mut self, query: &str) -> Self {
        self.status_query = query.to_string();
        self
    }

    pub fn get_ref(&self) -> Option<&IO> {
        self.io.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.io.is_none()
    }

    fn io(&mut self) -> Result<&mut IO> {
        match self.io.as_mut() {
            Some(io) => Ok(io),
            None => ClosedSnafu.fail(),
        }
    }
}

impl<IO> Transport for StreamTransport<IO>
where
    IO: Read + Write,
{
    fn write(&mut self, command: &str) -> Result<()> {
        trace!("-> {:?}", command);
        let mut data = Vec::with_capacity(command.len() + self.write_termination.len());
        data.extend_from_slice(command.as_bytes());
        data.extend_from_slice(self.write_termination.as_bytes());
        let io = self.io()?;
        io.write_all(&data)?;
        io.flush()?;
        Ok(())
    }

    fn read_line(&mut self) -> Result<String> {
        let mut chunk = [0; 64];
        loop {
            if let Some(line) = self.buffer.take_line(self.read_termination) {
                trace!("<- {:?}", line);
                return Ok(line);
            }
            let len = self.io()?.read(&mut chunk)?;
            if len == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "stream ended before the response terminator",
                )
                .into());
            }
            self.buffer.write(&chunk[..len]);
        }
    }

    fn read_status_byte(&mut self) -> Result<u8> {
        let query = self.status_query.clone();
        let reply = self.ask(&query)?;
        reply.trim().parse::<u8>().map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("malformed status byte {:?}: {}", reply, e),
            )
            .into()
        })
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut io) = self.io.take() {
            self.buffer.clear();
            io.flush()?;
        }
        Ok(())
    }
}

/// In-memory transport. Every non-empty command replaces the stored text and
/// every read returns it unchanged, so a value written is the value read back.
#[derive(Debug, Clone, Default)]
pub struct FakeTransport {
    stored: String,
    status: u8,
    closed: bool,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Status byte reported by [`read_status_byte`](Transport::read_status_byte).
    pub fn with_status(mut self, status: u8) -> Self {
        self.status = status;
        self
    }

    pub fn stored(&self) -> &str {
        &self.stored
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Transport for FakeTransport {
    fn write(&mut self, command: &str) -> Result<()> {
        if self.closed {
            return ClosedSnafu.fail();
        }
        if !command.is_empty() {
            self.stored = command.to_string();
        }
        Ok(())
    }

    fn read_line(&mut self) -> Result<String> {
        if self.closed {
            return ClosedSnafu.fail();
        }
        Ok(self.stored.clone())
    }

    fn read_status_byte(&mut self) -> Result<u8> {
        Ok(self.status)
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::io::Cursor;

    /// Reads from a fixed input, records everything written.
    struct Loopback {
        rx: Cursor<Vec<u8>>,
        tx: Vec<u8>,
    }

    impl Read for Loopback {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.rx.read(buf)
        }
    }

    impl Write for Loopback {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.tx.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn loopback(rx: &[u8]) -> StreamTransport<Loopback> {
        StreamTransport::new(Loopback {
            rx: Cursor::new(rx.to_vec()),
            tx: Vec::new(),
        })
    }

    #[test]
    fn test_ask_appends_termination() {
        let mut t = loopback(b"1.5\r\n").with_write_termination("\r\n");
        assert_eq!(t.ask("MEAS:VOLT?").unwrap(), "1.5");
        assert_eq!(t.get_ref().unwrap().tx, b"MEAS:VOLT?\r\n");
    }

    #[test]
    fn test_values() {
        let mut t = loopback(b"1,2,OVLD\n");
        assert_eq!(
            t.values("TRAC:DATA?", ",", Cast::Float).unwrap(),
            vec![Value::Float(1.0), Value::Float(2.0), Value::from("OVLD")]
        );
    }

    #[test]
    fn test_status_byte() {
        let mut t = loopback(b"32\n+0x\n");
        assert_eq!(t.read_status_byte().unwrap(), 32);
        match t.read_status_byte() {
            Err(Error::Io { source }) => assert_eq!(source.kind(), io::ErrorKind::InvalidData),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_eof_and_close() {
        let mut t = loopback(b"partial");
        match t.read_line() {
            Err(Error::Io { source }) => assert_eq!(source.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("unexpected {:?}", other),
        }
        t.close().unwrap();
        t.close().unwrap();
        assert!(t.is_closed());
        assert!(matches!(t.write("*RST"), Err(Error::Closed)));
    }

    #[test]
    fn test_fake_store() {
        let mut t = FakeTransport::new();
        t.write("5").unwrap();
        t.write("").unwrap();
        assert_eq!(t.read_line().unwrap(), "5");
        assert_eq!(t.ask("").unwrap(), "5");
        t.close().unwrap();
        assert!(matches!(t.read_line(), Err(Error::Closed)));
    }
}
