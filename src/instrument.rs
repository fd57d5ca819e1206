//! See [`Instrument`] for more details.

use log::{debug, info};

use crate::codec::split_values;
use crate::sync::{poll_status, SyncCommands, SyncMode, SyncParams};
use crate::transport::{FakeTransport, Transport};
use crate::{Cast, InvalidValueSnafu, NotSupportedSnafu, Result, Value};

/// Device error query run after field accesses that ask for it.
pub type ErrorCheck<T> = Box<dyn FnMut(&mut T) -> Result<()> + Send>;

/// A device session: a [`Transport`] plus the completion handshakes and the
/// IEEE 488.2 common commands.
///
/// Fields are read and written through an instrument, see
/// [`Field`](crate::Field).
///
/// # Example
///
/// ```
/// use scpi_fields::{FakeTransport, Instrument, SyncMode, SyncParams};
///
/// # fn main() -> Result<(), scpi_fields::Error> {
/// let mut inst = Instrument::new(FakeTransport::new(), "source");
/// inst.write_sync("OUTP ON", SyncMode::CompletionQuery, &SyncParams::default())?;
/// assert_eq!(inst.transport().stored(), "OUTP ON;*OPC?");
/// # Ok(()) }
/// ```
pub struct Instrument<T> {
    name: String,
    transport: T,
    scpi: bool,
    is_shutdown: bool,
    sync_commands: SyncCommands,
    error_check: Option<ErrorCheck<T>>,
}

impl<T: Transport> Instrument<T> {
    pub fn new(transport: T, name: &str) -> Self {
        info!("Initializing {}.", name);
        Self {
            name: name.to_string(),
            transport,
            scpi: true,
            is_shutdown: false,
            sync_commands: SyncCommands::default(),
            error_check: None,
        }
    }

    /// Toggle the IEEE 488.2 common commands (`id`, `status`, `clear`, ...).
    pub fn with_scpi(mut self, scpi: bool) -> Self {
        self.scpi = scpi;
        self
    }

    pub fn with_sync_commands(mut self, commands: SyncCommands) -> Self {
        self.sync_commands = commands;
        self
    }

    /// Install the device error query used by [`check_errors`](Self::check_errors).
    pub fn with_error_check<F>(mut self, check: F) -> Self
    where
        F: FnMut(&mut T) -> Result<()> + Send + 'static,
    {
        self.error_check = Some(Box::new(check));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_shutdown(&self) -> bool {
        self.is_shutdown
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    pub fn write(&mut self, command: &str) -> Result<()> {
        self.transport.write(command)
    }

    pub fn read(&mut self) -> Result<String> {
        self.transport.read_line()
    }

    pub fn ask(&mut self, command: &str) -> Result<String> {
        self.transport.ask(command)
    }

    pub fn values(&mut self, command: &str, separator: &str, cast: Cast) -> Result<Vec<Value>> {
        self.transport.values(command, separator, cast)
    }

    pub fn read_stb(&mut self) -> Result<u8> {
        self.transport.read_status_byte()
    }

    /// Poll the status byte until `params.mask` matches, see
    /// [`poll_status`](crate::sync::poll_status).
    pub fn poll_status(&mut self, params: &SyncParams) -> Result<u8> {
        let transport = &mut self.transport;
        poll_status(|| transport.read_status_byte(), params)
    }

    /// Write `command` and wait for it to complete as selected by `mode`.
    pub fn write_sync(&mut self, command: &str, mode: SyncMode, params: &SyncParams) -> Result<()> {
        debug!("write_sync <{}> {:?}", mode, command);
        match mode {
            SyncMode::None => self.write(command),
            SyncMode::CompletionQuery => {
                let compound = format!("{}{}", command, self.sync_commands.query_suffix);
                self.write(&compound)?;
                self.read()?;
                Ok(())
            }
            SyncMode::StatusPolling => {
                self.arm_status_reporting()?;
                let compound = format!("{}{}", command, self.sync_commands.trigger_suffix);
                self.write(&compound)?;
                self.poll_status(params)?;
                Ok(())
            }
        }
    }

    /// Send a query and return its reply once the device reports completion.
    ///
    /// With [`SyncMode::CompletionQuery`] the completion reply that follows the
    /// payload is stripped: `"3.14;1"` comes back as `"3.14"`.
    pub fn ask_sync(&mut self, command: &str, mode: SyncMode, params: &SyncParams) -> Result<String> {
        debug!("ask_sync <{}> {:?}", mode, command);
        let result = match mode {
            SyncMode::None => self.ask(command)?,
            SyncMode::CompletionQuery => {
                let compound = format!("{}{}", command, self.sync_commands.query_suffix);
                self.write(&compound)?;
                let reply = self.read()?;
                self.sync_commands.strip_completion(&reply).to_string()
            }
            SyncMode::StatusPolling => {
                self.write_sync(command, mode, params)?;
                self.read()?
            }
        };
        debug!("ask_sync result:<{}>", result);
        Ok(result)
    }

    /// [`ask_sync`](Self::ask_sync), then [`split_values`].
    pub fn values_sync(
        &mut self,
        command: &str,
        separator: &str,
        cast: Cast,
        mode: SyncMode,
        params: &SyncParams,
    ) -> Result<Vec<Value>> {
        let result = self.ask_sync(command, mode, params)?;
        Ok(split_values(&result, separator, cast))
    }

    // Enable OPC in the event status enable register, then read back the
    // enable and event registers so no stale event is pending.
    fn arm_status_reporting(&mut self) -> Result<()> {
        let enable = self.sync_commands.enable_command.clone();
        let enable_query = self.sync_commands.enable_query.clone();
        let event_query = self.sync_commands.event_status_query.clone();
        self.write(&enable)?;
        let ese = self.ask(&enable_query)?;
        let esr = self.ask(&event_query)?;
        debug!("armed status reporting, ESE={} ESR={}", ese.trim(), esr.trim());
        Ok(())
    }

    fn require_scpi(&self, operation: &str) -> Result<()> {
        if self.scpi {
            Ok(())
        } else {
            NotSupportedSnafu { operation }.fail()
        }
    }

    /// Identification string (`*IDN?`).
    pub fn id(&mut self) -> Result<String> {
        self.require_scpi("*IDN?")?;
        Ok(self.ask("*IDN?")?.trim().to_string())
    }

    /// Status byte as reported by `*STB?`.
    pub fn status(&mut self) -> Result<i64> {
        self.require_scpi("*STB?")?;
        self.ask_integer("*STB?")
    }

    /// 1 once all pending operations are complete (`*OPC?`).
    pub fn complete(&mut self) -> Result<i64> {
        self.require_scpi("*OPC?")?;
        self.ask_integer("*OPC?")
    }

    /// Clear the status registers (`*CLS`).
    pub fn clear(&mut self) -> Result<()> {
        self.require_scpi("*CLS")?;
        self.write("*CLS")
    }

    /// Reset to the power-on state (`*RST`).
    pub fn reset(&mut self) -> Result<()> {
        self.require_scpi("*RST")?;
        self.write("*RST")
    }

    fn ask_integer(&mut self, command: &str) -> Result<i64> {
        let reply = self.ask(command)?;
        match crate::codec::cast_token(reply.trim(), Cast::Int) {
            Value::Int(i) => Ok(i),
            _ => InvalidValueSnafu {
                value: reply.trim(),
                reason: format!("non-integer reply to {}", command),
            }
            .fail(),
        }
    }

    /// Run the installed device error query. Does nothing when none is installed.
    pub fn check_errors(&mut self) -> Result<()> {
        match self.error_check.as_mut() {
            Some(check) => check(&mut self.transport),
            None => Ok(()),
        }
    }

    /// Mark the instrument as brought to a safe state.
    pub fn shutdown(&mut self) {
        self.is_shutdown = true;
        info!("Shutting down {}", self.name);
    }

    /// Close the transport session.
    pub fn close(&mut self) -> Result<()> {
        self.transport.close()
    }
}

impl Instrument<FakeTransport> {
    /// Offline instrument backed by [`FakeTransport`], without the common
    /// commands.
    pub fn fake(name: &str) -> Self {
        Instrument::new(FakeTransport::new(), name).with_scpi(false)
    }
}

impl<T> std::fmt::Debug for Instrument<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instrument")
            .field("name", &self.name)
            .field("scpi", &self.scpi)
            .field("is_shutdown", &self.is_shutdown)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_fake_instrument() {
        let mut inst = Instrument::fake("Fake Instrument");
        assert_eq!(inst.name(), "Fake Instrument");
        assert!(matches!(inst.id(), Err(Error::NotSupported { .. })));
        assert!(matches!(inst.reset(), Err(Error::NotSupported { .. })));
        inst.write("1.5").unwrap();
        assert_eq!(inst.read().unwrap(), "1.5");
        assert_eq!(inst.ask("").unwrap(), "1.5");
    }

    #[test]
    fn test_completion_query_compound() {
        let mut inst = Instrument::new(FakeTransport::new(), "fake");
        let reply = inst
            .ask_sync("MEAS?", SyncMode::CompletionQuery, &SyncParams::default())
            .unwrap();
        assert_eq!(inst.transport().stored(), "MEAS?;*OPC?");
        assert_eq!(reply, "MEAS?");
    }

    #[test]
    fn test_error_check_hook() {
        let mut inst = Instrument::fake("fake");
        inst.check_errors().unwrap();

        let mut inst = Instrument::fake("fake").with_error_check(|t: &mut FakeTransport| {
            if t.stored() == "ERR" {
                Err(Error::NotSupported {
                    operation: "ERR".to_string(),
                })
            } else {
                Ok(())
            }
        });
        inst.check_errors().unwrap();
        inst.write("ERR").unwrap();
        assert!(inst.check_errors().is_err());
    }

    #[test]
    fn test_malformed_integer_reply() {
        // the fake echoes the query back, which is not a number
        let mut inst = Instrument::new(FakeTransport::new(), "echo");
        match inst.status() {
            Err(Error::InvalidValue { value, reason }) => {
                assert_eq!(value, "*STB?");
                assert!(reason.contains("*STB?"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(inst.complete(), Err(Error::InvalidValue { .. })));
    }

    #[test]
    fn test_shutdown_and_close() {
        let mut inst = Instrument::fake("fake");
        inst.shutdown();
        assert!(inst.is_shutdown());
        inst.close().unwrap();
        inst.close().unwrap();
        assert!(inst.transport().is_closed());
    }
}
