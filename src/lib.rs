//! Declarative field bindings for message-based (SCPI style) instruments.
//!
//! An instrument quantity is described once as a [`Field`]: a query command,
//! a set command template, an allowed-value [`Domain`] and a handful of hooks.
//! The field is then read or written through any [`Instrument`], which owns a
//! [`Transport`] and implements the command-completion protocols in
//! [`SyncMode`].
//!
//! # Example
//!
//! ```
//! use scpi_fields::{Domain, Field, Instrument, Value};
//! use scpi_fields::validators::strict_discrete_set;
//!
//! # fn main() -> Result<(), scpi_fields::Error> {
//! let range = Field::control("VOLT:RANG?", "VOLT:RANG %d", "Voltage range in volts")
//!     .values(Domain::sequence([1, 10, 100]))
//!     .validator(strict_discrete_set)
//!     .build()?
//!     .to_fake();
//!
//! let mut dmm = Instrument::fake("dmm");
//! range.set(&mut dmm, 10)?;
//! assert_eq!(range.get(&mut dmm)?, Value::Int(10));
//! assert!(range.set(&mut dmm, 5).is_err());
//! # Ok(()) }
//! ```

use snafu::Snafu;
use std::time::Duration;

mod buffer;
pub mod codec;
pub mod field;
pub mod instrument;
mod nom_parser;
pub mod sync;
pub mod template;
pub mod transport;
mod types;
pub mod validators;

pub use codec::split_values;
pub use field::{Field, FieldBuilder, FieldKind, FieldTable, Hooks};
pub use instrument::Instrument;
pub use sync::{SyncCommands, SyncMode, SyncParams};
pub use template::CommandTemplate;
pub use transport::{FakeTransport, StreamTransport, Transport};
pub use types::{Cast, Domain, Value};
pub use validators::ValueMap;

/// Errors raised by field bindings, the synchronization engine and transports.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum Error {
    /// A value to be written is not acceptable for the field.
    #[snafu(display("Invalid value {value}: {reason}"))]
    InvalidValue { value: String, reason: String },
    /// Value mapping was requested for a domain that has no encoding.
    #[snafu(display("Domain of kind {domain} can not be used for value mapping"))]
    UnsupportedDomain { domain: String },
    /// A binding or synchronization setting is malformed.
    #[snafu(display("Invalid configuration: {message}"))]
    InvalidConfiguration { message: String },
    /// Status polling did not see the completion bit before the timeout.
    #[snafu(display("Synchronization timed out after {elapsed:?} (timeout {timeout:?})"))]
    SynchronizationTimeout { elapsed: Duration, timeout: Duration },
    /// Write attempted on a measurement.
    #[snafu(display("Field is read-only: {docs}"))]
    ReadOnlyField { docs: String },
    /// Read attempted on a setting.
    #[snafu(display("Field is write-only: {docs}"))]
    WriteOnlyField { docs: String },
    /// No field registered under the name.
    #[snafu(display("Unknown field {name}"))]
    UnknownField { name: String },
    /// The instrument does not implement the operation.
    #[snafu(display("{operation} is not supported by this instrument"))]
    NotSupported { operation: String },
    /// The transport session was closed.
    #[snafu(display("Transport is closed"))]
    Closed,
    /// Error reported by the underlying byte stream.
    #[snafu(context(false), display("Transport error: {source}"))]
    Io { source: std::io::Error },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
