//! Declarative instrument fields.
//!
//! A [`Field`] is built once, typically into a static table, and then read
//! or written through any [`Instrument`]. Three kinds exist:
//!
//! * [`Field::control`]: readable and writable,
//! * [`Field::measurement`]: read-only,
//! * [`Field::setting`]: write-only.
//!
//! Every access runs through the same two functions, [`Field::get`] and
//! [`Field::set`]:
//!
//! ```text
//! get: command_process -> query (sync) -> check errors -> get_process -> decode
//! set: set_process -> validator -> encode -> template -> write (sync) -> check errors
//! ```
//!
//! # Example
//!
//! ```
//! use std::sync::OnceLock;
//! use scpi_fields::{Domain, Field, FieldTable, Instrument, Value};
//! use scpi_fields::validators::strict_discrete_set;
//!
//! fn fields() -> &'static FieldTable {
//!     static FIELDS: OnceLock<FieldTable> = OnceLock::new();
//!     FIELDS.get_or_init(|| {
//!         FieldTable::new()
//!             .with("coupling", Field::control("INP:COUP?", "INP:COUP %d", "Input coupling")
//!                 .values(Domain::sequence(["AC", "DC"]))
//!                 .map_values(true)
//!                 .validator(strict_discrete_set)
//!                 .build()
//!                 .unwrap()
//!                 .to_fake())
//!     })
//! }
//!
//! # fn main() -> Result<(), scpi_fields::Error> {
//! let mut scope = Instrument::fake("scope");
//! fields().set(&mut scope, "coupling", "DC")?;
//! assert_eq!(scope.transport().stored(), "1");
//! assert_eq!(fields().get(&mut scope, "coupling")?, Value::from("DC"));
//! # Ok(()) }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use log::debug;

use crate::codec::unwrap_single;
use crate::instrument::Instrument;
use crate::sync::{SyncMode, SyncParams};
use crate::template::CommandTemplate;
use crate::transport::Transport;
use crate::validators::{self, ValueMap};
use crate::{
    Cast, Domain, Error, InvalidConfigurationSnafu, ReadOnlyFieldSnafu, Result, UnknownFieldSnafu,
    Value, WriteOnlyFieldSnafu,
};

/// Checks (and possibly adjusts) a value before it is written.
pub type Validator = Arc<dyn Fn(Value, &Domain) -> Result<Value> + Send + Sync>;
/// Transforms a value after reading or before writing.
pub type Process = Arc<dyn Fn(Value) -> Value + Send + Sync>;
/// Transforms a command string before it is sent.
pub type CommandProcess = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// The optional hooks of a field. Every hook defaults to the identity.
#[derive(Clone)]
pub struct Hooks {
    pub validator: Validator,
    pub get_process: Process,
    pub set_process: Process,
    pub command_process: CommandProcess,
}

impl Default for Hooks {
    fn default() -> Self {
        Self {
            validator: Arc::new(validators::identity),
            get_process: Arc::new(|v: Value| v),
            set_process: Arc::new(|v: Value| v),
            command_process: Arc::new(|c: &str| c.to_string()),
        }
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks").finish_non_exhaustive()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// Readable and writable.
    Control,
    /// Read-only.
    Measurement,
    /// Write-only.
    Setting,
}

impl FieldKind {
    pub fn readable(self) -> bool {
        self != FieldKind::Setting
    }

    pub fn writable(self) -> bool {
        self != FieldKind::Measurement
    }
}

/// An immutable binding of one instrument quantity to its commands.
#[derive(Debug, Clone)]
pub struct Field {
    kind: FieldKind,
    get_command: String,
    set_command: Option<CommandTemplate>,
    docs: String,
    domain: Domain,
    value_map: Option<ValueMap>,
    hooks: Hooks,
    check_get_errors: bool,
    check_set_errors: bool,
    get_sync: SyncMode,
    set_sync: SyncMode,
    params: SyncParams,
    separator: String,
    cast: Cast,
}

impl Field {
    /// A readable and writable field.
    pub fn control(get_command: &str, set_command: &str, docs: &str) -> FieldBuilder {
        FieldBuilder::new(FieldKind::Control, get_command, set_command, docs)
    }

    /// A read-only field.
    pub fn measurement(get_command: &str, docs: &str) -> FieldBuilder {
        FieldBuilder::new(FieldKind::Measurement, get_command, "", docs)
    }

    /// A write-only field.
    pub fn setting(set_command: &str, docs: &str) -> FieldBuilder {
        FieldBuilder::new(FieldKind::Setting, "", set_command, docs)
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn docs(&self) -> &str {
        &self.docs
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn get_command(&self) -> &str {
        &self.get_command
    }

    pub fn set_command(&self) -> Option<&str> {
        self.set_command.as_ref().map(CommandTemplate::as_str)
    }

    pub fn get_sync(&self) -> SyncMode {
        self.get_sync
    }

    pub fn set_sync(&self) -> SyncMode {
        self.set_sync
    }

    /// Read the field from `instrument`.
    ///
    /// A single response token is passed through `get_process` and, when
    /// mapping is enabled, decoded back to its domain member. Several tokens
    /// skip mapping; `get_process` receives them as one [`Value::List`].
    ///
    /// # Errors
    /// [`Error::WriteOnlyField`] for settings, without touching the transport.
    pub fn get<T: Transport>(&self, instrument: &mut Instrument<T>) -> Result<Value> {
        if !self.kind.readable() {
            return WriteOnlyFieldSnafu { docs: &self.docs }.fail();
        }
        let command = (self.hooks.command_process)(&self.get_command);
        let values = match self.get_sync {
            SyncMode::None => instrument.values(&command, &self.separator, self.cast)?,
            mode => instrument.values_sync(&command, &self.separator, self.cast, mode, &self.params)?,
        };
        if self.check_get_errors {
            instrument.check_errors()?;
        }
        self.decode(values)
    }

    /// Write `value` to `instrument`.
    ///
    /// # Errors
    /// [`Error::ReadOnlyField`] for measurements and any error from
    /// [`render`](Self::render); in both cases nothing is sent.
    pub fn set<T: Transport>(&self, instrument: &mut Instrument<T>, value: impl Into<Value>) -> Result<()> {
        if !self.kind.writable() {
            return ReadOnlyFieldSnafu { docs: &self.docs }.fail();
        }
        let command = self.render(value.into())?;
        match self.set_sync {
            SyncMode::None => instrument.write(&command)?,
            mode => instrument.write_sync(&command, mode, &self.params)?,
        }
        if self.check_set_errors {
            instrument.check_errors()?;
        }
        Ok(())
    }

    /// The command [`set`](Self::set) would send for `value`:
    /// `set_process`, then the validator, then encoding, then template substitution.
    pub fn render(&self, value: Value) -> Result<String> {
        let template = self.set_command.as_ref().ok_or_else(|| {
            Error::ReadOnlyField {
                docs: self.docs.clone(),
            }
        })?;
        let value = (self.hooks.set_process)(value);
        let value = (self.hooks.validator)(value, &self.domain)?;
        let value = match &self.value_map {
            Some(map) => map.encode(&value)?,
            None => value,
        };
        let command = template.format(&value)?;
        debug!("{} -> {:?}", self.docs, command);
        Ok((self.hooks.command_process)(&command))
    }

    fn decode(&self, values: Vec<Value>) -> Result<Value> {
        let single = values.len() == 1;
        let value = (self.hooks.get_process)(unwrap_single(values));
        match &self.value_map {
            Some(map) if single => map.decode(&value),
            _ => Ok(value),
        }
    }

    /// The offline variant of this field, for use with
    /// [`Instrument::fake`](crate::Instrument::fake).
    ///
    /// The get command is dropped and the set command is reduced to its first
    /// conversion specifier, so the in-memory store holds exactly the
    /// formatted value. Validation, mapping and processing are kept;
    /// synchronization is switched off.
    pub fn to_fake(&self) -> Field {
        let set_command = self.set_command.as_ref().map(|t| {
            let spec = t.first_specifier().unwrap_or("");
            // A specifier parsed out of a valid template parses again.
            CommandTemplate::parse(spec).unwrap_or_else(|_| t.clone())
        });
        Field {
            get_command: String::new(),
            set_command,
            get_sync: SyncMode::None,
            set_sync: SyncMode::None,
            ..self.clone()
        }
    }
}

/// Collects the optional parts of a [`Field`]. Finish with [`build`](Self::build).
#[must_use]
pub struct FieldBuilder {
    kind: FieldKind,
    get_command: String,
    set_command: String,
    docs: String,
    domain: Domain,
    map_values: bool,
    hooks: Hooks,
    check_get_errors: bool,
    check_set_errors: bool,
    get_sync: SyncMode,
    set_sync: SyncMode,
    params: SyncParams,
    separator: String,
    cast: Cast,
    config_error: Option<Error>,
}

impl FieldBuilder {
    fn new(kind: FieldKind, get_command: &str, set_command: &str, docs: &str) -> Self {
        Self {
            kind,
            get_command: get_command.to_string(),
            set_command: set_command.to_string(),
            docs: docs.to_string(),
            domain: Domain::Any,
            map_values: false,
            hooks: Hooks::default(),
            check_get_errors: false,
            check_set_errors: false,
            get_sync: SyncMode::None,
            set_sync: SyncMode::None,
            params: SyncParams::default(),
            separator: ",".to_string(),
            cast: Cast::Float,
            config_error: None,
        }
    }

    pub fn validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(Value, &Domain) -> Result<Value> + Send + Sync + 'static,
    {
        self.hooks.validator = Arc::new(validator);
        self
    }

    /// Allowed values; also the mapping table when [`map_values`](Self::map_values) is set.
    pub fn values(mut self, domain: Domain) -> Self {
        self.domain = domain;
        self
    }

    pub fn map_values(mut self, map_values: bool) -> Self {
        self.map_values = map_values;
        self
    }

    pub fn get_process<F>(mut self, process: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.hooks.get_process = Arc::new(process);
        self
    }

    pub fn set_process<F>(mut self, process: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.hooks.set_process = Arc::new(process);
        self
    }

    pub fn command_process<F>(mut self, process: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.hooks.command_process = Arc::new(process);
        self
    }

    pub fn check_get_errors(mut self, check: bool) -> Self {
        self.check_get_errors = check;
        self
    }

    pub fn check_set_errors(mut self, check: bool) -> Self {
        self.check_set_errors = check;
        self
    }

    pub fn get_sync(mut self, mode: SyncMode) -> Self {
        self.get_sync = mode;
        self
    }

    pub fn set_sync(mut self, mode: SyncMode) -> Self {
        self.set_sync = mode;
        self
    }

    /// Like [`get_sync`](Self::get_sync), from a mode name. An unknown name
    /// makes [`build`](Self::build) fail.
    pub fn get_sync_str(self, mode: &str) -> Self {
        match mode.parse() {
            Ok(mode) => self.get_sync(mode),
            Err(e) => self.fail(e),
        }
    }

    /// Like [`set_sync`](Self::set_sync), from a mode name. An unknown name
    /// makes [`build`](Self::build) fail.
    pub fn set_sync_str(self, mode: &str) -> Self {
        match mode.parse() {
            Ok(mode) => self.set_sync(mode),
            Err(e) => self.fail(e),
        }
    }

    pub fn sync_params(mut self, params: SyncParams) -> Self {
        self.params = params;
        self
    }

    /// Separator between values in a response, `","` by default.
    pub fn separator(mut self, separator: &str) -> Self {
        self.separator = separator.to_string();
        self
    }

    /// Cast applied to response tokens, [`Cast::Float`] by default.
    pub fn cast(mut self, cast: Cast) -> Self {
        self.cast = cast;
        self
    }

    fn fail(mut self, error: Error) -> Self {
        self.config_error.get_or_insert(error);
        self
    }

    /// Check the configuration and produce the field.
    ///
    /// # Errors
    /// [`Error::InvalidConfiguration`] for unknown sync mode names, malformed
    /// set templates, zero-step ranges or non-invertible maps, [`Error::UnsupportedDomain`] when
    /// mapping is requested for a domain without an encoding.
    pub fn build(self) -> Result<Field> {
        if let Some(error) = self.config_error {
            return Err(error);
        }
        self.domain.check()?;
        let set_command = if self.kind.writable() {
            let template = CommandTemplate::parse(&self.set_command)?;
            if template.specifier_count() == 0 {
                return InvalidConfigurationSnafu {
                    message: format!("set command {:?} has no conversion specifier", self.set_command),
                }
                .fail();
            }
            Some(template)
        } else {
            None
        };
        let value_map = if self.map_values {
            Some(ValueMap::new(&self.domain)?)
        } else {
            None
        };
        Ok(Field {
            kind: self.kind,
            get_command: self.get_command,
            set_command,
            docs: self.docs,
            domain: self.domain,
            value_map,
            hooks: self.hooks,
            check_get_errors: self.check_get_errors,
            check_set_errors: self.check_set_errors,
            get_sync: self.get_sync,
            set_sync: self.set_sync,
            params: self.params,
            separator: self.separator,
            cast: self.cast,
        })
    }
}

/// Fields of an instrument type, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct FieldTable {
    fields: BTreeMap<String, Field>,
}

impl FieldTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, field: Field) -> Option<Field> {
        self.fields.insert(name.to_string(), field)
    }

    #[must_use]
    pub fn with(mut self, name: &str, field: Field) -> Self {
        self.insert(name, field);
        self
    }

    pub fn field(&self, name: &str) -> Result<&Field> {
        match self.fields.get(name) {
            Some(field) => Ok(field),
            None => UnknownFieldSnafu { name }.fail(),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get<T: Transport>(&self, instrument: &mut Instrument<T>, name: &str) -> Result<Value> {
        self.field(name)?.get(instrument)
    }

    pub fn set<T: Transport>(
        &self,
        instrument: &mut Instrument<T>,
        name: &str,
        value: impl Into<Value>,
    ) -> Result<()> {
        self.field(name)?.set(instrument, value)
    }

    /// The same table with every field replaced by [`Field::to_fake`].
    pub fn to_fake(&self) -> FieldTable {
        FieldTable {
            fields: self
                .fields
                .iter()
                .map(|(name, field)| (name.clone(), field.to_fake()))
                .collect(),
        }
    }
}
