#![allow(dead_code)]

pub mod bus;

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{Error, ErrorKind};
use std::rc::Rc;

use scpi_fields::{Result, Transport};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Device side of a [`ScriptedTransport`]: replies are queued up front and
/// every command sent is recorded.
pub struct ScriptedDevice {
    sent: Vec<String>,
    replies: VecDeque<String>,
    status: VecDeque<u8>,
    idle_status: u8,
    do_read_error: bool,
    do_write_error: bool,
    closed: bool,
}

impl ScriptedDevice {
    pub fn new() -> Rc<RefCell<ScriptedDevice>> {
        Rc::new(RefCell::new(ScriptedDevice {
            sent: Vec::new(),
            replies: VecDeque::new(),
            status: VecDeque::new(),
            idle_status: 0,
            do_read_error: false,
            do_write_error: false,
            closed: false,
        }))
    }

    pub fn reply(&mut self, line: &str) -> &mut Self {
        self.replies.push_back(line.to_string());
        self
    }

    /// Status bytes returned in order; afterwards `idle_status` is repeated.
    pub fn status_sequence(&mut self, bytes: &[u8]) -> &mut Self {
        self.status.extend(bytes);
        self
    }

    pub fn idle_status(&mut self, byte: u8) -> &mut Self {
        self.idle_status = byte;
        self
    }

    pub fn trigger_write_error(&mut self) {
        self.do_write_error = true;
    }

    pub fn trigger_read_error(&mut self) {
        self.do_read_error = true;
    }

    pub fn sent(&self) -> &[String] {
        &self.sent
    }

    pub fn pending_replies(&self) -> usize {
        self.replies.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

pub struct ScriptedTransport(Rc<RefCell<ScriptedDevice>>);

impl ScriptedTransport {
    pub fn new(device: &Rc<RefCell<ScriptedDevice>>) -> ScriptedTransport {
        ScriptedTransport(device.clone())
    }
}

impl Transport for ScriptedTransport {
    fn write(&mut self, command: &str) -> Result<()> {
        let mut inner = self.0.borrow_mut();
        if inner.do_write_error {
            inner.do_write_error = false;
            return Err(Error::new(ErrorKind::PermissionDenied, "scripted write error").into());
        }
        inner.sent.push(command.to_string());
        Ok(())
    }

    fn read_line(&mut self) -> Result<String> {
        let mut inner = self.0.borrow_mut();
        if inner.do_read_error {
            inner.do_read_error = false;
            return Err(Error::new(ErrorKind::PermissionDenied, "scripted read error").into());
        }
        match inner.replies.pop_front() {
            Some(line) => Ok(line),
            None => Err(Error::new(ErrorKind::TimedOut, "no scripted reply").into()),
        }
    }

    fn read_status_byte(&mut self) -> Result<u8> {
        let mut inner = self.0.borrow_mut();
        inner.sent.push("<stb>".to_string());
        let idle = inner.idle_status;
        Ok(inner.status.pop_front().unwrap_or(idle))
    }

    fn close(&mut self) -> Result<()> {
        self.0.borrow_mut().closed = true;
        Ok(())
    }
}
