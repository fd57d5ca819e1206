use std::collections::VecDeque;
use std::io::{Error, ErrorKind};
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::SeqCst;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

#[derive(Default)]
struct Link {
    rx: Mutex<VecDeque<u8>>,
    data_available: Condvar,
}

/// Point-to-point byte link between a host and one simulated device, like a
/// serial cable.
#[derive(Default)]
pub struct Cable {
    host: Link,
    device: Link,
    eof: AtomicBool,
}

impl Cable {
    pub fn new() -> Arc<Cable> {
        Default::default()
    }

    /// Makes blocked reads on both ends return end-of-file.
    pub fn disconnect(&self) {
        self.eof.store(true, SeqCst);
        self.host.data_available.notify_all();
        self.device.data_available.notify_all();
    }

    pub fn host_end(self: &Arc<Self>) -> CableEnd {
        CableEnd::new(Arc::clone(self), true)
    }

    pub fn device_end(self: &Arc<Self>) -> CableEnd {
        CableEnd::new(Arc::clone(self), false)
    }
}

pub struct CableEnd {
    cable: Arc<Cable>,
    is_host: bool,
    pub timeout: Duration,
    pub do_read_error: bool,
    pub do_write_error: bool,
}

impl CableEnd {
    fn new(cable: Arc<Cable>, is_host: bool) -> CableEnd {
        CableEnd {
            cable,
            is_host,
            timeout: Duration::from_millis(500),
            do_read_error: false,
            do_write_error: false,
        }
    }

    fn rx(&self) -> &Link {
        if self.is_host {
            &self.cable.host
        } else {
            &self.cable.device
        }
    }

    fn tx(&self) -> &Link {
        if self.is_host {
            &self.cable.device
        } else {
            &self.cable.host
        }
    }
}

impl std::io::Read for CableEnd {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            panic!("Testsuite called read with zero length buffer.")
        }
        if self.do_read_error {
            self.do_read_error = false;
            return Err(Error::new(ErrorKind::PermissionDenied, "IO read error"));
        }
        let link = self.rx();
        let mut rx = link.rx.lock().expect("Read mutex is poisoned");
        if rx.is_empty() && !self.cable.eof.load(SeqCst) {
            rx = link
                .data_available
                .wait_timeout(rx, self.timeout)
                .expect("Mutex lock failed")
                .0;
        }
        if rx.is_empty() {
            return if self.cable.eof.load(SeqCst) {
                Ok(0)
            } else {
                Err(Error::new(ErrorKind::TimedOut, "IO read timeout"))
            };
        }
        let len = buf.len().min(rx.len());
        for (slot, byte) in buf.iter_mut().zip(rx.drain(..len)) {
            *slot = byte;
        }
        Ok(len)
    }
}

impl std::io::Write for CableEnd {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.do_write_error {
            self.do_write_error = false;
            return Err(Error::new(ErrorKind::PermissionDenied, "IO write error"));
        }
        let link = self.tx();
        link.rx.lock().expect("Write mutex is poisoned").extend(buf);
        link.data_available.notify_all();
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
