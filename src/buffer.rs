/// Receive buffer that assembles terminated response lines from a byte stream.
#[derive(Debug)]
pub struct Buffer {
    data: Vec<u8>,
    read_pos: usize,
}

impl Buffer {
    pub fn new() -> Buffer {
        Buffer {
            data: Vec::with_capacity(256),
            read_pos: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len() - self.read_pos
    }

    pub fn write(&mut self, bytes: &[u8]) {
        if self.read_pos == self.data.len() {
            self.clear();
        }
        self.data.extend_from_slice(bytes);
    }

    /// Remove and return the next complete line, without its terminator.
    /// A trailing `\r` before a `\n` terminator is dropped as well.
    pub fn take_line(&mut self, terminator: u8) -> Option<String> {
        let pending = &self.data[self.read_pos..];
        let end = pending.iter().position(|b| *b == terminator)?;
        let mut line = &pending[..end];
        if terminator == b'\n' {
            if let Some(stripped) = line.strip_suffix(b"\r") {
                line = stripped;
            }
        }
        let text = String::from_utf8_lossy(line).into_owned();
        self.read_pos += end + 1;
        Some(text)
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.read_pos = 0;
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Buffer::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_across_writes() {
        let mut buf = Buffer::new();
        buf.write(b"+1.0E");
        assert_eq!(buf.take_line(b'\n'), None);
        buf.write(b"+00\r\nOVLD\n3");
        assert_eq!(buf.take_line(b'\n').as_deref(), Some("+1.0E+00"));
        assert_eq!(buf.take_line(b'\n').as_deref(), Some("OVLD"));
        assert_eq!(buf.take_line(b'\n'), None);
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn test_other_terminator() {
        let mut buf = Buffer::new();
        buf.write(b"ON\rOFF\r");
        assert_eq!(buf.take_line(b'\r').as_deref(), Some("ON"));
        assert_eq!(buf.take_line(b'\r').as_deref(), Some("OFF"));
        assert_eq!(buf.len(), 0);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut buf = Buffer::new();
        buf.write(b"A\xffB\n");
        assert_eq!(buf.take_line(b'\n').as_deref(), Some("A\u{fffd}B"));
    }
}
