use anyhow::{Context, Result};
use serialport::SerialPort;
use std::io::Write;
use std::iter::Peekable;
use std::str::{FromStr, SplitWhitespace};
use std::sync::mpsc;
use std::time::Duration;

use scpi_fields::{Instrument, StreamTransport, SyncMode, SyncParams};

type Dev = Instrument<StreamTransport<Box<dyn SerialPort>>>;

fn cmd_ask(args: &mut CmdScanner, dev: &mut Dev) -> Result<()> {
    println!("{}", dev.ask(&args.rest()?)?);
    Ok(())
}

fn cmd_write(args: &mut CmdScanner, dev: &mut Dev) -> Result<()> {
    dev.write(&args.rest()?)?;
    Ok(())
}

fn cmd_sync(args: &mut CmdScanner, dev: &mut Dev, params: &SyncParams) -> Result<()> {
    let mode: SyncMode = args.next()?.parse()?;
    let command = args.rest()?;
    if command.contains('?') {
        println!("{}", dev.ask_sync(&command, mode, params)?);
    } else {
        dev.write_sync(&command, mode, params)?;
        println!("done");
    }
    Ok(())
}

fn cmd_timeout(args: &mut CmdScanner, params: &mut SyncParams) -> Result<()> {
    params.timeout = Duration::from_secs_f32(args.parse_next()?);
    if args.has_next() {
        params.interval = Duration::from_secs_f32(args.parse_next()?);
    }
    println!("timeout {:?}, interval {:?}", params.timeout, params.interval);
    Ok(())
}

fn cmd_poll(args: &mut CmdScanner, dev: &mut Dev) -> Result<()> {
    let delay = Duration::from_secs_f32(args.parse_next()?);
    let query = args.rest()?;

    println!("Press enter to stop polling.");
    // check that the first query is ok before starting the poll stop thread
    println!("{}", dev.ask(&query)?);
    let (io_tx, io_rx) = mpsc::channel::<()>();
    std::thread::spawn(move || {
        let _ch = io_tx;
        let mut buf = String::new();
        let _ = std::io::stdin().read_line(&mut buf);
    });
    loop {
        if io_rx.recv_timeout(delay) == Err(mpsc::RecvTimeoutError::Disconnected) {
            break;
        }
        println!("{}", dev.ask(&query)?);
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args();
    args.next(); // Skip program name
    let port = args.next().unwrap_or_else(|| "/dev/ttyUSB0".to_string());
    let baud = match args.next() {
        Some(baud) => baud.parse().context("Invalid baud rate")?,
        None => 9600,
    };

    let serial = serialport::new(&port, baud)
        .timeout(Duration::from_secs(2))
        .open()
        .with_context(|| format!("Failed to open serial port {}", port))?;

    let mut stdout = std::io::stdout();
    let mut params = SyncParams::default();

    let mut dev = Instrument::new(StreamTransport::new(serial), &port);
    loop {
        print!(">> ");
        stdout.flush()?;
        let mut cmd = String::new();
        let mut scan = CmdScanner::read_stdin(&mut cmd)?;
        if let Err(err) = match scan.next() {
            Err(_) => continue,
            Ok("ask") | Ok("a") => cmd_ask(&mut scan, &mut dev),
            Ok("write") | Ok("w") => cmd_write(&mut scan, &mut dev),
            Ok("sync") => cmd_sync(&mut scan, &mut dev, &params),
            Ok("timeout") => cmd_timeout(&mut scan, &mut params),
            Ok("poll") => cmd_poll(&mut scan, &mut dev),
            Ok("id") => dev.id().map(|id| println!("{}", id)).map_err(Into::into),
            Ok("stb") => dev.read_stb().map(|stb| println!("{:#010b}", stb)).map_err(Into::into),
            Ok("quit") | Ok("q") => break,
            Ok(cmd) => {
                println!("Unknown command {}", cmd);
                continue;
            }
        } {
            println!("{:?}", err)
        }
    }
    dev.close()?;
    Ok(())
}

struct CmdScanner<'a> {
    splt: Peekable<SplitWhitespace<'a>>,
}

impl<'a> CmdScanner<'a> {
    fn read_stdin(buf: &'a mut String) -> Result<Self> {
        buf.clear();
        std::io::stdin().read_line(buf)?;
        let splt = buf.split_whitespace().peekable();
        Ok(Self { splt })
    }
    fn next(&mut self) -> Result<&str> {
        self.splt.next().context("End of stream")
    }
    fn has_next(&mut self) -> bool {
        self.splt.peek().is_some()
    }
    fn parse_next<T: FromStr>(&mut self) -> Result<T> {
        self.next()?.parse::<T>().ok().context("Parse error")
    }
    /// The remaining words, i.e. a device command.
    fn rest(&mut self) -> Result<String> {
        let words: Vec<&str> = self.splt.by_ref().collect();
        if words.is_empty() {
            anyhow::bail!("Missing device command");
        }
        Ok(words.join(" "))
    }
}
