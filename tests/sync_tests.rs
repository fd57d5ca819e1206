mod common;

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use common::*;
use scpi_fields::{Error, Field, Instrument, SyncCommands, SyncMode, SyncParams, Value};

fn instrument() -> (Rc<RefCell<ScriptedDevice>>, Instrument<ScriptedTransport>) {
    init_logging();
    let device = ScriptedDevice::new();
    let inst = Instrument::new(ScriptedTransport::new(&device), "scripted");
    (device, inst)
}

fn fast() -> SyncParams {
    SyncParams::default()
        .with_timeout(Duration::from_millis(200))
        .with_interval(Duration::from_millis(2))
}

#[test]
fn completion_query_set() {
    let (device, mut inst) = instrument();
    let output = Field::setting("OUTP %d", "Output")
        .set_sync(SyncMode::CompletionQuery)
        .build()
        .unwrap();

    device.borrow_mut().reply("1");
    output.set(&mut inst, 1).unwrap();
    assert_eq!(device.borrow().sent(), ["OUTP 1;*OPC?"]);
    assert_eq!(device.borrow().pending_replies(), 0);
}

#[test]
fn completion_query_get_strips_reply() {
    let (device, mut inst) = instrument();
    let reading = Field::measurement("MEAS:VOLT?", "Voltage")
        .get_sync(SyncMode::CompletionQuery)
        .build()
        .unwrap();

    device.borrow_mut().reply("3.14;1");
    assert_eq!(reading.get(&mut inst).unwrap(), Value::Float(3.14));
    assert_eq!(device.borrow().sent(), ["MEAS:VOLT?;*OPC?"]);
}

#[test]
fn status_polling_handshake_order() {
    let (device, mut inst) = instrument();
    let sweep = Field::setting("SWE:STAR %d", "Start a sweep")
        .set_sync(SyncMode::StatusPolling)
        .sync_params(fast())
        .build()
        .unwrap();

    device
        .borrow_mut()
        .reply("1")
        .reply("0")
        .status_sequence(&[0, 0, 0b0010_0000]);
    sweep.set(&mut inst, 3).unwrap();
    assert_eq!(
        device.borrow().sent(),
        ["*ESE 1", "*ESE?", "*ESR?", "SWE:STAR 3;*OPC", "<stb>", "<stb>", "<stb>"]
    );
}

#[test]
fn status_polling_get_reads_after_completion() {
    let (device, mut inst) = instrument();
    let trace = Field::measurement("TRAC:DATA?", "Trace")
        .get_sync(SyncMode::StatusPolling)
        .sync_params(fast())
        .build()
        .unwrap();

    device
        .borrow_mut()
        .reply("1")
        .reply("0")
        .reply("1,2,3")
        .idle_status(0b0010_0000);
    assert_eq!(
        trace.get(&mut inst).unwrap(),
        Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
    );
    let sent = device.borrow().sent().to_vec();
    assert_eq!(sent[3], "TRAC:DATA?;*OPC");
    assert_eq!(sent.last().map(String::as_str), Some("<stb>"));
}

#[test]
fn status_polling_timeout() {
    let (device, mut inst) = instrument();
    device.borrow_mut().reply("1").reply("0").idle_status(0);
    let params = SyncParams::default()
        .with_timeout(Duration::from_millis(300))
        .with_interval(Duration::from_millis(50));

    let start = Instant::now();
    let result = inst.write_sync("INIT", SyncMode::StatusPolling, &params);
    let waited = start.elapsed();
    match result {
        Err(Error::SynchronizationTimeout { elapsed, timeout }) => {
            assert_eq!(timeout, Duration::from_millis(300));
            assert!(elapsed > timeout);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(waited >= Duration::from_millis(300));
    // gives up after the sixth 50 ms interval
    assert!(waited <= Duration::from_millis(350), "waited {:?}", waited);
}

#[test]
fn custom_mask() {
    let (device, mut inst) = instrument();
    device
        .borrow_mut()
        .reply("1")
        .reply("0")
        .status_sequence(&[0b0010_0000, 0b0000_0001]);
    let params = fast().with_mask(0b0000_0001);
    inst.write_sync("INIT", SyncMode::StatusPolling, &params).unwrap();
    let polls = device.borrow().sent().iter().filter(|c| *c == "<stb>").count();
    assert_eq!(polls, 2);
}

#[test]
fn none_mode_is_plain_io() {
    let (device, mut inst) = instrument();
    device.borrow_mut().reply("3.14;1");
    inst.write_sync("*RST", SyncMode::None, &fast()).unwrap();
    assert_eq!(
        inst.ask_sync("MEAS?", SyncMode::None, &fast()).unwrap(),
        "3.14;1"
    );
    assert_eq!(device.borrow().sent(), ["*RST", "MEAS?"]);
}

#[test]
fn custom_sync_commands() {
    init_logging();
    let device = ScriptedDevice::new();
    let commands = SyncCommands {
        query_suffix: ";:*OPC?".to_string(),
        reply_separator: ',',
        ..SyncCommands::default()
    };
    let mut inst =
        Instrument::new(ScriptedTransport::new(&device), "scripted").with_sync_commands(commands);

    device.borrow_mut().reply("12.5,1");
    assert_eq!(
        inst.ask_sync("FREQ?", SyncMode::CompletionQuery, &fast()).unwrap(),
        "12.5"
    );
    assert_eq!(device.borrow().sent(), ["FREQ?;:*OPC?"]);
}

#[test]
fn unknown_mode_name_is_rejected() {
    let result = Field::control("A?", "A %d", "a").set_sync_str("stb-poll").build();
    assert!(matches!(result, Err(Error::InvalidConfiguration { .. })));
    assert!(matches!(
        "fast".parse::<SyncMode>(),
        Err(Error::InvalidConfiguration { .. })
    ));
}

#[test]
fn legacy_mode_names() {
    let field = Field::control("A?", "A %d", "a")
        .get_sync_str("opc_query")
        .set_sync_str("stb_polling")
        .build()
        .unwrap();
    assert_eq!(field.get_sync(), SyncMode::CompletionQuery);
    assert_eq!(field.set_sync(), SyncMode::StatusPolling);
}
