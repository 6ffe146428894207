//! Emulator plus controller, with the device link toggled through the backdoor

#![cfg(unix)]

mod common;

use common::{Rig, SHORT};
use hilt_common::{ControlPointClient, Error, SimulationMode, Value};
use hilt_harness::{stop_all, ControlPointAssertions, ProcessHandle};
use std::time::Duration;

#[test]
fn test_link_disconnect_and_reconnect() {
    let rig = Rig::new();
    rig.boot_dir("TPG300");
    let mut ctx = rig.context();

    let mut emulator = rig.emulator("TPG300", "tpg300");
    emulator.start(&mut ctx).unwrap();
    let port = emulator.port().unwrap();

    let mut controller = rig
        .controller("TPG300", SimulationMode::DevSim, rig.controller_config())
        .for_emulator(&emulator);
    controller.start(&mut ctx).unwrap();

    rig.client.assert_point_is("TPG300:MODE", "devsim", SHORT).unwrap();
    rig.client.assert_point_is("TPG300:PORT", &port.to_string(), SHORT).unwrap();
    rig.client.assert_point_is("TPG300:STATUS", "OK", SHORT).unwrap();

    let link = emulator.disconnected().unwrap();
    rig.client.assert_point_is("TPG300:STATUS", "INVALID", SHORT).unwrap();
    link.close().unwrap();
    rig.client.assert_point_is("TPG300:STATUS", "OK", SHORT).unwrap();
    rig.client
        .assert_point_remains("TPG300:STATUS", |v| v == "OK", Duration::from_millis(500))
        .unwrap();

    {
        let _link = emulator.disconnected().unwrap();
        rig.client.assert_point_not("TPG300:STATUS", "OK", SHORT).unwrap();
    }
    rig.client.assert_point_is("TPG300:STATUS", "OK", SHORT).unwrap();

    // disconnect/reconnect are idempotent toggles
    emulator.disconnect().unwrap();
    emulator.disconnect().unwrap();
    rig.client.assert_point_is("TPG300:STATUS", "INVALID", SHORT).unwrap();
    emulator.reconnect().unwrap();
    emulator.reconnect().unwrap();
    rig.client
        .assert_point_with(ctx.eventually("TPG300:STATUS"), "TPG300:STATUS", |v| v == "OK")
        .unwrap();

    stop_all(&mut ctx, &mut [&mut emulator, &mut controller]).unwrap();
    assert!(ctx.controllers.is_empty());
    assert!(ctx.emulators.is_empty());
    assert!(!rig.client.resolves("TPG300:DISABLE").unwrap());
}

#[test]
fn test_backdoor_values_are_encoded() {
    let rig = Rig::new();
    let mut ctx = rig.context();
    let mut emulator = rig.emulator("EUROTHRM", "eurotherm");
    emulator.start(&mut ctx).unwrap();

    emulator.set("mode", "REMOTE").unwrap();
    assert_eq!(emulator.get("mode").unwrap(), "\"REMOTE\"");

    emulator.set("speed", 42).unwrap();
    emulator
        .assert_value_is("speed", 42, SHORT, |raw| raw.parse::<i64>().ok())
        .unwrap();
    emulator.assert_value_at_least("speed", 40.0, SHORT).unwrap();

    emulator.set("enabled", true).unwrap();
    assert_eq!(emulator.get("enabled").unwrap(), "True");

    let err = emulator
        .assert_value_satisfies("speed", |raw| raw == "7", Duration::from_millis(200), "speed never reached 7")
        .unwrap_err();
    let text = err.to_string();
    assert!(text.contains("speed never reached 7"), "{}", text);
    assert!(text.contains("'42'"), "{}", text);

    match emulator.get("nonexistent").unwrap_err() {
        Error::Backdoor { status, stderr, .. } => {
            assert_eq!(status, "exit code 2");
            assert!(stderr.contains("no attribute nonexistent"));
        }
        other => panic!("unexpected error: {}", other),
    }

    let output = emulator.call("reset", &[Value::from(1)]).unwrap();
    assert!(output.is_empty());

    emulator.stop(&mut ctx).unwrap();
    assert!(!emulator.is_running());
    assert!(matches!(emulator.get("mode"), Err(Error::NotFound { .. })));
}

#[test]
fn test_emulator_double_start_and_ports() {
    let rig = Rig::new();
    let mut ctx = rig.context();
    let mut emulator = rig.emulator("LKSH336", "lakeshore336");
    emulator.start(&mut ctx).unwrap();

    let entry = ctx.emulators.get("LKSH336").unwrap();
    assert_eq!(entry.port, emulator.port());
    assert_ne!(emulator.port(), emulator.control_port());

    let err = emulator.start(&mut ctx).unwrap_err();
    assert!(matches!(err, Error::AlreadyRunning { .. }));

    emulator.stop(&mut ctx).unwrap();
    emulator.stop(&mut ctx).unwrap();
    assert!(ctx.emulators.is_empty());
}
