mod common;

use std::time::{Duration, Instant};

use autopress_core::{AutopressError, CalibrationParameters, Controller, LoopEvent};
use common::{ScriptedConnector, ScriptedSensor, run_config};
use rstest::rstest;

fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    false
}

fn controller() -> (Controller<ScriptedSensor, ScriptedConnector>, common::Ledger) {
    let connector = ScriptedConnector::healthy();
    let ledger = connector.ledger.clone();
    let mut cfg = run_config(1.0, 5.0);
    cfg.interval = Duration::from_millis(2);
    let ctl = Controller::new(ScriptedSensor::pressures(&[2.0, 1.0]), connector, cfg)
        .expect("controller");
    (ctl, ledger)
}

#[rstest]
fn start_stop_restart() {
    let (mut ctl, ledger) = controller();
    let events = ctl.subscribe();

    ctl.start().expect("start");
    assert!(ctl.is_running());
    assert!(wait_for(|| ctl.status().saves >= 1), "no save observed");

    let summary = ctl.stop().expect("stop");
    assert!(summary.cycles >= 2);
    assert_eq!(summary.saves, 1);
    assert!(!ctl.is_running());
    assert!(!ctl.status().running);
    // Stopping advances to the next particle.
    assert_eq!(ctl.particle(), 2);

    let seen: Vec<LoopEvent> = events.try_iter().collect();
    assert_eq!(seen.first(), Some(&LoopEvent::Started));
    assert!(seen.iter().any(|e| matches!(e, LoopEvent::Triggered(_))));
    assert_eq!(seen.last(), Some(&LoopEvent::Stopped));

    // The sensor keeps reporting 1.0 but a new run starts Outside.
    ctl.start().expect("restart");
    assert!(wait_for(|| ctl.status().saves >= 2), "no save on restart");
    ctl.stop().expect("stop");
    let saved = ledger.saved();
    assert_eq!(saved.len(), 2);
    assert!(saved[0].file_path.contains("Particle1_"));
    assert!(saved[1].file_path.contains("Particle2_"));
}

#[rstest]
fn double_start_and_idle_stop_are_state_errors() {
    let (mut ctl, _) = controller();
    assert!(matches!(ctl.stop(), Err(AutopressError::State(_))));
    ctl.start().expect("start");
    assert!(matches!(ctl.start(), Err(AutopressError::State(_))));
    ctl.stop().expect("stop");
}

#[rstest]
fn setters_validate_and_publish() {
    let (ctl, _) = controller();
    ctl.set_setpoint_mbar(2e-3).expect("setpoint");
    ctl.set_tolerance_pct(10.0).expect("tolerance");
    ctl.set_channel(4).expect("channel");
    ctl.set_interval(Duration::from_millis(50)).expect("interval");
    ctl.set_address("10.1.2.3").expect("address");
    ctl.set_particle(12).expect("particle");
    let cal = CalibrationParameters {
        divider_ratio: 1.977,
        ..CalibrationParameters::default()
    };
    ctl.set_calibration(cal).expect("calibration");

    assert_eq!(ctl.setpoint_mbar(), Some(2e-3));
    assert_eq!(ctl.setpoints_mbar(), vec![2e-3]);
    assert!((ctl.tolerance_pct() - 10.0).abs() < f64::EPSILON);
    assert_eq!(ctl.channel(), 4);
    assert_eq!(ctl.interval(), Duration::from_millis(50));
    assert_eq!(ctl.address(), "10.1.2.3");
    assert_eq!(ctl.particle(), 12);
    assert_eq!(ctl.calibration(), cal);

    for err in [
        ctl.set_setpoint_mbar(-1.0),
        ctl.set_tolerance_pct(150.0),
        ctl.set_channel(0),
        ctl.set_interval(Duration::ZERO),
        ctl.set_address("   "),
        ctl.set_particle(0),
    ] {
        assert!(matches!(err, Err(AutopressError::Config(_))), "{err:?}");
    }
    // Rejected values leave the published config alone.
    assert_eq!(ctl.channel(), 4);
    assert_eq!(ctl.particle(), 12);
}

#[rstest]
fn targets_are_added_and_removed_highest_first() {
    let (ctl, _) = controller();
    ctl.add_target(1e-3).expect("add");
    ctl.add_target(10.0).expect("add");
    assert_eq!(ctl.setpoints_mbar(), vec![1e-3, 1.0, 10.0]);
    assert!(matches!(ctl.add_target(1.0), Err(AutopressError::Config(_))));
    assert!(matches!(ctl.add_target(0.0), Err(AutopressError::Config(_))));

    assert_eq!(ctl.remove_last_target().expect("remove"), Some(10.0));
    assert_eq!(ctl.setpoint_mbar(), Some(1e-3));
    assert_eq!(ctl.remove_last_target().expect("remove"), Some(1.0));
    assert_eq!(ctl.remove_last_target().expect("remove"), Some(1e-3));
    assert_eq!(ctl.remove_last_target().expect("remove"), None);
    assert_eq!(ctl.setpoint_mbar(), None);

    ctl.set_tolerance_pct(12.0).expect("tolerance on empty list");
    ctl.add_target(2.0).expect("add");
    assert!((ctl.targets()[0].tolerance_pct() - 12.0).abs() < f64::EPSILON);
}

#[rstest]
fn concurrent_setters_keep_every_edit() {
    let (ctl, _) = controller();
    let ctl = &ctl;
    std::thread::scope(|scope| {
        for i in 0..6u32 {
            scope.spawn(move || {
                ctl.add_target(1e-5 * f64::from(i + 1)).expect("add");
                ctl.set_tolerance_pct(2.0 + f64::from(i)).expect("tolerance");
            });
        }
    });
    let targets = ctl.targets();
    assert_eq!(targets.len(), 7);
    let tol = ctl.tolerance_pct();
    assert!(targets.iter().all(|b| (b.tolerance_pct() - tol).abs() < f64::EPSILON));
}

#[rstest]
fn history_lists_saves_of_the_run() {
    let (mut ctl, _) = controller();
    ctl.start().expect("start");
    assert!(wait_for(|| ctl.status().saves >= 1));
    ctl.stop().expect("stop");
    let history = ctl.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].particle, 1);
    assert!((history[0].setpoint_mbar - 1.0).abs() < f64::EPSILON);
}

#[rstest]
fn setpoint_change_while_running_is_picked_up() {
    let (mut ctl, ledger) = controller();
    ctl.start().expect("start");
    assert!(wait_for(|| ctl.status().saves >= 1));
    // A new band re-arms the detector while the pressure sits inside it.
    ctl.set_tolerance_pct(10.0).expect("tolerance");
    assert!(wait_for(|| ctl.status().saves >= 2), "band change not applied");
    ctl.stop().expect("stop");
    assert!(ledger.saved().len() >= 2);
}

#[rstest]
fn dropping_a_running_controller_joins_the_worker() {
    let (mut ctl, _) = controller();
    ctl.start().expect("start");
    drop(ctl);
}
