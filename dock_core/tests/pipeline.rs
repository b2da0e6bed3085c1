//! End-to-end flows through `ReporterService::report_event` and the
//! upload-queue drain, with in-memory collaborators.

mod common;

use chrono::Utc;
use common::{Harness, co_cylinder, co_instrument, cylinder, station};
use dock_core::action::FirmwareUpgradeAction;
use dock_core::event::{
    DiagnosticEvent, FirmwareUpgradeEvent, GasResponseEvent, ScheduleRef, SensorGasResponse,
    SettingsReadEvent, SettingsUpdateEvent, UsedCylinder,
};
use dock_core::gas::gas_code;
use dock_core::ports::{DataStore, SettingsReader};
use dock_core::queue::UploadQueue;
use dock_core::{Sensor, SettingsReadAction, UploadPayload};
use dock_core::{
    Cylinder, DockingStationAction, DockingStationError, DockingStationEvent, ErrorLevel,
    EventKind, GasEndPoint, GasOperationAction, PressureLevel, ReporterConfig, SensorStatus,
    Trigger,
};
use rstest::rstest;

fn heartbeat() -> DockingStationEvent {
    DockingStationEvent::new(EventKind::Nothing, station())
}

fn co_response(status: SensorStatus) -> SensorGasResponse {
    SensorGasResponse {
        uid: "co-1".into(),
        type_code: "S0001".into(),
        gas_code: gas_code::CO.into(),
        status,
        span_reserve: 80.0,
        reading: 100.0,
        time: Utc::now(),
        position: 1,
        used_cylinders: Vec::new(),
    }
}

fn calibrate() -> DockingStationAction {
    DockingStationAction::InstrumentCalibration(GasOperationAction::default())
}

#[test]
fn event_without_station_serial_is_ignored() {
    let h = Harness::new();
    let ev = DockingStationEvent::new(EventKind::Nothing, dock_core::DockingStation::new(""));
    assert_eq!(h.reporter.report_event(&ev), None);
    assert!(h.queue.is_empty());
}

#[test]
fn heartbeat_exchanges_status_and_queues_nothing() {
    let h = Harness::new();
    assert_eq!(
        h.reporter.report_event(&heartbeat()),
        Some(DockingStationAction::Nothing)
    );
    assert_eq!(h.uploader.status_exchanges(), 1);
    assert!(h.queue.is_empty());
}

#[test]
fn calibration_is_journaled_and_consumes_run_once_schedule() {
    let h = Harness::new();
    h.store.add_schedule(7);
    h.store.add_schedule(8);
    let ev = DockingStationEvent::new(
        EventKind::InstrumentCalibration(GasResponseEvent {
            responses: vec![co_response(SensorStatus::Passed)],
            high_bump_failure_cal_responses: Vec::new(),
        }),
        station(),
    )
    .with_instrument(co_instrument())
    .with_schedule(ScheduleRef {
        id: 7,
        run_once: true,
    });

    let action = h.reporter.report_event(&ev);

    assert_eq!(action, Some(DockingStationAction::Nothing));
    assert!(!h.store.has_schedule(7));
    assert!(h.store.has_schedule(8));
    let journal = h.store.journal();
    assert_eq!(journal.len(), 1);
    assert!(journal[0].passed);
    assert_eq!(journal[0].serial_number, "INS-0042");
    assert_eq!(h.queued_labels(), vec!["event:CAL".to_string()]);
}

#[test]
fn failed_save_is_reported_and_pipeline_continues() {
    let h = Harness::new();
    h.store.fail_commits(true);
    let ev = DockingStationEvent::new(
        EventKind::SettingsUpdate(SettingsUpdateEvent::default()),
        station(),
    );
    let action = h.reporter.report_event(&ev);
    assert!(matches!(action, Some(DockingStationAction::SettingsRead(_))));
    // event upload plus the save failure report
    assert_eq!(
        h.queued_labels(),
        vec!["event:SETUPDATE".to_string(), "error".to_string()]
    );
}

#[test]
fn settings_read_reloads_installed_cylinders() {
    let h = Harness::new();
    let ev = DockingStationEvent::new(
        EventKind::SettingsRead(SettingsReadEvent {
            installed_cylinders: vec![
                GasEndPoint::new(2, co_cylinder()),
                GasEndPoint::new(1, Cylinder::fresh_air()),
            ],
            ..SettingsReadEvent::default()
        }),
        station(),
    );
    assert_eq!(
        h.reporter.report_event(&ev),
        Some(DockingStationAction::Nothing)
    );
    let cached = h.ctx.cached_cylinders();
    assert_eq!(cached.iter().map(|c| c.position).collect::<Vec<_>>(), vec![1, 2]);
}

#[test]
fn error_level_event_makes_station_unavailable() {
    let h = Harness::new();
    let ev = heartbeat().with_error(DockingStationError::new("pump stalled", ErrorLevel::Error));
    match h.reporter.report_event(&ev) {
        Some(DockingStationAction::Unavailable(n)) => assert_eq!(n.description, "pump stalled"),
        other => panic!("expected Unavailable, got {other:?}"),
    }
    assert_eq!(h.queued_labels(), vec!["event:Nothing".to_string()]);
}

#[test]
fn warnings_do_not_block_scheduling() {
    let h = Harness::new();
    let ev = heartbeat().with_error(DockingStationError::new("low battery", ErrorLevel::Warning));
    assert_eq!(
        h.reporter.report_event(&ev),
        Some(DockingStationAction::Nothing)
    );
}

#[rstest]
#[case(Trigger::Scheduled, "CylinderPressureReset")]
#[case(Trigger::Manual, "SettingsRead")]
#[case(Trigger::Unscheduled, "SettingsRead")]
fn settings_update_followup_depends_on_trigger(#[case] trigger: Trigger, #[case] expected: &str) {
    let h = Harness::new();
    let ev = DockingStationEvent::new(
        EventKind::SettingsUpdate(SettingsUpdateEvent {
            settings_ref: Some(12),
            reboot_required: false,
        }),
        station(),
    )
    .with_trigger(trigger);
    let action = h.reporter.report_event(&ev).unwrap();
    assert_eq!(action.name(), expected);
    if let DockingStationAction::SettingsRead(read) = action {
        assert_eq!(read.changed_smart_cards, Some(vec![false; 3]));
        assert!(read.post_update);
    }
}

#[test]
fn reboot_wins_over_followups() {
    let h = Harness::new();
    let ev = DockingStationEvent::new(
        EventKind::SettingsUpdate(SettingsUpdateEvent {
            settings_ref: None,
            reboot_required: true,
        }),
        station(),
    );
    assert_eq!(
        h.reporter.report_event(&ev),
        Some(DockingStationAction::Reboot)
    );
}

#[test]
fn calibration_gets_matched_cylinders() {
    let h = Harness::new();
    h.ctx.update_docked(|d| d.instrument = Some(co_instrument()));
    h.install(vec![
        GasEndPoint::new(1, Cylinder::fresh_air()),
        GasEndPoint::new(2, co_cylinder()),
    ]);
    h.scheduler.set_next(calibrate());

    let action = h.reporter.report_event(&heartbeat()).unwrap();
    let positions: Vec<u8> = action
        .gas_operation()
        .unwrap()
        .gas_end_points
        .iter()
        .map(|g| g.position)
        .collect();
    assert_eq!(positions, vec![1, 2]);
    assert!(h.scheduler.reforced().is_empty());
}

#[test]
fn missing_gas_yields_resource_unavailable_and_reforces() {
    let h = Harness::new();
    h.ctx.update_docked(|d| d.instrument = Some(co_instrument()));
    h.install(vec![GasEndPoint::new(2, co_cylinder())]);
    h.scheduler.set_next(calibrate());

    match h.reporter.report_event(&heartbeat()) {
        Some(DockingStationAction::ResourceUnavailable(n)) => {
            assert!(n.description.contains("Fresh Air"));
            assert_eq!(n.error_codes, vec!["FreshAirUnavailable".to_string()]);
        }
        other => panic!("expected ResourceUnavailable, got {other:?}"),
    }
    assert_eq!(h.scheduler.reforced(), vec!["InstrumentCalibration".to_string()]);
    assert_eq!(h.queued_labels(), vec!["error".to_string()]);
}

#[test]
fn sticky_instrument_error_suppresses_gas_operations() {
    let h = Harness::new();
    h.ctx.update_docked(|d| {
        d.instrument = Some(co_instrument());
        d.critical_error = Some(5);
    });
    h.install(vec![
        GasEndPoint::new(1, Cylinder::fresh_air()),
        GasEndPoint::new(2, co_cylinder()),
    ]);
    h.scheduler.set_next(calibrate());
    assert_eq!(
        h.reporter.report_event(&heartbeat()),
        Some(DockingStationAction::Nothing)
    );

    h.scheduler
        .set_next(DockingStationAction::InstrumentDatalogDownload);
    assert_eq!(
        h.reporter.report_event(&heartbeat()),
        Some(DockingStationAction::InstrumentDatalogDownload)
    );
}

#[test]
fn unknown_cylinder_is_flagged_and_notified_once() {
    let h = Harness::new();
    h.install(vec![
        GasEndPoint::new(1, Cylinder::fresh_air()),
        GasEndPoint::new(3, cylinder("9999-0000", &[(gas_code::H2S, 25.0)])),
    ]);

    for _ in 0..2 {
        match h.reporter.report_event(&heartbeat()) {
            Some(DockingStationAction::UnsupportedCylinder(n)) => {
                assert_eq!(n.codes, vec!["P3".to_string()]);
                assert_eq!(n.error_codes, vec!["UnsupportedCylinder".to_string()]);
            }
            other => panic!("expected UnsupportedCylinder, got {other:?}"),
        }
    }
    assert_eq!(h.queued_labels(), vec!["error".to_string()]);
    assert_eq!(h.ctx.cached_cylinders()[1].supported, Some(false));

    // Any other action forgets the last notification.
    h.scheduler.set_next(DockingStationAction::SettingsUpdate);
    assert_eq!(
        h.reporter.report_event(&heartbeat()),
        Some(DockingStationAction::SettingsUpdate)
    );
    h.scheduler.set_next(DockingStationAction::Nothing);
    h.reporter.report_event(&heartbeat());
    assert_eq!(h.queued_labels(), vec!["error".to_string(), "error".to_string()]);
}

#[test]
fn air_on_port_one_must_match_restrictions() {
    let mut s = station();
    s.port1_restrictions = dock_core::Port1Restrictions {
        fresh_air: false,
        zero_air: true,
    };
    let h = Harness::with(
        s,
        dock_core::store::MemoryStore::new().with_catalog(common::catalog()),
        ReporterConfig::default(),
    );
    h.install(vec![GasEndPoint::new(1, co_cylinder())]);
    match h.reporter.report_event(&heartbeat()) {
        Some(DockingStationAction::UnsupportedCylinder(n)) => {
            assert_eq!(n.error_codes, vec!["IllegalPort1Cylinder".to_string()]);
        }
        other => panic!("expected UnsupportedCylinder, got {other:?}"),
    }
}

#[test]
fn flow_failure_downgrades_pressure_and_reuploads_settings() {
    let h = Harness::new();
    h.install(vec![
        GasEndPoint::new(1, Cylinder::fresh_air()),
        GasEndPoint::new(2, co_cylinder()),
    ]);
    h.reporter.report_flow_failed_error(2).unwrap();

    let cached = h.ctx.cached_cylinders();
    assert_eq!(cached[1].cylinder.pressure, PressureLevel::Low);
    assert_eq!(h.reporter.pending_error_count(), 1);
    assert_eq!(h.queued_labels(), vec!["event:SETREAD".to_string()]);
}

#[test]
fn flow_failure_survives_settings_reread() {
    let h = Harness::new();
    h.settings.set_installed(vec![
        GasEndPoint::new(1, Cylinder::fresh_air()),
        GasEndPoint::new(2, co_cylinder()),
    ]);
    let read = h
        .settings
        .read_settings(&SettingsReadAction::default())
        .unwrap();
    h.reporter.report_event(&read);

    let pressure_at = |cylinders: Vec<GasEndPoint>, port: u8| {
        cylinders
            .into_iter()
            .find(|c| c.position == port)
            .map(|c| c.cylinder.pressure)
    };

    h.reporter.report_flow_failed_error(2).unwrap();
    assert_eq!(pressure_at(h.ctx.cached_cylinders(), 2), Some(PressureLevel::Low));
    assert_eq!(
        pressure_at(h.store.gas_end_points().unwrap(), 2),
        Some(PressureLevel::Low)
    );
    assert_eq!(pressure_at(h.ctx.cached_cylinders(), 1), Some(PressureLevel::Full));

    let entries = h.queue.entries().unwrap();
    let last = entries.last().unwrap();
    assert_eq!(last.label, "event:SETREAD");
    match &last.payload {
        UploadPayload::Event { event, .. } => match &event.kind {
            EventKind::SettingsRead(read) => assert_eq!(
                pressure_at(read.installed_cylinders.clone(), 2),
                Some(PressureLevel::Low)
            ),
            other => panic!("expected SettingsRead, got {other:?}"),
        },
        other => panic!("expected an event payload, got {other:?}"),
    }

    h.reporter.report_flow_failed_error(2).unwrap();
    assert_eq!(
        pressure_at(h.store.gas_end_points().unwrap(), 2),
        Some(PressureLevel::Empty)
    );
}

fn docked_co(h: &Harness) {
    h.ctx.update_docked(|d| d.instrument = Some(co_instrument()));
}

fn cal_event(responses: Vec<SensorGasResponse>) -> DockingStationEvent {
    DockingStationEvent::new(
        EventKind::InstrumentCalibration(GasResponseEvent {
            responses,
            high_bump_failure_cal_responses: Vec::new(),
        }),
        station(),
    )
    .with_instrument(co_instrument())
}

fn docked_co_sensor(h: &Harness) -> Sensor {
    h.ctx
        .docked()
        .instrument
        .unwrap()
        .sensors()
        .find(|s| s.uid == "co-1")
        .cloned()
        .unwrap()
}

#[test]
fn bump_result_updates_docked_sensor() {
    let h = Harness::new();
    docked_co(&h);
    let ev = DockingStationEvent::new(
        EventKind::InstrumentBumpTest(GasResponseEvent {
            responses: vec![co_response(SensorStatus::Failed)],
            high_bump_failure_cal_responses: Vec::new(),
        }),
        station(),
    )
    .with_instrument(co_instrument());
    h.reporter.report_event(&ev);

    let sensor = docked_co_sensor(&h);
    assert_eq!(sensor.bump_status, SensorStatus::Failed);
    assert_eq!(sensor.cal_status, SensorStatus::Unknown);
    assert_eq!(h.ctx.docked().bad_gas_hookup, None);
}

#[test]
fn span_failure_flags_bad_hookup_until_next_good_calibration() {
    let h = Harness::new();
    docked_co(&h);

    let mut failed = co_response(SensorStatus::SpanFailed);
    failed.span_reserve = 0.0;
    failed.used_cylinders = vec![
        UsedCylinder {
            position: 1,
            part_number: Cylinder::fresh_air().part_number,
        },
        UsedCylinder {
            position: 2,
            part_number: "1810-0001".into(),
        },
    ];
    h.reporter.report_event(&cal_event(vec![failed]));
    assert_eq!(docked_co_sensor(&h).cal_status, SensorStatus::SpanFailed);
    assert_eq!(h.ctx.docked().bad_gas_hookup.as_deref(), Some("1810-0001"));

    h.reporter
        .report_event(&cal_event(vec![co_response(SensorStatus::Passed)]));
    assert_eq!(docked_co_sensor(&h).cal_status, SensorStatus::Passed);
    assert_eq!(h.ctx.docked().bad_gas_hookup, None);
}

fn o2_instrument() -> dock_core::Instrument {
    common::instrument(vec![Sensor::new("o2-1", "S0020", gas_code::O2)])
}

fn upgrade() -> DockingStationAction {
    DockingStationAction::InstrumentFirmwareUpgrade(FirmwareUpgradeAction {
        version: "5.0".into(),
    })
}

#[test]
fn firmware_upgrade_needs_bump_gas_as_well_as_calibration_gas() {
    let h = Harness::new();
    h.ctx.update_docked(|d| d.instrument = Some(o2_instrument()));
    // Fresh air calibrates O2 but cannot bump it.
    h.install(vec![GasEndPoint::new(1, Cylinder::fresh_air())]);
    h.scheduler.set_next(upgrade());

    match h.reporter.report_event(&heartbeat()) {
        Some(DockingStationAction::ResourceUnavailable(n)) => {
            assert_eq!(n.error_codes[0], "GasUnavailable");
        }
        other => panic!("expected ResourceUnavailable, got {other:?}"),
    }
    assert_eq!(
        h.scheduler.reforced(),
        vec!["InstrumentFirmwareUpgrade".to_string()]
    );
}

#[test]
fn firmware_upgrade_proceeds_with_both_gases() {
    let h = Harness::new();
    h.ctx.update_docked(|d| d.instrument = Some(o2_instrument()));
    h.install(vec![
        GasEndPoint::new(1, Cylinder::fresh_air()),
        GasEndPoint::new(2, cylinder("1810-0026", &[(gas_code::N2, 1_000_000.0)])),
    ]);
    h.scheduler.set_next(upgrade());

    assert_eq!(h.reporter.report_event(&heartbeat()), Some(upgrade()));
    assert!(h.scheduler.reforced().is_empty());
}

#[test]
fn failed_upgrade_sets_sticky_error() {
    let h = Harness::new();
    docked_co(&h);
    let ev = DockingStationEvent::new(
        EventKind::InstrumentFirmwareUpgrade(FirmwareUpgradeEvent {
            passed: false,
            target_version: "5.0".into(),
        }),
        station(),
    )
    .with_instrument(co_instrument());

    assert_eq!(
        h.reporter.report_event(&ev),
        Some(DockingStationAction::Nothing)
    );
    assert!(h.ctx.docked().upgrade_error);

    h.install(vec![
        GasEndPoint::new(1, Cylinder::fresh_air()),
        GasEndPoint::new(2, co_cylinder()),
    ]);
    h.scheduler.set_next(calibrate());
    assert_eq!(
        h.reporter.report_event(&heartbeat()),
        Some(DockingStationAction::Nothing)
    );
}

#[test]
fn critical_diagnostic_sets_sticky_error() {
    let h = Harness::new();
    docked_co(&h);
    let ev = DockingStationEvent::new(
        EventKind::InstrumentDiagnostic(DiagnosticEvent {
            interactive: false,
            critical_error: Some(17),
        }),
        station(),
    )
    .with_instrument(co_instrument());

    assert_eq!(
        h.reporter.report_event(&ev),
        Some(DockingStationAction::Nothing)
    );
    assert_eq!(h.ctx.docked().critical_error, Some(17));
    assert!(!h.ctx.docked().upgrade_error);
}

#[test]
fn gas_action_without_instrument_is_passed_through() {
    let h = Harness::new();
    h.install(vec![GasEndPoint::new(2, co_cylinder())]);
    h.scheduler.set_next(calibrate());

    assert_eq!(h.reporter.report_event(&heartbeat()), Some(calibrate()));
    assert!(h.scheduler.reforced().is_empty());
    assert!(h.queue.is_empty());
}

#[test]
fn pending_errors_are_deduplicated_by_description() {
    let h = Harness::new();
    h.reporter
        .report_error(DockingStationError::new("valve stuck", ErrorLevel::Warning));
    h.reporter
        .report_error(DockingStationError::new("valve stuck", ErrorLevel::Error));
    h.reporter
        .report_error(DockingStationError::new("fan stopped", ErrorLevel::Warning));
    assert_eq!(h.reporter.pending_error_count(), 2);

    h.reporter.report_queued_errors();
    assert_eq!(h.reporter.pending_error_count(), 0);
    assert_eq!(h.queue.len(), 2);
}

#[test]
fn drain_stops_at_first_failure_and_resumes_in_order() {
    let h = Harness::online();
    for _ in 0..3 {
        h.reporter.upload_event(&DockingStationEvent::new(
            EventKind::SettingsUpdate(SettingsUpdateEvent::default()),
            station(),
        ));
    }
    h.uploader.set_failing(true);
    assert_eq!(h.reporter.drain_queue().unwrap(), 0);
    assert_eq!(h.queue.len(), 3);

    h.uploader.set_failing(false);
    assert_eq!(h.reporter.drain_queue().unwrap(), 3);
    assert!(h.queue.is_empty());
    assert!(h.uploader.calls().iter().all(|c| c.account == "ACME"));
}

#[test]
fn drain_requires_url_activation_and_network() {
    let h = Harness::new();
    h.reporter.upload_event(&heartbeat());
    assert!(!h.reporter.runnable());
    assert_eq!(h.reporter.drain_queue().unwrap(), 0);

    let h = Harness::online();
    h.reporter.upload_event(&heartbeat());
    h.ctx.set_flag(dock_core::RunFlag::NetworkPresent, false);
    assert!(!h.reporter.runnable());
    h.ctx.set_flag(dock_core::RunFlag::NetworkPresent, true);
    h.ctx.update_station(|s| s.activated = false);
    assert!(!h.reporter.runnable());
    h.ctx.update_station(|s| s.service_mode = true);
    assert!(h.reporter.runnable());
}

fn plant_corrupt_entry(h: &Harness) {
    std::fs::write(h.queue.dir().join("0000000000.json"), b"{ not json").unwrap();
}

#[test]
fn poison_entry_is_purged_when_configured() {
    let h = Harness::online();
    h.reporter.upload_event(&heartbeat());
    plant_corrupt_entry(&h);
    assert_eq!(h.queue.len(), 2);
    assert_eq!(h.reporter.drain_queue().unwrap(), 1);
    assert!(h.queue.is_empty());
}

#[test]
fn poison_entry_is_kept_when_configured() {
    let config = ReporterConfig {
        uploader_url: Some("https://ds.example.test".into()),
        keep_poison: true,
    };
    let h = Harness::with(
        station(),
        dock_core::store::MemoryStore::new(),
        config,
    );
    h.reporter.upload_event(&heartbeat());
    plant_corrupt_entry(&h);
    assert_eq!(h.reporter.drain_queue().unwrap(), 0);
    assert_eq!(h.queue.len(), 2);
    assert!(h.uploader.calls().is_empty());
}
