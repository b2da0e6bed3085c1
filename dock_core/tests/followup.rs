//! Mandatory follow-up actions are a pure function of the event.

use chrono::Utc;
use dock_core::event::{
    ClearTarget, DiagnosticEvent, DownloadEvent, DownloadedEntry, FirmwareUpgradeEvent,
    PressureResetEvent, SettingsUpdateEvent,
};
use dock_core::processor::EventProcessor;
use dock_core::{DockingStation, DockingStationAction, DockingStationEvent, EventKind, Trigger};
use proptest::prelude::*;
use rstest::rstest;

fn event(kind: EventKind) -> DockingStationEvent {
    DockingStationEvent::new(kind, DockingStation::new("DS"))
}

fn one_entry() -> DownloadEvent {
    DownloadEvent {
        entries: vec![DownloadedEntry {
            started: Utc::now(),
            record_count: 3,
        }],
        corrupted: false,
    }
}

#[rstest]
#[case(EventKind::InstrumentDatalogDownload(one_entry()), Some("InstrumentDatalogClear"))]
#[case(EventKind::InstrumentAlarmEventsDownload(one_entry()), Some("InstrumentAlarmEventsClear"))]
#[case(
    EventKind::InstrumentManualOperationsDownload(one_entry()),
    Some("InstrumentManualOperationsClear")
)]
#[case(EventKind::InstrumentAlarmEventsDownload(DownloadEvent::default()), None)]
#[case(EventKind::InstrumentDataClear(ClearTarget::Datalog), None)]
#[case(
    EventKind::InstrumentFirmwareUpgrade(FirmwareUpgradeEvent { passed: true, target_version: "5.1".into() }),
    None
)]
#[case(
    EventKind::InstrumentFirmwareUpgrade(FirmwareUpgradeEvent { passed: false, target_version: "5.1".into() }),
    Some("Nothing")
)]
#[case(
    EventKind::InstrumentDiagnostic(DiagnosticEvent { interactive: false, critical_error: Some(9) }),
    Some("Nothing")
)]
#[case(EventKind::InstrumentDiagnostic(DiagnosticEvent::default()), None)]
#[case(
    EventKind::CylinderPressureReset(PressureResetEvent { post_update: false, settings_ref: None }),
    Some("SettingsRead")
)]
#[case(EventKind::Nothing, None)]
fn followup_table(#[case] kind: EventKind, #[case] expected: Option<&str>) {
    let action = EventProcessor::followup_action(&event(kind));
    assert_eq!(action.as_ref().map(DockingStationAction::name), expected);
}

fn arb_kind() -> impl Strategy<Value = EventKind> {
    prop_oneof![
        Just(EventKind::Nothing),
        (any::<bool>(), any::<bool>()).prop_map(|(reboot, has_ref)| {
            EventKind::SettingsUpdate(SettingsUpdateEvent {
                settings_ref: has_ref.then_some(3),
                reboot_required: reboot,
            })
        }),
        (any::<bool>(), any::<bool>()).prop_map(|(post_update, has_ref)| {
            EventKind::CylinderPressureReset(PressureResetEvent {
                post_update,
                settings_ref: has_ref.then_some(4),
            })
        }),
        any::<bool>().prop_map(|corrupted| {
            EventKind::InstrumentDatalogDownload(DownloadEvent {
                entries: Vec::new(),
                corrupted,
            })
        }),
        any::<bool>().prop_map(|passed| {
            EventKind::InstrumentFirmwareUpgrade(FirmwareUpgradeEvent {
                passed,
                target_version: "5.1".into(),
            })
        }),
        prop::option::of(0i32..100).prop_map(|critical_error| {
            EventKind::InstrumentDiagnostic(DiagnosticEvent {
                interactive: false,
                critical_error,
            })
        }),
    ]
}

fn arb_trigger() -> impl Strategy<Value = Trigger> {
    prop_oneof![
        Just(Trigger::Scheduled),
        Just(Trigger::Manual),
        Just(Trigger::Docked),
        Just(Trigger::Unscheduled),
    ]
}

proptest! {
    #[test]
    fn followup_is_deterministic(kind in arb_kind(), trigger in arb_trigger()) {
        let ev = event(kind).with_trigger(trigger);
        let first = EventProcessor::followup_action(&ev);
        let second = EventProcessor::followup_action(&ev.clone());
        prop_assert_eq!(first, second);
    }

    #[test]
    fn settings_update_always_has_a_followup(
        trigger in arb_trigger(),
        settings_ref in prop::option::of(1i64..1000),
    ) {
        let ev = event(EventKind::SettingsUpdate(SettingsUpdateEvent {
            settings_ref,
            reboot_required: false,
        }))
        .with_trigger(trigger);
        match EventProcessor::followup_action(&ev) {
            Some(DockingStationAction::CylinderPressureReset(reset)) => {
                prop_assert_eq!(trigger, Trigger::Scheduled);
                prop_assert_eq!(reset.settings_ref, settings_ref);
            }
            Some(DockingStationAction::SettingsRead(read)) => {
                prop_assert!(trigger != Trigger::Scheduled);
                prop_assert_eq!(read.settings_ref, settings_ref);
            }
            other => prop_assert!(false, "unexpected follow-up {:?}", other),
        }
    }
}
