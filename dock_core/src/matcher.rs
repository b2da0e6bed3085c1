//! Gas end-point selection for calibration and bump tests.
//!
//! Every enabled sensor is scanned against the installed cylinders in port
//! order. A sensor whose gas (or the air it needs) cannot be supplied aborts
//! the whole match: a multi-sensor operation never runs partially.

use chrono::NaiveDate;

use crate::gas::{Cylinder, GasEndPoint, GasType, PressureLevel, gas_code};
use crate::instrument::{Instrument, Sensor, sensor_code};
use crate::station::{DockingStation, Port1Restrictions};

/// Highest O2 content usable for an O2 bump test, in ppm.
pub const O2_BUMP_CAP_PPM: f64 = 190_000.0;
/// Highest explosive content of any cylinder, in %LEL.
pub const LEL_CAP_PERCENT: f64 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GasOperation {
    Calibration,
    BumpTest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depletion {
    Expired,
    Empty,
}

impl Depletion {
    pub fn label(self) -> &'static str {
        match self {
            Depletion::Expired => "Expired",
            Depletion::Empty => "Empty",
        }
    }

    fn error_code(self) -> &'static str {
        match self {
            Depletion::Expired => "CylinderExpired",
            Depletion::Empty => "CylinderEmpty",
        }
    }
}

/// Result of a match. An empty `matched` list means the operation cannot run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MatchOutcome {
    pub matched: Vec<GasEndPoint>,
    pub explanation: String,
    pub explanation_codes: Vec<String>,
    pub error_codes: Vec<String>,
}

impl MatchOutcome {
    pub fn is_match(&self) -> bool {
        !self.matched.is_empty()
    }

    fn abort(what: &str, reason: &str, depletion: Option<Depletion>) -> Self {
        let mut explanation = format!("{what} unavailable");
        let mut explanation_codes = vec![what.to_string()];
        let mut error_codes = vec![reason.to_string()];
        if let Some(d) = depletion {
            explanation.push_str(&format!(" ({})", d.label()));
            explanation_codes.push(d.label().to_string());
            error_codes.push(d.error_code().to_string());
        }
        MatchOutcome {
            matched: Vec::new(),
            explanation,
            explanation_codes,
            error_codes,
        }
    }
}

/// Accumulated state of one sensor's scan.
#[derive(Debug, Default)]
struct SensorScan {
    fresh_air: bool,
    zero_air: bool,
    gas_found: bool,
    /// First expired/empty cylinder holding the required gas.
    depletion: Option<Depletion>,
    /// First expired/empty zero-air cylinder.
    air_depletion: Option<Depletion>,
    picks: Vec<usize>,
}

impl SensorScan {
    fn pick(&mut self, idx: usize, cylinders: &[GasEndPoint]) {
        let key = cylinders[idx].key();
        if !self.picks.iter().any(|&p| cylinders[p].key() == key) {
            self.picks.push(idx);
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResourceMatcher {
    port1: Port1Restrictions,
    combustible_bump_gas: Option<String>,
    use_expired_for_bump: bool,
    today: NaiveDate,
}

impl ResourceMatcher {
    pub fn new(station: &DockingStation, today: NaiveDate) -> Self {
        let configured = station.combustible_bump_test_gas.trim();
        let combustible_bump_gas = (!configured.is_empty()).then(|| {
            GasType::lookup(configured).map_or_else(|| configured.to_string(), |g| g.code.to_string())
        });
        ResourceMatcher {
            port1: station.port1_restrictions,
            combustible_bump_gas,
            use_expired_for_bump: station.use_expired_cylinders_for_bump,
            today,
        }
    }

    /// Select the cylinders for `op` on the instrument's enabled sensors,
    /// restricted to `component_codes` when that list is non-empty.
    pub fn match_resources(
        &self,
        op: GasOperation,
        component_codes: &[String],
        instrument: &Instrument,
        cylinders: &[GasEndPoint],
    ) -> MatchOutcome {
        let sensors: Vec<&Sensor> = instrument
            .sensors()
            .filter(|s| s.enabled)
            .filter(|s| component_codes.is_empty() || component_codes.contains(&s.type_code))
            .collect();
        if sensors.is_empty() {
            return MatchOutcome::abort("Sensor", "NoSensors", None);
        }

        let mut order: Vec<usize> = (0..cylinders.len()).collect();
        order.sort_by_key(|&i| cylinders[i].position);

        let mut picked: Vec<usize> = Vec::new();
        for sensor in sensors {
            let gas = self.required_gas(op, sensor);
            let scan = self.scan_sensor(op, sensor, &gas, cylinders, &order);

            if self.port1.requires_air() && !scan.fresh_air && !scan.zero_air {
                let (what, reason) = if self.port1.zero_air_only() {
                    ("Zero Air", "ZeroAirUnavailable")
                } else {
                    ("Fresh Air", "FreshAirUnavailable")
                };
                tracing::debug!(sensor = %sensor.uid, what, "no air source for sensor");
                return MatchOutcome::abort(what, reason, scan.air_depletion);
            }
            if is_co2(sensor) && !scan.zero_air {
                tracing::debug!(sensor = %sensor.uid, "CO2 sensor needs zero air");
                return MatchOutcome::abort("Zero Air", "Co2ZeroAirUnavailable", scan.air_depletion);
            }
            if !scan.gas_found {
                let symbol = GasType::symbol_for(&gas);
                tracing::debug!(sensor = %sensor.uid, gas = %gas, "required gas not found");
                return MatchOutcome::abort(symbol, "GasUnavailable", scan.depletion);
            }

            for idx in scan.picks {
                let key = cylinders[idx].key();
                if !picked.iter().any(|&p| cylinders[p].key() == key) {
                    picked.push(idx);
                }
            }
        }

        MatchOutcome {
            matched: picked.into_iter().map(|i| cylinders[i].clone()).collect(),
            ..MatchOutcome::default()
        }
    }

    /// Gas a sensor must be exposed to for `op`.
    pub fn required_gas(&self, op: GasOperation, sensor: &Sensor) -> String {
        if op == GasOperation::BumpTest {
            if sensor.type_code == sensor_code::CLO2 {
                return gas_code::CL2.to_string();
            }
            if sensor.is_combustible() {
                if let Some(g) = &self.combustible_bump_gas {
                    return g.clone();
                }
            }
        }
        sensor.cal_gas_code.clone()
    }

    fn scan_sensor(
        &self,
        op: GasOperation,
        sensor: &Sensor,
        gas: &str,
        cylinders: &[GasEndPoint],
        order: &[usize],
    ) -> SensorScan {
        let bump = op == GasOperation::BumpTest;
        let mut scan = SensorScan::default();

        for &idx in order {
            let end_point = &cylinders[idx];
            let cyl = &end_point.cylinder;
            if end_point.position == 1 && !self.port1.allows(cyl) {
                continue;
            }

            if let Some(d) = self.depletion(op, cyl) {
                if cyl.contains_gas(gas) && scan.depletion.is_none() {
                    scan.depletion = Some(d);
                }
                if cyl.is_zero_air() && scan.air_depletion.is_none() {
                    scan.air_depletion = Some(d);
                }
                continue;
            }

            if cyl.is_fresh_air() || cyl.is_zero_air() {
                scan.fresh_air |= cyl.is_fresh_air();
                scan.zero_air |= cyl.is_zero_air();
                scan.pick(idx, cylinders);
            }

            let has_gas = cyl.contains_gas(gas)
                || (sensor.is_o2() && !bump && cyl.is_fresh_air())
                || (sensor.is_o2() && bump && cyl.is_pure_nitrogen());
            if !has_gas || exceeds_safety_caps(op, sensor, cyl) {
                continue;
            }
            scan.gas_found = true;
            scan.pick(idx, cylinders);
        }

        if scan.gas_found {
            scan.depletion = None;
        }
        scan
    }

    fn depletion(&self, op: GasOperation, cyl: &Cylinder) -> Option<Depletion> {
        let expired_allowed = op == GasOperation::BumpTest && self.use_expired_for_bump;
        if cyl.is_expired(self.today) && !expired_allowed {
            Some(Depletion::Expired)
        } else if cyl.pressure == PressureLevel::Empty {
            Some(Depletion::Empty)
        } else {
            None
        }
    }
}

fn is_co2(sensor: &Sensor) -> bool {
    sensor.type_code == sensor_code::CO2 || sensor.cal_gas_code == gas_code::CO2
}

fn exceeds_safety_caps(op: GasOperation, sensor: &Sensor, cyl: &Cylinder) -> bool {
    if op == GasOperation::BumpTest
        && sensor.is_o2()
        && cyl.concentration(gas_code::O2).is_some_and(|ppm| ppm > O2_BUMP_CAP_PPM)
    {
        return true;
    }
    cyl.gases.iter().any(|g| {
        GasType::find(&g.gas_code)
            .is_some_and(|t| t.lel_multiplier > 0.0 && g.ppm * t.lel_multiplier > LEL_CAP_PERCENT)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gas::{Cylinder, GasConcentration, ZERO_AIR_PART};
    use crate::instrument::InstalledComponent;

    fn cylinder(part: &str, gases: &[(&str, f64)]) -> Cylinder {
        Cylinder {
            part_number: part.to_string(),
            factory_id: None,
            expiration_date: None,
            pressure: PressureLevel::Full,
            gases: gases
                .iter()
                .map(|(code, ppm)| GasConcentration {
                    gas_code: (*code).to_string(),
                    ppm: *ppm,
                })
                .collect(),
        }
    }

    fn instrument(sensors: Vec<Sensor>) -> Instrument {
        Instrument {
            serial_number: "INS-1".into(),
            firmware_version: "1.0".into(),
            components: sensors.into_iter().map(InstalledComponent::Sensor).collect(),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, 1).unwrap()
    }

    #[test]
    fn co_calibration_uses_fresh_air_and_co_cylinder() {
        let station = DockingStation::new("DS");
        let matcher = ResourceMatcher::new(&station, today());
        let ins = instrument(vec![Sensor::new("co", "S0001", gas_code::CO)]);
        let cyls = vec![
            GasEndPoint::new(1, Cylinder::fresh_air()),
            GasEndPoint::new(2, cylinder("1810-0001", &[(gas_code::CO, 100.0)])),
        ];
        let out = matcher.match_resources(GasOperation::Calibration, &[], &ins, &cyls);
        assert_eq!(out.matched.len(), 2);
        assert!(out.explanation.is_empty());
    }

    #[test]
    fn missing_air_names_fresh_air() {
        let station = DockingStation::new("DS");
        let matcher = ResourceMatcher::new(&station, today());
        let ins = instrument(vec![Sensor::new("co", "S0001", gas_code::CO)]);
        let cyls = vec![GasEndPoint::new(2, cylinder("1810-0001", &[(gas_code::CO, 100.0)]))];
        let out = matcher.match_resources(GasOperation::Calibration, &[], &ins, &cyls);
        assert!(!out.is_match());
        assert!(out.explanation.contains("Fresh Air"));
    }

    #[test]
    fn zero_air_only_restriction_names_zero_air() {
        let mut station = DockingStation::new("DS");
        station.port1_restrictions = Port1Restrictions {
            fresh_air: false,
            zero_air: true,
        };
        let matcher = ResourceMatcher::new(&station, today());
        let ins = instrument(vec![Sensor::new("co", "S0001", gas_code::CO)]);
        let cyls = vec![
            GasEndPoint::new(1, Cylinder::fresh_air()),
            GasEndPoint::new(2, cylinder("1810-0001", &[(gas_code::CO, 100.0)])),
        ];
        let out = matcher.match_resources(GasOperation::Calibration, &[], &ins, &cyls);
        assert!(!out.is_match());
        assert_eq!(out.explanation_codes[0], "Zero Air");
    }

    #[test]
    fn co2_sensor_requires_zero_air() {
        let station = DockingStation::new("DS");
        let matcher = ResourceMatcher::new(&station, today());
        let ins = instrument(vec![Sensor::new("co2", sensor_code::CO2, gas_code::CO2)]);
        let mut cyls = vec![
            GasEndPoint::new(1, Cylinder::fresh_air()),
            GasEndPoint::new(2, cylinder("1810-0018", &[(gas_code::CO2, 5000.0)])),
        ];
        let out = matcher.match_resources(GasOperation::Calibration, &[], &ins, &cyls);
        assert_eq!(out.error_codes[0], "Co2ZeroAirUnavailable");

        cyls.push(GasEndPoint::new(3, cylinder(ZERO_AIR_PART, &[])));
        let out = matcher.match_resources(GasOperation::Calibration, &[], &ins, &cyls);
        assert!(out.is_match());
    }

    #[test]
    fn depleted_cylinder_is_forgiven_when_gas_found_elsewhere() {
        let station = DockingStation::new("DS");
        let matcher = ResourceMatcher::new(&station, today());
        let ins = instrument(vec![Sensor::new("h2s", "S0002", gas_code::H2S)]);
        let mut empty = cylinder("1810-0002", &[(gas_code::H2S, 25.0)]);
        empty.pressure = PressureLevel::Empty;
        let cyls = vec![
            GasEndPoint::new(1, Cylinder::fresh_air()),
            GasEndPoint::new(2, empty),
            GasEndPoint::new(3, cylinder("1810-0002", &[(gas_code::H2S, 25.0)])),
        ];
        let out = matcher.match_resources(GasOperation::Calibration, &[], &ins, &cyls);
        assert!(out.is_match());
        assert_eq!(out.matched.iter().map(|g| g.position).collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn expired_override_applies_to_bump_only() {
        let mut station = DockingStation::new("DS");
        station.use_expired_cylinders_for_bump = true;
        let matcher = ResourceMatcher::new(&station, today());
        let ins = instrument(vec![Sensor::new("co", "S0001", gas_code::CO)]);
        let mut expired = cylinder("1810-0001", &[(gas_code::CO, 100.0)]);
        expired.expiration_date = today().pred_opt();
        let cyls = vec![
            GasEndPoint::new(1, Cylinder::fresh_air()),
            GasEndPoint::new(2, expired),
        ];
        assert!(matcher.match_resources(GasOperation::BumpTest, &[], &ins, &cyls).is_match());
        let cal = matcher.match_resources(GasOperation::Calibration, &[], &ins, &cyls);
        assert!(!cal.is_match());
        assert!(cal.explanation.contains("Expired"));
    }

    #[test]
    fn clo2_bump_uses_chlorine() {
        let station = DockingStation::new("DS");
        let matcher = ResourceMatcher::new(&station, today());
        let sensor = Sensor::new("clo2", sensor_code::CLO2, gas_code::CLO2);
        assert_eq!(matcher.required_gas(GasOperation::BumpTest, &sensor), gas_code::CL2);
        assert_eq!(matcher.required_gas(GasOperation::Calibration, &sensor), gas_code::CLO2);
    }

    #[test]
    fn component_filter_limits_sensors() {
        let station = DockingStation::new("DS");
        let matcher = ResourceMatcher::new(&station, today());
        let ins = instrument(vec![
            Sensor::new("co", "S0001", gas_code::CO),
            Sensor::new("h2s", "S0002", gas_code::H2S),
        ]);
        let cyls = vec![
            GasEndPoint::new(1, Cylinder::fresh_air()),
            GasEndPoint::new(2, cylinder("1810-0001", &[(gas_code::CO, 100.0)])),
        ];
        assert!(!matcher.match_resources(GasOperation::Calibration, &[], &ins, &cyls).is_match());
        let only_co = vec!["S0001".to_string()];
        assert!(matcher.match_resources(GasOperation::Calibration, &only_co, &ins, &cyls).is_match());
    }
}
