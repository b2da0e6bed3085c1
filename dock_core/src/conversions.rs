//! `From` implementations bridging `dock_config` types to `dock_core` types.

use std::time::Duration;

use crate::gas::{FactoryCylinder, GasConcentration, GasType};
use crate::reporter::ReporterConfig;
use crate::service::ServiceTiming;
use crate::station::{DockingStation, Port1Restrictions};
use crate::supervisor::{DrainBudget, SupervisorTiming};
use dock_config::PoisonMode;

// ── Station ──────────────────────────────────────────────────────────────────

impl From<dock_config::Port1Cfg> for Port1Restrictions {
    fn from(c: dock_config::Port1Cfg) -> Self {
        Self {
            fresh_air: c.fresh_air,
            zero_air: c.zero_air,
        }
    }
}

/// Accepts a gas symbol ("CH4") or code ("G0021"); unknown values pass through.
fn gas_code_of(value: &str) -> String {
    let value = value.trim();
    GasType::lookup(value).map_or_else(|| value.to_string(), |g| g.code.to_string())
}

impl From<&dock_config::Config> for DockingStation {
    fn from(c: &dock_config::Config) -> Self {
        let mut station = DockingStation::new(c.station.serial_number.trim());
        station.port_count = c.station.port_count;
        station.port1_restrictions = c.station.port1_restrictions.into();
        station.combustible_bump_test_gas = if c.station.combustible_bump_test_gas.trim().is_empty()
        {
            String::new()
        } else {
            gas_code_of(&c.station.combustible_bump_test_gas)
        };
        station.use_expired_cylinders_for_bump = c.station.use_expired_cylinders_for_bump;
        station.cal_station_mode = c.station.cal_station_mode;
        station.time_zone.clone_from(&c.station.time_zone);
        station.account.clone_from(&c.account.number);
        station.activated = c.account.activated;
        station.service_mode = c.account.service_mode;
        station
            .manufacturing_accounts
            .clone_from(&c.station.manufacturing_accounts);
        station
    }
}

// ── Services ─────────────────────────────────────────────────────────────────

impl From<&dock_config::Config> for SupervisorTiming {
    fn from(c: &dock_config::Config) -> Self {
        let delayed_start = Duration::from_millis(c.services.delayed_start_ms);
        Self {
            reporter: ServiceTiming {
                idle: Duration::from_millis(c.services.reporter_idle_ms),
                delayed_start,
            },
            switch: ServiceTiming {
                idle: Duration::from_millis(c.services.switch_idle_ms),
                delayed_start,
            },
            debounce: Duration::from_millis(c.services.debounce_ms),
            drain: (&c.drain).into(),
        }
    }
}

impl From<&dock_config::DrainCfg> for DrainBudget {
    fn from(c: &dock_config::DrainCfg) -> Self {
        Self {
            retries: c.retries,
            retry: Duration::from_millis(c.retry_ms),
        }
    }
}

impl From<&dock_config::Config> for ReporterConfig {
    fn from(c: &dock_config::Config) -> Self {
        let keep_poison = match c.queue.poison {
            PoisonMode::Keep => true,
            PoisonMode::Purge => false,
            PoisonMode::Auto => cfg!(debug_assertions),
        };
        Self {
            uploader_url: c.uploader.url.clone(),
            keep_poison,
        }
    }
}

// ── Catalog ──────────────────────────────────────────────────────────────────

impl From<&dock_config::CatalogEntry> for FactoryCylinder {
    fn from(e: &dock_config::CatalogEntry) -> Self {
        Self {
            part_number: e.part_number.clone(),
            factory_id: e.factory_id,
            gases: e
                .gases
                .iter()
                .map(|(gas, ppm)| GasConcentration {
                    gas_code: gas_code_of(gas),
                    ppm: *ppm,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gas::gas_code;

    const MINIMAL: &str = r#"
[station]
serial_number = "DS-0001"
combustible_bump_test_gas = "CH4"
port1_restrictions = ["zero_air"]

[account]
number = "ACME"
activated = true

[queue]
poison = "purge"
"#;

    #[test]
    fn station_from_config() {
        let cfg = dock_config::load_toml(MINIMAL).unwrap();
        let station = DockingStation::from(&cfg);
        assert_eq!(station.serial_number, "DS-0001");
        assert_eq!(station.combustible_bump_test_gas, gas_code::CH4);
        assert!(station.port1_restrictions.zero_air_only());
        assert_eq!(station.account.as_deref(), Some("ACME"));
        assert!(station.activated);
    }

    #[test]
    fn poison_mode_maps_to_keep_flag() {
        let cfg = dock_config::load_toml(MINIMAL).unwrap();
        assert!(!ReporterConfig::from(&cfg).keep_poison);
        let mut cfg = cfg;
        cfg.queue.poison = PoisonMode::Auto;
        assert_eq!(ReporterConfig::from(&cfg).keep_poison, cfg!(debug_assertions));
    }

    #[test]
    fn catalog_symbols_become_codes() {
        let entry = dock_config::CatalogEntry {
            part_number: "1810-9155".into(),
            factory_id: 36,
            gases: vec![("CO".into(), 100.0), ("G0021".into(), 25_000.0)],
        };
        let cyl = FactoryCylinder::from(&entry);
        assert_eq!(cyl.gases[0].gas_code, gas_code::CO);
        assert_eq!(cyl.gases[1].gas_code, gas_code::CH4);
    }
}
