//! Battery energy model.
//!
//! Pure conversions between distance, energy, state of charge and charging
//! time, plus the [`VehicleParams`] record that carries the per-call vehicle
//! configuration through search and simulation.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Vehicle configuration supplied once per planning call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehicleParams {
    /// Energy consumption in kWh per 100 km.
    pub consumption_kwh_per_100km: f64,
    /// Usable battery capacity in kWh.
    pub battery_kwh_max: f64,
    /// State of charge at departure, in percent.
    pub start_soc_percent: f64,
    /// SOC floor that a regular hop must not cross, in percent.
    pub safe_soc_percent: f64,
    /// SOC the vehicle charges up to at a charging stop, in percent.
    pub charge_target_percent: f64,
    /// Assumed average driving speed in km/h.
    pub avg_speed_kmh: f64,
}

impl Default for VehicleParams {
    fn default() -> Self {
        Self {
            consumption_kwh_per_100km: 16.3,
            battery_kwh_max: 60.0,
            start_soc_percent: 50.0,
            safe_soc_percent: 20.0,
            charge_target_percent: 80.0,
            avg_speed_kmh: 60.0,
        }
    }
}

impl VehicleParams {
    /// Validate the vehicle configuration.
    pub fn validate(&self) -> Result<()> {
        positive("consumption_kwh_per_100km", self.consumption_kwh_per_100km)?;
        positive("battery_kwh_max", self.battery_kwh_max)?;
        positive("avg_speed_kmh", self.avg_speed_kmh)?;
        percent("start_soc_percent", self.start_soc_percent)?;
        percent("safe_soc_percent", self.safe_soc_percent)?;
        percent("charge_target_percent", self.charge_target_percent)?;
        Ok(())
    }

    /// SOC percentage consumed by driving `distance_km`.
    pub fn percent_for_distance(&self, distance_km: f64) -> f64 {
        percent_from_kwh(
            energy_needed(distance_km, self.consumption_kwh_per_100km),
            self.battery_kwh_max,
        )
    }

    /// Distance in km covered by `percent` of the battery.
    pub fn range_km(&self, percent: f64) -> f64 {
        km_from_percent(
            percent,
            self.battery_kwh_max,
            self.consumption_kwh_per_100km,
        )
    }

    /// Driving time in minutes for `distance_km` at the assumed average speed.
    pub fn drive_minutes(&self, distance_km: f64) -> f64 {
        drive_minutes(distance_km, self.avg_speed_kmh)
    }

    /// Minutes needed to charge from `from_percent` to `to_percent` at `power_kw`.
    ///
    /// The caller must have checked `power_kw` with [`usable_power`].
    pub fn charge_minutes_between(&self, power_kw: f64, from_percent: f64, to_percent: f64) -> f64 {
        let delta_kwh = self.battery_kwh_max * (to_percent - from_percent).max(0.0) / 100.0;
        charge_minutes(power_kw, delta_kwh)
    }
}

fn positive(field: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(Error::InvalidVehicle {
            message: format!("{field} must be finite and positive, got {value}"),
        });
    }
    Ok(())
}

fn percent(field: &str, value: f64) -> Result<()> {
    if !value.is_finite() || !(0.0..=100.0).contains(&value) {
        return Err(Error::InvalidVehicle {
            message: format!("{field} must be between 0 and 100, got {value}"),
        });
    }
    Ok(())
}

/// Energy in kWh required to drive `distance_km`.
pub fn energy_needed(distance_km: f64, consumption_kwh_per_100km: f64) -> f64 {
    distance_km * consumption_kwh_per_100km / 100.0
}

/// Express `kwh` as a percentage of `battery_kwh_max`.
pub fn percent_from_kwh(kwh: f64, battery_kwh_max: f64) -> f64 {
    kwh / battery_kwh_max * 100.0
}

/// Distance in km that `percent` of the battery covers.
pub fn km_from_percent(percent: f64, battery_kwh_max: f64, consumption_kwh_per_100km: f64) -> f64 {
    let kwh = battery_kwh_max * percent / 100.0;
    kwh / consumption_kwh_per_100km * 100.0
}

/// Minutes needed to deliver `delta_kwh` at `power_kw`.
///
/// Undefined for non-positive power; filter stations through [`usable_power`]
/// before calling.
pub fn charge_minutes(power_kw: f64, delta_kwh: f64) -> f64 {
    delta_kwh / power_kw * 60.0
}

/// Driving time in minutes for `distance_km` at `speed_kmh`.
pub fn drive_minutes(distance_km: f64, speed_kmh: f64) -> f64 {
    distance_km / speed_kmh * 60.0
}

/// Return the charging power if it can be used for charging.
pub fn usable_power(power_kw: Option<f64>) -> Option<f64> {
    power_kw.filter(|p| p.is_finite() && *p > 0.0)
}
