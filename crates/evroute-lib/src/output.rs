use std::fmt::Write;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::planner::{RouteSource, TripPlan, Waypoint};
use crate::search::ChargingEvent;
use crate::simulate::SimulationReport;

/// Classifies the command that produced a trip summary.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SummaryKind {
    Route,
    Simulation,
}

impl SummaryKind {
    /// Human-readable label shown in textual renderings.
    pub fn label(self) -> &'static str {
        match self {
            SummaryKind::Route => "Route",
            SummaryKind::Simulation => "Simulation",
        }
    }
}

/// Presentation style for turning a [`TripSummary`] into text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    PlainText,
    RichText,
}

/// What happens at a summary step.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    Drive,
    Charge,
}

/// Endpoint within a summarised trip.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SummaryEndpoint {
    pub id: String,
    pub name: String,
}

/// Step of a summarised trip.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SummaryStep {
    pub index: usize,
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub action: StepAction,
}

/// Structured representation of a trip that higher-level consumers can serialise.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TripSummary {
    pub kind: SummaryKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<RouteSource>,
    pub start: SummaryEndpoint,
    pub goal: SummaryEndpoint,
    pub steps: Vec<SummaryStep>,
    pub total_distance_km: f64,
    pub total_driving_min: f64,
    pub total_charging_min: f64,
    pub total_time_min: f64,
    pub final_soc: f64,
    pub charges: Vec<ChargingEvent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

/// Note attached when the totals come from the search instead of a simulation.
pub const UNSIMULATED_NOTE: &str =
    "battery simulation rejected this route; totals come from the graph search";

impl TripSummary {
    /// Convert a [`TripPlan`] into a summary.
    pub fn from_plan(plan: &TripPlan) -> Result<Self> {
        let mut summary = Self::from_report(SummaryKind::Route, &plan.waypoints, &plan.report)?;
        summary.source = Some(plan.source);
        if !plan.simulation_feasible {
            summary.notes.push(UNSIMULATED_NOTE.to_string());
        }
        Ok(summary)
    }

    /// Summarise a simulation over the given waypoints.
    pub fn from_report(
        kind: SummaryKind,
        waypoints: &[Waypoint],
        report: &SimulationReport,
    ) -> Result<Self> {
        let (Some(first), Some(last)) = (waypoints.first(), waypoints.last()) else {
            return Err(Error::EmptyRoute);
        };

        let mut steps = Vec::with_capacity(waypoints.len() + report.charges.len());
        let mut pending = report.charges.iter().peekable();
        for waypoint in waypoints {
            steps.push(step(steps.len(), waypoint, StepAction::Drive));
            while pending
                .peek()
                .is_some_and(|charge| {
                    charge.station_id == waypoint.id && charge.detour_km.is_none()
                })
            {
                pending.next();
                steps.push(step(steps.len(), waypoint, StepAction::Charge));
            }
        }

        Ok(Self {
            kind,
            source: None,
            start: endpoint(first),
            goal: endpoint(last),
            steps,
            total_distance_km: report.total_distance_km,
            total_driving_min: report.total_driving_min,
            total_charging_min: report.total_charging_min,
            total_time_min: report.total_time_min,
            final_soc: report.final_soc,
            charges: report.charges.clone(),
            notes: Vec::new(),
        })
    }

    /// Render the summary using the requested textual mode.
    pub fn render(&self, mode: RenderMode) -> String {
        match mode {
            RenderMode::PlainText => self.render_plain(),
            RenderMode::RichText => self.render_rich(),
        }
    }

    fn render_plain(&self) -> String {
        let mut buffer = String::new();
        let _ = writeln!(
            buffer,
            "{}: {} -> {} ({:.1} km, {:.1} min, {} charging stops)",
            self.kind.label(),
            self.start.name,
            self.goal.name,
            self.total_distance_km,
            self.total_time_min,
            self.charges.len()
        );
        for step in &self.steps {
            let marker = match step.action {
                StepAction::Drive => "",
                StepAction::Charge => " [charge]",
            };
            let _ = writeln!(buffer, "{:>3}: {} ({}){}", step.index, step.name, step.id, marker);
        }
        let _ = writeln!(
            buffer,
            "Driving {:.1} min, charging {:.1} min, arrival SOC {:.1}%",
            self.total_driving_min, self.total_charging_min, self.final_soc
        );
        for charge in &self.charges {
            let _ = write!(
                buffer,
                "  charge at {}: {:.1}% -> {:.1}% in {:.1} min",
                charge.station_id, charge.arrival_soc, charge.departure_soc, charge.charge_minutes
            );
            if let Some(detour) = charge.detour_km {
                let _ = write!(buffer, " (detour {detour:.2} km)");
            }
            let _ = writeln!(buffer);
        }
        for note in &self.notes {
            let _ = writeln!(buffer, "Note: {note}");
        }
        buffer
    }

    fn render_rich(&self) -> String {
        let mut buffer = String::new();
        let _ = writeln!(
            buffer,
            "**{}**: _{} to {}_ ({:.1} km, {:.1} min)",
            self.kind.label(),
            self.start.name,
            self.goal.name,
            self.total_distance_km,
            self.total_time_min
        );
        for step in &self.steps {
            let label = match step.action {
                StepAction::Drive => "",
                StepAction::Charge => " :zap:",
            };
            let _ = writeln!(
                buffer,
                "* {:>2}. **{}** (`{}`){}",
                step.index, step.name, step.id, label
            );
        }
        if !self.charges.is_empty() {
            let _ = writeln!(buffer, "\n| Station | Arrive | Depart | Minutes |");
            let _ = writeln!(buffer, "|---|---|---|---|");
            for charge in &self.charges {
                let _ = writeln!(
                    buffer,
                    "| `{}` | {:.1}% | {:.1}% | {:.1} |",
                    charge.station_id,
                    charge.arrival_soc,
                    charge.departure_soc,
                    charge.charge_minutes
                );
            }
        }
        for note in &self.notes {
            let _ = writeln!(buffer, "\n> {note}");
        }
        buffer
    }
}

fn step(index: usize, waypoint: &Waypoint, action: StepAction) -> SummaryStep {
    SummaryStep {
        index,
        id: waypoint.id.clone(),
        name: waypoint.name.clone(),
        lat: waypoint.coordinate.lat,
        lon: waypoint.coordinate.lon,
        action,
    }
}

fn endpoint(waypoint: &Waypoint) -> SummaryEndpoint {
    SummaryEndpoint {
        id: waypoint.id.clone(),
        name: waypoint.name.clone(),
    }
}
