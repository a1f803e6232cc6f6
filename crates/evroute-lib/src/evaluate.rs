//! Simulate and rank candidate routes.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::energy::VehicleParams;
use crate::error::Result;
use crate::graph::{compare_distance, Graph};
use crate::simulate::{simulate_path, SimulationOptions, SimulationOutcome, SimulationReport};

/// Key used to order feasible candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RankBy {
    #[default]
    Time,
    Distance,
    Charges,
}

impl fmt::Display for RankBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            RankBy::Time => "time",
            RankBy::Distance => "distance",
            RankBy::Charges => "charges",
        };
        f.write_str(value)
    }
}

impl FromStr for RankBy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "time" => Ok(RankBy::Time),
            "distance" => Ok(RankBy::Distance),
            "charges" => Ok(RankBy::Charges),
            other => Err(format!("unknown ranking key '{other}'")),
        }
    }
}

/// One simulated candidate route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateEvaluation {
    /// Station ids of the candidate.
    pub route: Vec<String>,
    pub outcome: SimulationOutcome,
}

impl CandidateEvaluation {
    pub fn is_feasible(&self) -> bool {
        self.outcome.is_feasible()
    }

    pub fn report(&self) -> Option<&SimulationReport> {
        self.outcome.report()
    }
}

/// Simulate every candidate and rank them.
///
/// Every candidate is returned. Feasible candidates come first, ordered by
/// `rank_by`; infeasible ones follow in input order.
pub fn evaluate_routes(
    graph: &Graph,
    candidates: &[Vec<String>],
    vehicle: &VehicleParams,
    options: &SimulationOptions,
    rank_by: RankBy,
) -> Result<Vec<CandidateEvaluation>> {
    let mut evaluations = Vec::with_capacity(candidates.len());
    for route in candidates {
        let outcome = simulate_path(graph, route, vehicle, options)?;
        evaluations.push(CandidateEvaluation {
            route: route.clone(),
            outcome,
        });
    }
    rank_evaluations(&mut evaluations, rank_by);
    debug!(
        candidates = evaluations.len(),
        feasible = evaluations.iter().filter(|e| e.is_feasible()).count(),
        %rank_by,
        "evaluated candidate routes"
    );
    Ok(evaluations)
}

/// Stable sort putting feasible candidates first, ordered by `rank_by`.
pub fn rank_evaluations(evaluations: &mut [CandidateEvaluation], rank_by: RankBy) {
    evaluations.sort_by(|a, b| compare_evaluations(a, b, rank_by));
}

/// Ordering used by [`rank_evaluations`]: feasible before infeasible, then
/// by `rank_by`. Infeasible candidates compare equal to each other.
pub fn compare_evaluations(
    a: &CandidateEvaluation,
    b: &CandidateEvaluation,
    rank_by: RankBy,
) -> Ordering {
    match (a.report(), b.report()) {
        (Some(x), Some(y)) => compare_reports(x, y, rank_by),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn compare_reports(a: &SimulationReport, b: &SimulationReport, rank_by: RankBy) -> Ordering {
    match rank_by {
        RankBy::Time => compare_distance(a.total_time_min, b.total_time_min),
        RankBy::Distance => compare_distance(a.total_distance_km, b.total_distance_km),
        RankBy::Charges => a.charge_count().cmp(&b.charge_count()),
    }
}
