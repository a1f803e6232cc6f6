//! Replay a route against battery physics.
//!
//! Two granularities share one per-segment decision procedure:
//!
//! - [`simulate_path`] replays a sequence of station ids.
//! - [`simulate_polyline`] replays raw coordinates, such as a road polyline.
//!   Polyline points are not graph nodes, so detour searches run against a
//!   private snapshot of the graph with a temporary virtual node inserted at
//!   the current point for exactly one segment.
//!
//! Before each segment the simulator charges when the segment would leave the
//! battery below the safe floor. It first tries the station it is standing
//! at, then a round-trip detour to the nearby charger with the lowest added
//! time. The floor is soft: if no charge is possible the segment is still
//! driven as long as the battery does not run empty.

use std::fmt;

use serde::Serialize;
use tracing::{debug, warn};

use crate::energy::{usable_power, VehicleParams};
use crate::error::{Error, Result};
use crate::geo::Coordinate;
use crate::graph::{Graph, NodeId, VirtualNodeOptions};
use crate::search::{ChargingEvent, SOC_EPSILON};
use crate::services::RoadRouter;

/// Prefix of the temporary node inserted for polyline detour searches.
pub const CURRENT_POSITION_KEY: &str = "CUR_TMP";

/// Tolerance below zero before a battery is considered depleted.
const DEPLETED_EPSILON: f64 = 1e-6;

/// Options for detour selection during simulation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationOptions {
    /// Maximum number of chargers considered per detour search.
    pub nearby_k: usize,
    /// Straight-line radius for detour candidates.
    pub nearby_radius_km: f64,
    /// Attachment of the temporary position node in polyline mode.
    pub virtual_node: VirtualNodeOptions,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            nearby_k: 5,
            nearby_radius_km: 100.0,
            virtual_node: VirtualNodeOptions {
                k_neighbors: 6,
                max_dist_km: 200.0,
            },
        }
    }
}

/// Battery state across one driven segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentTrace {
    pub from: String,
    pub to: String,
    pub distance_km: f64,
    pub soc_before: f64,
    pub soc_after: f64,
}

/// Totals and trace of a feasible simulation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SimulationReport {
    pub total_distance_km: f64,
    pub total_driving_min: f64,
    pub total_charging_min: f64,
    pub total_time_min: f64,
    pub final_soc: f64,
    pub charges: Vec<ChargingEvent>,
    /// Road geometries of detours, when a road router supplied them.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub detour_geometries: Vec<Vec<Coordinate>>,
    pub segments: Vec<SegmentTrace>,
}

impl SimulationReport {
    pub fn charge_count(&self) -> usize {
        self.charges.len()
    }
}

/// Why a simulation failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InfeasibleReason {
    /// Nothing to simulate.
    EmptyRoute,
    /// The segment needs more energy than the battery holds and no charge
    /// could make up the difference.
    NoDetourAvailable,
    /// The battery went negative while driving.
    BatteryDepleted,
}

impl fmt::Display for InfeasibleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            InfeasibleReason::EmptyRoute => "route is empty",
            InfeasibleReason::NoDetourAvailable => "no reachable charger can cover the segment",
            InfeasibleReason::BatteryDepleted => "battery depleted",
        };
        f.write_str(value)
    }
}

/// Result of a simulation: feasible with a full report, or infeasible with
/// no partial route.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SimulationOutcome {
    Feasible(SimulationReport),
    Infeasible {
        segment_index: usize,
        reason: InfeasibleReason,
    },
}

impl SimulationOutcome {
    pub fn is_feasible(&self) -> bool {
        matches!(self, SimulationOutcome::Feasible(_))
    }

    pub fn report(&self) -> Option<&SimulationReport> {
        match self {
            SimulationOutcome::Feasible(report) => Some(report),
            SimulationOutcome::Infeasible { .. } => None,
        }
    }

    pub fn into_report(self) -> Option<SimulationReport> {
        match self {
            SimulationOutcome::Feasible(report) => Some(report),
            SimulationOutcome::Infeasible { .. } => None,
        }
    }
}

/// Replay a sequence of station ids.
///
/// Segment lengths are straight-line distances between consecutive stations;
/// detour legs use graph shortest paths. Unknown station ids are an error.
pub fn simulate_path(
    graph: &Graph,
    station_ids: &[String],
    vehicle: &VehicleParams,
    options: &SimulationOptions,
) -> Result<SimulationOutcome> {
    let mut nodes = Vec::with_capacity(station_ids.len());
    for id in station_ids {
        let node = graph.node_id(id).ok_or_else(|| Error::UnknownStation {
            name: id.clone(),
            suggestions: Vec::new(),
        })?;
        nodes.push(node);
    }
    Ok(simulate_nodes(graph, &nodes, vehicle, options))
}

/// Replay a sequence of graph nodes. See [`simulate_path`].
pub fn simulate_nodes(
    graph: &Graph,
    nodes: &[NodeId],
    vehicle: &VehicleParams,
    options: &SimulationOptions,
) -> SimulationOutcome {
    if nodes.is_empty() {
        return SimulationOutcome::Infeasible {
            segment_index: 0,
            reason: InfeasibleReason::EmptyRoute,
        };
    }

    let mut run = Run::new(vehicle, options, None);
    for (index, pair) in nodes.windows(2).enumerate() {
        let (Some(from), Some(to)) = (graph.node(pair[0]), graph.node(pair[1])) else {
            return SimulationOutcome::Infeasible {
                segment_index: index,
                reason: InfeasibleReason::NoDetourAvailable,
            };
        };
        let distance = from.coordinate.distance_to(&to.coordinate);
        let need = vehicle.percent_for_distance(distance);

        if run.needs_charge(need) {
            let charged_here = usable_power(from.power_kw)
                .map(|power_kw| run.charge_in_place(&from.key, power_kw, need))
                .unwrap_or(false);
            if !charged_here && run.needs_charge(need) {
                if let Some(detour) = run.best_detour(graph, from.id, from.coordinate) {
                    run.apply_detour(detour);
                }
            }
            if need > run.soc {
                debug!(segment = index, from = %from.key, to = %to.key, "segment unreachable");
                return SimulationOutcome::Infeasible {
                    segment_index: index,
                    reason: InfeasibleReason::NoDetourAvailable,
                };
            }
        }

        if let Err(reason) = run.drive(&from.key, &to.key, distance) {
            return SimulationOutcome::Infeasible {
                segment_index: index,
                reason,
            };
        }
    }
    SimulationOutcome::Feasible(run.finish())
}

/// Replay an arbitrary polyline.
///
/// The caller's graph is never modified: detour searches run on a snapshot.
/// When `router` is given, detour legs are requested from it, falling back to
/// graph distances for candidates the router cannot serve.
pub fn simulate_polyline(
    graph: &Graph,
    points: &[Coordinate],
    vehicle: &VehicleParams,
    options: &SimulationOptions,
    router: Option<&dyn RoadRouter>,
) -> Result<SimulationOutcome> {
    if points.is_empty() {
        return Ok(SimulationOutcome::Infeasible {
            segment_index: 0,
            reason: InfeasibleReason::EmptyRoute,
        });
    }

    let mut snapshot = graph.clone();
    let mut run = Run::new(vehicle, options, router);
    let mut counter = 0usize;

    for (index, pair) in points.windows(2).enumerate() {
        let (from, to) = (pair[0], pair[1]);
        let distance = from.distance_to(&to);
        let need = vehicle.percent_for_distance(distance);

        if run.needs_charge(need) {
            let key = snapshot.unique_node_key(&format!("{CURRENT_POSITION_KEY}_{counter}"));
            counter += 1;
            let detour = snapshot.with_virtual_node(
                &key,
                from,
                &options.virtual_node,
                |scratch, id| run.best_detour(scratch, id, from),
            )?;
            if let Some(detour) = detour {
                run.apply_detour(detour);
            }
            if need > run.soc {
                debug!(segment = index, %from, %to, "polyline segment unreachable");
                return Ok(SimulationOutcome::Infeasible {
                    segment_index: index,
                    reason: InfeasibleReason::NoDetourAvailable,
                });
            }
        }

        if let Err(reason) = run.drive(&from.to_string(), &to.to_string(), distance) {
            return Ok(SimulationOutcome::Infeasible {
                segment_index: index,
                reason,
            });
        }
    }
    Ok(SimulationOutcome::Feasible(run.finish()))
}

#[derive(Debug)]
struct Detour {
    station_id: String,
    /// One-way leg length.
    leg_km: f64,
    arrival_soc: f64,
    target_soc: f64,
    charge_minutes: f64,
    geometry: Option<Vec<Coordinate>>,
}

struct Run<'a> {
    vehicle: &'a VehicleParams,
    options: &'a SimulationOptions,
    router: Option<&'a dyn RoadRouter>,
    soc: f64,
    report: SimulationReport,
}

impl<'a> Run<'a> {
    fn new(
        vehicle: &'a VehicleParams,
        options: &'a SimulationOptions,
        router: Option<&'a dyn RoadRouter>,
    ) -> Self {
        Self {
            vehicle,
            options,
            router,
            soc: vehicle.start_soc_percent,
            report: SimulationReport::default(),
        }
    }

    fn needs_charge(&self, need: f64) -> bool {
        need > self.soc || self.soc - need < self.vehicle.safe_soc_percent - SOC_EPSILON
    }

    /// Charge at the current station. Returns whether SOC increased.
    fn charge_in_place(&mut self, station_id: &str, power_kw: f64, need: f64) -> bool {
        let target = (self.vehicle.safe_soc_percent + need)
            .max(self.soc)
            .min(self.vehicle.charge_target_percent);
        if target <= self.soc + SOC_EPSILON {
            return false;
        }
        let minutes = self.vehicle.charge_minutes_between(power_kw, self.soc, target);
        self.report.charges.push(ChargingEvent {
            station_id: station_id.to_string(),
            arrival_soc: self.soc,
            departure_soc: target,
            charge_minutes: minutes,
            detour_km: None,
            detour_geometry: None,
        });
        self.report.total_charging_min += minutes;
        self.soc = target;
        true
    }

    /// Pick the round-trip detour with the lowest added time that leaves the
    /// vehicle with more charge than it has now.
    fn best_detour(
        &self,
        graph: &Graph,
        origin: NodeId,
        origin_coord: Coordinate,
    ) -> Option<Detour> {
        let candidates: Vec<NodeId> = graph
            .nodes_within(origin_coord, self.options.nearby_radius_km, Some(origin))
            .into_iter()
            .filter(|(id, _)| graph.node(*id).is_some_and(|n| !n.is_virtual))
            .take(self.options.nearby_k)
            .map(|(id, _)| id)
            .collect();

        let mut graph_paths = graph.shortest_paths(origin, &candidates);
        let mut best: Option<(f64, Detour)> = None;

        for candidate in candidates {
            let Some(station) = graph.node(candidate) else {
                continue;
            };
            let Some(power_kw) = usable_power(station.power_kw) else {
                continue;
            };
            let graph_km = graph_paths.remove(&candidate).map(|p| p.distance_km);
            let Some((leg_km, geometry)) =
                self.detour_leg(origin_coord, station.coordinate, graph_km)
            else {
                debug!(station = %station.key, "detour candidate unreachable");
                continue;
            };

            let need = self.vehicle.percent_for_distance(leg_km);
            if need > self.soc {
                continue;
            }
            let arrival_soc = self.soc - need;
            let target_soc = self.vehicle.charge_target_percent;
            if target_soc - need <= self.soc + SOC_EPSILON {
                continue;
            }

            let charge_minutes = self
                .vehicle
                .charge_minutes_between(power_kw, arrival_soc, target_soc);
            let added = 2.0 * self.vehicle.drive_minutes(leg_km) + charge_minutes;
            if best.as_ref().map(|(cost, _)| added < *cost).unwrap_or(true) {
                best = Some((
                    added,
                    Detour {
                        station_id: station.key.clone(),
                        leg_km,
                        arrival_soc,
                        target_soc,
                        charge_minutes,
                        geometry,
                    },
                ));
            }
        }

        best.map(|(_, detour)| detour)
    }

    fn detour_leg(
        &self,
        from: Coordinate,
        to: Coordinate,
        graph_km: Option<f64>,
    ) -> Option<(f64, Option<Vec<Coordinate>>)> {
        if let Some(router) = self.router {
            match router.routes(from, to, false) {
                Ok(routes) => {
                    if let Some(route) = routes.into_iter().next() {
                        return Some((route.distance_km, Some(route.points)));
                    }
                    warn!(%from, %to, "road router returned no detour route; using graph distance");
                }
                Err(err) => {
                    warn!(%from, %to, error = %err, "road router failed; using graph distance");
                }
            }
        }
        graph_km.map(|km| (km, None))
    }

    fn apply_detour(&mut self, detour: Detour) {
        let round_trip_km = 2.0 * detour.leg_km;
        let return_need = self.vehicle.percent_for_distance(detour.leg_km);
        self.report.total_distance_km += round_trip_km;
        self.report.total_driving_min += self.vehicle.drive_minutes(round_trip_km);
        self.report.total_charging_min += detour.charge_minutes;
        if let Some(geometry) = &detour.geometry {
            self.report.detour_geometries.push(geometry.clone());
        }
        debug!(
            station = %detour.station_id,
            detour_km = round_trip_km,
            charge_minutes = detour.charge_minutes,
            "inserted charging detour"
        );
        self.report.charges.push(ChargingEvent {
            station_id: detour.station_id,
            arrival_soc: detour.arrival_soc,
            departure_soc: detour.target_soc,
            charge_minutes: detour.charge_minutes,
            detour_km: Some(round_trip_km),
            detour_geometry: detour.geometry,
        });
        self.soc = detour.target_soc - return_need;
    }

    fn drive(
        &mut self,
        from: &str,
        to: &str,
        distance_km: f64,
    ) -> std::result::Result<(), InfeasibleReason> {
        let soc_before = self.soc;
        self.soc -= self.vehicle.percent_for_distance(distance_km);
        if self.soc < -DEPLETED_EPSILON {
            return Err(InfeasibleReason::BatteryDepleted);
        }
        self.report.total_distance_km += distance_km;
        self.report.total_driving_min += self.vehicle.drive_minutes(distance_km);
        self.report.segments.push(SegmentTrace {
            from: from.to_string(),
            to: to.to_string(),
            distance_km,
            soc_before,
            soc_after: self.soc,
        });
        Ok(())
    }

    fn finish(mut self) -> SimulationReport {
        self.report.total_time_min = self.report.total_driving_min + self.report.total_charging_min;
        self.report.final_soc = self.soc;
        self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{build_graph, GraphBuildOptions};
    use crate::station::Station;

    fn graph(stations: &[Station]) -> Graph {
        build_graph(stations, &GraphBuildOptions::default())
    }

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_route_is_infeasible() {
        let g = graph(&[Station::new("A", "A", 0.0, 0.0, None)]);
        let outcome =
            simulate_path(&g, &[], &VehicleParams::default(), &SimulationOptions::default())
                .expect("simulated");
        assert_eq!(
            outcome,
            SimulationOutcome::Infeasible {
                segment_index: 0,
                reason: InfeasibleReason::EmptyRoute
            }
        );
    }

    #[test]
    fn unknown_station_is_an_error() {
        let g = graph(&[Station::new("A", "A", 0.0, 0.0, None)]);
        let err = simulate_path(
            &g,
            &ids(&["A", "Z"]),
            &VehicleParams::default(),
            &SimulationOptions::default(),
        )
            .unwrap_err();
        assert!(matches!(err, Error::UnknownStation { name, .. } if name == "Z"));
    }

    #[test]
    fn charges_in_place_when_floor_would_be_crossed() {
        // ~111 km needs ~30.2 %; 40 % start leaves ~9.8 %.
        let g = graph(&[
            Station::new("A", "A", 0.0, 0.0, Some(60.0)),
            Station::new("B", "B", 0.0, 1.0, None),
        ]);
        let vehicle = VehicleParams {
            start_soc_percent: 40.0,
            ..VehicleParams::default()
        };
        let report = simulate_path(&g, &ids(&["A", "B"]), &vehicle, &SimulationOptions::default())
            .expect("simulated")
            .into_report()
            .expect("feasible");
        assert_eq!(report.charge_count(), 1);
        let charge = &report.charges[0];
        assert_eq!(charge.station_id, "A");
        assert!(charge.detour_km.is_none());
        assert!((report.final_soc - vehicle.safe_soc_percent).abs() < 1e-6);
        assert!(
            (report.total_time_min - report.total_driving_min - report.total_charging_min).abs()
                < 1e-9
        );
    }

    #[test]
    fn soft_floor_keeps_driving_without_charger() {
        let g = graph(&[
            Station::new("A", "A", 0.0, 0.0, None),
            Station::new("B", "B", 0.0, 1.0, None),
        ]);
        let vehicle = VehicleParams {
            start_soc_percent: 40.0,
            ..VehicleParams::default()
        };
        let report = simulate_path(&g, &ids(&["A", "B"]), &vehicle, &SimulationOptions::default())
            .expect("simulated")
            .into_report()
            .expect("feasible below floor");
        assert!(report.final_soc > 0.0 && report.final_soc < vehicle.safe_soc_percent);
        assert!(report.charges.is_empty());
    }

    #[test]
    fn detours_to_nearby_charger_as_round_trip() {
        // Charger C is ~11 km off the start; A has no power.
        let g = graph(&[
            Station::new("A", "A", 0.0, 0.0, None),
            Station::new("B", "B", 0.0, 1.0, None),
            Station::new("C", "C", 0.1, 0.0, Some(50.0)),
        ]);
        let vehicle = VehicleParams {
            start_soc_percent: 40.0,
            ..VehicleParams::default()
        };
        let report = simulate_path(&g, &ids(&["A", "B"]), &vehicle, &SimulationOptions::default())
            .expect("simulated")
            .into_report()
            .expect("feasible with detour");
        let charge = &report.charges[0];
        assert_eq!(charge.station_id, "C");
        let leg = g
            .node(g.node_id("A").unwrap())
            .unwrap()
            .coordinate
            .distance_to(&g.node(g.node_id("C").unwrap()).unwrap().coordinate);
        assert!((charge.detour_km.unwrap() - 2.0 * leg).abs() < 1e-6);
        let direct = report.segments[0].distance_km;
        assert!((report.total_distance_km - (direct + 2.0 * leg)).abs() < 1e-6);
    }

    #[test]
    fn unreachable_segment_is_infeasible() {
        let g = graph(&[
            Station::new("A", "A", 0.0, 0.0, None),
            Station::new("B", "B", 0.0, 5.0, None),
        ]);
        let outcome = simulate_path(
            &g,
            &ids(&["A", "B"]),
            &VehicleParams::default(),
            &SimulationOptions::default(),
        )
            .expect("simulated");
        assert_eq!(
            outcome,
            SimulationOutcome::Infeasible {
                segment_index: 0,
                reason: InfeasibleReason::NoDetourAvailable
            }
        );
    }

    #[test]
    fn polyline_leaves_caller_graph_untouched() {
        let g = graph(&[
            Station::new("A", "A", 0.0, 0.0, None),
            Station::new("C", "C", 0.05, 0.0, Some(50.0)),
        ]);
        let points = [Coordinate::new(0.0, 0.0), Coordinate::new(0.0, 1.0)];
        let vehicle = VehicleParams {
            start_soc_percent: 40.0,
            ..VehicleParams::default()
        };
        let before = g.node_count();
        let outcome =
            simulate_polyline(&g, &points, &vehicle, &SimulationOptions::default(), None)
                .expect("simulated");
        assert!(outcome.is_feasible());
        assert_eq!(g.node_count(), before);
        assert!(g.nodes().all(|n| !n.is_virtual));
        let report = outcome.report().unwrap();
        assert_eq!(report.charges[0].station_id, "C");
    }
}
