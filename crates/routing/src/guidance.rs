//! Turn-by-turn text for a planned route.

use nav_geo::{GeoPoint, bearing_deg, haversine_m};
use serde::Serialize;

use crate::planner::RouteResult;

/// Relative turn, in 45° sectors centred on straight ahead.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnDirection {
    Straight,
    SlightRight,
    Right,
    SharpRight,
    UTurn,
    SharpLeft,
    Left,
    SlightLeft,
}

impl TurnDirection {
    /// Classify a change of heading in degrees (any range; normalized to `[0, 360)`).
    pub fn from_relative_bearing(delta_deg: f64) -> Self {
        let delta = delta_deg.rem_euclid(360.0);
        match delta {
            d if !(22.5..337.5).contains(&d) => TurnDirection::Straight,
            d if d < 67.5 => TurnDirection::SlightRight,
            d if d < 112.5 => TurnDirection::Right,
            d if d < 157.5 => TurnDirection::SharpRight,
            d if d < 202.5 => TurnDirection::UTurn,
            d if d < 247.5 => TurnDirection::SharpLeft,
            d if d < 292.5 => TurnDirection::Left,
            _ => TurnDirection::SlightLeft,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Instruction {
    pub from: GeoPoint,
    pub to: GeoPoint,
    pub distance_m: f64,
    /// Absolute heading of this step, clockwise from north.
    pub bearing_deg: f64,
    pub turn: TurnDirection,
    pub text: String,
}

/// One instruction per non-degenerate segment. The first step is always `Straight`.
pub fn instructions(route: &RouteResult) -> Vec<Instruction> {
    let mut steps = Vec::new();
    let mut previous_bearing: Option<f64> = None;

    for segment in route.coordinates.windows(2) {
        let (from, to) = (segment[0], segment[1]);
        let distance_m = haversine_m(from, to);
        if distance_m < f64::EPSILON {
            continue;
        }
        let bearing = bearing_deg(from, to);
        let turn = previous_bearing
            .map(|prev| TurnDirection::from_relative_bearing(bearing - prev))
            .unwrap_or(TurnDirection::Straight);
        previous_bearing = Some(bearing);

        steps.push(Instruction {
            from,
            to,
            distance_m,
            bearing_deg: bearing,
            turn,
            text: describe(turn, distance_m),
        });
    }
    steps
}

pub fn describe(turn: TurnDirection, distance_m: f64) -> String {
    let rounded = distance_m.round();
    let distance = if rounded < 1_000.0 {
        format!("{rounded:.0} meters")
    } else {
        format!("{:.1} kilometers", rounded / 1_000.0)
    };

    match turn {
        TurnDirection::Straight => format!("Continue straight for {distance}"),
        TurnDirection::SlightRight => format!("In {distance}, bear slightly to the right"),
        TurnDirection::SlightLeft => format!("In {distance}, bear slightly to the left"),
        TurnDirection::Right => format!("In {distance}, make a right turn"),
        TurnDirection::Left => format!("In {distance}, make a left turn"),
        TurnDirection::SharpRight => format!("In {distance}, make a sharp right turn"),
        TurnDirection::SharpLeft => format!("In {distance}, make a sharp left turn"),
        TurnDirection::UTurn => format!("Please make a U-turn and go back for {distance}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::RouteSource;

    fn point(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint::new(lat, lon).unwrap()
    }

    #[test]
    fn sectors() {
        assert_eq!(TurnDirection::from_relative_bearing(0.0), TurnDirection::Straight);
        assert_eq!(TurnDirection::from_relative_bearing(-10.0), TurnDirection::Straight);
        assert_eq!(TurnDirection::from_relative_bearing(45.0), TurnDirection::SlightRight);
        assert_eq!(TurnDirection::from_relative_bearing(90.0), TurnDirection::Right);
        assert_eq!(TurnDirection::from_relative_bearing(180.0), TurnDirection::UTurn);
        assert_eq!(TurnDirection::from_relative_bearing(-90.0), TurnDirection::Left);
        assert_eq!(TurnDirection::from_relative_bearing(300.0), TurnDirection::SlightLeft);
    }

    #[test]
    fn text_formats_distance() {
        assert_eq!(
            describe(TurnDirection::Right, 120.4),
            "In 120 meters, make a right turn"
        );
        assert_eq!(
            describe(TurnDirection::Straight, 1_549.0),
            "Continue straight for 1.5 kilometers"
        );
    }

    #[test]
    fn right_angle_route() {
        let route = RouteResult {
            coordinates: vec![
                point(0.0, 0.0),
                point(0.001, 0.0),
                point(0.001, 0.0),
                point(0.001, 0.001),
            ],
            distance_m: 0.0,
            duration_s: 0.0,
            source: RouteSource::Direct,
        };
        let steps = instructions(&route);
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].turn, TurnDirection::Straight);
        assert_eq!(steps[1].turn, TurnDirection::Right);
        assert!(steps[1].text.ends_with("make a right turn"));
    }
}
