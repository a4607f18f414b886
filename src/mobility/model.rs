//! Position allocators and trajectory generators.
//!
//! Every model is reduced to a [`Trajectory`]: a list of piecewise-linear
//! legs generated once, up to the run horizon, from the context RNG. The
//! external clock samples it with [`Trajectory::position_at`].

use std::fmt;
use std::ops::{Add, Mul, Sub};
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::options::{Distribution, MobilityOptions};
use super::MobilityError;

/// Cartesian position or velocity in metres (per second)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Vector {
    pub const ZERO: Vector = Vector { x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn length(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Component-wise comparison within `tolerance`
    pub fn approx_eq(&self, other: &Vector, tolerance: f64) -> bool {
        (self.x - other.x).abs() <= tolerance
            && (self.y - other.y).abs() <= tolerance
            && (self.z - other.z).abs() <= tolerance
    }
}

impl Add for Vector {
    type Output = Vector;
    fn add(self, rhs: Vector) -> Vector {
        Vector::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vector {
    type Output = Vector;
    fn sub(self, rhs: Vector) -> Vector {
        Vector::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vector {
    type Output = Vector;
    fn mul(self, rhs: f64) -> Vector {
        Vector::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl fmt::Display for Vector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3}, {:.3})", self.x, self.y, self.z)
    }
}

/// Axis-aligned movement area
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl Rect {
    pub fn new(x_min: f64, x_max: f64, y_min: f64, y_max: f64) -> Self {
        Self { x_min, x_max, y_min, y_max }
    }

    pub fn contains(&self, p: Vector) -> bool {
        p.x >= self.x_min && p.x <= self.x_max && p.y >= self.y_min && p.y <= self.y_max
    }

    pub fn clamp(&self, p: Vector) -> Vector {
        Vector::new(p.x.clamp(self.x_min, self.x_max), p.y.clamp(self.y_min, self.y_max), p.z)
    }

    pub fn center(&self) -> Vector {
        Vector::new((self.x_min + self.x_max) / 2.0, (self.y_min + self.y_max) / 2.0, 0.0)
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R, z: f64) -> Vector {
        let x = if self.x_min < self.x_max { rng.gen_range(self.x_min..=self.x_max) } else { self.x_min };
        let y = if self.y_min < self.y_max { rng.gen_range(self.y_min..=self.y_max) } else { self.y_min };
        Vector::new(x, y, z)
    }

    /// Time until a point moving from `p` with velocity `v` leaves the rectangle
    fn exit_time(&self, p: Vector, v: Vector) -> f64 {
        let axis = |pos: f64, vel: f64, lo: f64, hi: f64| {
            if vel > 0.0 {
                (hi - pos) / vel
            } else if vel < 0.0 {
                (lo - pos) / vel
            } else {
                f64::INFINITY
            }
        };
        axis(p.x, v.x, self.x_min, self.x_max).min(axis(p.y, v.y, self.y_min, self.y_max))
    }
}

/// Parses `x_min,x_max,y_min,y_max`; `|` is accepted as separator as well
impl FromStr for Rect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .split(|c| c == ',' || c == '|')
            .map(|v| v.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| format!("Invalid bounds '{}': {}", s, e))?;
        match parts.as_slice() {
            [x_min, x_max, y_min, y_max] if !((x_max - x_min).is_finite() && (y_max - y_min).is_finite()) => {
                Err(format!("Bounds '{}' must be finite with a finite span", s))
            }
            [x_min, x_max, y_min, y_max] if x_min <= x_max && y_min <= y_max => {
                Ok(Rect::new(*x_min, *x_max, *y_min, *y_max))
            }
            [_, _, _, _] => Err(format!("Bounds '{}' have min greater than max", s)),
            _ => Err(format!("Bounds '{}' must have four values", s)),
        }
    }
}

/// Mobility model selected by its kind string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MobilityKind {
    /// Travel to uniformly drawn waypoints inside `bounds`, pausing at each
    RandomWaypoint,
    /// Travel in a random heading until hitting `bounds`, pause, pick a new heading
    RandomDirection,
    /// Stationary on a regular grid
    Grid,
    /// Stationary at explicitly listed positions
    FixedList,
}

impl MobilityKind {
    pub fn is_stationary(&self) -> bool {
        matches!(self, MobilityKind::Grid | MobilityKind::FixedList)
    }
}

impl fmt::Display for MobilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MobilityKind::RandomWaypoint => "random-waypoint",
            MobilityKind::RandomDirection => "random-direction",
            MobilityKind::Grid => "grid",
            MobilityKind::FixedList => "fixed-list",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for MobilityKind {
    type Err = MobilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "random-waypoint" => Ok(MobilityKind::RandomWaypoint),
            "random-direction" => Ok(MobilityKind::RandomDirection),
            "grid" => Ok(MobilityKind::Grid),
            "fixed-list" | "list" => Ok(MobilityKind::FixedList),
            _ => Err(MobilityError::UnknownKind(s.to_string())),
        }
    }
}

/// Regular grid placement read from the `min_x`, `min_y`, `delta_x`,
/// `delta_y`, `grid_width` and `layout` options.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridLayout {
    pub min_x: f64,
    pub min_y: f64,
    pub delta_x: f64,
    pub delta_y: f64,
    pub grid_width: usize,
    pub row_first: bool,
}

impl GridLayout {
    pub fn from_options(options: &MobilityOptions) -> Result<Self, MobilityError> {
        let layout = options.text("layout", "row_first")?;
        let row_first = match layout.to_lowercase().replace('-', "_").as_str() {
            "row_first" => true,
            "column_first" => false,
            _ => {
                return Err(MobilityError::InvalidOption {
                    key: "layout".to_string(),
                    reason: format!("expected row_first or column_first, got '{}'", layout),
                })
            }
        };
        Ok(Self {
            min_x: options.number("min_x", 0.0)?,
            min_y: options.number("min_y", 0.0)?,
            delta_x: options.number("delta_x", 1.0)?,
            delta_y: options.number("delta_y", 1.0)?,
            grid_width: options.count("grid_width", 10)?,
            row_first,
        })
    }

    pub fn position(&self, index: usize) -> Vector {
        let (major, minor) = (index / self.grid_width, index % self.grid_width);
        if self.row_first {
            Vector::new(self.min_x + self.delta_x * minor as f64, self.min_y + self.delta_y * major as f64, 0.0)
        } else {
            Vector::new(self.min_x + self.delta_x * major as f64, self.min_y + self.delta_y * minor as f64, 0.0)
        }
    }
}

/// One linear segment, valid from `start` until the next leg begins
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Leg {
    pub start: f64,
    pub origin: Vector,
    pub velocity: Vector,
}

/// Piecewise-linear path in the binding's local frame
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    legs: Vec<Leg>,
}

impl Trajectory {
    pub fn stationary(position: Vector) -> Self {
        Self {
            legs: vec![Leg { start: 0.0, origin: position, velocity: Vector::ZERO }],
        }
    }

    pub fn legs(&self) -> &[Leg] {
        &self.legs
    }

    pub fn initial_position(&self) -> Vector {
        self.legs[0].origin
    }

    pub fn position_at(&self, t: f64) -> Vector {
        let idx = self.legs.partition_point(|leg| leg.start <= t);
        let leg = &self.legs[idx.saturating_sub(1)];
        let elapsed = (t - leg.start).max(0.0);
        leg.origin + leg.velocity * elapsed
    }

    /// Shifts the whole path by `delta`
    pub fn translate(&mut self, delta: Vector) {
        for leg in &mut self.legs {
            leg.origin = leg.origin + delta;
        }
    }

    fn push(&mut self, start: f64, origin: Vector, velocity: Vector) {
        self.legs.push(Leg { start, origin, velocity });
    }
}

/// Motion parameters for the random kinds
#[derive(Debug, Clone, Copy)]
struct Motion {
    bounds: Rect,
    speed: Distribution,
    pause: Distribution,
}

impl Motion {
    fn from_options(kind: MobilityKind, options: &MobilityOptions) -> Result<Self, MobilityError> {
        let (speed, pause) = match kind {
            MobilityKind::RandomWaypoint => (Distribution::Uniform { min: 0.3, max: 0.7 }, Distribution::Constant(2.0)),
            _ => (Distribution::Uniform { min: 1.0, max: 2.0 }, Distribution::Constant(2.0)),
        };
        Ok(Self {
            bounds: options.bounds("bounds", Rect::new(0.0, 100.0, 0.0, 100.0))?,
            speed: options.distribution("speed", speed)?,
            pause: options.distribution("pause", pause)?,
        })
    }
}

/// Checks that `options` hold everything `kind` needs, without generating anything
pub fn validate_options(kind: MobilityKind, options: &MobilityOptions) -> Result<(), MobilityError> {
    match kind {
        MobilityKind::Grid => GridLayout::from_options(options).map(|_| ()),
        MobilityKind::FixedList => Ok(()),
        MobilityKind::RandomWaypoint | MobilityKind::RandomDirection => Motion::from_options(kind, options).map(|_| ()),
    }
}

/// Generates the trajectory for one member starting at `initial`
pub fn generate_trajectory<R: Rng + ?Sized>(
    kind: MobilityKind,
    options: &MobilityOptions,
    initial: Vector,
    horizon: f64,
    rng: &mut R,
) -> Result<Trajectory, MobilityError> {
    match kind {
        MobilityKind::Grid | MobilityKind::FixedList => Ok(Trajectory::stationary(initial)),
        MobilityKind::RandomWaypoint => {
            let motion = Motion::from_options(kind, options)?;
            Ok(random_waypoint(motion, initial, horizon, rng))
        }
        MobilityKind::RandomDirection => {
            let motion = Motion::from_options(kind, options)?;
            Ok(random_direction(motion, initial, horizon, rng))
        }
    }
}

const MIN_STEP: f64 = 1e-9;

fn random_waypoint<R: Rng + ?Sized>(motion: Motion, initial: Vector, horizon: f64, rng: &mut R) -> Trajectory {
    let mut trajectory = Trajectory { legs: Vec::new() };
    let mut t = 0.0;
    let mut position = initial;

    while t < horizon {
        let target = motion.bounds.sample(rng, position.z);
        let speed = motion.speed.sample(rng);
        let distance = (target - position).length();
        if speed <= 0.0 {
            break;
        }
        let travel = distance / speed;
        if travel > MIN_STEP {
            trajectory.push(t, position, (target - position) * (1.0 / travel));
            t += travel;
            position = target;
        }
        let pause = motion.pause.sample(rng);
        trajectory.push(t, position, Vector::ZERO);
        if travel + pause <= MIN_STEP {
            break;
        }
        t += pause;
    }

    if trajectory.legs.is_empty() {
        trajectory.push(0.0, position, Vector::ZERO);
    }
    trajectory
}

fn random_direction<R: Rng + ?Sized>(motion: Motion, initial: Vector, horizon: f64, rng: &mut R) -> Trajectory {
    let bounds = motion.bounds;
    let mut trajectory = Trajectory { legs: Vec::new() };
    let mut t = 0.0;
    let mut position = bounds.clamp(initial);

    while t < horizon {
        let speed = motion.speed.sample(rng);
        if speed <= 0.0 {
            break;
        }

        // Headings that point straight into a wall give a zero-length leg; retry a few times
        // and fall back to heading for the centre.
        let mut velocity = Vector::ZERO;
        let mut travel = 0.0;
        for _ in 0..16 {
            let heading = rng.gen_range(0.0..std::f64::consts::TAU);
            velocity = Vector::new(heading.cos() * speed, heading.sin() * speed, 0.0);
            travel = bounds.exit_time(position, velocity);
            if travel > MIN_STEP {
                break;
            }
        }
        if travel <= MIN_STEP {
            let to_center = bounds.center() - Vector::new(position.x, position.y, 0.0);
            let len = to_center.length();
            if len <= MIN_STEP {
                break;
            }
            velocity = to_center * (speed / len);
            travel = bounds.exit_time(position, velocity);
        }

        trajectory.push(t, position, velocity);
        t += travel;
        position = bounds.clamp(position + velocity * travel);

        let pause = motion.pause.sample(rng);
        trajectory.push(t, position, Vector::ZERO);
        t += pause;
    }

    if trajectory.legs.is_empty() {
        trajectory.push(0.0, position, Vector::ZERO);
    }
    trajectory
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mobility::options::OptionValue;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_kind_from_str() {
        assert_eq!("random-direction".parse::<MobilityKind>().unwrap(), MobilityKind::RandomDirection);
        assert_eq!("random_waypoint".parse::<MobilityKind>().unwrap(), MobilityKind::RandomWaypoint);
        assert_eq!("Grid".parse::<MobilityKind>().unwrap(), MobilityKind::Grid);
        assert_eq!("fixed-list".parse::<MobilityKind>().unwrap(), MobilityKind::FixedList);
        assert!("brownian".parse::<MobilityKind>().is_err());
        assert_eq!(MobilityKind::RandomWaypoint.to_string(), "random-waypoint");
    }

    #[test]
    fn test_grid_row_first() {
        let options = MobilityOptions::new()
            .with("min_x", OptionValue::Number(20.0))
            .with("min_y", OptionValue::Number(20.0))
            .with("delta_x", OptionValue::Number(20.0))
            .with("delta_y", OptionValue::Number(20.0))
            .with("grid_width", OptionValue::Number(5.0));
        let grid = GridLayout::from_options(&options).unwrap();

        assert_eq!(grid.position(0), Vector::new(20.0, 20.0, 0.0));
        assert_eq!(grid.position(4), Vector::new(100.0, 20.0, 0.0));
        assert_eq!(grid.position(5), Vector::new(20.0, 40.0, 0.0));
    }

    #[test]
    fn test_grid_column_first() {
        let options = MobilityOptions::new()
            .with("grid_width", OptionValue::Number(2.0))
            .with("layout", OptionValue::String("column_first".to_string()));
        let grid = GridLayout::from_options(&options).unwrap();
        assert_eq!(grid.position(1), Vector::new(0.0, 1.0, 0.0));
        assert_eq!(grid.position(2), Vector::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_parse_rect() {
        assert_eq!("-500,500,-500,500".parse::<Rect>().unwrap(), Rect::new(-500.0, 500.0, -500.0, 500.0));
        assert_eq!("-10|10|-10|10".parse::<Rect>().unwrap(), Rect::new(-10.0, 10.0, -10.0, 10.0));
        assert!("1,2,3".parse::<Rect>().is_err());
        assert!("5,1,0,1".parse::<Rect>().is_err());
        assert!("-inf,0,0,1".parse::<Rect>().is_err());
        assert!("0,1,0,NaN".parse::<Rect>().is_err());
        assert!("-1e308,1e308,0,1".parse::<Rect>().is_err());
    }

    #[test]
    fn test_overflowing_bounds_fail_validation() {
        let options = MobilityOptions::new().with("bounds", OptionValue::String("-1e308,1e308,0,1".to_string()));
        assert!(matches!(
            validate_options(MobilityKind::RandomWaypoint, &options),
            Err(MobilityError::InvalidOption { .. })
        ));

        let speed = MobilityOptions::new().with("speed", OptionValue::String("uniform(0,inf)".to_string()));
        let mut rng = StdRng::seed_from_u64(1);
        assert!(validate_options(MobilityKind::RandomWaypoint, &speed).is_err());
        assert!(generate_trajectory(MobilityKind::RandomWaypoint, &speed, Vector::default(), 10.0, &mut rng).is_err());
    }

    #[test]
    fn test_stationary_trajectory() {
        let trajectory = Trajectory::stationary(Vector::new(1.0, 2.0, 0.0));
        assert_eq!(trajectory.position_at(0.0), Vector::new(1.0, 2.0, 0.0));
        assert_eq!(trajectory.position_at(100.0), Vector::new(1.0, 2.0, 0.0));
    }

    #[test]
    fn test_random_direction_stays_in_bounds() {
        let options = MobilityOptions::new()
            .with("bounds", OptionValue::String("-10,10,-10,10".to_string()))
            .with("speed", OptionValue::Number(3.0))
            .with("pause", OptionValue::Number(0.4));
        let mut rng = StdRng::seed_from_u64(11);
        let trajectory =
            generate_trajectory(MobilityKind::RandomDirection, &options, Vector::new(0.0, 1.0, 0.0), 50.0, &mut rng)
                .unwrap();

        assert!(trajectory.legs().len() > 2);
        let mut t = 0.0;
        while t <= 50.0 {
            let p = trajectory.position_at(t);
            assert!(p.x >= -10.0 - 1e-6 && p.x <= 10.0 + 1e-6, "x out of bounds at {}: {}", t, p);
            assert!(p.y >= -10.0 - 1e-6 && p.y <= 10.0 + 1e-6, "y out of bounds at {}: {}", t, p);
            t += 0.25;
        }
    }

    #[test]
    fn test_random_waypoint_moves_at_speed() {
        let options = MobilityOptions::new()
            .with("bounds", OptionValue::String("0,100,0,100".to_string()))
            .with("speed", OptionValue::Number(2.0))
            .with("pause", OptionValue::Number(0.0));
        let mut rng = StdRng::seed_from_u64(5);
        let trajectory =
            generate_trajectory(MobilityKind::RandomWaypoint, &options, Vector::ZERO, 30.0, &mut rng).unwrap();

        for leg in trajectory.legs() {
            let speed = leg.velocity.length();
            assert!(speed == 0.0 || (speed - 2.0).abs() < 1e-9);
        }
        assert_eq!(trajectory.position_at(0.0), Vector::ZERO);
    }

    #[test]
    fn test_translate_shifts_every_sample() {
        let options = MobilityOptions::new().with("speed", OptionValue::Number(1.0));
        let mut rng = StdRng::seed_from_u64(9);
        let mut trajectory =
            generate_trajectory(MobilityKind::RandomDirection, &options, Vector::new(50.0, 50.0, 0.0), 20.0, &mut rng)
                .unwrap();
        let before = trajectory.position_at(7.5);
        trajectory.translate(Vector::new(3.0, -1.0, 0.0));
        assert!(trajectory.position_at(7.5).approx_eq(&(before + Vector::new(3.0, -1.0, 0.0)), 1e-9));
    }
}
