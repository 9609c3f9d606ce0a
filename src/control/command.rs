//! PTZ command types

use std::str::FromStr;

/// Speed below which cameras tend to ignore a move entirely
pub const MIN_SPEED: f32 = 0.05;
/// ONVIF velocity components are normalized to 1.0
pub const MAX_SPEED: f32 = 1.0;

/// Movement direction for a continuous PTZ move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
    UpLeft,
    UpRight,
    DownLeft,
    DownRight,
    ZoomIn,
    ZoomOut,
}

/// Normalized ONVIF velocity vector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Velocity {
    pub pan: f32,
    pub tilt: f32,
    pub zoom: f32,
}

impl Velocity {
    pub fn has_pan_tilt(&self) -> bool {
        self.pan != 0.0 || self.tilt != 0.0
    }

    pub fn has_zoom(&self) -> bool {
        self.zoom != 0.0
    }
}

impl Direction {
    /// Velocity vector for this direction at the given speed.
    ///
    /// Speed is clamped to `MIN_SPEED..=MAX_SPEED`.
    pub fn velocity(self, speed: f32) -> Velocity {
        let s = speed.clamp(MIN_SPEED, MAX_SPEED);
        let (pan, tilt, zoom) = match self {
            Direction::Up => (0.0, s, 0.0),
            Direction::Down => (0.0, -s, 0.0),
            Direction::Left => (-s, 0.0, 0.0),
            Direction::Right => (s, 0.0, 0.0),
            Direction::UpLeft => (-s, s, 0.0),
            Direction::UpRight => (s, s, 0.0),
            Direction::DownLeft => (-s, -s, 0.0),
            Direction::DownRight => (s, -s, 0.0),
            Direction::ZoomIn => (0.0, 0.0, s),
            Direction::ZoomOut => (0.0, 0.0, -s),
        };
        Velocity { pan, tilt, zoom }
    }
}

impl FromStr for Direction {
    type Err = ();

    /// Parse the direction names the web layer sends (`"up"`, `"downleft"`,
    /// `"zoom_in"`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            "left" => Ok(Direction::Left),
            "right" => Ok(Direction::Right),
            "upleft" => Ok(Direction::UpLeft),
            "upright" => Ok(Direction::UpRight),
            "downleft" => Ok(Direction::DownLeft),
            "downright" => Ok(Direction::DownRight),
            "zoom_in" => Ok(Direction::ZoomIn),
            "zoom_out" => Ok(Direction::ZoomOut),
            _ => Err(()),
        }
    }
}

/// One PTZ command.
///
/// `Move` starts continuous motion that runs until a `Stop` arrives; it does
/// not block until the camera finishes moving, and nothing stops the motion
/// implicitly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PtzCommand {
    Move { direction: Direction, speed: f32 },
    Stop,
}

impl PtzCommand {
    pub fn is_stop(&self) -> bool {
        matches!(self, PtzCommand::Stop)
    }
}

impl std::fmt::Display for PtzCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PtzCommand::Move { direction, speed } => {
                write!(f, "move({direction:?}, {speed})")
            }
            PtzCommand::Stop => f.write_str("stop"),
        }
    }
}
