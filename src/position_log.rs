//! Append-only position log and the "go to position" input.
//!
//! Each saved position is one `a; b; c` line: `x; y; z` for the fly camera,
//! `x; y; zoom` for plane fractals.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use tracing::info;

use crate::fractal::FractalInstance;
use crate::navigation::NavigationMode;
use crate::params::{ParamError, ParamId, Point2, Point3};

#[derive(thiserror::Error, Debug)]
pub enum PositionError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("expected `x; y; z`, got {fields} fields")]
    FieldCount { fields: usize },
    #[error("`{text}` is not a number")]
    NotANumber { text: String },
    #[error("position {0:?} has a non-finite component")]
    NotFinite(Point3),
    #[error("zoom must be positive, got {0}")]
    InvalidZoom(f64),
    #[error("{0} fractals have no position")]
    Unsupported(&'static str),
    #[error(transparent)]
    Param(#[from] ParamError),
}

/// Current position triple of `fractal`, if its camera has one.
pub fn current_position(fractal: &FractalInstance) -> Result<Point3, PositionError> {
    let store = fractal.params();
    match fractal.navigation_mode() {
        NavigationMode::Fly => Ok(store.point3(ParamId::Offset)?),
        NavigationMode::Plane => {
            let offset = store.point2(ParamId::Offset)?;
            Ok(Point3::new(offset.x, offset.y, store.float(ParamId::ZoomFactor)?))
        }
        NavigationMode::Orbit => Err(PositionError::Unsupported(NavigationMode::Orbit.label())),
    }
}

/// Moves `fractal` to `position` and requests a redraw. Nothing changes
/// when the position is rejected.
pub fn apply_position(fractal: &mut FractalInstance, position: Point3) -> Result<(), PositionError> {
    if ![position.x, position.y, position.z].iter().all(|v| v.is_finite()) {
        return Err(PositionError::NotFinite(position));
    }
    let mode = fractal.navigation_mode();
    if mode == NavigationMode::Plane && position.z <= 0.0 {
        return Err(PositionError::InvalidZoom(position.z));
    }
    let store = fractal.params_mut();
    match mode {
        NavigationMode::Fly => store.set(ParamId::Offset, position)?,
        NavigationMode::Plane => {
            store.set(ParamId::Offset, Point2::new(position.x, position.y))?;
            store.set(ParamId::ZoomFactor, position.z)?;
        }
        NavigationMode::Orbit => return Err(PositionError::Unsupported(mode.label())),
    }
    store.request_redraw();
    Ok(())
}

pub fn format_position(p: Point3) -> String {
    format!("{}; {}; {}", p.x, p.y, p.z)
}

pub fn append(path: &Path, position: Point3) -> Result<(), PositionError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", format_position(position))?;
    info!(path = %path.display(), "position saved");
    Ok(())
}

/// Every well-formed line of the log, oldest first. A missing file is empty.
pub fn read_all(path: &Path) -> Result<Vec<Point3>, PositionError> {
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };
    Ok(data
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| parse_position_input(line, Point3::ZERO).ok())
        .collect())
}

/// Parses `x; y; z`. Empty fields keep the matching component of `current`.
pub fn parse_position_input(text: &str, current: Point3) -> Result<Point3, PositionError> {
    let fields: Vec<&str> = text.split(';').map(str::trim).collect();
    if fields.len() != 3 {
        return Err(PositionError::FieldCount {
            fields: fields.len(),
        });
    }
    let mut out = [current.x, current.y, current.z];
    for (slot, field) in out.iter_mut().zip(&fields) {
        if field.is_empty() {
            continue;
        }
        *slot = field.parse::<f64>().map_err(|_| PositionError::NotANumber {
            text: field.to_string(),
        })?;
    }
    Ok(Point3::new(out[0], out[1], out[2]))
}
