//! Flat JSON snapshots of a fractal's parameters.
//!
//! Colours are split into `<name>.red/.green/.blue/.alpha`, points into
//! `<name>.x/.y[/.z]`. Loading validates every key before anything is
//! written, so a bad record leaves the fractal untouched.

use std::fs;
use std::path::Path;

use serde_json::{Map, Number, Value};
use tracing::{info, warn};

use crate::fractal::FractalInstance;
use crate::params::{ParamError, ParamId, ParamKind, ParamValue, Point2, Point3, Rgba};

pub type StateRecord = Map<String, Value>;

const COLOR_FIELDS: [&str; 4] = ["red", "green", "blue", "alpha"];
const POINT_FIELDS: [&str; 3] = ["x", "y", "z"];

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum MalformedStateError {
    #[error("state is missing key `{0}`")]
    MissingKey(String),
    #[error("state key `{key}` should be {expected}")]
    WrongType { key: String, expected: &'static str },
    #[error("state key `{key}` is {value}, outside {min}..={max}")]
    OutOfRange {
        key: String,
        value: i64,
        min: i64,
        max: i64,
    },
    #[error("state root must be a JSON object")]
    NotAnObject,
}

#[derive(thiserror::Error, Debug)]
pub enum StateError {
    #[error(transparent)]
    Malformed(#[from] MalformedStateError),
    #[error("fractal `{0}` does not support saving state")]
    NotStateful(String),
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Param(#[from] ParamError),
}

fn field_key(id: ParamId, field: &str) -> String {
    format!("{}.{}", id.name(), field)
}

fn number(v: f64) -> Value {
    Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
}

fn flatten(id: ParamId, value: ParamValue, out: &mut StateRecord) {
    match value {
        ParamValue::Int(v) => {
            out.insert(id.name().to_string(), Value::from(v));
        }
        ParamValue::Float(v) => {
            out.insert(id.name().to_string(), number(v));
        }
        ParamValue::Bool(v) => {
            out.insert(id.name().to_string(), Value::Bool(v));
        }
        ParamValue::Color(c) => {
            for (field, channel) in COLOR_FIELDS.iter().zip(c.to_array()) {
                out.insert(field_key(id, field), number(channel as f64));
            }
        }
        ParamValue::Point2(p) => {
            for (field, v) in POINT_FIELDS.iter().zip([p.x, p.y]) {
                out.insert(field_key(id, field), number(v));
            }
        }
        ParamValue::Point3(p) => {
            for (field, v) in POINT_FIELDS.iter().zip([p.x, p.y, p.z]) {
                out.insert(field_key(id, field), number(v));
            }
        }
    }
}

fn read_float(record: &StateRecord, key: String) -> Result<f64, MalformedStateError> {
    match record.get(&key) {
        None => Err(MalformedStateError::MissingKey(key)),
        Some(v) => v.as_f64().ok_or(MalformedStateError::WrongType {
            key,
            expected: "a number",
        }),
    }
}

fn read_value(
    record: &StateRecord,
    id: ParamId,
    kind: ParamKind,
) -> Result<ParamValue, MalformedStateError> {
    let name = id.name();
    Ok(match kind {
        ParamKind::Int => match record.get(name) {
            None => return Err(MalformedStateError::MissingKey(name.into())),
            Some(v) => ParamValue::Int(v.as_i64().ok_or(MalformedStateError::WrongType {
                key: name.into(),
                expected: "an integer",
            })?),
        },
        ParamKind::Float => ParamValue::Float(read_float(record, name.into())?),
        ParamKind::Bool => match record.get(name) {
            None => return Err(MalformedStateError::MissingKey(name.into())),
            Some(v) => ParamValue::Bool(v.as_bool().ok_or(MalformedStateError::WrongType {
                key: name.into(),
                expected: "a boolean",
            })?),
        },
        ParamKind::Color => {
            let mut channels = [0f32; 4];
            for (slot, field) in channels.iter_mut().zip(COLOR_FIELDS) {
                *slot = read_float(record, field_key(id, field))? as f32;
            }
            let [r, g, b, a] = channels;
            ParamValue::Color(Rgba::new(r, g, b, a))
        }
        ParamKind::Point2 => ParamValue::Point2(Point2::new(
            read_float(record, field_key(id, "x"))?,
            read_float(record, field_key(id, "y"))?,
        )),
        ParamKind::Point3 => ParamValue::Point3(Point3::new(
            read_float(record, field_key(id, "x"))?,
            read_float(record, field_key(id, "y"))?,
            read_float(record, field_key(id, "z"))?,
        )),
    })
}

pub fn save(fractal: &FractalInstance) -> Result<StateRecord, StateError> {
    if !fractal.is_stateful() {
        return Err(StateError::NotStateful(fractal.name().to_string()));
    }
    let mut record = StateRecord::new();
    for (id, value) in fractal.params().iter() {
        flatten(id, value, &mut record);
    }
    Ok(record)
}

fn check_range(
    fractal: &FractalInstance,
    id: ParamId,
    value: ParamValue,
) -> Result<(), MalformedStateError> {
    if let (ParamValue::Int(v), Some((min, max))) = (value, fractal.int_range(id)) {
        if !(min..=max).contains(&v) {
            return Err(MalformedStateError::OutOfRange {
                key: id.name().to_string(),
                value: v,
                min,
                max,
            });
        }
    }
    Ok(())
}

/// Applies `record` to `fractal` atomically and requests one redraw.
/// Integers must lie within their slider range. Keys the fractal does not
/// own are ignored.
pub fn load(fractal: &mut FractalInstance, record: &StateRecord) -> Result<(), StateError> {
    if !fractal.is_stateful() {
        return Err(StateError::NotStateful(fractal.name().to_string()));
    }
    let current_state: &FractalInstance = fractal;
    let parsed = current_state
        .params()
        .iter()
        .map(|(id, current)| {
            let value = read_value(record, id, current.kind())?;
            check_range(current_state, id, value)?;
            Ok((id, value))
        })
        .collect::<Result<Vec<_>, MalformedStateError>>()?;

    let store = fractal.params_mut();
    for (id, value) in parsed {
        store.set(id, value)?;
    }
    store.request_redraw();
    Ok(())
}

pub fn save_to_path(fractal: &FractalInstance, path: &Path) -> Result<(), StateError> {
    let record = save(fractal)?;
    let data = serde_json::to_string_pretty(&record)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, data)?;
    info!(fractal = fractal.name(), path = %path.display(), "state saved");
    Ok(())
}

pub fn load_from_path(fractal: &mut FractalInstance, path: &Path) -> Result<(), StateError> {
    let result = fs::read_to_string(path)
        .map_err(StateError::from)
        .and_then(|data| {
            let value: Value = serde_json::from_str(&data)?;
            match value {
                Value::Object(record) => load(fractal, &record),
                _ => Err(MalformedStateError::NotAnObject.into()),
            }
        });
    match &result {
        Ok(()) => info!(fractal = fractal.name(), path = %path.display(), "state loaded"),
        Err(err) => warn!(path = %path.display(), "state load failed: {err}"),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fractal::FractalKind;
    use std::f64::consts::PI;

    fn julia() -> FractalInstance {
        FractalInstance::new(FractalKind::Julia2D, Path::new("shaders")).unwrap()
    }

    #[test]
    fn keys_are_flattened() {
        let record = save(&julia()).unwrap();
        for key in [
            "max_iter",
            "zoom_factor",
            "central_lines",
            "rotation_angle",
            "color.red",
            "color.alpha",
            "offset.x",
            "offset.y",
            "antialiasing",
            "arg_c",
            "abs_c",
            "power",
        ] {
            assert!(record.contains_key(key), "missing {key}");
        }
        assert_eq!(record["arg_c"], Value::from(PI));
    }

    #[test]
    fn save_then_load_is_exact() {
        let mut source = julia();
        {
            let store = source.params_mut();
            store.set(ParamId::ZoomFactor, 1234.567_891_234_5).unwrap();
            store
                .set(ParamId::Offset, Point2::new(-0.743_643_887_037_151, 0.131_825_904_205_33))
                .unwrap();
            store.set(ParamId::Color, Rgba::new(0.1, 0.25, 1.0 / 3.0, 0.9)).unwrap();
            store.set(ParamId::MaxIter, 321i64).unwrap();
            store.set(ParamId::Antialiasing, true).unwrap();
        }
        let text = serde_json::to_string(&save(&source).unwrap()).unwrap();
        let record: StateRecord = serde_json::from_str(&text).unwrap();

        let mut target = julia();
        target.params_mut().take_redraw();
        load(&mut target, &record).unwrap();
        let a: Vec<_> = source.params().iter().collect();
        let b: Vec<_> = target.params().iter().collect();
        assert_eq!(a, b);
        assert!(target.params_mut().take_redraw());
        assert!(!target.params_mut().take_redraw());
    }

    #[test]
    fn missing_key_leaves_state_untouched() {
        let mut fractal = julia();
        let mut record = save(&fractal).unwrap();
        record.insert("zoom_factor".into(), Value::from(99.0));
        record.remove("color.blue");
        let before: Vec<_> = fractal.params().iter().collect();

        let err = load(&mut fractal, &record).unwrap_err();
        assert!(matches!(
            err,
            StateError::Malformed(MalformedStateError::MissingKey(ref k)) if k == "color.blue"
        ));
        let after: Vec<_> = fractal.params().iter().collect();
        assert_eq!(before, after);
    }

    #[test]
    fn wrong_type_is_malformed() {
        let mut fractal = julia();
        let mut record = save(&fractal).unwrap();
        record.insert("max_iter".into(), Value::from("many"));
        assert!(matches!(
            load(&mut fractal, &record),
            Err(StateError::Malformed(MalformedStateError::WrongType { .. }))
        ));
    }

    #[test]
    fn iteration_count_outside_the_slider_is_rejected() {
        let mut fractal =
            FractalInstance::new(FractalKind::Mandelbrot2D, Path::new("shaders")).unwrap();
        let mut record = save(&fractal).unwrap();
        record.insert("max_iter".into(), Value::from(1i64 << 40));
        record.insert("perturbation".into(), Value::Bool(true));
        let before: Vec<_> = fractal.params().iter().collect();

        let err = load(&mut fractal, &record).unwrap_err();
        assert!(matches!(
            err,
            StateError::Malformed(MalformedStateError::OutOfRange { ref key, max: 500, .. })
                if key == "max_iter"
        ));
        let after: Vec<_> = fractal.params().iter().collect();
        assert_eq!(before, after);

        record.insert("max_iter".into(), Value::from(-1));
        assert!(load(&mut fractal, &record).is_err());
        record.insert("max_iter".into(), Value::from(500));
        load(&mut fractal, &record).unwrap();
        assert_eq!(fractal.params().int(ParamId::MaxIter).unwrap(), 500);
    }

    #[test]
    fn non_stateful_fractals_refuse() {
        let fractal =
            FractalInstance::new(FractalKind::Mandelbox, Path::new("shaders")).unwrap();
        assert!(matches!(save(&fractal), Err(StateError::NotStateful(_))));
    }

    #[test]
    fn file_round_trip_and_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("julia.json");
        let mut source = julia();
        source.params_mut().set(ParamId::AbsC, 0.123).unwrap();
        save_to_path(&source, &path).unwrap();

        let mut target = julia();
        load_from_path(&mut target, &path).unwrap();
        assert_eq!(target.params().float(ParamId::AbsC).unwrap(), 0.123);

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{ \"max_iter\": ").unwrap();
        target.params_mut().set(ParamId::AbsC, 0.5).unwrap();
        assert!(matches!(
            load_from_path(&mut target, &broken),
            Err(StateError::Json(_))
        ));
        assert_eq!(target.params().float(ParamId::AbsC).unwrap(), 0.5);

        let array = dir.path().join("array.json");
        fs::write(&array, "[1, 2]").unwrap();
        assert!(matches!(
            load_from_path(&mut target, &array),
            Err(StateError::Malformed(MalformedStateError::NotAnObject))
        ));
    }
}
