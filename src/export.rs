//! Screenshots and video export.
//!
//! Screenshots are single JPEGs. Videos are PNG frames rendered into a
//! scoped temporary directory and handed to an external ffmpeg.

use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use chrono::Local;
use image::{ImageError, RgbaImage};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::animation::{CancelToken, RecordError, EXPORT_FPS};
use crate::fractal::FractalInstance;
use crate::params::{ParamError, ParamId};
use crate::render::{RenderError, Renderer};

pub const HIGH_QUALITY_SIZE: (u32, u32) = (2560, 1440);
pub const TIMESTAMP_FORMAT: &str = "%m-%d-%Y_%H-%M-%S";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum VideoCodec {
    #[default]
    H264,
    ProRes,
    Vp9,
    Av1,
}

impl VideoCodec {
    pub const ALL: [VideoCodec; 4] = [
        VideoCodec::H264,
        VideoCodec::ProRes,
        VideoCodec::Vp9,
        VideoCodec::Av1,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "H.264",
            VideoCodec::ProRes => "ProRes 422",
            VideoCodec::Vp9 => "VP9",
            VideoCodec::Av1 => "AV1",
        }
    }

    /// Container extension matching the codec.
    pub fn extension(&self) -> &'static str {
        match self {
            VideoCodec::H264 | VideoCodec::Av1 => "mp4",
            VideoCodec::ProRes => "mov",
            VideoCodec::Vp9 => "webm",
        }
    }

    pub fn ffmpeg_args(&self, crf: u8) -> Vec<String> {
        let mut args: Vec<String> = match self {
            VideoCodec::H264 => vec!["-c:v".into(), "libx264".into(), "-pix_fmt".into(), "yuv420p".into()],
            VideoCodec::ProRes => {
                return vec![
                    "-c:v".into(),
                    "prores_ks".into(),
                    "-profile:v".into(),
                    "3".into(),
                    "-pix_fmt".into(),
                    "yuv422p10le".into(),
                ]
            }
            VideoCodec::Vp9 => vec!["-c:v".into(), "libvpx-vp9".into(), "-b:v".into(), "0".into()],
            VideoCodec::Av1 => vec!["-c:v".into(), "libaom-av1".into(), "-b:v".into(), "0".into()],
        };
        args.push("-crf".into());
        args.push(crf.to_string());
        args
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ExportError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image: {0}")]
    Image(#[from] ImageError),
    #[error("render: {0}")]
    Render(#[from] RenderError),
    #[error(transparent)]
    Param(#[from] ParamError),
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error("ffmpeg exited with {status}")]
    Ffmpeg { status: ExitStatus },
}

/// `dir/<timestamp>.<ext>` using the local clock.
pub fn timestamped_path(dir: &Path, extension: &str) -> PathBuf {
    dir.join(format!("{}.{extension}", Local::now().format(TIMESTAMP_FORMAT)))
}

/// Rounds each side up to the next even number; encoders reject odd sizes.
pub fn even_size(size: (u32, u32)) -> (u32, u32) {
    let up = |v: u32| (v.max(1) + 1) & !1;
    (up(size.0), up(size.1))
}

/// Renders the current view and writes it as a JPEG named after the time.
pub fn take_screenshot(
    fractal: &FractalInstance,
    renderer: &mut dyn Renderer,
    view_size: (u32, u32),
    dir: &Path,
) -> Result<PathBuf, ExportError> {
    let high_quality = fractal
        .params()
        .flag(ParamId::HighScreenshotQuality)
        .unwrap_or(false);
    let size = if high_quality {
        HIGH_QUALITY_SIZE
    } else {
        even_size(view_size)
    };
    let uniforms = fractal.uniforms(size)?;
    let frame = renderer.draw(fractal.kind(), &uniforms, size)?;
    std::fs::create_dir_all(dir)?;
    let path = timestamped_path(dir, "jpg");
    image::DynamicImage::ImageRgba8(frame).to_rgb8().save(&path)?;
    info!(fractal = fractal.name(), path = %path.display(), width = size.0, height = size.1, "screenshot saved");
    Ok(path)
}

/// Numbered PNG frames in a temporary directory that is removed on drop.
pub struct FrameSequence {
    dir: TempDir,
    count: usize,
}

impl FrameSequence {
    pub fn new() -> Result<Self, ExportError> {
        Ok(Self {
            dir: tempfile::tempdir()?,
            count: 0,
        })
    }

    pub fn push(&mut self, frame: &RgbaImage) -> Result<(), ExportError> {
        let path = self.dir.path().join(format!("frame_{:06}.png", self.count));
        frame.save(&path)?;
        self.count += 1;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// printf-style input pattern for ffmpeg.
    pub fn pattern(&self) -> String {
        format!("{}/frame_%06d.png", self.dir.path().display())
    }
}

pub trait VideoEncoder {
    fn encode(&mut self, frames: &FrameSequence, fps: u32, out: &Path) -> Result<(), ExportError>;
}

#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    pub codec: VideoCodec,
    pub crf: u8,
    pub binary: PathBuf,
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self {
            codec: VideoCodec::default(),
            crf: 20,
            binary: PathBuf::from("ffmpeg"),
        }
    }
}

impl FfmpegEncoder {
    pub fn args(&self, frames: &FrameSequence, fps: u32, out: &Path) -> Vec<String> {
        let mut args = vec![
            "-y".into(),
            "-framerate".into(),
            fps.to_string(),
            "-i".into(),
            frames.pattern(),
        ];
        args.extend(self.codec.ffmpeg_args(self.crf));
        args.push(out.display().to_string());
        args
    }
}

impl VideoEncoder for FfmpegEncoder {
    fn encode(&mut self, frames: &FrameSequence, fps: u32, out: &Path) -> Result<(), ExportError> {
        let args = self.args(frames, fps, out);
        debug!(binary = %self.binary.display(), ?args, "running encoder");
        let status = Command::new(&self.binary).args(&args).status()?;
        if status.success() {
            Ok(())
        } else {
            Err(ExportError::Ffmpeg { status })
        }
    }
}

/// Records the fractal's animation at 60 fps into `dir`. Partial output is
/// discarded when cancelled or failing.
pub fn record_video(
    fractal: &mut FractalInstance,
    renderer: &mut dyn Renderer,
    encoder: &mut dyn VideoEncoder,
    size: (u32, u32),
    dir: &Path,
    extension: &str,
    cancel: &dyn CancelToken,
) -> Result<PathBuf, ExportError> {
    if fractal.animation().is_none() {
        return Err(RecordError::NotAnimatable(fractal.name().to_string()).into());
    }
    let size = even_size(size);
    let kind = fractal.kind();
    let mut frames = FrameSequence::new()?;
    info!(fractal = fractal.name(), width = size.0, height = size.1, "recording started");
    let recorded = fractal.record(size, cancel, |index, uniforms| {
        let frame = renderer.draw(kind, uniforms, size).map_err(RecordError::capture)?;
        frames.push(&frame).map_err(RecordError::capture)?;
        if index % EXPORT_FPS as usize == 0 {
            debug!(frame = index, "frame captured");
        }
        Ok(())
    });
    if let Err(err) = recorded {
        warn!("recording aborted: {err}");
        return Err(err.into());
    }

    std::fs::create_dir_all(dir)?;
    let out = timestamped_path(dir, extension);
    encoder.encode(&frames, EXPORT_FPS, &out)?;
    info!(frames = frames.len(), path = %out.display(), "recording saved");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::{CancelFlag, NeverCancel};
    use crate::fractal::FractalKind;
    use crate::render::CpuRenderer;
    use std::fs;

    #[derive(Default)]
    struct CollectingEncoder {
        frames: usize,
        listed: Vec<String>,
        fps: u32,
    }

    impl VideoEncoder for CollectingEncoder {
        fn encode(&mut self, frames: &FrameSequence, fps: u32, out: &Path) -> Result<(), ExportError> {
            self.frames = frames.len();
            self.fps = fps;
            let mut names: Vec<String> = fs::read_dir(frames.dir())?
                .map(|e| e.map(|e| e.file_name().to_string_lossy().into_owned()))
                .collect::<Result<_, _>>()?;
            names.sort();
            self.listed = names;
            fs::write(out, b"video")?;
            Ok(())
        }
    }

    fn julia() -> FractalInstance {
        FractalInstance::new(FractalKind::Julia2D, Path::new("shaders")).unwrap()
    }

    #[test]
    fn codec_args_follow_ffmpeg_conventions() {
        assert_eq!(
            VideoCodec::H264.ffmpeg_args(18),
            vec!["-c:v", "libx264", "-pix_fmt", "yuv420p", "-crf", "18"]
        );
        assert!(!VideoCodec::ProRes.ffmpeg_args(18).contains(&"-crf".to_string()));
        assert_eq!(VideoCodec::Vp9.extension(), "webm");
    }

    #[test]
    fn sizes_round_up_to_even() {
        assert_eq!(even_size((641, 480)), (642, 480));
        assert_eq!(even_size((0, 3)), (2, 4));
    }

    #[test]
    fn encoder_input_pattern_and_output() {
        let frames = FrameSequence::new().unwrap();
        let encoder = FfmpegEncoder::default();
        let args = encoder.args(&frames, 60, Path::new("out.mp4"));
        assert_eq!(&args[..3], &["-y", "-framerate", "60"]);
        assert!(args[4].ends_with("frame_%06d.png"));
        assert_eq!(args.last().map(String::as_str), Some("out.mp4"));
    }

    #[test]
    fn screenshot_is_a_timestamped_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let fractal = julia();
        let path = take_screenshot(&fractal, &mut CpuRenderer::new(), (15, 9), dir.path()).unwrap();
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("jpg"));
        let image = image::open(&path).unwrap();
        assert_eq!((image.width(), image.height()), (16, 10));
    }

    #[test]
    fn recording_writes_every_frame_then_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let mut fractal = julia();
        fractal.animation_mut().unwrap().set_duration(0.05);
        let mut encoder = CollectingEncoder::default();
        let out = record_video(
            &mut fractal,
            &mut CpuRenderer::new(),
            &mut encoder,
            (8, 8),
            dir.path(),
            "mp4",
            &NeverCancel,
        )
        .unwrap();
        // ceil(60 * 0.05) + 1
        assert_eq!(encoder.frames, 4);
        assert_eq!(encoder.fps, 60);
        assert_eq!(encoder.listed.first().map(String::as_str), Some("frame_000000.png"));
        assert!(out.exists());
    }

    #[test]
    fn cancelled_recording_produces_no_video() {
        let dir = tempfile::tempdir().unwrap();
        let mut fractal = julia();
        let cancel = CancelFlag::new();
        cancel.cancel();
        let mut encoder = CollectingEncoder::default();
        let err = record_video(
            &mut fractal,
            &mut CpuRenderer::new(),
            &mut encoder,
            (8, 8),
            dir.path(),
            "mp4",
            &cancel,
        )
        .unwrap_err();
        assert!(matches!(err, ExportError::Record(RecordError::Cancelled { .. })));
        assert_eq!(encoder.frames, 0);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
