//! Editable project bundle.
//!
//! A zip holding `draft_content.json` (canvas, tracks of ordered
//! non-overlapping segments, materials) and `draft_meta_info.json`. Times
//! are microseconds. Segments that would overlap on a track spill into an
//! extra lane of the same kind. Remote sources are referenced by URL; inline
//! sources are packaged under `materials/`.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use uuid::Uuid;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use vcomp_media::MediaSource;
use vcomp_models::timeline::{scene_start_times, to_micros, Boundary, DURATION_EPSILON};
use vcomp_models::{effective_style, Caption, CaptionPosition, CaptionStyle, ProjectRequest};

use crate::error::{PipelineResult, RenderError};
use crate::pipeline::scenes::PreparedScene;

pub const CONTENT_ENTRY: &str = "draft_content.json";
pub const META_ENTRY: &str = "draft_meta_info.json";
const MATERIALS_DIR: &str = "materials";

/// A visual segment of the composed timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct BundleVisual {
    pub scene_id: String,
    pub reference: String,
    pub local: Option<PathBuf>,
    pub is_image: bool,
    pub start: f64,
    pub duration: f64,
}

/// An audio segment of the composed timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct BundleAudio {
    pub reference: String,
    pub local: Option<PathBuf>,
    pub start: f64,
    pub duration: f64,
    /// Offset into the source
    pub source_start: f64,
    pub volume: f64,
}

/// Everything the bundle describes, in timeline coordinates.
#[derive(Debug, Clone)]
pub struct BundleTimeline<'a> {
    pub project_id: &'a str,
    pub name: &'a str,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub duration: f64,
    pub visuals: Vec<BundleVisual>,
    pub audios: Vec<BundleAudio>,
    pub captions: &'a [Caption],
    pub caption_style: Option<&'a CaptionStyle>,
}

impl<'a> BundleTimeline<'a> {
    /// Lay out the surviving scenes with the joins that were rendered.
    pub fn from_render(
        request: &'a ProjectRequest,
        scenes: &[PreparedScene<'_>],
        applied: &[Boundary],
        music_file: Option<&Path>,
        duration: f64,
    ) -> Self {
        let durations: Vec<f64> = scenes.iter().map(|s| s.clip.duration).collect();
        let starts = scene_start_times(&durations, applied);
        let (width, height) = request.resolution.dimensions();

        let mut visuals = Vec::with_capacity(scenes.len());
        let mut audios = Vec::new();

        for (prepared, start) in scenes.iter().zip(starts) {
            let scene = prepared.scene();
            let reference = scene
                .visual_source()
                .map(|s| s.reference().to_string())
                .unwrap_or_default();
            visuals.push(BundleVisual {
                scene_id: scene.id.clone(),
                reference,
                local: Some(prepared.fetched.source.clone()),
                is_image: prepared.fetched.is_image,
                start,
                duration: prepared.clip.duration,
            });

            for (voiceover, local) in scene.voiceovers.iter().zip(&prepared.fetched.voice_files) {
                let remaining = prepared.clip.duration - voiceover.start_offset;
                if remaining <= DURATION_EPSILON {
                    continue;
                }
                audios.push(BundleAudio {
                    reference: voiceover.audio_url.clone(),
                    local: local.clone(),
                    start: start + voiceover.start_offset,
                    duration: voiceover
                        .duration
                        .map_or(remaining, |d| d.min(remaining)),
                    source_start: 0.0,
                    volume: voiceover.volume,
                });
            }
        }

        if let (Some(music), Some(envelope)) = (&request.music, request.music_envelope()) {
            audios.push(BundleAudio {
                reference: music.audio_url.clone(),
                local: music_file.map(Path::to_path_buf),
                start: 0.0,
                duration,
                source_start: music.start_offset,
                volume: envelope.volume,
            });
        }

        Self {
            project_id: &request.project_id,
            name: &request.project_name,
            width,
            height,
            fps: request.fps,
            duration,
            visuals,
            audios,
            captions: &request.captions,
            caption_style: request.caption_style.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DraftContent {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub create_time: i64,
    pub update_time: i64,
    pub duration: i64,
    pub fps: u32,
    pub canvas_config: CanvasConfig,
    pub tracks: Vec<Track>,
    pub materials: Vec<Material>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanvasConfig {
    pub width: u32,
    pub height: u32,
    pub ratio: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
    Text,
}

#[derive(Debug, Clone, Serialize)]
pub struct Track {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TrackKind,
    /// 0 for the main lane of a kind, then overflow lanes
    pub lane: usize,
    pub segments: Vec<Segment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Segment {
    pub id: String,
    pub material_id: String,
    pub target_timerange: TimeRange,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_timerange: Option<TimeRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeRange {
    pub start: i64,
    pub duration: i64,
}

impl TimeRange {
    fn from_secs(start: f64, duration: f64) -> Self {
        Self {
            start: to_micros(start),
            duration: to_micros(duration),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MaterialKind {
    Video,
    Photo,
    Audio,
    Text,
}

#[derive(Debug, Clone, Serialize)]
pub struct Material {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MaterialKind,
    /// URL, or a path inside the bundle for inline sources
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_style: Option<TextStyle>,
    pub duration: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextStyle {
    pub font_size: u32,
    pub font_color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    pub position: CaptionPosition,
    pub shadow: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DraftMetaInfo {
    pub draft_id: String,
    pub draft_name: String,
    pub project_id: String,
    pub create_time: i64,
    pub scene_count: usize,
    pub duration: i64,
}

/// Files copied into the bundle: `(entry name, local file)`.
pub type PackagedFiles = Vec<(String, PathBuf)>;

/// A bundle ready to be written.
#[derive(Debug, Clone)]
pub struct Bundle {
    pub content: DraftContent,
    pub meta: DraftMetaInfo,
    pub packaged: PackagedFiles,
}

/// Build the bundle documents for a timeline.
pub fn build_bundle(timeline: &BundleTimeline<'_>, created_micros: i64) -> Bundle {
    let draft_id = Uuid::new_v4().to_string();
    let mut materials = Vec::new();
    let mut packaged = PackagedFiles::new();
    let mut tracks = Vec::new();

    let video = timeline
        .visuals
        .iter()
        .map(|visual| {
            let material = Material {
                id: Uuid::new_v4().to_string(),
                kind: if visual.is_image {
                    MaterialKind::Photo
                } else {
                    MaterialKind::Video
                },
                path: material_path(&visual.reference, visual.local.as_deref(), &mut packaged),
                content: None,
                text_style: None,
                duration: to_micros(visual.duration),
            };
            let segment = Segment {
                id: Uuid::new_v4().to_string(),
                material_id: material.id.clone(),
                target_timerange: TimeRange::from_secs(visual.start, visual.duration),
                source_timerange: Some(TimeRange::from_secs(0.0, visual.duration)),
                volume: Some(1.0),
            };
            materials.push(material);
            (visual.start, visual.start + visual.duration, segment)
        })
        .collect();
    push_lanes(&mut tracks, TrackKind::Video, video);

    let audio = timeline
        .audios
        .iter()
        .map(|audio| {
            let material = Material {
                id: Uuid::new_v4().to_string(),
                kind: MaterialKind::Audio,
                path: material_path(&audio.reference, audio.local.as_deref(), &mut packaged),
                content: None,
                text_style: None,
                duration: to_micros(audio.duration),
            };
            let segment = Segment {
                id: Uuid::new_v4().to_string(),
                material_id: material.id.clone(),
                target_timerange: TimeRange::from_secs(audio.start, audio.duration),
                source_timerange: Some(TimeRange::from_secs(audio.source_start, audio.duration)),
                volume: Some(audio.volume),
            };
            materials.push(material);
            (audio.start, audio.start + audio.duration, segment)
        })
        .collect();
    push_lanes(&mut tracks, TrackKind::Audio, audio);

    let text = timeline
        .captions
        .iter()
        .filter(|c| c.end_time > c.start_time)
        .map(|caption| {
            let style = effective_style(&caption.style, timeline.caption_style);
            let duration = caption.end_time - caption.start_time;
            let material = Material {
                id: Uuid::new_v4().to_string(),
                kind: MaterialKind::Text,
                path: None,
                content: Some(caption.text.clone()),
                text_style: Some(TextStyle {
                    font_size: style.font_size.pixels_for_height(timeline.height),
                    font_color: style.font_color.to_string(),
                    background_color: style.background.map(|c| c.to_string()),
                    position: style.position,
                    shadow: style.shadow,
                }),
                duration: to_micros(duration),
            };
            let segment = Segment {
                id: Uuid::new_v4().to_string(),
                material_id: material.id.clone(),
                target_timerange: TimeRange::from_secs(caption.start_time, duration),
                source_timerange: None,
                volume: None,
            };
            materials.push(material);
            (caption.start_time, caption.end_time, segment)
        })
        .collect();
    push_lanes(&mut tracks, TrackKind::Text, text);

    let duration = to_micros(timeline.duration);
    Bundle {
        content: DraftContent {
            id: draft_id.clone(),
            project_id: timeline.project_id.to_string(),
            name: timeline.name.to_string(),
            create_time: created_micros,
            update_time: created_micros,
            duration,
            fps: timeline.fps,
            canvas_config: CanvasConfig {
                width: timeline.width,
                height: timeline.height,
                ratio: aspect_ratio(timeline.width, timeline.height),
            },
            tracks,
            materials,
        },
        meta: DraftMetaInfo {
            draft_id,
            draft_name: timeline.name.to_string(),
            project_id: timeline.project_id.to_string(),
            create_time: created_micros,
            scene_count: timeline.visuals.len(),
            duration,
        },
        packaged,
    }
}

/// Greedy interval partitioning: each item goes to the first lane whose
/// last item has ended, in start order.
pub fn assign_lanes<T>(mut items: Vec<(f64, f64, T)>) -> Vec<Vec<T>> {
    items.sort_by(|a, b| a.0.total_cmp(&b.0));
    let mut lanes: Vec<(f64, Vec<T>)> = Vec::new();
    for (start, end, item) in items {
        match lanes
            .iter_mut()
            .find(|(lane_end, _)| *lane_end <= start + DURATION_EPSILON)
        {
            Some((lane_end, lane)) => {
                *lane_end = end;
                lane.push(item);
            }
            None => lanes.push((end, vec![item])),
        }
    }
    lanes.into_iter().map(|(_, lane)| lane).collect()
}

fn push_lanes(tracks: &mut Vec<Track>, kind: TrackKind, segments: Vec<(f64, f64, Segment)>) {
    for (lane, segments) in assign_lanes(segments).into_iter().enumerate() {
        tracks.push(Track {
            id: Uuid::new_v4().to_string(),
            kind,
            lane,
            segments,
        });
    }
}

fn material_path(reference: &str, local: Option<&Path>, packaged: &mut PackagedFiles) -> Option<String> {
    match MediaSource::parse(reference) {
        Ok(MediaSource::Remote(_)) => Some(reference.to_string()),
        _ => {
            let file = local?;
            let name = file.file_name()?.to_string_lossy();
            let entry = format!("{}/{}", MATERIALS_DIR, name);
            if !packaged.iter().any(|(e, _)| *e == entry) {
                packaged.push((entry.clone(), file.to_path_buf()));
            }
            Some(entry)
        }
    }
}

/// Reduced `W:H` ratio, e.g. `16:9`.
pub fn aspect_ratio(width: u32, height: u32) -> String {
    fn gcd(a: u32, b: u32) -> u32 {
        if b == 0 {
            a
        } else {
            gcd(b, a % b)
        }
    }
    let divisor = gcd(width, height).max(1);
    format!("{}:{}", width / divisor, height / divisor)
}

/// Write the bundle zip to `output`.
pub async fn write_bundle(bundle: Bundle, output: PathBuf) -> PipelineResult<()> {
    tokio::task::spawn_blocking(move || write_zip(&bundle, &output))
        .await
        .map_err(|e| RenderError::internal(format!("bundle writer panicked: {}", e)))?
}

fn write_zip(bundle: &Bundle, output: &Path) -> PipelineResult<()> {
    let mut zip = ZipWriter::new(File::create(output)?);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file(CONTENT_ENTRY, options)?;
    serde_json::to_writer_pretty(&mut zip, &bundle.content)?;
    zip.start_file(META_ENTRY, options)?;
    serde_json::to_writer_pretty(&mut zip, &bundle.meta)?;

    for (entry, file) in &bundle.packaged {
        zip.start_file(entry.as_str(), options)?;
        let mut source = File::open(file)?;
        io::copy(&mut source, &mut zip)?;
    }

    zip.finish()?;
    Ok(())
}
