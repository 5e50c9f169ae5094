//! Reading the result store and the experiment-organization table.
//!
//! The result-store layout is owned by the external tracking engine: one
//! directory per analyzed video under a store root, each containing a
//! `results_<video>.txt` JSON file. Its bout records are deserialized
//! through a declared schema rather than ad-hoc key lookups, so a schema
//! violation fails loudly at the load boundary instead of deep inside
//! feature extraction. Everything here is read-only; I/O errors propagate
//! to the caller unmodified.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::bout::{Bout, BoutId, WellLabels};
use crate::error::{Error, Result};

/// A result-store root: one sub-directory per analyzed video.
#[derive(Clone, Debug)]
pub struct ResultStore {
    root: PathBuf,
}

/// All bouts of one video, in (well, animal, bout) order.
#[derive(Clone, Debug)]
pub struct VideoResult {
    pub video: String,
    pub n_wells: usize,
    pub bouts: Vec<(BoutId, Bout)>,
}

impl ResultStore {
    /// Opens a result store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(Error::MalformedStore(format!(
                "{} is not a directory",
                root.display()
            )));
        }
        Ok(ResultStore { root })
    }

    /// Path of the results file for one video.
    pub fn results_path(&self, video: &str) -> PathBuf {
        self.root.join(video).join(format!("results_{}.txt", video))
    }

    /// Loads the bouts of one video.
    pub fn load_video(&self, video: &str) -> Result<VideoResult> {
        let path = self.results_path(video);
        let file = BufReader::new(File::open(&path)?);
        let result = parse_results(video, file)?;
        debug!(
            video,
            n_wells = result.n_wells,
            n_bouts = result.bouts.len(),
            "loaded result file"
        );
        Ok(result)
    }

    /// Loads several videos; name order is preserved.
    pub fn load_videos<I, S>(&self, videos: I) -> Result<Vec<VideoResult>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        videos
            .into_iter()
            .map(|name| self.load_video(name.as_ref()))
            .collect()
    }
}

/// Parses one results file into ordered bouts.
pub fn parse_results(video: &str, reader: impl Read) -> Result<VideoResult> {
    let raw: RawResults = serde_json::from_reader(reader)?;
    let n_wells = raw.well_poiss_mouv.len();
    let mut bouts = Vec::new();
    for (well, animals) in raw.well_poiss_mouv.into_iter().enumerate() {
        for (animal, raw_bouts) in animals.into_iter().enumerate() {
            for (bout, raw_bout) in raw_bouts.into_iter().enumerate() {
                if raw_bout.bout_end < raw_bout.bout_start {
                    return Err(Error::MalformedStore(format!(
                        "{}: bout {}/{}/{} ends before it starts",
                        video, well, animal, bout
                    )));
                }
                bouts.push((
                    BoutId::new(video, well, animal, bout),
                    raw_bout.into_bout(),
                ));
            }
        }
    }
    Ok(VideoResult {
        video: video.to_string(),
        n_wells,
        bouts,
    })
}

/// Result-file schema, as written by the tracking engine.
#[derive(Debug, Deserialize)]
struct RawResults {
    #[serde(rename = "wellPoissMouv")]
    well_poiss_mouv: Vec<Vec<Vec<RawBout>>>,
}

#[derive(Debug, Deserialize)]
struct RawBout {
    #[serde(rename = "BoutStart")]
    bout_start: usize,
    #[serde(rename = "BoutEnd")]
    bout_end: usize,
    #[serde(rename = "TailAngle_smoothed", default)]
    tail_angle_smoothed: Option<Vec<f64>>,
    #[serde(rename = "HeadX", default)]
    head_x: Option<Vec<f64>>,
    #[serde(rename = "HeadY", default)]
    head_y: Option<Vec<f64>>,
    #[serde(rename = "Bend_Timing", default)]
    bend_timing: Vec<usize>,
    #[serde(rename = "Bend_Amplitude", default)]
    bend_amplitude: Vec<f64>,
}

impl RawBout {
    fn into_bout(self) -> Bout {
        Bout {
            start: self.bout_start,
            end: self.bout_end,
            tail_angle: self.tail_angle_smoothed,
            head_x: self.head_x,
            head_y: self.head_y,
            bend_timing: self.bend_timing,
            bend_amplitude: self.bend_amplitude,
        }
    }
}

/// Per-video metadata from the experiment-organization table.
#[derive(Clone, Debug, PartialEq)]
pub struct VideoMeta {
    /// Acquisition rate, frames per second
    pub fps: f64,
    /// Pixel size, millimeters per pixel
    pub pixel_size: f64,
    pub labels: WellLabels,
}

/// The experiment-organization table: which videos belong to the analysis
/// and which condition/genotype every well carries.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Experiment {
    videos: BTreeMap<String, VideoMeta>,
}

/// One row of the experiment-organization table. The `condition` and
/// `genotype` cells hold per-well bracketed lists, e.g. `[wt,wt,mut,mut]`.
#[derive(Debug, Deserialize)]
struct ExperimentRow {
    trial_id: String,
    fq: f64,
    #[serde(default = "default_pixel_size")]
    pixelsize: f64,
    condition: String,
    genotype: String,
    #[serde(default = "default_include")]
    include: u8,
}

fn default_pixel_size() -> f64 {
    1.0
}

fn default_include() -> u8 {
    1
}

impl Experiment {
    /// Reads the table from a CSV file.
    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_csv_reader(BufReader::new(File::open(path)?))
    }

    /// Reads the table from any CSV source. Rows with `include = 0` are
    /// dropped here so the rest of the pipeline never sees them.
    pub fn from_csv_reader(reader: impl Read) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut videos = BTreeMap::new();
        for row in csv_reader.deserialize() {
            let row: ExperimentRow = row?;
            if row.include == 0 {
                debug!(video = %row.trial_id, "excluded by the experiment table");
                continue;
            }
            videos.insert(
                row.trial_id,
                VideoMeta {
                    fps: row.fq,
                    pixel_size: row.pixelsize,
                    labels: WellLabels {
                        condition: parse_well_list(&row.condition),
                        genotype: parse_well_list(&row.genotype),
                    },
                },
            );
        }
        Ok(Experiment { videos })
    }

    /// Metadata of one video, `None` when the table has no row for it.
    pub fn meta(&self, video: &str) -> Option<&VideoMeta> {
        self.videos.get(video)
    }

    /// Included video names, in sorted order.
    pub fn video_names(&self) -> impl Iterator<Item = &str> {
        self.videos.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.videos.is_empty()
    }
}

/// Expands a bracketed per-well list cell into one label per well.
/// A plain cell (no brackets) is a single shared label for well 0.
fn parse_well_list(cell: &str) -> Vec<String> {
    let inner = cell
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim();
    if inner.is_empty() {
        return Vec::new();
    }
    inner.split(',').map(|s| s.trim().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESULTS: &str = r#"{
        "firstFrame": 1,
        "wellPoissMouv": [
            [[
                {"AnimalNumber": 0, "BoutStart": 10, "BoutEnd": 14,
                 "TailAngle_smoothed": [0.0, 0.1, 0.2, 0.1, 0.0],
                 "HeadX": [5.0, 5.5, 6.0, 6.5, 7.0],
                 "HeadY": [2.0, 2.0, 2.0, 2.0, 2.0],
                 "Bend_Timing": [0, 2], "Bend_Amplitude": [0.2, -0.15]},
                {"AnimalNumber": 0, "BoutStart": 30, "BoutEnd": 32,
                 "HeadX": [1.0, 1.0, 1.0], "HeadY": [4.0, 4.5, 5.0]}
            ]],
            [[]]
        ]
    }"#;

    #[test]
    fn parses_wells_animals_and_bouts_in_order() {
        let result = parse_results("vid1", RESULTS.as_bytes()).unwrap();
        assert_eq!(result.n_wells, 2);
        assert_eq!(result.bouts.len(), 2);
        let (id, bout) = &result.bouts[0];
        assert_eq!(*id, BoutId::new("vid1", 0, 0, 0));
        assert_eq!(bout.start, 10);
        assert_eq!(bout.end, 14);
        assert_eq!(bout.tail_angle.as_ref().unwrap().len(), 5);
        assert_eq!(bout.bend_timing, vec![0, 2]);
        // the second bout has no tail series
        let (id, bout) = &result.bouts[1];
        assert_eq!(*id, BoutId::new("vid1", 0, 0, 1));
        assert!(bout.tail_angle.is_none());
        assert_eq!(bout.n_frames(), 3);
    }

    #[test]
    fn rejects_a_bout_ending_before_it_starts() {
        let bad = r#"{"wellPoissMouv": [[[{"BoutStart": 9, "BoutEnd": 3}]]]}"#;
        let err = parse_results("vid1", bad.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::MalformedStore(_)));
    }

    #[test]
    fn experiment_table_expands_well_lists_and_honors_include() {
        let csv = "\
trial_id,fq,pixelsize,condition,genotype,include
vid1,160,0.1,\"[wt,wt,het,het]\",\"[a,a,b,b]\",1
vid2,300,0.1,\"[wt]\",\"[a]\",0
vid3,160,0.1,light,wt,1
";
        let experiment = Experiment::from_csv_reader(csv.as_bytes()).unwrap();
        let names: Vec<&str> = experiment.video_names().collect();
        assert_eq!(names, vec!["vid1", "vid3"]);

        let meta = experiment.meta("vid1").unwrap();
        assert_eq!(meta.fps, 160.0);
        assert_eq!(meta.labels.condition_of(2), "het");
        assert_eq!(meta.labels.genotype_of(0), "a");
        // a plain cell is a single label; further wells read as empty
        let meta = experiment.meta("vid3").unwrap();
        assert_eq!(meta.labels.condition_of(0), "light");
        assert_eq!(meta.labels.condition_of(1), "");
    }
}
