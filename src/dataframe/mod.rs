//! Stacking per-bout feature vectors into one labeled table.
//!
//! The assembler walks the batch in a stable order (videos sorted by
//! name, then wells, animals and bouts ascending), so two runs over
//! identical inputs produce byte-identical row order. That, plus the fixed
//! feature policy, is what makes clustering labels reproducible and lets
//! classifier predictions be matched back against row indices.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use ndarray::{Array1, Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::bout::{Bout, BoutId};
use crate::error::{Error, Result};
use crate::features::{build_feature, FeaturePolicy, FrameLength};
use crate::loader::{Experiment, VideoResult};

/// Per-row metadata: where the row came from and how it is grouped.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RowMeta {
    pub id: BoutId,
    pub condition: String,
    pub genotype: String,
    pub duration_frames: usize,
}

/// The assembled dataframe of one clustering run: one feature vector per
/// surviving bout, plus enough metadata to trace every row back to its
/// source bout.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoutFrame {
    features: Array2<f64>,
    rows: Vec<RowMeta>,
    policy: FeaturePolicy,
    frame_length: usize,
    skipped: usize,
}

impl BoutFrame {
    /// The feature matrix, shape `(n_rows, n_features)`.
    pub fn features(&self) -> ArrayView2<'_, f64> {
        self.features.view()
    }

    pub fn rows(&self) -> &[RowMeta] {
        &self.rows
    }

    pub fn n_rows(&self) -> usize {
        self.features.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    /// The feature policy every row was built under.
    pub fn policy(&self) -> FeaturePolicy {
        self.policy
    }

    /// The resolved common frame length of this run.
    pub fn frame_length(&self) -> usize {
        self.frame_length
    }

    /// How many bouts failed feature extraction and were dropped.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Serializes the whole frame; features, labels and provenance
    /// round-trip losslessly through [`BoutFrame::from_reader`].
    pub fn to_writer(&self, writer: impl Write) -> Result<()> {
        serde_json::to_writer(writer, self)?;
        Ok(())
    }

    pub fn from_reader(reader: impl Read) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        self.to_writer(BufWriter::new(File::create(path)?))
    }

    pub fn read_json(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_reader(BufReader::new(File::open(path)?))
    }
}

/// Builds one bout's feature row, attaching provenance to failures.
///
/// This is the abort-on-first-failure alternative to [`assemble`]'s
/// skip-and-count behavior, for callers that treat a malformed bout as a
/// hard error.
pub fn build_row(
    id: &BoutId,
    bout: &Bout,
    policy: FeaturePolicy,
    len: usize,
    fps: f64,
) -> Result<Array1<f64>> {
    build_feature(bout, policy, len, fps).map_err(|source| Error::MalformedBout {
        id: id.clone(),
        source,
    })
}

/// Builds the dataframe for a whole batch of videos.
///
/// Bouts whose feature extraction fails are skipped and counted, never
/// aborting the run, unless zero bouts remain, which is fatal
/// ([`Error::EmptyDataframe`]). Wells without a row in the experiment
/// table keep empty condition/genotype labels.
pub fn assemble(
    videos: &[VideoResult],
    experiment: &Experiment,
    policy: FeaturePolicy,
    frame_length: FrameLength,
) -> Result<BoutFrame> {
    if let FrameLength::Fixed(0) = frame_length {
        return Err(Error::InvalidParameter(
            "frame length must be positive".into(),
        ));
    }

    // stable batch order: videos by name, bouts already (well, animal,
    // bout) ordered by the loader
    let mut order: Vec<&VideoResult> = videos.iter().collect();
    order.sort_by(|a, b| a.video.cmp(&b.video));

    let len = resolve_frame_length(frame_length, &order)?;
    debug!(frame_length = len, ?policy, "assembling dataframe");

    let width = len * policy.channels().len();
    let mut data = Vec::new();
    let mut rows = Vec::new();
    let mut skipped = 0usize;

    for video in &order {
        let meta = experiment.meta(&video.video);
        if meta.is_none() {
            warn!(
                video = %video.video,
                "no experiment-table row; assuming 1 fps and unlabeled wells"
            );
        }
        let fps = meta.map(|m| m.fps).unwrap_or(1.0);
        // loaders emit (well, animal, bout) order already; re-sorting here
        // keeps the row order independent of where the bouts came from
        let mut bouts: Vec<_> = video.bouts.iter().collect();
        bouts.sort_by(|a, b| a.0.cmp(&b.0));
        for (id, bout) in bouts {
            match build_row(id, bout, policy, len, fps) {
                Ok(vector) => {
                    data.extend(vector.iter());
                    rows.push(RowMeta {
                        id: id.clone(),
                        condition: meta
                            .map(|m| m.labels.condition_of(id.well).to_string())
                            .unwrap_or_default(),
                        genotype: meta
                            .map(|m| m.labels.genotype_of(id.well).to_string())
                            .unwrap_or_default(),
                        duration_frames: bout.duration_frames(),
                    });
                }
                Err(err) => {
                    warn!(bout = %id, %err, "skipping bout");
                    skipped += 1;
                }
            }
        }
    }

    if rows.is_empty() {
        return Err(Error::EmptyDataframe);
    }
    let features = Array2::from_shape_vec((rows.len(), width), data)
        .expect("row width is fixed by the policy and frame length");
    Ok(BoutFrame {
        features,
        rows,
        policy,
        frame_length: len,
        skipped,
    })
}

/// Resolves the common frame length of the batch. `Unbounded` derives it
/// as the minimum bout length over the whole batch, before any vector is
/// built; bouts with no frames at all are left for the per-bout extraction
/// to reject.
fn resolve_frame_length(frame_length: FrameLength, videos: &[&VideoResult]) -> Result<usize> {
    match frame_length {
        FrameLength::Fixed(n) => Ok(n),
        FrameLength::Unbounded => videos
            .iter()
            .flat_map(|v| v.bouts.iter())
            .map(|(_, bout)| bout.n_frames())
            .filter(|n| *n > 0)
            .min()
            .ok_or(Error::EmptyDataframe),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bout::Bout;
    use approx::assert_abs_diff_eq;

    fn bout(n: usize, phase: f64) -> Bout {
        Bout {
            start: 0,
            end: n - 1,
            tail_angle: Some((0..n).map(|i| (i as f64 * 0.4 + phase).sin()).collect()),
            head_x: Some((0..n).map(|i| i as f64).collect()),
            head_y: Some(vec![0.0; n]),
            bend_timing: vec![0, 4, 8],
            bend_amplitude: vec![1.0, -0.6, 0.8],
        }
    }

    fn video(name: &str, bouts: Vec<Bout>) -> VideoResult {
        let video = name.to_string();
        let bouts = bouts
            .into_iter()
            .enumerate()
            .map(|(i, b)| (BoutId::new(name, 0, 0, i), b))
            .collect();
        VideoResult {
            video,
            n_wells: 1,
            bouts,
        }
    }

    #[test]
    fn assembly_is_deterministic() {
        let videos = vec![
            video("b", vec![bout(30, 0.0), bout(25, 1.0)]),
            video("a", vec![bout(40, 2.0)]),
        ];
        let experiment = Experiment::default();
        let one = assemble(
            &videos,
            &experiment,
            FeaturePolicy::Angles,
            FrameLength::Fixed(20),
        )
        .unwrap();
        let two = assemble(
            &videos,
            &experiment,
            FeaturePolicy::Angles,
            FrameLength::Fixed(20),
        )
        .unwrap();
        assert_eq!(one, two);
        // videos are visited in name order regardless of input order
        assert_eq!(one.rows()[0].id.video, "a");
        assert_eq!(one.rows()[1].id.video, "b");
    }

    #[test]
    fn unbounded_resolves_to_the_batch_minimum() {
        let videos = vec![video("a", vec![bout(30, 0.0), bout(25, 1.0), bout(40, 2.0)])];
        let frame = assemble(
            &videos,
            &Experiment::default(),
            FeaturePolicy::Angles,
            FrameLength::Unbounded,
        )
        .unwrap();
        assert_eq!(frame.frame_length(), 25);
        assert_eq!(frame.n_features(), 25);
        assert_eq!(frame.n_rows(), 3);
    }

    #[test]
    fn malformed_bouts_are_skipped_and_counted() {
        let mut broken = bout(30, 0.0);
        broken.tail_angle = None;
        let videos = vec![video("a", vec![bout(30, 0.0), broken])];
        let frame = assemble(
            &videos,
            &Experiment::default(),
            FeaturePolicy::Angles,
            FrameLength::Fixed(30),
        )
        .unwrap();
        assert_eq!(frame.n_rows(), 1);
        assert_eq!(frame.skipped(), 1);
    }

    #[test]
    fn all_bouts_skipped_is_fatal() {
        let mut broken = bout(30, 0.0);
        broken.tail_angle = None;
        let videos = vec![video("a", vec![broken])];
        let err = assemble(
            &videos,
            &Experiment::default(),
            FeaturePolicy::Angles,
            FrameLength::Fixed(30),
        )
        .unwrap_err();
        assert!(matches!(err, Error::EmptyDataframe));
    }

    #[test]
    fn build_row_aborts_with_provenance() {
        let mut broken = bout(30, 0.0);
        broken.tail_angle = None;
        let id = BoutId::new("a", 2, 0, 5);
        let err = build_row(&id, &broken, FeaturePolicy::Angles, 30, 160.0).unwrap_err();
        match err {
            Error::MalformedBout { id: got, .. } => assert_eq!(got, id),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn zero_frame_length_fails_fast() {
        let videos = vec![video("a", vec![bout(30, 0.0)])];
        let err = assemble(
            &videos,
            &Experiment::default(),
            FeaturePolicy::Angles,
            FrameLength::Fixed(0),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)));
    }

    #[test]
    fn labels_come_from_the_experiment_table() {
        let csv = "\
trial_id,fq,pixelsize,condition,genotype,include
a,160,0.1,\"[dark]\",\"[wt]\",1
";
        let experiment = Experiment::from_csv_reader(csv.as_bytes()).unwrap();
        let videos = vec![video("a", vec![bout(30, 0.0)])];
        let frame = assemble(
            &videos,
            &experiment,
            FeaturePolicy::Angles,
            FrameLength::Fixed(10),
        )
        .unwrap();
        assert_eq!(frame.rows()[0].condition, "dark");
        assert_eq!(frame.rows()[0].genotype, "wt");
    }

    #[test]
    fn json_round_trip_preserves_everything() {
        let videos = vec![video("a", vec![bout(30, 0.0), bout(25, 1.0)])];
        let frame = assemble(
            &videos,
            &Experiment::default(),
            FeaturePolicy::AnglesSpeed,
            FrameLength::Fixed(12),
        )
        .unwrap();
        let mut buf = Vec::new();
        frame.to_writer(&mut buf).unwrap();
        let back = BoutFrame::from_reader(buf.as_slice()).unwrap();
        assert_eq!(back.rows(), frame.rows());
        assert_eq!(back.policy(), frame.policy());
        assert_abs_diff_eq!(back.features(), frame.features(), epsilon = 1e-12);
    }
}
