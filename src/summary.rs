//! Per-cluster aggregation of a labeled dataframe.
//!
//! The tabular slice of the original per-cluster outputs: how many bouts
//! each cluster holds, how they split across conditions and genotypes,
//! and how long they last on average. Visual and per-cluster video
//! summaries are out of scope.

use std::collections::BTreeMap;
use std::io::Write;

use ndarray::ArrayView1;
use serde::Serialize;

use crate::dataframe::BoutFrame;
use crate::error::{Error, Result};

/// Aggregates of one cluster.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClusterRow {
    pub cluster: usize,
    pub n_bouts: usize,
    pub mean_duration_frames: f64,
    /// Bout counts per condition label
    pub by_condition: BTreeMap<String, usize>,
    /// Bout counts per genotype label
    pub by_genotype: BTreeMap<String, usize>,
}

/// Per-cluster summary of one clustering run, ordered by cluster id.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClusterSummary {
    rows: Vec<ClusterRow>,
}

impl ClusterSummary {
    /// Aggregates a dataframe by the labels a clustering run assigned to
    /// its rows. `labels` must have one entry per dataframe row.
    pub fn from_labels(frame: &BoutFrame, labels: ArrayView1<'_, usize>) -> Result<Self> {
        if labels.len() != frame.n_rows() {
            return Err(Error::InvalidParameter(format!(
                "{} labels for {} dataframe rows",
                labels.len(),
                frame.n_rows()
            )));
        }
        let n_clusters = labels.iter().max().map(|m| m + 1).unwrap_or(0);
        let mut rows: Vec<ClusterRow> = (0..n_clusters)
            .map(|cluster| ClusterRow {
                cluster,
                n_bouts: 0,
                mean_duration_frames: 0.0,
                by_condition: BTreeMap::new(),
                by_genotype: BTreeMap::new(),
            })
            .collect();

        for (meta, &label) in frame.rows().iter().zip(labels.iter()) {
            let row = &mut rows[label];
            row.n_bouts += 1;
            row.mean_duration_frames += meta.duration_frames as f64;
            *row.by_condition.entry(meta.condition.clone()).or_insert(0) += 1;
            *row.by_genotype.entry(meta.genotype.clone()).or_insert(0) += 1;
        }
        for row in &mut rows {
            if row.n_bouts > 0 {
                row.mean_duration_frames /= row.n_bouts as f64;
            }
        }
        Ok(ClusterSummary { rows })
    }

    pub fn rows(&self) -> &[ClusterRow] {
        &self.rows
    }

    /// Writes the summary as CSV, one line per cluster. Label maps are
    /// rendered as `label:count` pairs joined with `;`.
    pub fn write_csv(&self, writer: impl Write) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record(&[
            "cluster",
            "n_bouts",
            "mean_duration_frames",
            "conditions",
            "genotypes",
        ])?;
        for row in &self.rows {
            csv_writer.write_record(&[
                row.cluster.to_string(),
                row.n_bouts.to_string(),
                format!("{:.3}", row.mean_duration_frames),
                join_counts(&row.by_condition),
                join_counts(&row.by_genotype),
            ])?;
        }
        csv_writer.flush()?;
        Ok(())
    }
}

fn join_counts(counts: &BTreeMap<String, usize>) -> String {
    counts
        .iter()
        .map(|(label, count)| format!("{}:{}", label, count))
        .collect::<Vec<_>>()
        .join(";")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bout::{Bout, BoutId};
    use crate::dataframe::assemble;
    use crate::features::{FeaturePolicy, FrameLength};
    use crate::loader::{Experiment, VideoResult};
    use ndarray::array;

    fn labeled_frame() -> BoutFrame {
        let csv = "\
trial_id,fq,pixelsize,condition,genotype,include
vid,160,0.1,\"[dark,light]\",\"[wt,wt]\",1
";
        let experiment = Experiment::from_csv_reader(csv.as_bytes()).unwrap();
        let bouts = (0..4)
            .map(|i| {
                (
                    BoutId::new("vid", i / 2, 0, i % 2),
                    Bout {
                        start: 0,
                        end: 9 + i,
                        tail_angle: Some(vec![0.1; 10 + i]),
                        head_x: None,
                        head_y: None,
                        bend_timing: vec![],
                        bend_amplitude: vec![],
                    },
                )
            })
            .collect();
        let videos = vec![VideoResult {
            video: "vid".to_string(),
            n_wells: 2,
            bouts,
        }];
        assemble(
            &videos,
            &experiment,
            FeaturePolicy::Angles,
            FrameLength::Fixed(10),
        )
        .unwrap()
    }

    #[test]
    fn aggregates_counts_and_durations_per_cluster() {
        let frame = labeled_frame();
        // rows are in (well, animal, bout) order: well 0 first
        let labels = array![0, 0, 1, 1];
        let summary = ClusterSummary::from_labels(&frame, labels.view()).unwrap();
        assert_eq!(summary.rows().len(), 2);
        let first = &summary.rows()[0];
        assert_eq!(first.n_bouts, 2);
        assert!((first.mean_duration_frames - 11.0).abs() < 1e-9);
        assert_eq!(first.by_condition.get("dark"), Some(&2));
        let second = &summary.rows()[1];
        assert!((second.mean_duration_frames - 12.0).abs() < 1e-9);
        assert_eq!(second.by_condition.get("light"), Some(&2));
        assert_eq!(second.by_genotype.get("wt"), Some(&2));
    }

    #[test]
    fn label_count_must_match_row_count() {
        let frame = labeled_frame();
        let labels = array![0, 1];
        let err = ClusterSummary::from_labels(&frame, labels.view()).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)));
    }

    #[test]
    fn csv_export_has_one_line_per_cluster() {
        let frame = labeled_frame();
        let labels = array![0, 0, 1, 1];
        let summary = ClusterSummary::from_labels(&frame, labels.view()).unwrap();
        let mut buf = Vec::new();
        summary.write_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.trim().lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("0,2,"));
        assert!(lines[2].contains("light:2"));
    }
}
