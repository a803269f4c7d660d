//! Decoding of one sampler document into a [`PowerSample`].
//!
//! Clusters are read from `processor.clusters`, or from
//! `processor.packages[*].clusters` when the direct list is absent. Names are
//! classified by convention (`E-Cluster`, `P0-Cluster`, ...); anything else is
//! kept under [`ClusterKind::Unknown`] rather than dropped.

use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::plist::{self, PlistError, PlistValue};
use super::tail::{DEFAULT_TAIL_BYTES, last_complete_document, read_tail};
use crate::platform::ThermalState;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("no complete document in sampler output")]
    NoCompleteDocument,
    #[error(transparent)]
    Plist(#[from] PlistError),
    #[error("unexpected document layout: {0}")]
    Schema(String),
    #[error("reading sampler output: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterKind {
    Efficiency,
    Performance,
    Unknown,
}

impl ClusterKind {
    /// `E`, `E1`, `P`, `P0` with an optional `-Cluster` suffix.
    pub fn classify(name: &str) -> Self {
        let stem = name.strip_suffix("-Cluster").unwrap_or(name);
        let mut chars = stem.chars();
        let kind = match chars.next() {
            Some('E') => Self::Efficiency,
            Some('P') => Self::Performance,
            _ => return Self::Unknown,
        };
        if chars.all(|c| c.is_ascii_digit()) {
            kind
        } else {
            Self::Unknown
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSample {
    pub name: String,
    pub kind: ClusterKind,
    pub frequency_hz: f64,
    pub cpu_count: usize,
}

/// Decoded power/frequency sample. Replaced wholesale on every decode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PowerSample {
    pub clusters: Vec<ClusterSample>,
    /// First efficiency cluster.
    pub efficiency_frequency_hz: f64,
    /// Peak across performance clusters.
    pub performance_frequency_hz: f64,
    pub package_watts: f64,
    pub gpu_frequency_hz: f64,
    pub gpu_watts: f64,
    pub ane_watts: Option<f64>,
    pub combined_watts: Option<f64>,
    pub thermal_pressure: Option<ThermalState>,
}

impl PowerSample {
    /// Cluster name → frequency, for display.
    pub fn cluster_frequencies(&self) -> BTreeMap<String, f64> {
        self.clusters
            .iter()
            .map(|c| (c.name.clone(), c.frequency_hz))
            .collect()
    }
}

fn number(node: Option<&PlistValue>, key: &str) -> Option<f64> {
    node?.get(key)?.as_f64()
}

fn milliwatts(node: Option<&PlistValue>, key: &str) -> Option<f64> {
    number(node, key).map(|mw| mw / 1000.0)
}

fn decode_clusters(list: &[PlistValue]) -> Result<Vec<ClusterSample>, DecodeError> {
    list.iter()
        .map(|entry| {
            let name = entry
                .get("name")
                .and_then(PlistValue::as_str)
                .ok_or_else(|| DecodeError::Schema("cluster without name".into()))?;
            Ok(ClusterSample {
                name: name.to_string(),
                kind: ClusterKind::classify(name),
                frequency_hz: number(Some(entry), "freq_hz").unwrap_or(0.0),
                cpu_count: entry
                    .get("cpus")
                    .and_then(PlistValue::as_array)
                    .map_or(0, <[PlistValue]>::len),
            })
        })
        .collect()
}

fn cluster_list(processor: &PlistValue) -> Result<Vec<ClusterSample>, DecodeError> {
    if let Some(direct) = processor.get("clusters").and_then(PlistValue::as_array) {
        return decode_clusters(direct);
    }
    let mut clusters = Vec::new();
    if let Some(packages) = processor.get("packages").and_then(PlistValue::as_array) {
        for package in packages {
            if let Some(list) = package.get("clusters").and_then(PlistValue::as_array) {
                clusters.extend(decode_clusters(list)?);
            }
        }
    }
    Ok(clusters)
}

/// Map a parsed document to a [`PowerSample`].
pub fn from_plist(root: &PlistValue) -> Result<PowerSample, DecodeError> {
    if !matches!(root, PlistValue::Dict(_)) {
        return Err(DecodeError::Schema("root is not a dictionary".into()));
    }
    let processor = root.get("processor");
    let gpu = root.get("gpu");
    if processor.is_none() && gpu.is_none() {
        return Err(DecodeError::Schema("no processor or gpu section".into()));
    }

    let clusters = match processor {
        Some(p) => cluster_list(p)?,
        None => Vec::new(),
    };
    let efficiency_frequency_hz = clusters
        .iter()
        .find(|c| c.kind == ClusterKind::Efficiency)
        .map_or(0.0, |c| c.frequency_hz);
    let performance_frequency_hz = clusters
        .iter()
        .filter(|c| c.kind == ClusterKind::Performance)
        .map(|c| c.frequency_hz)
        .fold(0.0, f64::max);

    let package_watts = milliwatts(processor, "cpu_power")
        .or_else(|| milliwatts(Some(root), "cpu_power"))
        .unwrap_or(0.0);
    let gpu_watts = milliwatts(gpu, "gpu_power")
        .or_else(|| milliwatts(processor, "gpu_power"))
        .or_else(|| milliwatts(Some(root), "gpu_power"))
        .unwrap_or(0.0);
    let ane_watts = milliwatts(processor, "ane_power").or_else(|| milliwatts(Some(root), "ane_power"));
    let combined_watts =
        milliwatts(processor, "combined_power").or_else(|| milliwatts(Some(root), "combined_power"));

    let thermal_pressure = root
        .get("thermal_pressure")
        .and_then(PlistValue::as_str)
        .and_then(ThermalState::from_label);

    Ok(PowerSample {
        clusters,
        efficiency_frequency_hz,
        performance_frequency_hz,
        package_watts,
        gpu_frequency_hz: number(gpu, "freq_hz").unwrap_or(0.0),
        gpu_watts,
        ane_watts,
        combined_watts,
        thermal_pressure,
    })
}

/// Decode exactly one document.
pub fn decode_document(text: &str) -> Result<PowerSample, DecodeError> {
    from_plist(&plist::parse(text)?)
}

/// Decode the last complete document in a buffer of concatenated documents.
pub fn decode_latest(text: &str) -> Result<PowerSample, DecodeError> {
    let document = last_complete_document(text).ok_or(DecodeError::NoCompleteDocument)?;
    decode_document(document)
}

/// Read the tail of the sampler output file and decode its latest document.
///
/// `Ok(None)` when the file is missing or empty (sampler not yet written
/// anything).
pub fn decode_file(path: &Path) -> Result<Option<PowerSample>, DecodeError> {
    let text = match read_tail(path, DEFAULT_TAIL_BYTES) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::debug!("{} does not exist yet", path.display());
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };
    if text.trim().is_empty() {
        return Ok(None);
    }
    decode_latest(&text).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
  <key>thermal_pressure</key><string>Nominal</string>
  <key>processor</key>
  <dict>
    <key>clusters</key>
    <array>
      <dict><key>name</key><string>E-Cluster</string><key>freq_hz</key><real>972000000</real>
        <key>cpus</key><array><dict><key>cpu</key><integer>0</integer></dict><dict><key>cpu</key><integer>1</integer></dict></array></dict>
      <dict><key>name</key><string>P0-Cluster</string><key>freq_hz</key><real>2064000000</real></dict>
      <dict><key>name</key><string>P1-Cluster</string><key>freq_hz</key><real>3228000000</real></dict>
    </array>
    <key>cpu_power</key><real>1234.5</real>
    <key>ane_power</key><real>0</real>
    <key>combined_power</key><real>1800</real>
  </dict>
  <key>gpu</key>
  <dict>
    <key>freq_hz</key><real>389000000</real>
    <key>gpu_power</key><real>512</real>
  </dict>
</dict>
</plist>
"#;

    #[test]
    fn classify_cluster_names() {
        assert_eq!(ClusterKind::classify("E-Cluster"), ClusterKind::Efficiency);
        assert_eq!(ClusterKind::classify("E1-Cluster"), ClusterKind::Efficiency);
        assert_eq!(ClusterKind::classify("P0-Cluster"), ClusterKind::Performance);
        assert_eq!(ClusterKind::classify("P"), ClusterKind::Performance);
        assert_eq!(ClusterKind::classify("GPU-Cluster"), ClusterKind::Unknown);
        assert_eq!(ClusterKind::classify(""), ClusterKind::Unknown);
    }

    #[test]
    fn decodes_full_sample() {
        let s = decode_document(SAMPLE).unwrap();
        assert_eq!(s.clusters.len(), 3);
        assert_eq!(s.clusters[0].cpu_count, 2);
        assert_eq!(s.efficiency_frequency_hz, 972_000_000.0);
        assert_eq!(s.performance_frequency_hz, 3_228_000_000.0);
        assert!((s.package_watts - 1.2345).abs() < 1e-9);
        assert_eq!(s.gpu_frequency_hz, 389_000_000.0);
        assert!((s.gpu_watts - 0.512).abs() < 1e-9);
        assert_eq!(s.ane_watts, Some(0.0));
        assert_eq!(s.combined_watts, Some(1.8));
        assert_eq!(s.thermal_pressure, Some(ThermalState::Nominal));
        assert_eq!(s.cluster_frequencies()["P0-Cluster"], 2_064_000_000.0);
    }

    #[test]
    fn clusters_nested_under_packages() {
        let text = r#"<plist version="1.0"><dict><key>processor</key><dict>
            <key>packages</key><array><dict><key>clusters</key><array>
              <dict><key>name</key><string>E-Cluster</string><key>freq_hz</key><integer>600000000</integer></dict>
              <dict><key>name</key><string>P-Cluster</string><key>freq_hz</key><integer>3000000000</integer></dict>
            </array></dict></array>
            <key>cpu_power</key><integer>2000</integer>
            <key>gpu_power</key><integer>250</integer>
          </dict></dict></plist>"#;
        let s = decode_document(text).unwrap();
        assert_eq!(s.clusters.len(), 2);
        assert_eq!(s.performance_frequency_hz, 3_000_000_000.0);
        assert_eq!(s.package_watts, 2.0);
        assert_eq!(s.gpu_watts, 0.25);
        assert_eq!(s.ane_watts, None);
    }

    #[test]
    fn direct_clusters_preferred_over_packages() {
        let text = r#"<plist version="1.0"><dict><key>processor</key><dict>
            <key>clusters</key><array><dict><key>name</key><string>E-Cluster</string><key>freq_hz</key><integer>1</integer></dict></array>
            <key>packages</key><array><dict><key>clusters</key><array>
              <dict><key>name</key><string>E-Cluster</string><key>freq_hz</key><integer>2</integer></dict>
            </array></dict></array>
          </dict></dict></plist>"#;
        let s = decode_document(text).unwrap();
        assert_eq!(s.clusters.len(), 1);
        assert_eq!(s.efficiency_frequency_hz, 1.0);
    }

    #[test]
    fn unknown_clusters_are_kept() {
        let text = r#"<plist version="1.0"><dict><key>processor</key><dict>
            <key>clusters</key><array><dict><key>name</key><string>X-Cluster</string><key>freq_hz</key><integer>5</integer></dict></array>
          </dict></dict></plist>"#;
        let s = decode_document(text).unwrap();
        assert_eq!(s.clusters[0].kind, ClusterKind::Unknown);
        assert_eq!(s.efficiency_frequency_hz, 0.0);
        assert_eq!(s.performance_frequency_hz, 0.0);
    }

    #[test]
    fn schema_mismatch() {
        let err = decode_document(r#"<plist version="1.0"><dict><key>a</key><integer>1</integer></dict></plist>"#)
            .unwrap_err();
        assert!(matches!(err, DecodeError::Schema(_)));
        let err = decode_document(r#"<plist version="1.0"><array/></plist>"#).unwrap_err();
        assert!(matches!(err, DecodeError::Schema(_)));
    }

    #[test]
    fn latest_of_concatenated_stream() {
        let second = SAMPLE.replace("1234.5", "4321");
        let text = format!("{SAMPLE}{second}{}", &SAMPLE[..SAMPLE.len() / 2]);
        let s = decode_latest(&text).unwrap();
        assert!((s.package_watts - 4.321).abs() < 1e-9);
    }

    #[test]
    fn stream_without_complete_document() {
        let err = decode_latest(&SAMPLE[..SAMPLE.len() / 2]).unwrap_err();
        assert!(matches!(err, DecodeError::NoCompleteDocument));
    }

    #[test]
    fn decode_missing_file_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-written-yet.plist");
        assert!(decode_file(&path).unwrap().is_none());
    }

    #[test]
    fn decode_empty_file_is_noop() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(decode_file(file.path()).unwrap().is_none());
    }
}
