//! Recorded scans as JSON manifests.
//!
//! A manifest lists fragment meshes and capture images by path, relative to
//! the manifest file, so a scan can be replayed into a [`ScanSession`]:
//!
//! ```json
//! {
//!   "fragments": [
//!     { "anchor": "67e55044-10b1-426f-9247-bb680e5fe0c8", "mesh": "frag0.ply",
//!       "transform": [1,0,0,0, 0,1,0,0, 0,0,1,0, 0,0,0,1], "timestamp": 0.0 }
//!   ],
//!   "captures": [
//!     { "timestamp": 0.0, "image": "cap0.png",
//!       "view_projection": [1,0,0,0, 0,1,0,0, 0,0,1,0, 0,0,0,1] }
//!   ]
//! }
//! ```
//!
//! Matrices are column-major. `anchor` defaults to a fresh id, `transform`
//! to the identity and `timestamp` to zero.

use std::path::{Path, PathBuf};

use nalgebra::Matrix4;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Capture, CaptureOutcome, ScanEffect, ScanEvent, ScanSession};
use crate::error::{BakeError, Result};

const IDENTITY: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

fn identity() -> [f32; 16] {
    IDENTITY
}

/// One fragment observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentEntry {
    /// Anchor identity. Entries sharing an anchor replace each other in order.
    #[serde(default)]
    pub anchor: Option<Uuid>,
    /// Mesh file, relative to the manifest.
    pub mesh: PathBuf,
    /// Column-major fragment to world transform.
    #[serde(default = "identity")]
    pub transform: [f32; 16],
    /// Observation time in seconds.
    #[serde(default)]
    pub timestamp: f64,
}

/// One capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureEntry {
    /// Capture time in seconds.
    pub timestamp: f64,
    /// PNG or JPEG image, relative to the manifest.
    pub image: PathBuf,
    /// Column-major world to clip transform.
    pub view_projection: [f32; 16],
}

/// A recorded scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanManifest {
    /// Fragment observations, in order.
    #[serde(default)]
    pub fragments: Vec<FragmentEntry>,
    /// Captures, in order.
    #[serde(default)]
    pub captures: Vec<CaptureEntry>,
}

/// What a replay did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Fragments stored, new or replacing.
    pub fragments: usize,
    /// Captures accepted by the session.
    pub captures_accepted: usize,
    /// Captures the session rejected.
    pub captures_rejected: usize,
}

impl ScanManifest {
    /// Parse manifest JSON.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| BakeError::Parse {
            format: "manifest",
            line: e.line(),
            message: e.to_string(),
        })
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| BakeError::invalid_param("manifest", e, "cannot serialize"))
    }

    /// Load a manifest file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text).map_err(|e| BakeError::LoadError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Replay into a session, resolving paths against `base_dir`.
    ///
    /// All fragments are applied before any capture, since the session
    /// ignores captures while it holds no geometry.
    pub fn replay<P: AsRef<Path>>(&self, base_dir: P, session: &ScanSession) -> Result<ReplaySummary> {
        let base_dir = base_dir.as_ref();
        let mut summary = ReplaySummary::default();

        for entry in &self.fragments {
            let mesh = crate::io::load(base_dir.join(&entry.mesh))?;
            let fragment = mesh
                .into_fragment(
                    entry.anchor.unwrap_or_else(Uuid::new_v4),
                    Matrix4::from_column_slice(&entry.transform),
                )
                .with_update_time(entry.timestamp);
            if let ScanEffect::FragmentStored { .. } = session.apply(ScanEvent::Updated(fragment)) {
                summary.fragments += 1;
            }
        }

        for entry in &self.captures {
            let path = base_dir.join(&entry.image);
            let bytes = std::fs::read(&path).map_err(|e| BakeError::LoadError {
                path: path.clone(),
                message: e.to_string(),
            })?;
            let capture = Capture::from_encoded(
                entry.timestamp,
                &bytes,
                Matrix4::from_column_slice(&entry.view_projection),
            )?;
            match session.apply(ScanEvent::Captured(capture)) {
                ScanEffect::Capture(CaptureOutcome::Accepted) => summary.captures_accepted += 1,
                _ => summary.captures_rejected += 1,
            }
        }

        log::info!(
            "Replayed manifest: {} fragments, {} captures accepted, {} rejected",
            summary.fragments,
            summary.captures_accepted,
            summary.captures_rejected
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};

    #[test]
    fn test_parse_defaults() {
        let manifest = ScanManifest::from_json(
            r#"{ "fragments": [ { "mesh": "a.obj" } ],
                 "captures": [ { "timestamp": 1.5, "image": "c.png",
                                 "view_projection": [1,0,0,0, 0,1,0,0, 0,0,1,0, 0,0,0,1] } ] }"#,
        )
        .unwrap();

        assert_eq!(manifest.fragments[0].anchor, None);
        assert_eq!(manifest.fragments[0].transform, IDENTITY);
        assert_eq!(manifest.fragments[0].timestamp, 0.0);
        assert_eq!(manifest.captures[0].timestamp, 1.5);
        assert_eq!(ScanManifest::from_json("{}").unwrap(), ScanManifest::default());
    }

    #[test]
    fn test_malformed_json() {
        let err = ScanManifest::from_json("{ \"fragments\": [ { } ] }").unwrap_err();
        assert!(matches!(err, BakeError::Parse { format: "manifest", .. }));
    }

    #[test]
    fn test_json_round_trip() {
        let manifest = ScanManifest {
            fragments: vec![FragmentEntry {
                anchor: Some(Uuid::from_u128(5)),
                mesh: PathBuf::from("f.obj"),
                transform: IDENTITY,
                timestamp: 2.0,
            }],
            captures: Vec::new(),
        };
        let json = manifest.to_json().unwrap();
        assert_eq!(ScanManifest::from_json(&json).unwrap(), manifest);
    }

    #[test]
    fn test_replay() {
        let dir = std::env::temp_dir().join(format!("atlasbake-manifest-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("tri.obj"), "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n").unwrap();
        RgbaImage::from_pixel(2, 2, Rgba([9, 9, 9, 255]))
            .save_with_format(dir.join("cap.png"), ImageFormat::Png)
            .unwrap();

        let anchor = Uuid::from_u128(11);
        let mut translated = IDENTITY;
        translated[12] = 3.0;
        let manifest = ScanManifest {
            fragments: vec![
                FragmentEntry {
                    anchor: Some(anchor),
                    mesh: "tri.obj".into(),
                    transform: IDENTITY,
                    timestamp: 0.0,
                },
                FragmentEntry {
                    anchor: Some(anchor),
                    mesh: "tri.obj".into(),
                    transform: translated,
                    timestamp: 1.0,
                },
            ],
            captures: [0.0, 0.2, 0.7]
                .iter()
                .map(|&t| CaptureEntry {
                    timestamp: t,
                    image: "cap.png".into(),
                    view_projection: IDENTITY,
                })
                .collect(),
        };

        let session = ScanSession::new();
        let summary = manifest.replay(&dir, &session).unwrap();
        std::fs::remove_dir_all(&dir).ok();

        assert_eq!(summary.fragments, 2);
        assert_eq!(summary.captures_accepted, 2);
        assert_eq!(summary.captures_rejected, 1);

        // The second observation replaced the first, translation in column 3
        let merged = session.snapshot().merge().unwrap();
        assert_eq!(merged.num_vertices(), 3);
        assert_eq!(merged.positions[0].x, 3.0);
    }
}
