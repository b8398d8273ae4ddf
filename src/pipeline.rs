//! The end-to-end bake: merge, unwrap, remap, bake, export.
//!
//! A [`Pipeline`] runs on a [`ScanSnapshot`], so the scanning producer can
//! keep mutating the session while a bake is in flight. [`BakeWorker`] runs
//! a pipeline on its own thread and hands the result to a callback.
//!
//! Nothing is retried. When a bake fails with an integrity error that names
//! a fragment, the caller may drop that fragment
//! ([`ScanSnapshot::without_fragment`]) and run again.
//!
//! # Example
//!
//! ```
//! use atlasbake::atlas::GridChartEngine;
//! use atlasbake::bake::{BakeOptions, CancelToken, SoftwareRasterizer, VertexPayload};
//! use atlasbake::mesh::MeshFragment;
//! use atlasbake::pipeline::{BakeMode, Pipeline, PipelineOptions};
//! use atlasbake::scan::ScanSession;
//! use nalgebra::{Matrix4, Point3, Vector3};
//! use uuid::Uuid;
//!
//! let session = ScanSession::new();
//! session.upsert_fragment(MeshFragment::new(
//!     Uuid::new_v4(),
//!     Matrix4::identity(),
//!     vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 0.0)],
//!     vec![Vector3::z(); 3],
//!     vec![[0, 1, 2]],
//! ));
//!
//! let options = PipelineOptions::default()
//!     .with_bake_options(BakeOptions::default().with_texture_size(64))
//!     .with_mode(BakeMode::VertexColors(VertexPayload::NormalizedPosition));
//! let mut pipeline = Pipeline::new(GridChartEngine::default(), SoftwareRasterizer::new(), options);
//!
//! let output = pipeline.run(&session.snapshot(), &CancelToken::new()).unwrap();
//! assert_eq!(output.texture.dimensions(), (64, 64));
//! assert!(output.asset.mesh_text.contains("usemtl material0"));
//! ```

use std::thread::JoinHandle;

use image::RgbaImage;

use crate::atlas::{remap, unwrap, AtlasMesh, UnwrapEngine};
use crate::bake::{
    BakeOptions, BakeReport, CancelToken, Progress, RasterBackend, TextureBaker, VertexPayload,
};
use crate::error::{BakeError, Result};
use crate::export::{export, AssetNames, ExportedAsset};
use crate::scan::{ScanSession, ScanSnapshot};

/// Stages reported through the pipeline's progress callback.
const STAGES: usize = 5;
const STAGE_BAKE: usize = 3;

/// What the bake stage writes into the atlas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BakeMode {
    /// One pass of a per-vertex payload.
    VertexColors(VertexPayload),
    /// One pass per capture in the snapshot, oldest first.
    Projections,
}

/// Pipeline configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    /// Baker options.
    pub bake: BakeOptions,
    /// Exported file names.
    pub names: AssetNames,
    /// Bake mode.
    pub mode: BakeMode,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            bake: BakeOptions::default(),
            names: AssetNames::default(),
            mode: BakeMode::Projections,
        }
    }
}

impl PipelineOptions {
    /// Set the baker options.
    pub fn with_bake_options(mut self, bake: BakeOptions) -> Self {
        self.bake = bake;
        self
    }

    /// Set the exported file names.
    pub fn with_asset_names(mut self, names: AssetNames) -> Self {
        self.names = names;
        self
    }

    /// Set the bake mode.
    pub fn with_mode(mut self, mode: BakeMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Everything a successful run produced.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// The atlas mesh the texture belongs to.
    pub mesh: AtlasMesh,
    /// The baked atlas texture.
    pub texture: RgbaImage,
    /// Per-pass report of a projective bake.
    pub report: Option<BakeReport>,
    /// The serialized asset.
    pub asset: ExportedAsset,
}

/// Runs the whole bake with one unwrap engine and one raster backend.
#[derive(Debug)]
pub struct Pipeline<E, B> {
    engine: E,
    baker: TextureBaker<B>,
    mode: BakeMode,
    names: AssetNames,
    progress: Progress,
}

impl<E: UnwrapEngine, B: RasterBackend> Pipeline<E, B> {
    /// Create a pipeline.
    pub fn new(engine: E, backend: B, options: PipelineOptions) -> Self {
        Self {
            engine,
            baker: TextureBaker::new(backend, options.bake),
            mode: options.mode,
            names: options.names,
            progress: Progress::none(),
        }
    }

    /// Report one step per stage; bake passes are reported within the bake stage.
    pub fn with_progress(mut self, progress: Progress) -> Self {
        let outer = progress.clone();
        self.baker.set_progress(Progress::new(move |done, total, message| {
            outer.report_sub(done, total, STAGE_BAKE, STAGES, message)
        }));
        self.progress = progress;
        self
    }

    /// The unwrap engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// The baker.
    pub fn baker(&self) -> &TextureBaker<B> {
        &self.baker
    }

    /// Snapshot a session and run on it.
    pub fn run_session(&mut self, session: &ScanSession, cancel: &CancelToken) -> Result<PipelineOutput> {
        self.run(&session.snapshot(), cancel)
    }

    /// Run on a snapshot.
    ///
    /// # Errors
    ///
    /// - `EmptyInput` when the snapshot has no fragments, before the engine runs.
    /// - `Integrity` from merge, unwrap or remap.
    /// - `ResourceUnavailable` from the engine, the backend or an empty capture.
    pub fn run(&mut self, snapshot: &ScanSnapshot, cancel: &CancelToken) -> Result<PipelineOutput> {
        if snapshot.fragments().is_empty() {
            return Err(BakeError::EmptyInput("scan has no fragments"));
        }

        self.progress.report_sub(0, 1, 0, STAGES, "Merging fragments");
        let merged = snapshot.merge()?;

        self.progress.report_sub(0, 1, 1, STAGES, "Unwrapping atlas");
        let atlas = unwrap(&mut self.engine, &merged)?;

        self.progress.report_sub(0, 1, 2, STAGES, "Remapping attributes");
        let mesh = remap(&merged, &atlas)?;

        self.progress.report_sub(0, 1, STAGE_BAKE, STAGES, "Baking texture");
        let (texture, report) = match &self.mode {
            BakeMode::VertexColors(payload) => (self.baker.bake_vertex_colors(&mesh, payload)?, None),
            BakeMode::Projections => {
                if snapshot.captures().is_empty() {
                    log::warn!("No captures to project; texture stays cleared");
                }
                let (texture, report) =
                    self.baker
                        .bake_projections(&mesh, snapshot.captures(), cancel)?;
                (texture, Some(report))
            }
        };

        self.progress.report_sub(0, 1, 4, STAGES, "Exporting asset");
        let asset = export(&mesh, &texture, &self.names)?;

        self.progress.report_sub(0, 1, STAGES, STAGES, "Done");
        Ok(PipelineOutput {
            mesh,
            texture,
            report,
            asset,
        })
    }
}

/// Starts pipelines on background threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct BakeWorker;

impl BakeWorker {
    /// Run `pipeline` on `snapshot` in a new thread.
    ///
    /// `on_complete` is called on the worker thread with the result. The
    /// returned handle can cancel the bake and gives the pipeline back on
    /// [`BakeHandle::join`].
    pub fn spawn<E, B, F>(
        mut pipeline: Pipeline<E, B>,
        snapshot: ScanSnapshot,
        on_complete: F,
    ) -> Result<BakeHandle<Pipeline<E, B>>>
    where
        E: UnwrapEngine + Send + 'static,
        B: RasterBackend + Send + 'static,
        F: FnOnce(Result<PipelineOutput>) + Send + 'static,
    {
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let thread = std::thread::Builder::new()
            .name("atlasbake-worker".to_string())
            .spawn(move || {
                log::debug!("Bake worker started on {} fragments", snapshot.fragments().len());
                let result = pipeline.run(&snapshot, &token);
                if let Err(e) = &result {
                    log::warn!("Bake failed: {}", e);
                }
                on_complete(result);
                pipeline
            })?;
        Ok(BakeHandle { cancel, thread })
    }
}

/// Handle to a running bake.
#[derive(Debug)]
pub struct BakeHandle<T> {
    cancel: CancelToken,
    thread: JoinHandle<T>,
}

impl<T> BakeHandle<T> {
    /// Skip the captures the bake has not started yet.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the worker thread has finished.
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the worker and take back what it owned.
    pub fn join(self) -> Result<T> {
        self.thread
            .join()
            .map_err(|_| BakeError::unavailable("bake worker", "worker thread panicked"))
    }
}
