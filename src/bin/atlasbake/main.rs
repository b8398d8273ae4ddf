//! atlasbake CLI - bake textured assets from meshes and recorded scans.
//!
//! Usage: atlasbake <COMMAND> [OPTIONS] <INPUT> <OUT_DIR>
//!
//! Run `atlasbake --help` for available commands. Set `RUST_LOG=debug` for
//! per-pass logs.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Instant;

use clap::{Parser, Subcommand, ValueEnum};
use nalgebra::Matrix4;
use uuid::Uuid;

use atlasbake::atlas::{remap, unwrap, AtlasMesh, GridChartEngine, GridChartOptions, UnwrapEngine};
use atlasbake::bake::{
    render_preview, BakeOptions, OrbitCamera, Progress, RasterBackend, SampleFilter,
    SoftwareRasterizer, VertexPayload,
};
use atlasbake::export::AssetNames;
use atlasbake::io;
use atlasbake::mesh::bounding_box;
use atlasbake::pipeline::{BakeMode, BakeWorker, Pipeline, PipelineOptions, PipelineOutput};
use atlasbake::scan::{CaptureOptions, ScanManifest, ScanSession};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "atlasbake")]
#[command(author, version, about = "UV atlas texture baking CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display mesh information
    Info {
        /// Input mesh file
        input: PathBuf,

        /// Also unwrap with the grid engine and report atlas statistics
        #[arg(long)]
        atlas: bool,
    },

    /// Bake per-vertex data of a single mesh into an atlas texture
    BakeColors {
        /// Input mesh file
        input: PathBuf,

        /// Output directory for the OBJ, MTL and PNG
        out_dir: PathBuf,

        /// Vertex data to bake
        #[arg(short, long, value_enum, default_value = "colors")]
        payload: PayloadArg,

        /// Texture edge length in texels
        #[arg(short, long, default_value = "1024")]
        size: u32,

        /// Chart padding inside each grid cell, as a fraction of the cell
        #[arg(long, default_value = "0.05")]
        padding: f32,

        /// Base name of the exported files
        #[arg(short, long, default_value = "model")]
        name: String,

        /// Also render a preview of the textured mesh to this PNG
        #[arg(long)]
        preview: Option<PathBuf>,

        /// Rasterization backend
        #[arg(short, long, value_enum, default_value = "software")]
        backend: BackendArg,

        /// Unwrap engine
        #[arg(short, long, value_enum, default_value = "grid")]
        engine: EngineArg,
    },

    /// Bake a recorded scan by projecting its captures
    BakeScan {
        /// Scan manifest (JSON)
        manifest: PathBuf,

        /// Output directory for the OBJ, MTL and PNG
        out_dir: PathBuf,

        /// Texture edge length in texels
        #[arg(short, long, default_value = "4096")]
        size: u32,

        /// Capture sampling filter
        #[arg(short, long, value_enum, default_value = "bilinear")]
        filter: FilterArg,

        /// Minimum seconds between accepted captures
        #[arg(long, default_value = "0.5")]
        min_interval: f64,

        /// Base name of the exported files
        #[arg(short, long, default_value = "model")]
        name: String,

        /// Also render a preview of the textured mesh to this PNG
        #[arg(long)]
        preview: Option<PathBuf>,

        /// Rasterization backend
        #[arg(short, long, value_enum, default_value = "software")]
        backend: BackendArg,

        /// Unwrap engine
        #[arg(short, long, value_enum, default_value = "grid")]
        engine: EngineArg,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum PayloadArg {
    /// Vertex colors from the input file
    Colors,
    /// Position normalized to the bounding box
    Position,
    /// Normal mapped to [0, 1]
    Normal,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum FilterArg {
    /// Nearest texel
    Nearest,
    /// Bilinear interpolation
    Bilinear,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum EngineArg {
    /// One chart per triangle on a square grid
    Grid,
    /// xatlas charting and packing (requires the `xatlas` feature)
    Xatlas,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum BackendArg {
    /// CPU rasterizer
    Software,
    /// wgpu rasterizer (requires the `gpu` feature)
    Gpu,
}

impl From<PayloadArg> for VertexPayload {
    fn from(arg: PayloadArg) -> Self {
        match arg {
            PayloadArg::Colors => VertexPayload::Colors,
            PayloadArg::Position => VertexPayload::NormalizedPosition,
            PayloadArg::Normal => VertexPayload::Normal,
        }
    }
}

impl From<FilterArg> for SampleFilter {
    fn from(arg: FilterArg) -> Self {
        match arg {
            FilterArg::Nearest => SampleFilter::Nearest,
            FilterArg::Bilinear => SampleFilter::Bilinear,
        }
    }
}

type Backend = Box<dyn RasterBackend + Send>;
type Engine = Box<dyn UnwrapEngine + Send>;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> CliResult<()> {
    match cli.command {
        Commands::Info { input, atlas } => {
            cmd_info(&input, atlas)?;
        }

        Commands::BakeColors {
            input,
            out_dir,
            payload,
            size,
            padding,
            name,
            preview,
            backend,
            engine,
        } => {
            let engine = create_engine(engine, padding, size)?;
            let options = PipelineOptions::default()
                .with_bake_options(BakeOptions::default().with_texture_size(size))
                .with_asset_names(AssetNames::from_mesh_name(&name))
                .with_mode(BakeMode::VertexColors(payload.into()));
            cmd_bake_colors(&input, &out_dir, options, engine, preview.as_deref(), backend)?;
        }

        Commands::BakeScan {
            manifest,
            out_dir,
            size,
            filter,
            min_interval,
            name,
            preview,
            backend,
            engine,
        } => {
            let engine = create_engine(engine, GridChartOptions::default().padding, size)?;
            let options = PipelineOptions::default()
                .with_bake_options(
                    BakeOptions::default()
                        .with_texture_size(size)
                        .with_filter(filter.into()),
                )
                .with_asset_names(AssetNames::from_mesh_name(&name))
                .with_mode(BakeMode::Projections);
            cmd_bake_scan(&manifest, &out_dir, options, engine, min_interval, preview.as_deref(), backend)?;
        }
    }

    Ok(())
}

fn create_engine(engine: EngineArg, padding: f32, texture_size: u32) -> CliResult<Engine> {
    match engine {
        EngineArg::Grid => Ok(Box::new(GridChartEngine::new(
            GridChartOptions::default().with_padding(padding),
        ))),
        #[cfg(feature = "xatlas")]
        EngineArg::Xatlas => {
            let _ = padding;
            Ok(Box::new(atlasbake::atlas::XatlasEngine::new(
                atlasbake::atlas::XatlasOptions::default().with_resolution(texture_size),
            )))
        }
        #[cfg(not(feature = "xatlas"))]
        EngineArg::Xatlas => {
            let _ = texture_size;
            Err("the xatlas engine needs a build with `--features xatlas`".into())
        }
    }
}

fn create_backend(backend: BackendArg) -> CliResult<Backend> {
    match backend {
        BackendArg::Software => Ok(Box::new(SoftwareRasterizer::new())),
        #[cfg(feature = "gpu")]
        BackendArg::Gpu => {
            let gpu = atlasbake::bake::WgpuRasterizer::new()?;
            println!("GPU adapter: {}", gpu.adapter_name());
            Ok(Box::new(gpu))
        }
        #[cfg(not(feature = "gpu"))]
        BackendArg::Gpu => Err("the GPU backend needs a build with `--features gpu`".into()),
    }
}

/// Create a progress reporter that displays a progress bar on the terminal.
fn create_progress() -> Progress {
    let max_percent = Arc::new(AtomicUsize::new(0)); // Highest percent shown so far

    Progress::new(move |current, total, message| {
        if total == 0 {
            return;
        }

        let raw_percent = if current >= total {
            100
        } else {
            ((current * 100) + (total / 2)) / total
        };

        // Stages report on their own scales; never move the bar backwards
        let previous = max_percent.fetch_max(raw_percent, Ordering::Relaxed);
        let percent = previous.max(raw_percent);
        if percent == previous && percent != 100 {
            return;
        }

        let bar_width = 30;
        let filled = (percent * bar_width) / 100;
        let bar = "=".repeat(filled);
        let space = " ".repeat(bar_width - filled);

        eprint!("\r[{}{}] {:3}% {:<40}", bar, space, percent, message);
        let _ = std::io::stderr().flush();

        if current >= total {
            eprintln!();
        }
    })
}

fn cmd_info(input: &Path, show_atlas: bool) -> CliResult<()> {
    let mesh = io::load(input)?;

    println!("File: {}", input.display());
    println!("Vertices: {}", mesh.num_vertices());
    println!("Triangles: {}", mesh.num_triangles());
    println!("Normals: {}", if mesh.normals.is_some() { "yes" } else { "no (computed on load)" });
    println!("Vertex colors: {}", if mesh.colors.is_some() { "yes" } else { "no" });

    if let Some((min, max)) = bounding_box(&mesh.positions) {
        println!(
            "Bounding box: ({:.3}, {:.3}, {:.3}) to ({:.3}, {:.3}, {:.3})",
            min.x, min.y, min.z, max.x, max.y, max.z
        );
        let diag = max - min;
        println!("Dimensions: {:.3} x {:.3} x {:.3}", diag.x, diag.y, diag.z);
    }

    if show_atlas {
        let session = ScanSession::new();
        session.upsert_fragment(mesh.into_fragment(Uuid::new_v4(), Matrix4::identity()));
        let merged = session.snapshot().merge()?;

        let start = Instant::now();
        let atlas = unwrap(&mut GridChartEngine::default(), &merged)?;
        let atlas_mesh = remap(&merged, &atlas)?;
        let elapsed = start.elapsed();

        println!("\nAtlas (grid engine, {:.2?}):", elapsed);
        println!("  Atlas vertices: {}", atlas_mesh.num_vertices());
        println!("  Split source vertices: {}", atlas_mesh.split_vertices().len());
        println!(
            "  Vertex growth: {:.2}x",
            atlas_mesh.num_vertices() as f64 / atlas_mesh.num_source_vertices().max(1) as f64
        );
    }

    Ok(())
}

fn cmd_bake_colors(
    input: &Path,
    out_dir: &Path,
    options: PipelineOptions,
    engine: Engine,
    preview: Option<&Path>,
    backend: BackendArg,
) -> CliResult<()> {
    let mesh = io::load(input)?;
    println!("Loaded: {} vertices, {} triangles", mesh.num_vertices(), mesh.num_triangles());

    let session = ScanSession::new();
    session.upsert_fragment(mesh.into_fragment(Uuid::new_v4(), Matrix4::identity()));

    let size = options.bake.texture_size;
    let mut pipeline = Pipeline::new(engine, create_backend(backend)?, options)
        .with_progress(create_progress());

    println!(
        "Baking {}x{} texture with {} and {}...",
        size,
        size,
        pipeline.engine().name(),
        pipeline.baker().backend().name()
    );
    let start = Instant::now();
    let output = pipeline.run_session(&session, &Default::default())?;
    let elapsed = start.elapsed();

    finish(&output, out_dir, preview, elapsed)
}

fn cmd_bake_scan(
    manifest_path: &Path,
    out_dir: &Path,
    options: PipelineOptions,
    engine: Engine,
    min_interval: f64,
    preview: Option<&Path>,
    backend: BackendArg,
) -> CliResult<()> {
    let manifest = ScanManifest::load(manifest_path)?;
    let base_dir = manifest_path.parent().unwrap_or_else(|| Path::new("."));

    let session =
        ScanSession::with_capture_options(CaptureOptions::default().with_min_interval(min_interval));
    let summary = manifest.replay(base_dir, &session)?;
    println!(
        "Replayed: {} fragments, {} captures ({} rejected)",
        summary.fragments, summary.captures_accepted, summary.captures_rejected
    );

    let size = options.bake.texture_size;
    let pipeline = Pipeline::new(engine, create_backend(backend)?, options)
        .with_progress(create_progress());
    println!(
        "Baking {}x{} texture with {} and {}...",
        size,
        size,
        pipeline.engine().name(),
        pipeline.baker().backend().name()
    );

    let start = Instant::now();
    let (sender, receiver) = mpsc::channel();
    let handle = BakeWorker::spawn(pipeline, session.snapshot(), move |result| {
        let _ = sender.send(result);
    })?;
    let output = receiver
        .recv()
        .map_err(|_| "bake worker exited without a result")??;
    handle.join()?;
    let elapsed = start.elapsed();

    if let Some(report) = &output.report {
        println!(
            "Passes: {} run, {} cancelled",
            report.passes_run(),
            report.passes_cancelled
        );
    }

    finish(&output, out_dir, preview, elapsed)
}

fn finish(
    output: &PipelineOutput,
    out_dir: &Path,
    preview: Option<&Path>,
    elapsed: std::time::Duration,
) -> CliResult<()> {
    println!(
        "Atlas: {} vertices, {} triangles",
        output.mesh.num_vertices(),
        output.mesh.num_triangles()
    );

    let paths = output.asset.write_to_dir(out_dir)?;
    for path in &paths {
        println!("Saved: {}", path.display());
    }
    println!("Done ({:.2?})", elapsed);

    if let Some(path) = preview {
        save_preview(&output.mesh, &output.texture, path)?;
        println!("Preview: {}", path.display());
    }

    Ok(())
}

fn save_preview(mesh: &AtlasMesh, texture: &image::RgbaImage, path: &Path) -> CliResult<()> {
    let camera = match mesh.bounding_box() {
        Some((min, max)) => OrbitCamera::framing(min, max),
        None => OrbitCamera::default(),
    }
    .with_angles(0.6, 0.35);

    let image = render_preview(
        &mut SoftwareRasterizer::new(),
        mesh,
        texture,
        &camera,
        512,
        512,
        [40, 40, 48, 255],
    )?;
    image.save(path)?;
    Ok(())
}
