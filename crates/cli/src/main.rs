use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process;
use std::thread;
use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use uuid::Uuid;

use yolo_detector_core::config::settings::Settings;
use yolo_detector_core::detection::domain::detection_result::{DetectionResult, DetectionStats};
use yolo_detector_core::detection::domain::detector_error::check_threshold;
use yolo_detector_core::models::model_import::import_model;
use yolo_detector_core::models::model_store::{canonical_model_id, ModelStore};
use yolo_detector_core::pipeline::detector_session::DetectorSession;
use yolo_detector_core::pipeline::live_frame_processor::{
    FrameOutcome, LiveFrameProcessor, ProcessorMessage,
};
use yolo_detector_core::render::overlay::draw_detections;
use yolo_detector_core::video::domain::frame_source::FrameSource;
use yolo_detector_core::video::infrastructure::ffmpeg_frame_source::FfmpegFrameSource;
use yolo_detector_core::video::infrastructure::image_io::{is_image, read_image, write_image};

/// YOLOv4 object detection for images and videos.
#[derive(Parser)]
#[command(name = "yolo-detect", version)]
struct Cli {
    /// Directory searched for the built-in model files before the cache.
    #[arg(long, global = true)]
    bundled_models: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Detect objects in a still image.
    Detect(DetectArgs),
    /// Run live detection over a video file.
    Stream(StreamArgs),
    /// Manage imported models.
    #[command(subcommand)]
    Models(ModelsCommand),
}

#[derive(Args)]
struct ThresholdArgs {
    /// Minimum detection confidence (0.0-1.0). Defaults to the saved setting.
    #[arg(long)]
    confidence: Option<f32>,

    /// IoU above which overlapping boxes are suppressed (0.0-1.0).
    #[arg(long)]
    nms: Option<f32>,

    /// Model id to use instead of the selected one.
    #[arg(long)]
    model: Option<String>,
}

#[derive(Args)]
struct DetectArgs {
    /// Input image.
    image: PathBuf,

    /// Write the image with boxes drawn to this path.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Write the letterboxed network input to this path.
    #[arg(long)]
    preprocessed: Option<PathBuf>,

    /// Print detections as JSON.
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    thresholds: ThresholdArgs,
}

#[derive(Args)]
struct StreamArgs {
    /// Input video.
    video: PathBuf,

    /// Feed frames at the video's own rate, dropping those that arrive
    /// while the detector is busy.
    #[arg(long)]
    realtime: bool,

    /// Keep landscape frames as decoded instead of turning them upright.
    #[arg(long)]
    keep_orientation: bool,

    #[command(flatten)]
    thresholds: ThresholdArgs,
}

#[derive(Subcommand)]
enum ModelsCommand {
    /// List available models.
    List,
    /// Import a weights/config/names triple.
    Import {
        #[arg(long)]
        name: String,
        #[arg(long)]
        weights: PathBuf,
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        names: PathBuf,
    },
    /// Delete an imported model.
    Delete { id: String },
    /// Make a model the default for detection.
    Select { id: String },
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut store = ModelStore::open_default()?;
    if let Some(dir) = &cli.bundled_models {
        store = store.with_bundled_dir(dir);
    }
    let mut settings = Settings::load();

    match cli.command {
        Command::Detect(args) => run_detect(&args, &store, &mut settings),
        Command::Stream(args) => run_stream(&args, &store, &mut settings),
        Command::Models(cmd) => run_models(cmd, &store, &mut settings),
    }
}

fn run_detect(
    args: &DetectArgs,
    store: &ModelStore,
    settings: &mut Settings,
) -> Result<(), Box<dyn std::error::Error>> {
    if !args.image.exists() {
        return Err(format!("Input file not found: {}", args.image.display()).into());
    }
    if !is_image(&args.image) {
        log::warn!("{} has no image extension, trying anyway", args.image.display());
    }
    let (confidence, nms) = thresholds(&args.thresholds, settings)?;
    let mut session = DetectorSession::new();
    load_session(&mut session, &args.thresholds, store, settings)?;

    let image = read_image(&args.image)?;
    let detections = session.detect_image(&image, confidence, nms)?;
    let elapsed = session.last_inference_time();

    if args.json {
        let report = serde_json::json!({
            "model": session.current_model_name(),
            "input_size": session.input_size(),
            "image_size": { "width": image.width(), "height": image.height() },
            "inference_time_ms": elapsed.as_secs_f64() * 1000.0,
            "detections": detections,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_detections(&detections);
        log::info!(
            "{} detections in {:.1}ms ({})",
            detections.len(),
            elapsed.as_secs_f64() * 1000.0,
            session.current_model_name()
        );
    }

    if let Some(path) = &args.preprocessed {
        match session.last_preprocessed_image() {
            Some(input) => write_image(path, input)?,
            None => log::warn!("No preprocessed image available"),
        }
    }
    if let Some(path) = &args.output {
        let mut annotated = image;
        draw_detections(&mut annotated, &detections);
        write_image(path, &annotated)?;
        log::info!("Output written to {}", path.display());
    }
    Ok(())
}

fn run_stream(
    args: &StreamArgs,
    store: &ModelStore,
    settings: &mut Settings,
) -> Result<(), Box<dyn std::error::Error>> {
    if !args.video.exists() {
        return Err(format!("Input file not found: {}", args.video.display()).into());
    }
    let (confidence, nms) = thresholds(&args.thresholds, settings)?;
    let mut session = DetectorSession::new().with_portrait_frames(!args.keep_orientation);
    load_session(&mut session, &args.thresholds, store, settings)?;

    let mut source = FfmpegFrameSource::new();
    let metadata = source.open(&args.video)?;
    let processor = LiveFrameProcessor::spawn(session, confidence, nms);
    let messages = processor.messages().clone();
    let mut summary = StreamSummary::default();
    let started = Instant::now();

    for buffer in source.buffers() {
        let buffer = buffer?;
        summary.decoded += 1;

        if args.realtime {
            if let Some(wait) = buffer.timestamp().checked_sub(started.elapsed()) {
                thread::sleep(wait);
            }
            processor.submit(buffer);
            for msg in messages.try_iter() {
                summary.record(msg);
            }
        } else if processor.submit(buffer) {
            // Wait for this frame so every decoded frame gets processed
            while let Ok(msg) = messages.recv() {
                if summary.record(msg) {
                    break;
                }
            }
        }
    }

    let dropped = processor.dropped_frames();
    let last_stats = processor.stats();
    processor.shutdown();
    for msg in messages.try_iter() {
        summary.record(msg);
    }
    source.close();

    summary.print(&metadata.codec, dropped, last_stats, started.elapsed().as_secs_f64());
    Ok(())
}

fn run_models(
    cmd: ModelsCommand,
    store: &ModelStore,
    settings: &mut Settings,
) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        ModelsCommand::List => {
            for model in store.load_models() {
                let marker = if model.id.to_string() == settings.selected_model_id {
                    "*"
                } else {
                    " "
                };
                println!(
                    "{marker} {}  {:<24} {:>9}  {:>3} classes  {}",
                    model.id,
                    model.display_name(),
                    model.input_size_description(),
                    model.class_count,
                    model.date_imported.format("%Y-%m-%d")
                );
            }
        }
        ModelsCommand::Import {
            name,
            weights,
            config,
            names,
        } => {
            let model = import_model(store, &name, &weights, &config, &names)?;
            println!("Imported {} as {}", model.display_name(), model.id);
        }
        ModelsCommand::Delete { id } => {
            let model = store.find_by_id(&id)?;
            if model.is_built_in() {
                return Err("The built-in model cannot be deleted".into());
            }
            store.delete_model(&model)?;
            if settings.selected_model_id == model.id.to_string() {
                settings.selected_model_id = Uuid::nil().to_string();
                settings.save()?;
            }
            println!("Deleted {}", model.display_name());
        }
        ModelsCommand::Select { id } => {
            let model = store.find_by_id(&id)?;
            settings.selected_model_id = model.id.to_string();
            settings.save()?;
            println!("Selected {}", model.display_name());
        }
    }
    Ok(())
}

/// Command-line thresholds win over the saved settings.
fn thresholds(
    args: &ThresholdArgs,
    settings: &Settings,
) -> Result<(f32, f32), Box<dyn std::error::Error>> {
    let confidence = check_threshold(
        "confidence",
        args.confidence.unwrap_or(settings.confidence_threshold),
    )?;
    let nms = check_threshold("nms", args.nms.unwrap_or(settings.nms_threshold))?;
    Ok((confidence, nms))
}

fn load_session(
    session: &mut DetectorSession,
    args: &ThresholdArgs,
    store: &ModelStore,
    settings: &mut Settings,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut selection = settings.clone();
    selection.selected_model_id = canonical_model_id(&selection.selected_model_id);
    if let Some(id) = &args.model {
        // An explicit choice must exist; only the saved one may fall back
        let model = store.find_by_id(id)?;
        selection.selected_model_id = model.id.to_string();
    }

    if selection.selected_model_id == Uuid::nil().to_string() {
        // Fetch config and names up front so the download shows progress
        store.resolve_built_in_files(Some(Box::new(download_progress)))?;
        eprintln!();
    }

    if !session.load_selected(store, &mut selection) {
        return Err(format!("Could not load model {}", selection.selected_model_id).into());
    }
    if args.model.is_none() && selection.selected_model_id != settings.selected_model_id {
        settings.selected_model_id = selection.selected_model_id;
        settings.save()?;
    }
    Ok(())
}

fn print_detections(detections: &[DetectionResult]) {
    for det in detections {
        let b = det.bounding_box();
        println!(
            "{:<24} x={:.0} y={:.0} w={:.0} h={:.0}",
            det.label(),
            b.x,
            b.y,
            b.width,
            b.height
        );
    }
}

#[derive(Default)]
struct StreamSummary {
    decoded: usize,
    processed: usize,
    errors: usize,
    detections: usize,
    per_class: BTreeMap<String, usize>,
}

impl StreamSummary {
    /// Returns true when `msg` finished a frame, successfully or not.
    fn record(&mut self, msg: ProcessorMessage) -> bool {
        match msg {
            ProcessorMessage::Frame(FrameOutcome { detections, .. }) => {
                self.processed += 1;
                self.detections += detections.len();
                for det in &detections {
                    *self.per_class.entry(det.class_name().to_string()).or_default() += 1;
                }
                true
            }
            ProcessorMessage::Stats(stats) => {
                log::info!(
                    "{:.1} fps ({} frames offered), inference {:.1}ms, {} objects",
                    stats.fps,
                    stats.submitted_frames,
                    stats.inference_time_ms,
                    stats.detection_count
                );
                false
            }
            ProcessorMessage::Error(e) => {
                self.errors += 1;
                log::warn!("Frame failed: {e}");
                true
            }
        }
    }

    fn print(&self, codec: &str, dropped: usize, stats: DetectionStats, seconds: f64) {
        println!(
            "{} frames decoded ({codec}), {} processed, {dropped} dropped, {} failed in {seconds:.1}s",
            self.decoded, self.processed, self.errors
        );
        println!(
            "last window: {:.1} fps, inference {:.1}ms",
            stats.fps, stats.inference_time_ms
        );
        println!("{} detections", self.detections);
        for (class, count) in &self.per_class {
            println!("  {class:<20} {count}");
        }
    }
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading model files... {pct}%");
    } else {
        eprint!("\rDownloading model files... {downloaded} bytes");
    }
}
