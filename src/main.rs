use anyhow::{Context, Result};
use clap::Parser;
use motion_lab::capture::{CaptureSource, ImageSequence, WebcamCapture};
use motion_lab::console::{Console, MenuChoice};
use motion_lab::detection::{
    self, AdaptiveSettings, DetectorSettings, FrameDifferenceSettings, MogSettings, Strategy,
};
use motion_lab::output::{DisplayFanout, SnapshotWriter, V4L2Output};
use motion_lab::session::{self, SessionConfig};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input webcam device index
    #[arg(short, long, default_value_t = 0)]
    input_device: u32,

    /// Capture resolution width
    #[arg(long, default_value_t = 640)]
    capture_width: u32,

    /// Capture resolution height
    #[arg(long, default_value_t = 480)]
    capture_height: u32,

    /// Replay images from this directory instead of opening a camera
    #[arg(long)]
    frames_dir: Option<PathBuf>,

    /// Run one strategy directly instead of showing the menu
    #[arg(short, long, value_enum)]
    strategy: Option<Strategy>,

    /// Frames between the compared pair in frame differencing
    #[arg(long, default_value_t = 20)]
    lag_window: u32,

    /// Extra ring buffer slots beyond the lag window
    #[arg(long, default_value_t = 80)]
    tolerance: u32,

    /// Absolute intensity difference that counts as motion
    #[arg(long, default_value_t = 50)]
    threshold: u8,

    /// Adaptive background learning rate
    #[arg(long, default_value_t = 0.05)]
    alpha: f32,

    /// Mixture model learning rate (negative selects the automatic rate)
    #[arg(long, default_value_t = 0.05, allow_negative_numbers = true)]
    mog_learning_rate: f32,

    /// Mixture model history length
    #[arg(long, default_value_t = 500)]
    mog_history: u32,

    /// Gaussian components per pixel
    #[arg(long, default_value_t = 5)]
    mog_mixtures: usize,

    /// v4l2loopback device receiving one panel
    #[arg(short, long)]
    output_device: Option<String>,

    /// Panel sent to the v4l2loopback device
    #[arg(long, default_value = "Motion")]
    output_panel: String,

    /// Directory for PNG snapshots of every panel
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,

    /// Write snapshots once every N frames
    #[arg(long, default_value_t = 30)]
    snapshot_every: u64,

    /// Stop each session after this many frames
    #[arg(long)]
    max_frames: Option<u64>,

    /// Target frames per second (0 disables pacing)
    #[arg(long, default_value_t = 33)]
    fps: u32,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

impl Args {
    fn detector_settings(&self) -> DetectorSettings {
        DetectorSettings {
            frame_difference: FrameDifferenceSettings {
                lag_window: self.lag_window,
                tolerance: self.tolerance,
                threshold: self.threshold,
            },
            adaptive: AdaptiveSettings {
                learning_rate: self.alpha,
                threshold: self.threshold,
            },
            mog: MogSettings {
                history: self.mog_history,
                mixtures: self.mog_mixtures,
                learning_rate: self.mog_learning_rate,
                ..MogSettings::default()
            },
        }
    }

    fn open_capture(&self) -> Result<Box<dyn CaptureSource>> {
        let capture: Box<dyn CaptureSource> = match &self.frames_dir {
            Some(dir) => {
                Box::new(ImageSequence::open(dir).context("Failed to open frame directory")?)
            }
            None => Box::new(
                WebcamCapture::new(
                    self.input_device,
                    self.capture_width,
                    self.capture_height,
                    self.fps.max(1),
                )
                .context("Failed to initialize webcam capture")?,
            ),
        };
        Ok(capture)
    }

    fn open_display(&self) -> Result<DisplayFanout> {
        let mut display = DisplayFanout::new();

        if let Some(device) = &self.output_device {
            let output = V4L2Output::new(
                device,
                &self.output_panel,
                self.capture_width,
                self.capture_height,
            )
            .context("Failed to initialize v4l2loopback output")?;
            display.push(Box::new(output));
        }

        if let Some(dir) = &self.snapshot_dir {
            let writer = SnapshotWriter::new(dir, self.snapshot_every)
                .context("Failed to initialize snapshot output")?;
            display.push(Box::new(writer));
        }

        if display.is_empty() {
            tracing::warn!("No display configured, masks are only summarised in the log");
        }

        Ok(display)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("Background subtractor starting");

    let settings = args.detector_settings();
    settings.validate().context("Invalid detector settings")?;

    let session_config = SessionConfig {
        fps: args.fps,
        max_frames: args.max_frames,
    };
    let mut display = args.open_display()?;
    let mut console = Console::stdin();

    if let Some(strategy) = args.strategy {
        return run_strategy(
            &args,
            strategy,
            &settings,
            &session_config,
            &mut display,
            &mut console,
        );
    }

    loop {
        console.drain();
        match console.prompt_menu() {
            MenuChoice::Run(strategy) => run_strategy(
                &args,
                strategy,
                &settings,
                &session_config,
                &mut display,
                &mut console,
            )?,
            MenuChoice::Exit => break,
        }
    }

    tracing::info!("Exiting");
    Ok(())
}

fn run_strategy(
    args: &Args,
    strategy: Strategy,
    settings: &DetectorSettings,
    session_config: &SessionConfig,
    display: &mut DisplayFanout,
    console: &mut Console,
) -> Result<()> {
    let mut capture = args.open_capture()?;
    let (width, height) = capture.resolution();
    tracing::info!("Capture: {}x{}", width, height);

    let mut detector = detection::create_strategy(strategy, settings)
        .with_context(|| format!("Failed to create {} detector", strategy.description()))?;

    println!("Type q and press Enter to stop");
    let stats = session::run_session(
        &mut capture,
        detector.as_mut(),
        display,
        console,
        session_config,
    )?;

    tracing::info!(
        "{} frames processed, {} masks, mean foreground {:.1}%",
        stats.frames,
        stats.masks,
        stats.mean_foreground * 100.0
    );
    Ok(())
}
