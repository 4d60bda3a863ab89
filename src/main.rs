use anyhow::{Context, Result};
use clap::Parser;
use dubber::job::progress::ProgressListener;
use dubber::request::{DubbingRequest, TtsProviderChoice, VideoFormat};
use dubber::translate::TranslationContext;
use dubber::tts::AudioQuality;
use dubber::{Config, JobStatus};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "dubber")]
#[command(version, about = "Multilingual video dubbing pipeline")]
#[command(
    long_about = "Transcribe a video, translate the timed script, synthesize speech, and mux it back over the original video."
)]
struct Cli {
    /// Source video URL or local file
    url: String,

    /// Process only the first 60 seconds
    #[arg(long)]
    test_mode: bool,

    /// Disable pause detection in the transcript
    #[arg(long)]
    no_breath_detection: bool,

    /// Reformat the transcript with an LLM before further stages
    #[arg(long)]
    postprocess: bool,

    /// Post-processing model (default: auto-detect fallback order)
    #[arg(long)]
    postprocess_model: Option<String>,

    /// Source language of the video
    #[arg(long, default_value = "hu-HU")]
    source_language: String,

    /// Translate to this language (enables the translation stage)
    #[arg(short, long)]
    translate_to: Option<String>,

    /// Translation context: casual, legal, spiritual, marketing,
    /// scientific, educational, news
    #[arg(long, default_value = "casual")]
    context: String,

    /// Target audience description
    #[arg(long, default_value = "general public")]
    audience: String,

    /// Desired tone
    #[arg(long, default_value = "neutral")]
    tone: String,

    /// Synthesize audio from the (translated) script
    #[arg(short, long)]
    synthesize: bool,

    /// TTS provider: auto, elevenlabs, google_tts
    #[arg(long, default_value = "auto")]
    tts_provider: String,

    /// Voice id for synthesis
    #[arg(long)]
    voice: Option<String>,

    /// Audio quality: low, medium, high
    #[arg(long, default_value = "high")]
    audio_quality: String,

    /// Mux the synthesized audio back over the video
    #[arg(short, long)]
    mux: bool,

    /// Output video format: mp4, webm, avi, mkv
    #[arg(long, default_value = "mp4")]
    video_format: String,

    /// Re-encode video instead of stream-copying it
    #[arg(long)]
    no_preserve_quality: bool,

    /// Refuse to start if the estimate exceeds this budget (USD)
    #[arg(long)]
    max_cost: Option<f64>,

    /// Produce a 30-second preview instead of the full video
    #[arg(long)]
    preview: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Suppress the progress bar
    #[arg(short, long)]
    quiet: bool,
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

fn build_request(cli: &Cli) -> Result<DubbingRequest> {
    let context: TranslationContext = cli
        .context
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;
    let audio_quality: AudioQuality = cli
        .audio_quality
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;
    let video_format: VideoFormat = cli
        .video_format
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;
    let tts_provider = match cli.tts_provider.to_lowercase().as_str() {
        "auto" => TtsProviderChoice::Auto,
        "elevenlabs" => TtsProviderChoice::Elevenlabs,
        "google_tts" | "google" => TtsProviderChoice::GoogleTts,
        other => anyhow::bail!("Unknown TTS provider: {other}"),
    };

    Ok(DubbingRequest {
        url: cli.url.clone(),
        test_mode: cli.test_mode,
        breath_detection: !cli.no_breath_detection,
        use_postprocess: cli.postprocess || cli.postprocess_model.is_some(),
        postprocess_model: cli.postprocess_model.clone(),
        source_language: cli.source_language.clone(),
        enable_translation: cli.translate_to.is_some(),
        target_language: cli
            .translate_to
            .clone()
            .unwrap_or_else(|| "en-US".to_string()),
        translation_context: context,
        target_audience: cli.audience.clone(),
        desired_tone: cli.tone.clone(),
        enable_synthesis: cli.synthesize || cli.mux,
        tts_provider,
        voice_id: cli.voice.clone(),
        audio_quality,
        enable_video_muxing: cli.mux,
        video_format,
        preserve_video_quality: !cli.no_preserve_quality,
        max_cost_usd: cli.max_cost,
        preview_mode: cli.preview,
        existing_transcript: None,
    })
}

fn print_summary(job: &dubber::Job) {
    println!();
    println!("═══════════════════════════════════════════════════════════════");
    println!("                        Dubbing Job Summary                     ");
    println!("═══════════════════════════════════════════════════════════════");
    println!();
    println!("  Job:        {}", job.job_id);
    println!("  Status:     {}", job.status);
    if let Some(t) = &job.transcription_result {
        println!("  Transcript: {}", t.transcript_file.display());
    }
    if let Some(t) = &job.translation_result {
        if let Some(f) = &t.translated_file {
            println!("  Translation: {} ({} words)", f.display(), t.word_count);
        }
    }
    if let Some(s) = &job.synthesis_result {
        println!(
            "  Audio:      {} ({:.1}s via {})",
            s.audio_file_path.display(),
            s.duration_seconds,
            s.provider
        );
    }
    if let Some(m) = &job.muxing_result {
        println!(
            "  Video:      {} ({:.1}s, {})",
            m.video_file_path.display(),
            m.final_video_duration,
            m.resolution
        );
    }
    println!();
    println!(
        "  Cost:       ${:.4} actual (${:.4} estimated)",
        job.actual_cost.total_cost, job.estimated_cost.total_cost
    );
    if let Some(seconds) = job.processing_time_seconds() {
        println!("  Time:       {seconds:.1}s");
    }
    if let Some(error) = &job.error {
        println!();
        println!(
            "  Error:      [{:?}] {} (during {})",
            error.kind, error.message, error.stage_of_failure
        );
    }
    println!();
    println!("═══════════════════════════════════════════════════════════════");
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let request = build_request(&cli)?;

    let config = Config::load().context("Failed to load configuration")?;
    let (registry, orchestrator) =
        dubber::build_orchestrator(&config).context("Failed to build pipeline")?;

    // Progress bar fed by the orchestrator's listener.
    let progress_bar = if cli.quiet {
        None
    } else {
        let pb = ProgressBar::new(100);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}% {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        Some(pb)
    };

    let orchestrator = if let Some(pb) = progress_bar.clone() {
        let listener: ProgressListener = Arc::new(move |status: &str, pct: u8| {
            pb.set_position(pct as u64);
            pb.set_message(status.to_string());
        });
        Arc::new(
            Arc::try_unwrap(orchestrator)
                .map_err(|_| anyhow::anyhow!("orchestrator is uniquely owned at startup"))?
                .with_listener(listener),
        )
    } else {
        orchestrator
    };

    let job = orchestrator
        .submit(request)
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    info!(
        "Submitted job {} (estimated ${:.4})",
        job.job_id, job.estimated_cost.total_cost
    );

    // Ctrl+C requests cooperative cancellation; a second press force-quits.
    let registry_for_signal = registry.clone();
    let job_id_for_signal = job.job_id.clone();
    let mut interrupted = false;
    ctrlc::set_handler(move || {
        if interrupted {
            std::process::exit(1);
        }
        eprintln!("\nCancelling... (press Ctrl+C again to force quit)");
        registry_for_signal.cancel(&job_id_for_signal);
        interrupted = true;
    })
    .ok();

    orchestrator
        .run(&job.job_id)
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    if let Some(pb) = progress_bar {
        pb.finish_and_clear();
    }

    let finished = registry
        .get(&job.job_id)
        .context("Job disappeared from the registry")?;

    if !cli.quiet {
        print_summary(&finished);
    }

    match finished.status {
        JobStatus::Completed => Ok(()),
        status => {
            let message = finished
                .error
                .map(|e| e.message)
                .unwrap_or_else(|| format!("job ended as {status}"));
            error!("{message}");
            Err(anyhow::anyhow!(message))
        }
    }
}
