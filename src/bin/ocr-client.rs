//! Command-line client: upload a document, follow the job to a terminal state
//! and print the normalized result.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use ocr_overlay::config::ClientConfig;
use ocr_overlay::models::job::{Job, JobStatus, ModelOptions, OcrModel};
use ocr_overlay::services::api_client::{HttpOcrApi, OcrApi};
use ocr_overlay::services::geometry::{LoadedImage, SurfaceState, Viewport};
use ocr_overlay::services::job_store::JobStore;
use ocr_overlay::services::lifecycle::{JobRunner, LifecycleState};
use ocr_overlay::services::page_source::{Artifact, PageSource};
use ocr_overlay::services::views::{overlay_boxes, render, OutputView};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "ocr-client", version, about = "Submit documents for OCR and inspect results")]
struct Cli {
    /// Base URL of the OCR API
    #[arg(long, env = "OCR_API_BASE_URL")]
    api_base_url: Option<String>,

    /// User id sent as x-user-id
    #[arg(long, env = "OCR_USER_ID")]
    user_id: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload a file, submit it and wait for the result
    Submit {
        file: PathBuf,

        #[arg(long, default_value = "paddleocr-vl")]
        model: OcrModel,

        /// Recognition language (ignored by paddleocr-vl)
        #[arg(long)]
        lang: Option<String>,

        #[arg(long)]
        doc_orientation: bool,

        #[arg(long)]
        doc_unwarping: bool,

        /// pp-ocrv5 only
        #[arg(long)]
        textline_orientation: bool,

        /// Return after the job is accepted instead of waiting
        #[arg(long)]
        no_wait: bool,

        #[command(flatten)]
        output: OutputArgs,
    },
    /// List previously submitted jobs
    List,
    /// Show a job's result, resuming the poll if it is still processing
    Show {
        job_id: String,

        #[command(flatten)]
        output: OutputArgs,
    },
    /// Delete a job and its stored artifacts
    Delete { job_id: String },
}

#[derive(Args)]
struct OutputArgs {
    /// items, raw or text
    #[arg(long, default_value = "items")]
    view: OutputView,

    /// 1-based page to print
    #[arg(long, default_value_t = 1)]
    page: usize,

    /// Print overlay rectangles for a display of this width (pixels)
    #[arg(long)]
    overlay_width: Option<f64>,

    #[arg(long, default_value_t = 1.0)]
    zoom: f64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .compact()
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(Cli::parse()).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let mut config = ClientConfig::from_env()?;
    if let Some(url) = cli.api_base_url {
        config.api_base_url = url;
    }
    if cli.user_id.is_some() {
        config.user_id = cli.user_id;
    }

    let api: Arc<dyn OcrApi> = Arc::new(HttpOcrApi::new(
        &config.api_base_url,
        config.request_timeout(),
        config.user_id.clone(),
    )?);
    let runner = JobRunner::new(Arc::clone(&api), JobStore::shared(), config.poll_config());

    let outcome = match cli.command {
        Command::Submit {
            file,
            model,
            lang,
            doc_orientation,
            doc_unwarping,
            textline_orientation,
            no_wait,
            output,
        } => {
            let options = ModelOptions {
                lang,
                use_doc_orientation_classify: doc_orientation.then_some(true),
                use_doc_unwarping: doc_unwarping.then_some(true),
                use_textline_orientation: textline_orientation.then_some(true),
            };
            let artifact = Artifact::from_path(&file, config.max_artifact_bytes).await?;
            let source = PageSource::open(artifact, config.render_options()).await?;
            let job_id = runner.submit(&source, model, options).await?;
            println!("job {job_id} accepted");
            if no_wait {
                runner.shutdown();
                return Ok(());
            }
            follow(&runner, &job_id, &source, &output).await
        }
        Command::List => {
            runner.restore_session().await?;
            let store = runner.store();
            let store = store.read().await;
            for job in store.jobs() {
                println!(
                    "{}  {:<10}  {:<15}  {}  {}",
                    job.id,
                    job.status,
                    job.model,
                    job.created_at.format("%Y-%m-%d %H:%M:%S"),
                    job.filename
                );
            }
            Ok(())
        }
        Command::Show { job_id, output } => {
            runner.restore_session().await?;
            runner.navigate(Some(&job_id)).await?;
            let key = runner
                .current_job()
                .await
                .and_then(|job| job.storage_key)
                .ok_or("job has no stored artifact")?;
            let artifact = Artifact::from_stored(api.as_ref(), &key, config.max_artifact_bytes).await?;
            let source = PageSource::open(artifact, config.render_options()).await?;
            follow(&runner, &job_id, &source, &output).await
        }
        Command::Delete { job_id } => {
            runner.restore_session().await?;
            let deleted = runner.delete(&job_id).await?;
            println!("deleted {} objects", deleted.len());
            for key in deleted {
                println!("  {key}");
            }
            Ok(())
        }
    };

    runner.shutdown();
    outcome
}

/// Wait for `job_id` to reach a terminal state, then print it.
async fn follow(
    runner: &JobRunner,
    job_id: &str,
    source: &PageSource,
    output: &OutputArgs,
) -> CliResult<()> {
    let mut states = runner.subscribe();
    let wait = states.wait_for(|s: &LifecycleState| s.job_id.as_deref() == Some(job_id) && s.is_terminal());

    let state = tokio::select! {
        state = wait => state?.clone(),
        _ = tokio::signal::ctrl_c() => {
            runner.shutdown();
            return Err("interrupted".into());
        }
    };

    let job = runner
        .current_job()
        .await
        .ok_or("job disappeared from the session")?;
    if job.status == JobStatus::Failed {
        return Err(state.error.unwrap_or_else(|| "OCR processing failed".to_string()).into());
    }
    print_job(&job, source, output).await
}

async fn print_job(job: &Job, source: &PageSource, output: &OutputArgs) -> CliResult<()> {
    let result = job.result.as_ref().ok_or("completed job has no result")?;
    if let Some(ms) = job.processing_time_ms {
        eprintln!("completed in {:.1}s", ms as f64 / 1000.0);
    }

    match render(result, output.view, output.page) {
        Some(text) => println!("{text}"),
        None => eprintln!("result could not be rendered; try --view raw"),
    }

    let Some(display_width) = output.overlay_width else {
        return Ok(());
    };
    let Some(page) = result.document().and_then(|doc| doc.page(output.page)) else {
        return Ok(());
    };
    let Some(raster) = source.render_page(output.page).await? else {
        eprintln!("page {} could not be rendered; no overlay", output.page);
        return Ok(());
    };

    let (natural_width, natural_height) = raster.natural_size();
    let display_height = display_width * natural_height as f64 / natural_width.max(1) as f64;
    let mut surface = SurfaceState::new(raster.source_id(), display_width, display_height);
    surface.set_zoom(output.zoom);
    surface.on_load(LoadedImage {
        src: raster.source_id().to_string(),
        natural_width,
        natural_height,
    });

    let viewport = Viewport::for_page(&surface, page)?;
    for overlay in overlay_boxes(page, &viewport) {
        println!(
            "#{:<4} {:<14} left={:.1} top={:.1} width={:.1} height={:.1}  {}",
            overlay.id,
            overlay.label,
            overlay.rect.left,
            overlay.rect.top,
            overlay.rect.width,
            overlay.rect.height,
            overlay.text.lines().next().unwrap_or_default()
        );
    }
    Ok(())
}
