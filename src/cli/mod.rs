//! Command-line interface for papertrail.
//!
//! Provides commands for submitting proposal runs, inspecting projects,
//! uploading files, analyzing web pages, looking up cached PDFs, and running
//! the retention sweeper.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use crate::adapters::{ChatClient, PdfFetcher};
use crate::config::{self, ResolvedConfig};
use crate::core::{ProjectStore, ProposalService, RetentionSweeper, Scheduler};
use crate::domain::{ModelType, ProjectParams, ProjectRecord, ProjectRequest, DEFAULT_MAX_PAPERS};

/// How often `run` polls for progress
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Characters of uploaded text shown after an upload
const TEXT_PREVIEW_CHARS: usize = 200;

/// papertrail - research topic to technical proposal pipeline
#[derive(Parser, Debug)]
#[command(name = "papertrail")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Submit a topic and follow the run until it finishes
    Run {
        /// Project title
        #[arg(long)]
        title: String,

        /// Research topic (any language)
        #[arg(long)]
        topic: String,

        /// Number of papers to retrieve (1-10)
        #[arg(long, default_value_t = DEFAULT_MAX_PAPERS, value_parser = clap::value_parser!(u32).range(1..=10))]
        max_papers: u32,

        /// Model tier used for generation
        #[arg(long, value_enum, default_value = "default")]
        model_type: ModelChoice,

        /// Free-form project description
        #[arg(long)]
        description: Option<String>,

        /// Extra search keyword (repeatable)
        #[arg(long = "keyword")]
        keywords: Vec<String>,
    },

    /// Show one project
    Status {
        /// Project ID
        project_id: String,

        /// Print the full stored document as JSON
        #[arg(long)]
        json: bool,
    },

    /// List recent projects
    Projects {
        /// Maximum number of projects to show (1-100)
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Attach a file to a project
    Upload {
        /// Project ID
        project_id: String,

        /// File to upload
        file: PathBuf,
    },

    /// Summarize a web page through the chat endpoint
    Analyze {
        /// Page URL (http or https)
        url: String,
    },

    /// Locate a cached paper PDF
    Pdf {
        /// Paper ID as listed on the project
        paper_id: String,

        /// Copy the PDF here instead of printing its path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Delete expired projects once
    Sweep {
        /// Override the configured retention window
        #[arg(long)]
        retention_hours: Option<u64>,
    },

    /// Run the periodic retention sweeper until Ctrl-C
    Serve,

    /// Show resolved configuration
    Config,
}

/// Model tier for CLI (maps to ModelType)
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ModelChoice {
    Default,
    Lite,
    Pro,
    Reader,
}

impl From<ModelChoice> for ModelType {
    fn from(choice: ModelChoice) -> Self {
        match choice {
            ModelChoice::Default => ModelType::Default,
            ModelChoice::Lite => ModelType::Lite,
            ModelChoice::Pro => ModelType::Pro,
            ModelChoice::Reader => ModelType::Reader,
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Run {
                title,
                topic,
                max_papers,
                model_type,
                description,
                keywords,
            } => {
                let params = ProjectParams {
                    description,
                    model_type: model_type.into(),
                    max_papers,
                    custom_keywords: (!keywords.is_empty()).then_some(keywords),
                    ..ProjectParams::default()
                };
                run_project(ProjectRequest::new(title, topic).with_params(params)).await
            }
            Commands::Status { project_id, json } => show_status(&project_id, json).await,
            Commands::Projects { limit } => list_projects(limit).await,
            Commands::Upload { project_id, file } => upload_file(&project_id, &file).await,
            Commands::Analyze { url } => analyze_url(&url).await,
            Commands::Pdf { paper_id, output } => cached_pdf(&paper_id, output.as_deref()).await,
            Commands::Sweep { retention_hours } => sweep(retention_hours).await,
            Commands::Serve => serve().await,
            Commands::Config => show_config(),
        }
    }
}

/// Start a scheduler and the service that submits to it
async fn start_service(cfg: &ResolvedConfig) -> Result<(Scheduler, ProposalService)> {
    let scheduler = Scheduler::new()?;
    let service = ProposalService::from_config(cfg, scheduler.handle()).await?;
    Ok((scheduler, service))
}

/// Stop the scheduler, then fail projects whose runs it cut short
async fn stop_service(scheduler: Scheduler, service: &ProposalService) -> Result<()> {
    tokio::task::spawn_blocking(move || scheduler.shutdown())
        .await
        .context("Scheduler shutdown failed")?;

    let settled = service.settle_interrupted().await?;
    if settled > 0 {
        eprintln!("Marked {} interrupted project(s) as failed", settled);
    }
    Ok(())
}

async fn run_project(request: ProjectRequest) -> Result<()> {
    let cfg = config::config()?;
    let (scheduler, service) = start_service(cfg).await?;

    let submission = service.create_project(request).await?;
    println!("Project: {}", submission.project_id);
    println!("Task:    {}", submission.task_id);

    let mut last_message = None;
    let task = loop {
        if let Some(project) = service.project(&submission.project_id).await? {
            if project.status_message != last_message {
                if let Some(message) = &project.status_message {
                    println!("  … {}", message);
                }
                last_message = project.status_message;
            }
        }

        match service.task(&submission.task_id) {
            Some(task) if task.is_finished() => break task,
            Some(_) => tokio::time::sleep(POLL_INTERVAL).await,
            None => anyhow::bail!("Task {} disappeared", submission.task_id),
        }
    };

    if let Some(error) = &task.error {
        eprintln!("Task failed: {}", error);
    }

    stop_service(scheduler, &service).await?;

    let project = service
        .project(&submission.project_id)
        .await?
        .with_context(|| format!("Project not found: {}", submission.project_id))?;
    println!();
    print_project(&project);

    Ok(())
}

async fn show_status(project_id: &str, json: bool) -> Result<()> {
    let store = ProjectStore::open_default().await?;
    let project = store
        .get(project_id)
        .await?
        .with_context(|| format!("Project not found: {}", project_id))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&project)?);
    } else {
        print_project(&project);
    }

    Ok(())
}

fn print_project(project: &ProjectRecord) {
    println!("Project ID: {}", project.id);
    println!("Title: {}", project.title);
    println!("Topic: {}", project.topic);
    if let Some(translated) = &project.translated_topic {
        println!("Translated topic: {}", translated);
    }
    println!("Status: {}", project.status);
    if let Some(message) = &project.status_message {
        println!("Message: {}", message);
    }
    println!("Created: {}", project.created_at);
    if let Some(updated) = project.updated_at {
        println!("Updated: {}", updated);
    }
    if let Some(task_id) = &project.task_id {
        println!("Task: {}", task_id);
    }
    if let Some(error) = &project.error {
        println!("Error: {}", error);
    }

    if let Some(papers) = &project.papers {
        println!("\nPapers:");
        for paper in papers {
            let marker = if paper.content_extracted { "✓" } else { " " };
            println!("  [{}] {} ({})", marker, paper.title, paper.id);
        }
    }

    if let Some(files) = project.files.as_ref().filter(|f| !f.is_empty()) {
        println!("\nFiles:");
        for file in files {
            println!("  {}", file.path);
        }
    }

    if let Some(result) = &project.result {
        println!("\nProposal:");
        println!("  Steps: {}", result.steps.len());
        for step in &result.steps {
            println!("    {}. {}", step.step, step.description);
        }
        println!("  Resources: {}", result.resources.len());
        println!("  Diagram: {}", if result.diagram.is_some() { "yes" } else { "no" });
        println!("  References: {}", result.references.len());
    }
}

async fn list_projects(limit: usize) -> Result<()> {
    let store = ProjectStore::open_default().await?;
    let limit = limit.clamp(
        *crate::core::LIST_LIMIT_RANGE.start(),
        *crate::core::LIST_LIMIT_RANGE.end(),
    );
    let projects = store.list(limit).await?;

    if projects.is_empty() {
        println!("No projects found");
        return Ok(());
    }

    println!("{:<38} {:<12} {:<22} {}", "PROJECT ID", "STATUS", "CREATED", "TITLE");
    println!("{}", "-".repeat(100));

    for project in projects {
        println!(
            "{:<38} {:<12} {:<22} {}",
            project.id,
            project.status.to_string(),
            project.created_at.format("%Y-%m-%d %H:%M:%S"),
            project.title
        );
    }

    Ok(())
}

async fn upload_file(project_id: &str, file: &Path) -> Result<()> {
    let filename = file
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("Not a file path: {}", file.display()))?;

    let content = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let cfg = config::config()?;
    let (scheduler, service) = start_service(cfg).await?;
    let uploaded = service
        .upload(project_id, filename, &content, guess_content_type(file))
        .await;
    stop_service(scheduler, &service).await?;
    let uploaded = uploaded?;

    println!(
        "Uploaded {} ({} bytes) to {}",
        uploaded.entry.filename,
        content.len(),
        uploaded.entry.path
    );
    match &uploaded.text {
        Some(text) => {
            println!("Extracted {} characters of text", text.chars().count());
            let preview: String = text.chars().take(TEXT_PREVIEW_CHARS).collect();
            if !preview.trim().is_empty() {
                println!("\n{}", preview.trim_end());
            }
        }
        None => println!("No text extracted"),
    }
    Ok(())
}

async fn analyze_url(url: &str) -> Result<()> {
    let cfg = config::config()?;
    let client = ChatClient::from_config(&cfg.llm, reqwest::Client::new());

    let summary = client.analyze_url(url).await?;
    println!("{}", summary.trim());
    Ok(())
}

async fn cached_pdf(paper_id: &str, output: Option<&Path>) -> Result<()> {
    let cfg = config::config()?;
    let fetcher = PdfFetcher::new(reqwest::Client::new(), cfg.pdf_dir());
    let path = fetcher
        .cached(paper_id)
        .with_context(|| format!("No cached PDF for paper: {}", paper_id))?;

    match output {
        Some(output) => {
            let bytes = tokio::fs::copy(&path, output).await.with_context(|| {
                format!("Failed to copy {} to {}", path.display(), output.display())
            })?;
            println!("Wrote {} ({} bytes)", output.display(), bytes);
        }
        None => println!("{}", path.display()),
    }
    Ok(())
}

/// Content type from the file extension, for the common upload kinds
fn guess_content_type(file: &Path) -> Option<String> {
    let ext = file.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => return None,
    };
    Some(mime.to_string())
}

async fn sweep(retention_hours: Option<u64>) -> Result<()> {
    let cfg = config::config()?;
    let hours = retention_hours.unwrap_or(cfg.retention.hours);

    let store = ProjectStore::open(&cfg.home).await?;
    let sweeper = RetentionSweeper::new(store, chrono::Duration::hours(hours as i64));
    let report = sweeper.sweep().await?;

    println!(
        "Scanned {} project(s): {} deleted, {} failed",
        report.scanned, report.deleted, report.failed
    );
    Ok(())
}

async fn serve() -> Result<()> {
    let cfg = config::config()?;
    let (scheduler, service) = start_service(cfg).await?;

    let retention = service.start_retention();
    info!(home = %cfg.home.display(), "Serving; press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    info!("Shutting down");
    retention.cancel();
    stop_service(scheduler, &service).await
}

fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("Papertrail Configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:     {}", cfg.home.display());
    println!("  Projects: {}", cfg.projects_dir().display());
    println!("  PDFs:     {}", cfg.pdf_dir().display());
    println!();
    println!("LLM:");
    println!("  API URL: {}", cfg.llm.api_url);
    println!("  Model:   {}", cfg.llm.model);
    println!("  API key: {}", if cfg.llm.api_key.is_some() { "set" } else { "(not set)" });
    for (tier, model) in &cfg.llm.models {
        println!("  {:<7}  {}", format!("{}:", tier), model);
    }
    println!();
    println!("Retention:");
    println!("  Window:   {}h", cfg.retention.hours);
    println!("  Interval: {}h", cfg.retention.sweep_interval_hours);
    println!();
    println!("Pipeline limits:");
    let p = &cfg.pipeline;
    println!("  Translate timeout: {}s", p.translate_timeout_seconds);
    println!("  Retrieve timeout:  {}s", p.retrieve_timeout_seconds);
    println!("  Fetch timeout:     {}s (delay {}ms)", p.fetch_timeout_seconds, p.fetch_delay_ms);
    println!("  Extract timeout:   {}s ({} pages)", p.extract_timeout_seconds, p.extract_max_pages);
    println!("  Generate timeout:  {}s ({} tokens)", p.generate_timeout_seconds, p.max_tokens);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_args_parse() {
        let cli = Cli::try_parse_from([
            "papertrail",
            "run",
            "--title",
            "Recs",
            "--topic",
            "graph recommenders",
            "--max-papers",
            "3",
            "--model-type",
            "pro",
            "--keyword",
            "gnn",
        ])
        .unwrap();

        match cli.command {
            Commands::Run {
                max_papers,
                model_type,
                keywords,
                ..
            } => {
                assert_eq!(max_papers, 3);
                assert_eq!(ModelType::from(model_type), ModelType::Pro);
                assert_eq!(keywords, vec!["gnn"]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_max_papers_out_of_range_rejected() {
        let result = Cli::try_parse_from([
            "papertrail", "run", "--title", "t", "--topic", "x", "--max-papers", "11",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_guess_content_type() {
        assert_eq!(
            guess_content_type(Path::new("paper.PDF")).as_deref(),
            Some("application/pdf")
        );
        assert_eq!(guess_content_type(Path::new("notes.md")).as_deref(), Some("text/markdown"));
        assert!(guess_content_type(Path::new("archive.tar.zst")).is_none());
        assert!(guess_content_type(Path::new("README")).is_none());
    }

    #[test]
    fn test_pdf_and_analyze_args_parse() {
        let cli = Cli::try_parse_from(["papertrail", "pdf", "2101.00001v2", "-o", "out.pdf"]).unwrap();
        match cli.command {
            Commands::Pdf { paper_id, output } => {
                assert_eq!(paper_id, "2101.00001v2");
                assert_eq!(output, Some(PathBuf::from("out.pdf")));
            }
            other => panic!("unexpected command: {:?}", other),
        }

        let cli = Cli::try_parse_from(["papertrail", "analyze", "https://example.org"]).unwrap();
        assert!(matches!(cli.command, Commands::Analyze { url } if url == "https://example.org"));
    }
}
