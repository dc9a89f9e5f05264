//! CLI entry point for the code suggestion service.
//!
//! Provides commands for ingesting the reference corpus, querying suggestions,
//! running the evaluation set and serving the HTTP query surface.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use cimsuggest::display::{self, Status, THEME};
use cimsuggest::evaluation::{self, EvaluationCase};
use cimsuggest::generation::GroundingPolicy;
use cimsuggest::io::{ExitCode, JsonResponse, OutputFormat, ResponseMeta};
use cimsuggest::vector::{IndexMetadata, content_digest};
use cimsuggest::{
    ChunkStore, EmbeddingGenerator, FastEmbedGenerator, IndexSnapshot, OpenAiReasoner, Pipeline,
    Settings, SharedIndex, SuggestionSet, VectorIndex, logging,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// ICD-10 code suggestion
#[derive(Parser)]
#[command(
    name = "cimsuggest",
    version = env!("CARGO_PKG_VERSION"),
    about = "Suggest ICD-10 (CIM-10) codes from a reference corpus",
    next_line_help = true,
    styles = clap_cargo_style(),
    override_help = display::create_help_text()
)]
struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Set up .cimsuggest directory with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    #[command(
        about = "Build the chunk store and vector index from a reference document",
        after_help = "Examples:\n  cimsuggest ingest data/CIM-10.txt\n  cimsuggest ingest data/CIM-10.txt --force"
    )]
    Ingest {
        /// Plain-text export of the reference corpus
        document: PathBuf,

        /// Rebuild even if an index already exists
        #[arg(short, long)]
        force: bool,
    },

    #[command(
        about = "Suggest codes for a diagnosis or symptom",
        after_help = "Examples:\n  cimsuggest suggest \"dyspnée à l'effort\"\n  cimsuggest suggest \"toux purulente\" --json | jq '.data.codes[].code'\n  cimsuggest suggest \"fièvre\" --no-rerank --grounding reject"
    )]
    Suggest {
        /// Query text
        text: String,

        /// Output JSON instead of tables
        #[arg(long)]
        json: bool,

        /// Candidates to retrieve (overrides config)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Skip query expansion
        #[arg(long)]
        no_expansion: bool,

        /// Skip reranking
        #[arg(long)]
        no_rerank: bool,

        /// What to do with codes absent from the candidates
        #[arg(long, value_parser = parse_grounding)]
        grounding: Option<GroundingPolicy>,
    },

    #[command(
        about = "Measure hit@3, hit@5 and recall on labelled cases",
        after_help = "Examples:\n  cimsuggest evaluate\n  cimsuggest evaluate --cases cases.json --output results.json\n\nCase file format:\n  [{\"query\": \"Fièvre\", \"expected\": [\"R50\"]}]"
    )]
    Evaluate {
        /// JSON file of cases (defaults to the built-in validation set)
        #[arg(long)]
        cases: Option<PathBuf>,

        /// Write metrics and per-case details to this JSON file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Queries in flight (overrides server.max_concurrency)
        #[arg(long)]
        concurrency: Option<usize>,

        /// Output JSON instead of tables
        #[arg(long)]
        json: bool,
    },

    #[command(
        about = "Start the HTTP query surface",
        after_help = "Examples:\n  cimsuggest serve\n  cimsuggest serve --bind 0.0.0.0:8000\n\nEndpoints:\n  POST /suggest  {\"text\": \"...\"}\n  GET  /health"
    )]
    Serve {
        /// Address to bind (overrides server.bind)
        #[arg(long)]
        bind: Option<String>,
    },

    #[command(about = "Display active settings")]
    Config,
}

fn parse_grounding(value: &str) -> Result<GroundingPolicy, String> {
    match value.to_ascii_lowercase().as_str() {
        "warn" => Ok(GroundingPolicy::Warn),
        "reject" => Ok(GroundingPolicy::Reject),
        other => Err(format!("unknown grounding policy '{other}', expected warn or reject")),
    }
}

/// A command failure: what to print and which code to exit with.
struct Failure {
    code: ExitCode,
    kind: &'static str,
    message: String,
}

impl Failure {
    fn new(code: ExitCode, kind: &'static str, message: impl std::fmt::Display) -> Self {
        Self {
            code,
            kind,
            message: message.to_string(),
        }
    }
}

impl From<cimsuggest::VectorError> for Failure {
    fn from(error: cimsuggest::VectorError) -> Self {
        Self::new(ExitCode::from_vector_error(&error), "INDEX_ERROR", error)
    }
}

impl From<cimsuggest::CorpusError> for Failure {
    fn from(error: cimsuggest::CorpusError) -> Self {
        Self::new(ExitCode::from_corpus_error(&error), "CORPUS_ERROR", error)
    }
}

impl From<cimsuggest::EvaluationError> for Failure {
    fn from(error: cimsuggest::EvaluationError) -> Self {
        Self::new(
            ExitCode::from_evaluation_error(&error),
            "EVALUATION_ERROR",
            error,
        )
    }
}

impl From<cimsuggest::CapabilityError> for Failure {
    fn from(error: cimsuggest::CapabilityError) -> Self {
        Self::new(ExitCode::ConfigError, "CAPABILITY_ERROR", error)
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if !matches!(cli.command, Commands::Init { .. }) && cli.config.is_none() {
        if let Err(warning) = Settings::check_init() {
            eprintln!("{}", THEME.status(Status::Notice, &warning));
            eprintln!("Using default configuration for now.");
        }
    }

    let mut settings = match &cli.config {
        Some(path) => Settings::load_from(path).unwrap_or_else(|e| {
            eprintln!("Configuration error loading from {}: {e}", path.display());
            std::process::exit(ExitCode::ConfigError.into());
        }),
        None => Settings::load().unwrap_or_else(|e| {
            eprintln!("Configuration error: {e}");
            Settings::default()
        }),
    };
    settings.debug |= cli.debug;
    logging::init(settings.debug);

    let json_output = matches!(
        cli.command,
        Commands::Suggest { json: true, .. } | Commands::Evaluate { json: true, .. }
    );

    let outcome = match cli.command {
        Commands::Init { force } => run_init(force),
        Commands::Config => run_config(&settings),
        Commands::Ingest { document, force } => run_ingest(&settings, &document, force),
        Commands::Suggest {
            text,
            json,
            top_k,
            no_expansion,
            no_rerank,
            grounding,
        } => {
            if let Some(k) = top_k {
                settings.retrieval.top_k = k;
            }
            if let Some(policy) = grounding {
                settings.generation.grounding = policy;
            }
            settings.retrieval.expansion &= !no_expansion;
            settings.rerank.enabled &= !no_rerank;
            run_suggest(&settings, &text, OutputFormat::from_json_flag(json)).await
        }
        Commands::Evaluate {
            cases,
            output,
            concurrency,
            json,
        } => {
            run_evaluate(
                &settings,
                cases.as_deref(),
                output.as_deref(),
                concurrency.unwrap_or(settings.server.max_concurrency),
                OutputFormat::from_json_flag(json),
            )
            .await
        }
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| settings.server.bind.clone());
            run_serve(&settings, bind).await
        }
    };

    let code = match outcome {
        Ok(code) => code,
        Err(failure) => {
            if json_output {
                let response = JsonResponse::error(failure.code, failure.kind, &failure.message);
                if let Ok(json) = serde_json::to_string_pretty(&response) {
                    println!("{json}");
                }
            } else {
                eprintln!("{}", THEME.status(Status::Failed, &failure.message));
            }
            failure.code
        }
    };

    tracing::debug!("Exiting with {} ({})", code as u8, code.description());
    std::process::exit(code.into());
}

fn run_init(force: bool) -> Result<ExitCode, Failure> {
    let path = Settings::init_config_file(force)
        .map_err(|e| Failure::new(ExitCode::ConfigError, "CONFIG_ERROR", e))?;
    println!(
        "{}",
        THEME.status(Status::Done, &format!("Created configuration file at: {}", path.display()))
    );
    println!("Edit this file to customize your settings, then run 'cimsuggest ingest <document>'.");
    Ok(ExitCode::Success)
}

fn run_config(settings: &Settings) -> Result<ExitCode, Failure> {
    let rendered = toml::to_string_pretty(settings)
        .map_err(|e| Failure::new(ExitCode::ConfigError, "CONFIG_ERROR", e))?;
    println!("{}", THEME.paint(&THEME.heading, "Current Configuration:"));
    println!("{}", "=".repeat(50));
    println!("{rendered}");
    Ok(ExitCode::Success)
}

fn validated(settings: &Settings) -> Result<(), Failure> {
    settings
        .validate()
        .map_err(|e| Failure::new(ExitCode::ConfigError, "CONFIG_ERROR", e))
}

fn load_embedder(settings: &Settings, show_progress: bool) -> Result<FastEmbedGenerator, Failure> {
    let generator = display::with_spinner(
        &format!("Loading embedding model {}", settings.embedding.model),
        || {
            FastEmbedGenerator::new(
                &settings.embedding.model,
                settings.embedding.batch_size,
                show_progress,
            )
        },
    )?;
    Ok(generator)
}

fn run_ingest(settings: &Settings, document: &Path, force: bool) -> Result<ExitCode, Failure> {
    validated(settings)?;
    let index_dir = settings.index_dir();

    if IndexMetadata::exists(&index_dir) && !force {
        return Err(Failure::new(
            ExitCode::GeneralError,
            "INDEX_EXISTS",
            format!(
                "An index already exists at {}. Use --force to rebuild it",
                index_dir.display()
            ),
        ));
    }

    let started = Instant::now();
    let text = std::fs::read_to_string(document).map_err(|source| {
        Failure::from(cimsuggest::CorpusError::Io {
            path: document.to_path_buf(),
            source,
        })
    })?;

    let store = ChunkStore::from_chunks(cimsuggest::ingest(&text)?)?;
    println!(
        "Parsed {} chunks from {}",
        THEME.paint(&THEME.count, store.len()),
        THEME.paint(&THEME.location, document.display())
    );

    let embedder = load_embedder(settings, true)?;
    let progress = display::create_progress_bar(store.len() as u64, "embedding chunks");
    let vectors = VectorIndex::build(
        store.as_slice(),
        &embedder,
        settings.embedding.batch_size,
        |done| progress.set_position(done as u64),
    )?;
    progress.finish_and_clear();

    let chunk_count = store.len();
    let snapshot = IndexSnapshot::new(store, vectors)?;
    snapshot.save(&index_dir, content_digest(&text))?;

    println!(
        "{}",
        THEME.status(
            Status::Done,
            &format!(
                "Indexed {chunk_count} chunks with {} ({} dimensions) in {:.1}s",
                embedder.model_name(),
                embedder.dimension().get(),
                started.elapsed().as_secs_f64()
            )
        )
    );
    println!("Index saved to {}", THEME.paint(&THEME.location, index_dir.display()));
    Ok(ExitCode::Success)
}

/// Loads the persisted index and wires the configured pipeline around it.
fn open_pipeline(settings: &Settings) -> Result<(Pipeline, SharedIndex), Failure> {
    validated(settings)?;
    let snapshot = IndexSnapshot::load(&settings.index_dir(), &settings.embedding.model)?;
    let index = SharedIndex::with_snapshot(snapshot);

    let embedder = load_embedder(settings, false)?;
    let reasoner = OpenAiReasoner::from_config(&settings.reasoning)?;

    let pipeline = Pipeline::from_settings(
        settings,
        index.clone(),
        Arc::new(embedder),
        Arc::new(reasoner),
    );
    Ok((pipeline, index))
}

async fn run_suggest(
    settings: &Settings,
    text: &str,
    format: OutputFormat,
) -> Result<ExitCode, Failure> {
    let (pipeline, _index) = open_pipeline(settings)?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let started = Instant::now();
    let spinner = (!format.is_json()).then(|| display::create_spinner("Querying"));
    let outcome = pipeline.suggest_with_cancel(text, &cancel).await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    let elapsed = started.elapsed().as_secs_f64();

    match outcome {
        Ok(set) => {
            let code = ExitCode::from_suggestion_count(set.codes.len());
            if format.is_json() {
                let response = JsonResponse::success(&set).with_meta(ResponseMeta::now(Some(elapsed)));
                let json = serde_json::to_string_pretty(&response)
                    .map_err(|e| Failure::new(ExitCode::GeneralError, "OUTPUT_ERROR", e))?;
                println!("{json}");
            } else {
                print_suggestions(&set, elapsed);
            }
            Ok(code)
        }
        Err(e) => {
            let code = ExitCode::from_suggest_error(&e);
            if format.is_json() {
                let response = JsonResponse::from_suggest_error(&e);
                let json = serde_json::to_string_pretty(&response)
                    .map_err(|e| Failure::new(ExitCode::GeneralError, "OUTPUT_ERROR", e))?;
                println!("{json}");
            } else {
                eprintln!("{}", THEME.status(Status::Failed, &format!("[{}] {e}", e.kind())));
            }
            Ok(code)
        }
    }
}

fn print_suggestions(set: &SuggestionSet, elapsed: f64) {
    if set.codes.is_empty() {
        println!("{}", THEME.status(Status::Notice, "No code suggested"));
    } else {
        println!("{}", display::create_suggestion_table(set));
    }

    let sections = [
        ("Coding rules", &set.coding_rules),
        ("Warnings", &set.warnings),
        ("Related codes", &set.related_codes),
    ];
    for (title, items) in sections {
        if items.is_empty() {
            continue;
        }
        println!("\n{}", THEME.paint(&THEME.heading, title));
        for item in items {
            println!("  - {item}");
        }
    }

    if THEME.is_colored() {
        println!();
    }
    println!("{}", THEME.paint(&THEME.muted, format!("Answered in {elapsed:.2}s")));
}

async fn run_evaluate(
    settings: &Settings,
    cases_path: Option<&Path>,
    output: Option<&Path>,
    concurrency: usize,
    format: OutputFormat,
) -> Result<ExitCode, Failure> {
    let cases: Vec<EvaluationCase> = match cases_path {
        Some(path) => evaluation::load_cases(path)?,
        None => evaluation::default_cases(),
    };
    let (pipeline, _index) = open_pipeline(settings)?;

    let spinner = (!format.is_json())
        .then(|| display::create_spinner(&format!("Evaluating {} cases", cases.len())));
    let report = evaluation::run_evaluation(&pipeline, &cases, concurrency).await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    if let Some(path) = output {
        report.write_json(path)?;
    }

    if format.is_json() {
        let json = serde_json::to_string_pretty(&JsonResponse::success(&report))
            .map_err(|e| Failure::new(ExitCode::GeneralError, "OUTPUT_ERROR", e))?;
        println!("{json}");
    } else {
        println!("{}", display::create_evaluation_table(&report));
        if let Some(path) = output {
            println!("Details written to {}", THEME.paint(&THEME.location, path.display()));
        }
    }

    Ok(ExitCode::Success)
}

#[cfg(feature = "http-server")]
async fn run_serve(settings: &Settings, bind: String) -> Result<ExitCode, Failure> {
    use cimsuggest::server::{AppState, serve};

    let (pipeline, index) = open_pipeline(settings)?;
    let state = AppState::new(Arc::new(pipeline), index, settings.server.max_concurrency);

    serve(state, &bind)
        .await
        .map_err(|e| Failure::new(ExitCode::GeneralError, "SERVER_ERROR", e))?;
    Ok(ExitCode::Success)
}

#[cfg(not(feature = "http-server"))]
async fn run_serve(_settings: &Settings, _bind: String) -> Result<ExitCode, Failure> {
    Err(Failure::new(
        ExitCode::GeneralError,
        "UNSUPPORTED",
        "HTTP server support is not compiled in. Rebuild with: cargo build --features http-server",
    ))
}
