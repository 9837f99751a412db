use rand::rngs::StdRng;
use rand::SeedableRng;
use ragprobe::cli::{Cli, Commands, ConfigAction};
use ragprobe::config::{ConfigValidator, RagConfig};
use ragprobe::document::Document;
use ragprobe::error::{RagError, Result};
use ragprobe::generation::create_generation_provider;
use ragprobe::harness::{
    AnswerMatcher, CancelFlag, LongContextConfig, LongContextHarness, LongContextTask,
    NeedleConfig, NeedleHarness, NeedlePosition,
};
use ragprobe::retrieval::{RetrievalPipeline, SearchRequest};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse_args();

    match cli.command {
        Commands::Search {
            query,
            file,
            limit,
            rerank,
            json,
        } => {
            cmd_search(cli.config, &query, &file, limit, rerank, json)?;
        }
        Commands::Needle {
            needle,
            query,
            haystack_size,
            limit,
            seed,
            sizes,
            trials,
            json,
        } => {
            cmd_needle(
                cli.config,
                &needle,
                query,
                haystack_size,
                limit,
                seed,
                sizes,
                trials,
                json,
            )?;
        }
        Commands::LongContext {
            lengths,
            positions,
            trials,
            concurrency,
            seed,
            json,
        } => {
            cmd_long_context(cli.config, lengths, &positions, trials, concurrency, seed, json)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ragprobe=info"));

    fmt().with_env_filter(filter).with_target(false).init();
}

fn load_config(path: Option<PathBuf>) -> Result<RagConfig> {
    RagConfig::load_or_default(path.as_deref())
}

fn cmd_search(
    config_path: Option<PathBuf>,
    query: &str,
    files: &[PathBuf],
    limit: usize,
    rerank: bool,
    json_output: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let pipeline = RetrievalPipeline::from_config(&config).map_err(anyhow::Error::new)?;

    let mut documents = Vec::with_capacity(files.len());
    for path in files {
        let content = std::fs::read_to_string(path).map_err(|e| RagError::Io {
            source: e,
            context: format!("Failed to read input file: {:?}", path),
        })?;
        let id = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        documents
            .push(Document::with_id(id, content).with_metadata("path", json!(path.display().to_string())));
    }

    let chunk_ids = pipeline.add(&documents).map_err(anyhow::Error::new)?;
    println!("✓ Ingested {} files as {} chunks", files.len(), chunk_ids.len());

    let mut request = SearchRequest::new(query, limit);
    request.use_reranking = Some(rerank);
    request.score_threshold = config.search.score_threshold;
    let results = pipeline.search(&request).map_err(anyhow::Error::new)?;

    if json_output {
        println!("{}", to_json(&results)?);
        return Ok(());
    }

    println!("\nQuery: '{}'", query);
    println!("Top {} results:", results.len());
    for (i, result) in results.iter().enumerate() {
        match result.rerank_score {
            Some(rerank_score) => println!(
                "  {}. {} - score {:.3} (reranked {:.3})",
                i + 1,
                result.chunk_id,
                result.score,
                rerank_score
            ),
            None => println!("  {}. {} - score {:.3}", i + 1, result.chunk_id, result.score),
        }
        println!("     {}", preview(&result.content, 80));
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_needle(
    config_path: Option<PathBuf>,
    needle: &str,
    query: Option<String>,
    haystack_size: usize,
    limit: usize,
    seed: u64,
    sizes: Option<Vec<usize>>,
    trials: usize,
    json_output: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let pipeline = RetrievalPipeline::from_config(&config).map_err(anyhow::Error::new)?;
    let harness = NeedleHarness::new(pipeline);

    let needle_config = NeedleConfig {
        haystack_size,
        query,
        limit,
        seed,
        ..NeedleConfig::default()
    };

    match sizes {
        Some(sizes) => {
            let reports = harness
                .run_matrix(needle, &sizes, trials, &needle_config)
                .map_err(anyhow::Error::new)?;

            if json_output {
                println!("{}", to_json(&reports)?);
                return Ok(());
            }

            println!("Needle test matrix ({} runs):", reports.len());
            for &size in &sizes {
                let for_size: Vec<_> =
                    reports.iter().filter(|r| r.haystack_size == size).collect();
                let successes = for_size.iter().filter(|r| r.success).count();
                println!(
                    "  {} documents: {}/{} found at top-1",
                    size,
                    successes,
                    for_size.len()
                );
            }
        }
        None => {
            let report = harness
                .run(needle, &needle_config)
                .map_err(anyhow::Error::new)?;

            if json_output {
                println!("{}", to_json(&report)?);
                return Ok(());
            }

            println!("Needle test:");
            println!("  Haystack size: {}", report.haystack_size);
            println!("  Needle position: {}", report.needle_position);
            println!("  Query: '{}'", report.query);
            match report.rank {
                Some(rank) => println!("  Needle rank: {} of {}", rank, report.limit),
                None => println!("  Needle not found in top {}", report.limit),
            }
            println!("  Success: {}", report.success);
        }
    }

    Ok(())
}

fn cmd_long_context(
    config_path: Option<PathBuf>,
    lengths: Vec<usize>,
    positions: &[String],
    trials: usize,
    concurrency: usize,
    seed: u64,
    json_output: bool,
) -> Result<()> {
    let config = load_config(config_path)?;

    let positions: Vec<NeedlePosition> = positions
        .iter()
        .map(|p| {
            NeedlePosition::parse_position(p)
                .ok_or_else(|| RagError::Validation(format!("Unknown needle position: {}", p)))
        })
        .collect::<Result<_>>()?;

    let provider = create_generation_provider(&config.llm).map_err(anyhow::Error::new)?;
    let harness_config = LongContextConfig {
        context_lengths: lengths,
        positions,
        trials_per_config: trials,
        matcher: AnswerMatcher::Substring,
        max_concurrent: concurrency,
        seed,
    };
    let harness = LongContextHarness::new(Arc::from(provider), harness_config)
        .map_err(anyhow::Error::new)?;

    let mut rng = StdRng::seed_from_u64(seed);
    let task = LongContextTask::random(&mut rng);
    println!("✓ Task: '{}' (expected answer: {})", task.query, task.expected_answer);

    let cancel = CancelFlag::new();
    let runtime = tokio::runtime::Runtime::new().map_err(|e| RagError::Io {
        source: e,
        context: "Failed to start async runtime".to_string(),
    })?;

    let report = runtime
        .block_on(async {
            let ctrl_c_cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    ctrl_c_cancel.cancel();
                }
            });
            harness.run(&task, &cancel).await
        })
        .map_err(anyhow::Error::new)?;

    if json_output {
        println!("{}", to_json(&report)?);
        return Ok(());
    }

    println!("\nLong context test ({} cells):", report.cells.len());
    for cell in &report.cells {
        let scored = cell.correct + cell.incorrect;
        println!(
            "  {} chars @ {}: {:.1}% ({}/{} correct, {} failed)",
            cell.context_length,
            cell.position,
            cell.accuracy * 100.0,
            cell.correct,
            scored,
            cell.failures
        );
    }
    if report.cancelled {
        println!("  (run cancelled before completion)");
    }

    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            println!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Init { output, force } => {
            let path = match output.or_else(RagConfig::default_path) {
                Some(path) => path,
                None => {
                    return Err(RagError::Config(
                        "Could not determine a config path; pass --output".to_string(),
                    ))
                }
            };
            if path.exists() && !force {
                return Err(RagError::Config(format!(
                    "{} already exists; use --force to overwrite",
                    path.display()
                )));
            }
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| RagError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }
            RagConfig::default().save(&path)?;
            println!("✓ Wrote default configuration to {}", path.display());
        }
        ConfigAction::Validate { file } => {
            let path = file.or_else(RagConfig::default_path);
            match path {
                Some(path) => {
                    let config = RagConfig::load(&path)?;
                    ConfigValidator::validate(&config)?;
                    println!("✓ {} is valid", path.display());
                }
                None => {
                    return Err(RagError::Config(
                        "No config file found to validate".to_string(),
                    ))
                }
            }
        }
    }
    Ok(())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| RagError::Json {
        source: e,
        context: "Failed to serialize output".to_string(),
    })
}

fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}
