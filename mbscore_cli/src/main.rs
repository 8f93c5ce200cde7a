use clap::{Parser, Subcommand};
use mbscore_core::age::default_age_model;
use mbscore_core::sink::write_summary_csv;
use mbscore_core::*;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "mbscore")]
#[command(about = "Gut microbiome scoring and risk assessment", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Default log level when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Score every sample in an abundance table
    Score {
        /// Feature table (TSV with a Taxon column)
        #[arg(long, short, default_value = "feature-table.tsv")]
        input: PathBuf,

        /// Directory for results/, results.jsonl and summary.csv
        #[arg(long, short, default_value = "mbscore-out")]
        output_dir: PathBuf,

        /// Chronological ages (sample<TAB>age)
        #[arg(long)]
        ages: Option<PathBuf>,

        /// Externally computed functional summaries (JSON)
        #[arg(long)]
        functional: Option<PathBuf>,

        /// Score only this sample
        #[arg(long)]
        sample: Option<String>,

        /// Worker threads (overrides engine.threads)
        #[arg(long)]
        threads: Option<usize>,
    },

    /// Load and validate the configured reference tables
    CheckReferences,

    /// Write the active reference tables and age model to a directory
    ExportReferences {
        #[arg(long)]
        dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    mbscore_core::logging::init_with_level(&cli.log_level);

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Score {
            input,
            output_dir,
            ages,
            functional,
            sample,
            threads,
        } => cmd_score(
            config,
            &input,
            &output_dir,
            ages.as_deref(),
            functional.as_deref(),
            sample.as_deref(),
            threads,
        ),
        Commands::CheckReferences => cmd_check_references(&config),
        Commands::ExportReferences { dir } => cmd_export_references(&config, &dir),
    }
}

fn cmd_score(
    mut config: Config,
    input: &Path,
    output_dir: &Path,
    ages: Option<&Path>,
    functional: Option<&Path>,
    sample: Option<&str>,
    threads: Option<usize>,
) -> Result<()> {
    if let Some(threads) = threads {
        config.engine.threads = threads;
    }

    // Configuration and input errors abort before any sample is scored
    let engine = Engine::new(config)?;
    let table = load_feature_table(input)?;

    let mut inputs = ScoringInputs::default();
    if let Some(path) = ages {
        inputs.chronological_ages = load_chronological_ages(path)?;
    }
    if let Some(path) = functional {
        inputs.functional = load_functional_summaries(path)?;
    }

    let (results, failures) = match sample {
        Some(id) => (vec![engine.score_sample(&table, id, &inputs)?], Vec::new()),
        None => {
            let batch = engine.score_batch(&table, &inputs)?;
            (batch.results, batch.failures)
        }
    };

    tracing::debug!("Writing {} results to {:?}", results.len(), output_dir);
    let mut jsonl = JsonlSink::new(output_dir.join("results.jsonl"));
    let mut documents = JsonDirSink::new(output_dir.join("results"));
    for result in &results {
        jsonl.write(result)?;
        documents.write(result)?;
    }
    write_summary_csv(&output_dir.join("summary.csv"), &results)?;

    for result in &results {
        print_result_line(result);
    }
    for failure in &failures {
        eprintln!("FAILED {}: {}", failure.sample_id, failure.error);
    }
    println!(
        "Scored {} sample(s), {} failed. Output in {}",
        results.len(),
        failures.len(),
        output_dir.display()
    );

    Ok(())
}

fn print_result_line(result: &SampleResult) {
    let health = result
        .health()
        .value()
        .map(|h| format!("{:.1} ({})", h.overall, h.grade.label()))
        .unwrap_or_else(|| "-".into());
    let enterotype = result
        .enterotype()
        .value()
        .map(|e| {
            if e.low_confidence {
                format!("{}?", e.label)
            } else {
                e.label.to_string()
            }
        })
        .unwrap_or_else(|| "-".into());
    let age = result
        .age()
        .value()
        .map(|a| format!("{:.1}", a.predicted_age))
        .unwrap_or_else(|| "-".into());

    println!(
        "{}\treads={}\thealth={}\tenterotype={}\tage={}\tstages={}/6",
        result.sample_id(),
        result.total_reads(),
        health,
        enterotype,
        age,
        result.completeness().computed_count()
    );
}

fn cmd_check_references(config: &Config) -> Result<()> {
    let refs = match ReferenceData::load(&config.references) {
        Ok(refs) => refs,
        Err(e) => {
            eprintln!("Reference validation failed:");
            eprintln!("  - {}", e);
            return Err(e);
        }
    };

    for warning in refs.count_warnings() {
        println!("warning: {}", warning);
    }

    let versions = refs.versions();
    println!("ranges:       {} taxa (version {})", refs.ranges().len(), versions.ranges);
    println!("diseases:     {} profiles (version {})", refs.diseases().len(), versions.diseases);
    println!("enterotypes:  {} centroids (version {})", refs.centroids().len(), versions.enterotypes);
    println!("core genera:  {} (version {})", refs.core_genera().len(), versions.core_genera);

    match &config.references.age_model {
        Some(path) => {
            let model = LinearAgeModel::load(path)?;
            if model.input_len() != refs.core_genera().len() {
                println!(
                    "warning: age model expects {} core genera, list has {}",
                    model.input_len(),
                    refs.core_genera().len()
                );
            }
            println!("age model:    version {}", model.version);
        }
        None => println!("age model:    built-in"),
    }

    println!("References OK");
    Ok(())
}

fn cmd_export_references(config: &Config, dir: &Path) -> Result<()> {
    let refs = ReferenceData::load(&config.references)?;
    refs.export_to(dir)?;

    let model = match &config.references.age_model {
        Some(path) => LinearAgeModel::load(path)?,
        None => default_age_model(),
    };
    model.save_to(&dir.join("age_model.json"))?;

    println!("Exported reference tables to {}", dir.display());
    Ok(())
}
