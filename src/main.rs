use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use pymutor::config::Config;
use pymutor::error::Result;
use pymutor::outcome::Outcome;
use pymutor::records;
use pymutor::scheduler::{self, RunOptions};
use pymutor::stats::{self, StatsSnapshot};
use pymutor::testrunner::PytestRunner;
use pymutor::trampoline::function_key_from_mutant;
use pymutor::{copy_tree, output, report};

#[derive(Parser)]
#[command(name = "pymutor", version, about = "Mutation testing for Python projects")]
struct Cli {
    /// Directories or files holding the code to mutate
    #[arg(long, global = true)]
    paths_to_mutate: Vec<PathBuf>,
    /// Python interpreter used to drive pytest
    #[arg(long, global = true, default_value = "python3")]
    python: String,
    /// Show subprocess output and worker exit codes
    #[arg(long, global = true)]
    debug: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate mutants and run the test suite against them
    Run {
        /// Mutant names or glob patterns to (re-)run; all by default
        mutants: Vec<String>,
        /// Maximum number of parallel workers (default: CPU count)
        #[arg(long)]
        max_children: Option<usize>,
        /// Copy only this test file into the mutated tree
        #[arg(long)]
        test_file: Option<PathBuf>,
    },
    /// List mutant outcomes from the last run
    Results {
        /// Include killed mutants
        #[arg(long)]
        all: bool,
    },
    /// Show the diff for a mutant
    Show {
        mutant: String,
    },
    /// Write a mutant's body into the original source for debugging
    Apply {
        mutant: String,
    },
    /// Print estimated worst-case run time per mutant
    TimeEstimates {
        mutants: Vec<String>,
    },
    /// Print the tests covering a mutant's function
    TestsForMutant {
        mutant: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            output::print_error(&e.to_string());
            process::exit(e.exit_code());
        }
    };

    let result = match cli.command {
        Commands::Run { ref mutants, .. } => cmd_run(&config, mutants.clone()),
        Commands::Results { all } => cmd_results(&config, all),
        Commands::Show { ref mutant } => cmd_show(&config, mutant),
        Commands::Apply { ref mutant } => cmd_apply(&config, mutant),
        Commands::TimeEstimates { ref mutants } => cmd_time_estimates(&config, mutants),
        Commands::TestsForMutant { ref mutant } => cmd_tests_for_mutant(&config, mutant),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            output::print_error(&e.to_string());
            process::exit(e.exit_code());
        }
    }
}

fn build_config(cli: &Cli) -> Result<Config> {
    let (test_file, max_children) = match &cli.command {
        Commands::Run {
            test_file,
            max_children,
            ..
        } => (test_file.clone(), *max_children),
        _ => (None, None),
    };
    let mut config = Config::discover(cli.paths_to_mutate.clone(), test_file, max_children)?;
    config.debug = cli.debug;
    config.python = cli.python.clone();
    Ok(config)
}

fn cmd_run(config: &Config, mutants: Vec<String>) -> Result<i32> {
    ctrlc::set_handler(scheduler::request_interrupt).ok();

    println!("Generating mutants");
    let summary = copy_tree::build_mutated_tree(config)?;
    output::print_generation_summary(&summary);

    let runner = PytestRunner::new(config.mutants_dir.clone(), config.python.clone(), config.debug);

    println!("Collecting stats");
    let stats = stats::collect_or_refresh(&runner, &config.stats_path())?;

    let mut records = records::load_all(config)?;

    println!("Running mutation testing");
    let run_summary = scheduler::run(
        &runner,
        &stats,
        &mut records,
        &RunOptions {
            mutant_filters: mutants,
            max_children: config.max_children,
            debug: config.debug,
        },
    )?;

    let counts = records::summarize(&records);
    output::print_run_summary(&counts, &run_summary);

    let survivors_path = report::export_survivors(config, &records, &stats)?;
    let survived = counts.get(&Outcome::Survived).copied().unwrap_or(0);
    if survived > 0 {
        println!("surviving mutants written to {}", survivors_path.display());
    }

    Ok(if survived > 0 { 1 } else { 0 })
}

fn cmd_results(config: &Config, all: bool) -> Result<i32> {
    let records = records::load_all(config)?;
    output::print_results(&records, all);
    Ok(0)
}

fn cmd_show(config: &Config, mutant: &str) -> Result<i32> {
    let records = records::load_all(config)?;
    let record = report::find_record(&records, mutant)?;
    let outcome = record
        .outcome_for(mutant)
        .unwrap_or(Outcome::NotChecked);
    println!("# {mutant}: {outcome}");
    let diff = report::diff_for_mutant(record, &config.mutants_dir, mutant)?;
    print!("{diff}");
    Ok(0)
}

fn cmd_apply(config: &Config, mutant: &str) -> Result<i32> {
    let records = records::load_all(config)?;
    let record = report::find_record(&records, mutant)?;
    report::apply_mutant(record, config, mutant)?;
    output::print_success(&format!(
        "applied {} to {}",
        mutant,
        record.path.display()
    ));
    Ok(0)
}

fn cmd_time_estimates(config: &Config, mutants: &[String]) -> Result<i32> {
    let stats = load_stats(config)?;
    let records = records::load_all(config)?;

    let mut estimates: Vec<(f64, String)> = Vec::new();
    for record in &records {
        for key in record.exit_code_by_key.keys() {
            if !mutants.is_empty()
                && !mutants
                    .iter()
                    .any(|m| m == key || pymutor::config::fnmatch(m, key))
            {
                continue;
            }
            let time = stats.estimated_worst_case(function_key_from_mutant(key));
            estimates.push((time, key.clone()));
        }
    }
    estimates.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    output::print_time_estimates(&estimates);
    Ok(0)
}

fn cmd_tests_for_mutant(config: &Config, mutant: &str) -> Result<i32> {
    let stats = load_stats(config)?;
    let tests = stats.tests_for_function(function_key_from_mutant(mutant));
    for test in tests {
        println!("{test}");
    }
    Ok(0)
}

fn load_stats(config: &Config) -> Result<StatsSnapshot> {
    let path = config.stats_path();
    StatsSnapshot::load(&path)?.ok_or(pymutor::Error::MissingStats(path))
}
