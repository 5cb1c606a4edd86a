use std::collections::BTreeMap;

use console::Style;

use crate::copy_tree::GenerationSummary;
use crate::outcome::Outcome;
use crate::records::SourceFileRecord;
use crate::scheduler::RunSummary;

pub fn print_error(msg: &str) {
    let style = Style::new().red().bold();
    eprintln!("{} {}", style.apply_to("✗"), msg);
}

pub fn print_success(msg: &str) {
    let style = Style::new().green().bold();
    println!("{} {}", style.apply_to("✓"), msg);
}

pub fn print_generation_summary(summary: &GenerationSummary) {
    let dim = Style::new().dim();
    println!(
        "{} {} mutants across {} files ({} copied verbatim)",
        dim.apply_to("·"),
        summary.mutants_generated,
        summary.files_mutated,
        summary.files_copied,
    );
}

pub fn print_run_summary(counts: &BTreeMap<Outcome, usize>, summary: &RunSummary) {
    let total: usize = counts.values().sum();
    let killed = counts.get(&Outcome::Killed).copied().unwrap_or(0);
    let survived = counts.get(&Outcome::Survived).copied().unwrap_or(0);
    let no_tests = counts.get(&Outcome::NoTests).copied().unwrap_or(0);

    println!("    summary:");
    println!("    {total} mutants, {killed} killed, {survived} survived, {no_tests} no tests");
    for outcome in [
        Outcome::Timeout,
        Outcome::Suspicious,
        Outcome::Segfault,
        Outcome::Skipped,
        Outcome::NotChecked,
    ] {
        if let Some(count) = counts.get(&outcome) {
            if *count > 0 {
                let dim = Style::new().dim();
                println!("    {} {} {}", dim.apply_to("·"), count, outcome);
            }
        }
    }

    let elapsed = summary.elapsed.as_secs_f64();
    if elapsed > 0.0 && summary.attempted > 0 {
        println!(
            "{:.2} mutations/second",
            summary.attempted as f64 / elapsed
        );
    }
}

/// Per-mutant outcome listing. Killed mutants are noise once a run is
/// healthy, so they are hidden unless asked for.
pub fn print_results(records: &[SourceFileRecord], show_all: bool) {
    for record in records {
        let mut shown_header = false;
        for (key, code) in &record.exit_code_by_key {
            let outcome = crate::outcome::outcome_for_exit_code(*code);
            if outcome == Outcome::Killed && !show_all {
                continue;
            }
            if !shown_header {
                println!("    {}:", record.path.display());
                shown_header = true;
            }
            let style = match outcome {
                Outcome::Survived => Style::new().yellow(),
                Outcome::Killed => Style::new().green(),
                Outcome::NotChecked => Style::new().dim(),
                _ => Style::new().magenta(),
            };
            println!("        {}: {}", key, style.apply_to(outcome));
        }
    }
}

pub fn print_time_estimates(estimates: &[(f64, String)]) {
    for (time, key) in estimates {
        if *time <= 0.0 {
            println!("<no tests> {key}");
        } else {
            println!("{}ms {key}", (*time * 1000.0) as u64);
        }
    }
}
