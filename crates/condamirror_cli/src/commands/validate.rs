use std::path::Path;
use std::process::ExitCode;

use condamirror::{ConfigError, MirrorEntry, load_mirror_file};
use console::style;

fn describe_entry(entry: &MirrorEntry) -> String {
    let subdirs: Vec<&str> = entry.subdirs.iter().map(|s| s.as_str()).collect();
    format!(
        "{} → {}: {} [{}]",
        entry.source,
        entry.destination,
        entry.packages.join(", "),
        subdirs.join(", ")
    )
}

fn validate_file<F>(path: &Path, lookup: F) -> Result<Vec<String>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let entries = load_mirror_file(path, lookup)?;
    Ok(entries.iter().map(describe_entry).collect())
}

/// Load and resolve a mirror document, listing its entries or every problem found.
pub(crate) fn handle_validate(path: &Path) -> ExitCode {
    match validate_file(path, |name| std::env::var(name).ok()) {
        Ok(lines) => {
            println!(
                "{} {} is valid ({} entries)",
                style("✓").green(),
                path.display(),
                lines.len()
            );
            for line in lines {
                println!("  {}", line);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            let problems = e.problems();
            eprintln!(
                "{} {} has {} problem(s):",
                style("✗").red(),
                path.display(),
                problems.len()
            );
            for problem in problems {
                eprintln!("  {}", problem);
            }
            ExitCode::FAILURE
        }
    }
}
