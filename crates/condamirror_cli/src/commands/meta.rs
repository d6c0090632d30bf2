use std::io::Write;
use std::path::{Path, PathBuf};

use clap::CommandFactory;

use crate::Cli;

const BIN_NAME: &str = "condamirror";

fn write_completions(
    shell: clap_complete::Shell,
    out: &mut impl Write,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, BIN_NAME, out);
    out.flush()?;
    Ok(())
}

fn write_man_page(
    cmd: clap::Command,
    title: &str,
    out: &mut impl Write,
) -> std::io::Result<()> {
    clap_mangen::Man::new(cmd).title(title).render(out)
}

/// Write `condamirror.1` plus `condamirror-<sub>.1` for each visible subcommand.
fn write_man_dir(dir: &Path) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(dir)?;
    let cmd = Cli::command();
    let mut written = Vec::new();

    let main_page = dir.join(format!("{BIN_NAME}.1"));
    let mut file = std::fs::File::create(&main_page)?;
    write_man_page(cmd.clone(), BIN_NAME, &mut file)?;
    written.push(main_page);

    for sub in cmd.get_subcommands().filter(|s| !s.is_hide_set()) {
        let name = format!("{BIN_NAME}-{}", sub.get_name());
        let page = dir.join(format!("{name}.1"));
        let mut file = std::fs::File::create(&page)?;
        write_man_page(sub.clone(), &name, &mut file)?;
        written.push(page);
    }

    Ok(written)
}

pub(crate) fn handle_completions(
    shell: clap_complete::Shell,
) -> Result<(), Box<dyn std::error::Error>> {
    write_completions(shell, &mut std::io::stdout().lock())
}

pub(crate) fn handle_man(output: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    match output {
        Some(dir) => {
            let pages = write_man_dir(&dir)?;
            println!("Wrote {} man pages to {}", pages.len(), dir.display());
        }
        None => write_man_page(Cli::command(), BIN_NAME, &mut std::io::stdout().lock())?,
    }
    Ok(())
}
