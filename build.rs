//! Build script that renders the `fleetup` man page into `OUT_DIR`.

use std::env;
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

use clap::CommandFactory;
use clap_mangen::Man;

#[path = "src/cli/mod.rs"]
mod cli;

use cli::Cli;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut stdout = io::stdout();
    for watched in ["build.rs", "src/cli/mod.rs"] {
        writeln!(stdout, "cargo:rerun-if-changed={watched}")?;
    }

    let out_dir = env::var_os("OUT_DIR")
        .map(PathBuf::from)
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "OUT_DIR was not set"))?;

    let command = Cli::command();
    let page = out_dir.join(format!("{}.1", command.get_name()));
    let mut file = File::create(page)?;
    Man::new(command).render(&mut file)?;
    file.flush()?;

    Ok(())
}
