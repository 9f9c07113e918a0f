//! Non-interactive inspection/extraction CLI. Thinner than the original
//! driver's interactive sector inspector (out of scope): list, read one file
//! to stdout, or extract every file to a directory.

use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use trs80fs::{DiskImage, TrsdosFileSystem};

#[derive(Parser)]
#[command(name = "trs80fs-demo", about = "Inspect TRS-80 disk images")]
struct Cli {
    /// Path to a JV1 or DMK disk image.
    image: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print geometry, analysis results, and the directory listing.
    List,
    /// Print one file's contents to stdout.
    Read { name: String },
    /// Extract every listed file into `dir`.
    Extract { dir: PathBuf },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    let image = DiskImage::open(&cli.image)?;
    let fs = TrsdosFileSystem::open(image);

    match cli.command {
        Command::List => {
            println!("Geometry:   {}", fs.geometry_description());
            println!("Dir track:  {}", fs.dir_track());
            println!("Sector base: {}", fs.sector_base());
            println!("System type: {}", fs.system_type());
            println!("OS variant:  {}", fs.os_variant());
            if let Some(warning) = fs.inconsistency() {
                println!("Warning:    {warning}");
            }
            println!();
            for entry in fs.list_files() {
                let flags = match (entry.system, entry.invisible) {
                    (true, true) => "SH",
                    (true, false) => "S ",
                    (false, true) => " H",
                    (false, false) => "  ",
                };
                println!("{:<12} {:>8} {}", entry.name, entry.size, flags);
            }
        }
        Command::Read { name } => {
            let bytes = fs
                .read_file(&name)
                .ok_or_else(|| format!("file not found: {name}"))?;
            std::io::stdout().write_all(&bytes)?;
        }
        Command::Extract { dir } => {
            std::fs::create_dir_all(&dir)?;
            for entry in fs.list_files() {
                let Some(bytes) = fs.read_file(&entry.name) else {
                    log::warn!("{}: listed but unreadable, skipping", entry.name);
                    continue;
                };
                let host_name = entry.name.replace('/', ".");
                std::fs::write(dir.join(host_name), bytes)?;
            }
        }
    }

    Ok(())
}
