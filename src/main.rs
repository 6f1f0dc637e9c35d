//! ibmfgen - EPUB to IBMF bitmap-font generator

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{debug, error, info};

use ibmfgen::ibmf::writer;
use ibmfgen::{scan_publication, EpubFile, HexImport};

/// Exit code reported when the EPUB cannot be opened (-2 as seen by a
/// Unix shell).
const EPUB_OPEN_FAILURE: u8 = 254;

#[derive(Parser)]
#[command(name = "ibmfgen")]
#[command(version, about = "Derive a compact IBMF bitmap font from an EPUB", long_about = None)]
struct Cli {
    /// GNU Unifont hex glyph source
    #[arg(default_value = "./unifont-15.1.04.hex")]
    hex_font: PathBuf,

    /// EPUB publication to harvest
    #[arg(default_value = "./V1010490321.epub")]
    epub: PathBuf,

    /// Output font file
    #[arg(short, long, default_value = "./font.ibmf")]
    output: PathBuf,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let mut epub = match EpubFile::open(&cli.epub) {
        Ok(epub) => epub,
        Err(e) => {
            error!("unable to open file {}: {e}", cli.epub.display());
            return ExitCode::from(EPUB_OPEN_FAILURE);
        }
    };
    info!("file {} is open", cli.epub.display());

    match run(&mut epub, &cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(epub: &mut EpubFile, cli: &Cli) -> ibmfgen::Result<()> {
    let harvest = scan_publication(epub)?;
    info!("scan completed, characters count: {}", harvest.len());
    for (code_point, count) in harvest.iter() {
        debug!("{code_point:04x}:{count}");
    }

    let ublocks = harvest.ublocks();
    info!("{} clusters", ublocks.len());

    let font = HexImport::load(&cli.hex_font, &ublocks)?;
    writer::save(&font, &cli.output)?;
    Ok(())
}
