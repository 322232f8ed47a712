use anyhow::Result;
use clap::Parser;
use genepop2structure::{genepop_to_structure, GenepopSource, PopGroupSource};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "genepop2structure",
    version,
    about = "Convert Genepop genotype files to STRUCTURE input format"
)]
struct Cli {
    /// Input Genepop file (plain or gzipped)
    #[arg(long)]
    genepop: PathBuf,

    /// Optional 2-column table mapping population labels to group labels
    #[arg(long)]
    popgroup: Option<PathBuf>,

    /// Include locus names as a header row
    #[arg(long, default_value_t = false)]
    locus_names: bool,

    /// Output STRUCTURE file path
    #[arg(long)]
    output: PathBuf,

    /// Emit progress to stderr
    #[arg(long, default_value_t = false)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let summary = genepop_to_structure(
        GenepopSource::Path(cli.genepop),
        cli.popgroup.map(PopGroupSource::Path),
        cli.locus_names,
        &cli.output,
    )?;

    if cli.verbose {
        eprintln!("Detected version: {}", summary.stacks_version);
        eprintln!(
            "✓ Wrote {} individuals ({} loci) to {}",
            summary.n_individuals,
            summary.n_loci,
            cli.output.display()
        );
    }
    Ok(())
}
