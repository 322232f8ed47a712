//! genepop2structure: convert Genepop genotype files to STRUCTURE input.
//!
//! This crate reformats Genepop text (locus-name header block, `Pop`
//! population delimiters, one genotype row per individual) into the
//! STRUCTURE program's layout: two space-separated rows per individual,
//! one per allele, with the sample id and group label as the leading
//! columns. This mirrors the R `genepop_to_structure()` routine used on
//! STACKS pipeline output.
//!
//! The conversion is a single-pass batch transform: parse, decode, group,
//! assemble, then write exactly one output file. All fatal format errors
//! abort before anything is written.

pub mod convert;
pub mod parse;

use anyhow::Result;
use std::path::{Path, PathBuf};

pub use convert::{
    build_structure_rows, default_group_codes, load_popgroup_table, resolve_groups,
    write_structure, MISSING,
};
pub use parse::{
    decode, read_rows, tokenize, GenepopData, GenepopDocument, IndividualRecord,
    NO_STACKS_VERSION, SAMPLE_SEPARATOR,
};

/// Genepop input: a file path (plain or gzipped) or preloaded rows.
#[derive(Clone, Debug)]
pub enum GenepopSource {
    Path(PathBuf),
    Rows(Vec<String>),
}

/// Population group mapping: a 2-column file path or preloaded pairs
/// of (population label, group label).
#[derive(Clone, Debug)]
pub enum PopGroupSource {
    Path(PathBuf),
    Table(Vec<(String, String)>),
}

/// What the conversion produced, for caller-side reporting.
#[derive(Clone, Debug)]
pub struct ConversionSummary {
    pub stacks_version: String,
    pub n_individuals: usize,
    pub n_loci: usize,
}

/// Parse Genepop input and assemble the STRUCTURE rows without writing.
pub fn convert_rows(
    genepop: GenepopSource,
    popgroup: Option<PopGroupSource>,
    locus_names: bool,
) -> Result<(Vec<String>, ConversionSummary)> {
    let raw = match genepop {
        GenepopSource::Path(path) => read_rows(path)?,
        GenepopSource::Rows(rows) => rows,
    };
    let data = decode(tokenize(raw)?)?;

    let popgroup_table = match popgroup {
        Some(PopGroupSource::Path(path)) => Some(load_popgroup_table(path)?),
        Some(PopGroupSource::Table(pairs)) => Some(pairs),
        None => None,
    };
    let groups = resolve_groups(&data.individuals, popgroup_table.as_deref());

    let rows = build_structure_rows(&data, &groups, locus_names)?;
    let summary = ConversionSummary {
        stacks_version: data.stacks_version,
        n_individuals: data.individuals.len(),
        n_loci: data.locus_names.len(),
    };
    Ok((rows, summary))
}

/// Convert a Genepop dataset to a STRUCTURE file.
///
/// Writing happens last, after every validation step has passed, so a
/// fatal format error never leaves a partial output file behind.
pub fn genepop_to_structure<P: AsRef<Path>>(
    genepop: GenepopSource,
    popgroup: Option<PopGroupSource>,
    locus_names: bool,
    path: P,
) -> Result<ConversionSummary> {
    let (rows, summary) = convert_rows(genepop, popgroup, locus_names)?;
    write_structure(path, &rows)?;
    Ok(summary)
}
