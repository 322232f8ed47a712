//! Genepop parsing: row normalization, tokenization, and record decoding.
//!
//! Parsing runs in two phases. Phase 1 ([`tokenize`]) classifies raw rows
//! into the stacks-version tag, the locus-name block, and genotype rows,
//! using the `Pop` delimiter rows as the boundary. Phase 2 ([`decode`])
//! turns genotype rows into typed [`IndividualRecord`]s, validating the
//! sample/genotype delimiter on every row.

use anyhow::{anyhow, bail, Result};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// The exact 4-character separator between sample id and genotypes.
pub const SAMPLE_SEPARATOR: &str = " ,  ";

/// Version tag recorded when the version line turns out to be a locus name.
pub const NO_STACKS_VERSION: &str = "No STACKS version specified";

/// Phase-1 output: rows classified but genotype rows not yet decoded.
#[derive(Clone, Debug)]
pub struct GenepopDocument {
    pub stacks_version: String,
    pub locus_names: Vec<String>,
    pub genotype_rows: Vec<String>,
}

/// One sampled individual with its ordered per-locus genotype codes.
#[derive(Clone, Debug)]
pub struct IndividualRecord {
    pub sample_id: String,
    /// Sample-id prefix before the first underscore.
    pub population: String,
    pub genotypes: Vec<String>,
}

/// Fully parsed Genepop dataset.
#[derive(Clone, Debug)]
pub struct GenepopData {
    pub stacks_version: String,
    pub locus_names: Vec<String>,
    pub individuals: Vec<IndividualRecord>,
}

/// Read all rows from a Genepop file, plain or gzipped.
pub fn read_rows<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| anyhow!("Failed to open Genepop file {}: {}", path.display(), e))?;
    let reader: Box<dyn BufRead> = if path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("gz"))
        .unwrap_or(false)
    {
        Box::new(BufReader::with_capacity(64 * 1024, MultiGzDecoder::new(file)))
    } else {
        Box::new(BufReader::with_capacity(64 * 1024, file))
    };
    let mut rows = Vec::new();
    for line in reader.lines() {
        rows.push(line?);
    }
    Ok(rows)
}

/// A population delimiter row: exactly `Pop`, `pop`, or `POP`, with only a
/// trailing carriage return tolerated, nothing else.
fn is_pop_delimiter(row: &str) -> bool {
    matches!(row.trim_end_matches('\r'), "Pop" | "pop" | "POP")
}

/// Phase 1: normalize the header form and classify rows.
///
/// The alternate header form puts every locus name on the first row as a
/// comma-delimited list; that row is spliced back into one-name-per-row
/// form before classification. The first normalized row is consumed as the
/// stacks-version tag. Rows before the first `Pop` delimiter are locus
/// names; everything after, minus further delimiter rows, is a genotype row.
pub fn tokenize(mut rows: Vec<String>) -> Result<GenepopDocument> {
    if rows.is_empty() {
        bail!("Genepop input is empty");
    }

    if rows[0].matches(',').count() > 1 {
        let spliced: Vec<String> = rows[0]
            .split(',')
            .map(|name| name.trim().to_string())
            .collect();
        rows.splice(0..1, spliced);
    }

    let stacks_version = rows.remove(0);

    let first_delim = rows
        .iter()
        .position(|r| is_pop_delimiter(r))
        .ok_or_else(|| anyhow!("No population delimiter row (Pop/pop/POP) found in Genepop input"))?;

    let locus_names: Vec<String> = rows[..first_delim]
        .iter()
        .map(|r| r.trim_end_matches('\r').trim_end().to_string())
        .collect();

    let genotype_rows: Vec<String> = rows[first_delim..]
        .iter()
        .filter(|r| !is_pop_delimiter(r))
        .map(|r| r.trim_end_matches('\r').to_string())
        .collect();

    Ok(GenepopDocument {
        stacks_version,
        locus_names,
        genotype_rows,
    })
}

/// Split one genotype row into (sample id, genotype codes), enforcing the
/// `" ,  "` sample/genotype delimiter contract.
fn split_genotype_row(row: &str) -> Result<(String, Vec<String>)> {
    let tokens: Vec<&str> = row.split(' ').collect();
    if tokens.len() < 4 || tokens[1] != "," || !tokens[2].is_empty() {
        bail!(
            "Malformed genotype row '{}': sample id and genotypes must be separated by \"{}\"",
            row,
            SAMPLE_SEPARATOR
        );
    }
    let sample_id = tokens[0].to_string();
    let codes: Vec<String> = tokens[3..]
        .iter()
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect();
    Ok((sample_id, codes))
}

/// Population label: the sample-id prefix before the first underscore.
fn population_label(sample_id: &str) -> Result<String> {
    match sample_id.split_once('_') {
        Some((prefix, _)) => Ok(prefix.to_string()),
        None => bail!(
            "Sample id '{}' has no underscore separating the population prefix",
            sample_id
        ),
    }
}

/// Phase 2: decode genotype rows into typed records.
///
/// If the first genotype row carries one more code than there are locus
/// names, the consumed version tag was actually a locus name (the alternate
/// header form has no version line). Recovery prepends it to the locus
/// block and records the version as unavailable. Any remaining count
/// mismatch is fatal.
pub fn decode(doc: GenepopDocument) -> Result<GenepopData> {
    let GenepopDocument {
        mut stacks_version,
        mut locus_names,
        genotype_rows,
    } = doc;

    if genotype_rows.is_empty() {
        bail!("No genotype rows found after the first population delimiter");
    }

    let mut individuals = Vec::with_capacity(genotype_rows.len());
    for (i, row) in genotype_rows.iter().enumerate() {
        let (sample_id, codes) = split_genotype_row(row)?;

        if i == 0 && codes.len() == locus_names.len() + 1 {
            eprintln!(
                "Warning: locus header misaligned with genotype columns; \
                 treating the version line '{}' as a locus name",
                stacks_version
            );
            locus_names.insert(0, stacks_version.trim_end().to_string());
            stacks_version = NO_STACKS_VERSION.to_string();
        }
        if codes.len() != locus_names.len() {
            bail!(
                "Genotype row for '{}' has {} genotype codes but {} locus names",
                sample_id,
                codes.len(),
                locus_names.len()
            );
        }

        let population = population_label(&sample_id)?;
        individuals.push(IndividualRecord {
            sample_id,
            population,
            genotypes: codes,
        });
    }

    Ok(GenepopData {
        stacks_version,
        locus_names,
        individuals,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_tokenize_one_locus_per_row() {
        let doc = tokenize(rows(&[
            "Stacks v2.60",
            "Loc1",
            "Loc2",
            "Pop",
            "BON_01 ,  001002 003004",
        ]))
        .unwrap();
        assert_eq!(doc.stacks_version, "Stacks v2.60");
        assert_eq!(doc.locus_names, vec!["Loc1", "Loc2"]);
        assert_eq!(doc.genotype_rows.len(), 1);
    }

    #[test]
    fn test_tokenize_comma_header_form() {
        let doc = tokenize(rows(&[
            "Loc1, Loc2, Loc3",
            "Pop",
            "BON_01 ,  001002 003004",
        ]))
        .unwrap();
        // First spliced name is consumed as the version tag.
        assert_eq!(doc.stacks_version, "Loc1");
        assert_eq!(doc.locus_names, vec!["Loc2", "Loc3"]);
    }

    #[test]
    fn test_tokenize_strips_delimiter_rows_between_pops() {
        let doc = tokenize(rows(&[
            "Stacks v2.60",
            "Loc1",
            "Pop",
            "BON_01 ,  001002",
            "pop",
            "TWI_01 ,  003004",
        ]))
        .unwrap();
        assert_eq!(doc.genotype_rows.len(), 2);
    }

    #[test]
    fn test_tokenize_requires_pop_delimiter() {
        let err = tokenize(rows(&["Stacks v2.60", "Loc1", "BON_01 ,  001002"])).unwrap_err();
        assert!(err.to_string().contains("Pop"));
    }

    #[test]
    fn test_pop_delimiter_exact_spellings_only() {
        assert!(is_pop_delimiter("Pop"));
        assert!(is_pop_delimiter("POP"));
        assert!(is_pop_delimiter("pop\r"));
        assert!(!is_pop_delimiter("PoP"));
        assert!(!is_pop_delimiter("Population"));
        assert!(!is_pop_delimiter("Pop "));
        assert!(!is_pop_delimiter("Pop\t"));
    }

    #[test]
    fn test_decode_valid_rows() {
        let data = decode(GenepopDocument {
            stacks_version: "Stacks v2.60".to_string(),
            locus_names: vec!["Loc1".to_string(), "Loc2".to_string()],
            genotype_rows: vec!["BON_01 ,  001002 003004".to_string()],
        })
        .unwrap();
        assert_eq!(data.individuals.len(), 1);
        assert_eq!(data.individuals[0].sample_id, "BON_01");
        assert_eq!(data.individuals[0].population, "BON");
        assert_eq!(data.individuals[0].genotypes, vec!["001002", "003004"]);
    }

    #[test]
    fn test_decode_rejects_malformed_separator() {
        let err = decode(GenepopDocument {
            stacks_version: String::new(),
            locus_names: vec!["Loc1".to_string()],
            genotype_rows: vec!["BON_01 , 001002".to_string()],
        })
        .unwrap_err();
        assert!(err.to_string().contains("\" ,  \""));
    }

    #[test]
    fn test_decode_header_misalignment_recovery() {
        // The "version" line is really the first locus name.
        let data = decode(GenepopDocument {
            stacks_version: "Loc1".to_string(),
            locus_names: vec!["Loc2".to_string()],
            genotype_rows: vec!["BON_01 ,  001002 003004".to_string()],
        })
        .unwrap();
        assert_eq!(data.stacks_version, NO_STACKS_VERSION);
        assert_eq!(data.locus_names, vec!["Loc1", "Loc2"]);
        assert_eq!(data.individuals[0].genotypes.len(), 2);
    }

    #[test]
    fn test_decode_irrecoverable_column_mismatch() {
        let err = decode(GenepopDocument {
            stacks_version: "Stacks v2.60".to_string(),
            locus_names: vec!["Loc1".to_string()],
            genotype_rows: vec!["BON_01 ,  001002 003004 005006".to_string()],
        })
        .unwrap_err();
        assert!(err.to_string().contains("genotype codes"));
    }

    #[test]
    fn test_decode_requires_underscore_in_sample_id() {
        let err = decode(GenepopDocument {
            stacks_version: String::new(),
            locus_names: vec!["Loc1".to_string()],
            genotype_rows: vec!["BON01 ,  001002".to_string()],
        })
        .unwrap_err();
        assert!(err.to_string().contains("underscore"));
    }
}
