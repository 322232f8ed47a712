//! Allele decoding, group-label resolution, and STRUCTURE output assembly.

use anyhow::{anyhow, bail, Result};
use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::parse::{GenepopData, IndividualRecord};

/// Missing-data sentinel in STRUCTURE output.
pub const MISSING: i32 = -9;

/// Sniff the popgroup table's delimiter from its header line:
/// tab wins over comma, space is the last resort.
fn sniff_delimiter(path: &Path) -> Result<u8> {
    let mut header = String::new();
    BufReader::new(File::open(path)?).read_line(&mut header)?;
    let delim = match () {
        _ if header.contains('\t') => b'\t',
        _ if header.contains(',') => b',',
        _ => b' ',
    };
    Ok(delim)
}

/// Load a 2-column population group table (population label, group label).
/// Expects a header row; delimiter is sniffed from the first line.
pub fn load_popgroup_table<P: AsRef<Path>>(path: P) -> Result<Vec<(String, String)>> {
    let delim = sniff_delimiter(path.as_ref())?;
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delim)
        .from_path(&path)?;

    if rdr.headers()?.len() < 2 {
        bail!("Population group file needs 2 columns: population label, group label");
    }

    let mut pairs = Vec::new();
    for result in rdr.records() {
        let record = result?;
        if record.is_empty() {
            continue;
        }
        let label = record.get(0).unwrap_or("").trim().to_string();
        let group = record.get(1).unwrap_or("").trim().to_string();
        if label.is_empty() {
            continue;
        }
        pairs.push((label, group));
    }
    Ok(pairs)
}

/// Shared width of the genotype codes, taken as the maximum length among
/// non-missing codes in the first locus column. Falls back to all codes
/// when the first column is entirely missing. An odd width is fatal.
pub fn allele_width(individuals: &[IndividualRecord]) -> Result<usize> {
    let first_column = individuals.iter().filter_map(|ind| ind.genotypes.first());
    let mut width = first_column
        .clone()
        .filter(|code| !code.chars().all(|c| c == '0'))
        .map(|code| code.len())
        .max()
        .unwrap_or(0);
    if width == 0 {
        width = first_column.map(|code| code.len()).max().unwrap_or(0);
    }
    if width == 0 {
        bail!("No genotype codes found in the first locus column");
    }
    if width % 2 != 0 {
        bail!(
            "Genotype codes have odd length {}; cannot split into two alleles",
            width
        );
    }
    Ok(width)
}

/// Split one genotype code into its two allele values; `0` becomes `-9`.
fn decode_alleles(code: &str, width: usize, sample_id: &str, locus: &str) -> Result<(i32, i32)> {
    if !code.bytes().all(|b| b.is_ascii_digit()) {
        bail!(
            "Invalid genotype code '{}' for sample '{}' at locus '{}'",
            code,
            sample_id,
            locus
        );
    }
    if code.len() != width {
        bail!(
            "Genotype code '{}' for sample '{}' at locus '{}' has length {}, expected {}",
            code,
            sample_id,
            locus,
            code.len(),
            width
        );
    }
    let half = width / 2;
    let parse = |s: &str| -> Result<i32> {
        s.parse::<i32>().map_err(|_| {
            anyhow!(
                "Invalid genotype code '{}' for sample '{}' at locus '{}'",
                code,
                sample_id,
                locus
            )
        })
    };
    let a1 = parse(&code[..half])?;
    let a2 = parse(&code[half..])?;
    let recode = |a: i32| if a == 0 { MISSING } else { a };
    Ok((recode(a1), recode(a2)))
}

/// Default grouping: distinct population labels sorted, coded 1..k.
pub fn default_group_codes(individuals: &[IndividualRecord]) -> HashMap<String, String> {
    let labels: BTreeSet<&str> = individuals.iter().map(|i| i.population.as_str()).collect();
    labels
        .into_iter()
        .enumerate()
        .map(|(i, label)| (label.to_string(), (i + 1).to_string()))
        .collect()
}

/// Resolve the population-label-to-group mapping.
///
/// With no table, labels get default integer codes. With a table that covers
/// every label present in the data, the table's group values are used. A
/// table missing any label triggers a warning and a full fallback to default
/// codes for all individuals, never a partial mix.
pub fn resolve_groups(
    individuals: &[IndividualRecord],
    popgroup: Option<&[(String, String)]>,
) -> HashMap<String, String> {
    if let Some(pairs) = popgroup {
        let table: HashMap<&str, &str> = pairs
            .iter()
            .map(|(label, group)| (label.as_str(), group.as_str()))
            .collect();
        let missing: BTreeSet<&str> = individuals
            .iter()
            .map(|i| i.population.as_str())
            .filter(|label| !table.contains_key(label))
            .collect();
        if missing.is_empty() {
            return individuals
                .iter()
                .filter_map(|i| {
                    table
                        .get(i.population.as_str())
                        .map(|group| (i.population.clone(), group.to_string()))
                })
                .collect();
        }
        eprintln!(
            "Warning: population group table is missing labels [{}]; \
             falling back to integer group codes for all individuals",
            missing.into_iter().collect::<Vec<_>>().join(", ")
        );
    }
    default_group_codes(individuals)
}

/// Assemble the STRUCTURE row set: two rows per individual, one per allele,
/// with an optional leading locus-name header row.
pub fn build_structure_rows(
    data: &GenepopData,
    groups: &HashMap<String, String>,
    locus_names: bool,
) -> Result<Vec<String>> {
    let width = allele_width(&data.individuals)?;

    let mut rows = Vec::with_capacity(data.individuals.len() * 2 + 1);
    if locus_names {
        // Two blank leading columns stand in for the sample id and group.
        let mut header: Vec<&str> = vec!["", ""];
        header.extend(data.locus_names.iter().map(String::as_str));
        rows.push(header.join(" "));
    }

    for ind in &data.individuals {
        let group = groups
            .get(&ind.population)
            .ok_or_else(|| anyhow!("No group assigned for population '{}'", ind.population))?;
        let mut first = Vec::with_capacity(ind.genotypes.len() + 2);
        let mut second = Vec::with_capacity(ind.genotypes.len() + 2);
        first.push(ind.sample_id.clone());
        first.push(group.clone());
        second.push(ind.sample_id.clone());
        second.push(group.clone());
        for (code, locus) in ind.genotypes.iter().zip(&data.locus_names) {
            let (a1, a2) = decode_alleles(code, width, &ind.sample_id, locus)?;
            first.push(a1.to_string());
            second.push(a2.to_string());
        }
        rows.push(first.join(" "));
        rows.push(second.join(" "));
    }

    Ok(rows)
}

/// Write the assembled rows, one per line, plain text.
pub fn write_structure<P: AsRef<Path>>(path: P, rows: &[String]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(&path).map_err(|e| {
        anyhow!(
            "Failed to create output file {}: {}",
            path.as_ref().display(),
            e
        )
    })?);
    for row in rows {
        writeln!(writer, "{}", row)?;
    }
    writer.flush()?;
    Ok(())
}
