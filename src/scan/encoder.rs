//! TSV record encoding
//!
//! One record per row: `source_id \t target_id \t link_type \n`, UTF-8,
//! no header. This matches `mysql --batch --silent` output, which is what
//! `fastcci_build_db` reads.

use std::io::Write;

use crate::error::{Result, ScanError};

/// One `categorylinks ⋈ page` row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRow {
    /// `cl_from`: the page carrying the category link
    pub source_id: u64,
    /// `page_id` of the category page, the partition key
    pub target_id: u64,
    /// `cl_type`, e.g. `subcat` or `file`
    pub link_type: String,
}

impl LinkRow {
    pub fn new(source_id: u64, target_id: u64, link_type: impl Into<String>) -> Self {
        Self {
            source_id,
            target_id,
            link_type: link_type.into(),
        }
    }
}

/// Append one encoded record to `out`
///
/// Fails without touching `out` if a text field contains a tab, CR or LF.
pub fn encode_row(row: &LinkRow, out: &mut Vec<u8>) -> Result<()> {
    check_field("link_type", &row.link_type)?;

    writeln!(out, "{}\t{}\t{}", row.source_id, row.target_id, row.link_type)?;
    Ok(())
}

/// Encode a whole chunk into one buffer
///
/// The buffer is only returned when every row encoded cleanly.
pub fn encode_chunk(rows: &[LinkRow]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(rows.len() * 24);
    for row in rows {
        encode_row(row, &mut out)?;
    }
    Ok(out)
}

fn check_field(field: &'static str, value: &str) -> Result<()> {
    if value.bytes().any(|b| matches!(b, b'\t' | b'\n' | b'\r')) {
        return Err(ScanError::Encoding {
            field,
            value: value.to_string(),
        }
        .into());
    }
    Ok(())
}
