//! Content sniffing: format signatures and CSV delimiter detection.

use super::SourceFormat;
use anyhow::{Result, bail};

const PARQUET_MAGIC: &[u8] = b"PAR1";
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0];
const DELIMITER_CANDIDATES: [u8; 4] = [b',', b';', b'\t', b'|'];
const SNIFF_LINES: usize = 20;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ContentSignature {
    Parquet,
    Zip,
    Ole,
    Binary,
    Text,
}

impl ContentSignature {
    fn describe(self) -> &'static str {
        match self {
            Self::Parquet => "parquet",
            Self::Zip => "a zip/xlsx workbook",
            Self::Ole => "a legacy xls workbook",
            Self::Binary => "binary data",
            Self::Text => "text",
        }
    }
}

pub fn detect_signature(bytes: &[u8]) -> ContentSignature {
    if bytes.starts_with(PARQUET_MAGIC) {
        ContentSignature::Parquet
    } else if bytes.starts_with(ZIP_MAGIC) {
        ContentSignature::Zip
    } else if bytes.starts_with(OLE_MAGIC) {
        ContentSignature::Ole
    } else if looks_binary(bytes) {
        ContentSignature::Binary
    } else {
        ContentSignature::Text
    }
}

/// NUL bytes outside a UTF-16 BOM mean the payload is not delimited text.
fn looks_binary(bytes: &[u8]) -> bool {
    if bytes.starts_with(&[0xFF, 0xFE]) || bytes.starts_with(&[0xFE, 0xFF]) {
        return false;
    }
    bytes.iter().take(8192).any(|&b| b == 0)
}

/// Fails when the payload clearly belongs to a different format than declared.
pub fn check_declared_format(bytes: &[u8], declared: SourceFormat) -> Result<()> {
    let signature = detect_signature(bytes);
    let matches = match declared {
        SourceFormat::Csv => signature == ContentSignature::Text,
        SourceFormat::Excel => matches!(signature, ContentSignature::Zip | ContentSignature::Ole),
        SourceFormat::Parquet => signature == ContentSignature::Parquet,
    };
    if !matches {
        bail!(
            "declared format {} but content looks like {}",
            declared.as_str(),
            signature.describe()
        );
    }
    Ok(())
}

/// Picks the candidate delimiter with a stable non-zero count across the
/// first lines, falling back to the most frequent one on the header, then `,`.
pub fn detect_delimiter(text: &str) -> u8 {
    let lines: Vec<&str> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(SNIFF_LINES)
        .collect();
    let Some(header) = lines.first() else {
        return b',';
    };

    let mut best_consistent: Option<(u8, usize)> = None;
    let mut best_header = (b',', 0usize);

    for &cand in &DELIMITER_CANDIDATES {
        let header_count = count_unquoted(header, cand);
        if header_count == 0 {
            continue;
        }
        if header_count > best_header.1 {
            best_header = (cand, header_count);
        }
        let consistent = lines.iter().all(|l| count_unquoted(l, cand) == header_count);
        if consistent && best_consistent.is_none_or(|(_, n)| header_count > n) {
            best_consistent = Some((cand, header_count));
        }
    }

    best_consistent.map_or(best_header.0, |(d, _)| d)
}

fn count_unquoted(line: &str, delimiter: u8) -> usize {
    let mut in_quotes = false;
    let mut count = 0;
    for &b in line.as_bytes() {
        if b == b'"' {
            in_quotes = !in_quotes;
        } else if b == delimiter && !in_quotes {
            count += 1;
        }
    }
    count
}

#[cfg(test)]
mod tests {
    #![expect(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_detect_delimiter_semicolon() {
        let text = "a;b;c\n1;2;3\n4;5;6\n";
        assert_eq!(detect_delimiter(text), b';');
    }

    #[test]
    fn test_detect_delimiter_ignores_quoted_commas() {
        let text = "name\tnote\n\"Smith, J\"\thello\n\"Doe, A\"\tworld\n";
        assert_eq!(detect_delimiter(text), b'\t');
    }

    #[test]
    fn test_detect_delimiter_fallback() {
        assert_eq!(detect_delimiter("single_column\n1\n2\n"), b',');
        assert_eq!(detect_delimiter(""), b',');
    }

    #[test]
    fn test_declared_csv_with_parquet_content() {
        let err = check_declared_format(b"PAR1\x00\x00", SourceFormat::Csv).unwrap_err();
        assert!(err.to_string().contains("parquet"));
    }

    #[test]
    fn test_declared_excel_with_text_content() {
        assert!(check_declared_format(b"a,b\n1,2\n", SourceFormat::Excel).is_err());
        assert!(check_declared_format(b"PK\x03\x04rest", SourceFormat::Excel).is_ok());
    }

    #[test]
    fn test_nul_bytes_are_binary() {
        assert_eq!(detect_signature(b"a,b\n\x00\x01"), ContentSignature::Binary);
        assert_eq!(detect_signature(b"a,b\n1,2"), ContentSignature::Text);
    }
}
