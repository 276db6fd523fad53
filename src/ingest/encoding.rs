//! Text encoding detection and strict decoding for delimited input.

use anyhow::{Result, anyhow, bail};
use chardetng::EncodingDetector;
use encoding_rs::Encoding;

/// Bytes fed to the statistical detector when no encoding is declared.
pub const DETECTION_SAMPLE_BYTES: usize = 64 * 1024;

#[derive(Debug)]
pub struct Decoded {
    pub text: String,
    pub encoding: &'static str,
}

/// Decodes `bytes` with the declared encoding, or with a detected one.
///
/// Declared encodings are strict: any malformed sequence is an error and a
/// byte-order mark does not override the declaration. Detected encodings
/// honour a BOM and reject output that needed replacement characters.
pub fn decode(bytes: &[u8], declared: Option<&str>) -> Result<Decoded> {
    let decoded = match declared {
        Some(label) => {
            let encoding = Encoding::for_label(label.trim().as_bytes())
                .ok_or_else(|| anyhow!("unknown encoding label '{label}'"))?;
            let text = encoding
                .decode_without_bom_handling_and_without_replacement(bytes)
                .ok_or_else(|| {
                    anyhow!("content contains bytes that are invalid in {}", encoding.name())
                })?;
            Decoded {
                text: text.into_owned(),
                encoding: encoding.name(),
            }
        }
        None => {
            let guess = detect(bytes);
            let (text, actual, had_errors) = guess.decode(bytes);
            if had_errors {
                bail!(
                    "content contains bytes that are invalid in detected encoding {}",
                    actual.name()
                );
            }
            Decoded {
                text: text.into_owned(),
                encoding: actual.name(),
            }
        }
    };

    let mut text = decoded.text;
    if text.starts_with('\u{feff}') {
        text.drain(..'\u{feff}'.len_utf8());
    }
    Ok(Decoded {
        text,
        encoding: decoded.encoding,
    })
}

pub fn detect(bytes: &[u8]) -> &'static Encoding {
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return encoding;
    }
    let sample = bytes.get(..DETECTION_SAMPLE_BYTES).unwrap_or(bytes);
    let mut detector = EncodingDetector::new();
    detector.feed(sample, sample.len() == bytes.len());
    detector.guess(None, true)
}
