//! Run-length encoding of text.
//!
//! A run of one symbol is written as the bare symbol; longer runs are written
//! as the symbol followed by the decimal run length (`"aaaabbbccd"` becomes
//! `"a4b3c2d"`). Because counts are plain digits, digit symbols cannot be
//! encoded and are rejected. When the encoded form is not strictly shorter
//! than the input, the input itself is the artifact; text without digits
//! decodes to itself, so no marker is needed.

use log::{info, warn};

use crate::compression::{as_text, Compression, Result};
use crate::error::Error;

/// Largest output, in bytes, a single artifact may expand to.
pub const MAX_DECODED_LEN: usize = 1 << 30;

/// Collapse runs in `input`, falling back to the input when that is not shorter.
pub fn rle_compress(input: &str) -> Result<String> {
    let mut chars = input.char_indices();
    let Some((_, first)) = chars.next() else {
        return Ok(String::new());
    };
    if first.is_ascii_digit() {
        return Err(Error::DigitSymbol {
            symbol: first,
            position: 0,
        });
    }

    let mut encoded = String::with_capacity(input.len());
    let mut current = first;
    let mut count = 1usize;
    for (position, ch) in chars {
        if ch.is_ascii_digit() {
            return Err(Error::DigitSymbol {
                symbol: ch,
                position,
            });
        }
        if ch == current {
            count += 1;
        } else {
            push_run(&mut encoded, current, count);
            current = ch;
            count = 1;
        }
    }
    push_run(&mut encoded, current, count);

    if encoded.len() < input.len() {
        Ok(encoded)
    } else {
        warn!(
            "rle: encoded form ({} bytes) is not smaller than input ({} bytes), storing raw",
            encoded.len(),
            input.len()
        );
        Ok(input.to_string())
    }
}

fn push_run(out: &mut String, symbol: char, count: usize) {
    out.push(symbol);
    if count > 1 {
        out.push_str(&count.to_string());
    }
}

/// Expand an artifact produced by [`rle_compress`].
pub fn rle_decompress(artifact: &str) -> Result<String> {
    let mut output = String::with_capacity(artifact.len());
    let mut chars = artifact.char_indices().peekable();

    while let Some((position, symbol)) = chars.next() {
        if symbol.is_ascii_digit() {
            return Err(Error::malformed(format!(
                "run length at byte {position} has no symbol"
            )));
        }

        let start = chars.peek().map_or(artifact.len(), |&(i, _)| i);
        let mut end = start;
        while let Some(&(i, c)) = chars.peek() {
            if !c.is_ascii_digit() {
                break;
            }
            end = i + c.len_utf8();
            chars.next();
        }

        if start == end {
            output.push(symbol);
            continue;
        }
        let count: usize = artifact[start..end].parse().map_err(|_| {
            Error::malformed(format!("run length {} is too large", &artifact[start..end]))
        })?;
        if count < 2 {
            return Err(Error::malformed(format!(
                "run length {count} at byte {start} is below 2"
            )));
        }
        let within_limit = count
            .checked_mul(symbol.len_utf8())
            .and_then(|run| output.len().checked_add(run))
            .is_some_and(|len| len <= MAX_DECODED_LEN);
        if !within_limit {
            return Err(Error::malformed(format!(
                "run length {count} at byte {start} expands past {MAX_DECODED_LEN} bytes"
            )));
        }
        output.extend(std::iter::repeat(symbol).take(count));
    }
    Ok(output)
}

/// Run-length codec over UTF-8 text.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rle;

impl Compression for Rle {
    fn name(&self) -> &'static str {
        "rle-txt"
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let encoded = rle_compress(as_text(data)?)?;
        info!("rle: {} bytes -> {} bytes", data.len(), encoded.len());
        Ok(encoded.into_bytes())
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let text = as_text(data).map_err(|_| Error::malformed("artifact is not valid UTF-8"))?;
        let decoded = rle_decompress(text)?;
        info!("rle: {} bytes -> {} bytes", data.len(), decoded.len());
        Ok(decoded.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_runs() {
        let compressed = rle_compress("aaaabbbccd").unwrap();
        assert_eq!(compressed, "a4b3c2d");
        assert_eq!(rle_decompress(&compressed).unwrap(), "aaaabbbccd");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(rle_compress("").unwrap(), "");
        assert_eq!(rle_decompress("").unwrap(), "");
    }

    #[test]
    fn test_single_character() {
        assert_eq!(rle_compress("x").unwrap(), "x");
        assert_eq!(rle_decompress("x").unwrap(), "x");
    }

    #[test]
    fn test_long_run_uses_multi_digit_count() {
        let input = "z".repeat(1234);
        let compressed = rle_compress(&input).unwrap();
        assert_eq!(compressed, "z1234");
        assert_eq!(rle_decompress(&compressed).unwrap(), input);
    }

    #[test]
    fn test_fallback_keeps_raw_input() {
        assert_eq!(rle_compress("abcdef").unwrap(), "abcdef");
        // "a2b" is not strictly shorter than "aab"
        assert_eq!(rle_compress("aab").unwrap(), "aab");
        assert_eq!(rle_decompress("aab").unwrap(), "aab");
    }

    #[test]
    fn test_multibyte_symbols() {
        let input = "ééééé🦀🦀🦀 ";
        let compressed = rle_compress(input).unwrap();
        assert_eq!(compressed, "é5🦀3 ");
        assert_eq!(rle_decompress(&compressed).unwrap(), input);
    }

    #[test]
    fn test_digit_symbols_rejected() {
        assert!(matches!(
            rle_compress("aaa1"),
            Err(Error::DigitSymbol {
                symbol: '1',
                position: 3
            })
        ));
        assert!(matches!(
            rle_compress("7"),
            Err(Error::DigitSymbol { position: 0, .. })
        ));
    }

    #[test]
    fn test_malformed_artifacts() {
        assert!(matches!(
            rle_decompress("5a"),
            Err(Error::MalformedArtifact(_))
        ));
        assert!(matches!(
            rle_decompress("a1"),
            Err(Error::MalformedArtifact(_))
        ));
        assert!(matches!(
            rle_decompress("a99999999999999999999999"),
            Err(Error::MalformedArtifact(_))
        ));
    }

    #[test]
    fn test_oversized_runs_are_rejected() {
        assert!(matches!(
            rle_decompress("a18446744073709551615"),
            Err(Error::MalformedArtifact(_))
        ));
        assert!(matches!(
            rle_decompress("a999999999999"),
            Err(Error::MalformedArtifact(_))
        ));
        // Two-byte symbol: half the limit in symbols is one byte too many.
        let artifact = format!("xé{}", MAX_DECODED_LEN / 2);
        assert!(matches!(
            rle_decompress(&artifact),
            Err(Error::MalformedArtifact(_))
        ));
    }

    #[test]
    fn test_digit_position_is_byte_offset() {
        assert!(matches!(
            rle_compress("éé4"),
            Err(Error::DigitSymbol {
                symbol: '4',
                position: 4
            })
        ));
    }
}
