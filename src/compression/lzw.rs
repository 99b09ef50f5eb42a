use std::collections::HashMap;

use log::{debug, info};

use crate::compression::{as_text, Compression, Result};
use crate::error::Error;

/// Number of bytes used for each emitted code (big-endian).
pub const CODE_WIDTH: usize = 6;

/// Number of single-symbol phrases the dictionary starts with.
///
/// Symbols are UTF-16 code units, so the initial table covers the whole alphabet.
pub const INITIAL_CODES: u64 = 1 << 16;

const MAX_CODE: u64 = (1 << (8 * CODE_WIDTH)) - 1;

/// Runs the LZW scan over `input`, reporting every dictionary insertion to `on_insert`.
fn encode_codes<F>(input: &[u16], mut on_insert: F) -> Result<Vec<u64>>
where
    F: FnMut(u64, &[u16]),
{
    // Phrases beyond the initial table are keyed by (code of prefix, last unit).
    let mut dict: HashMap<(u64, u16), u64> = HashMap::new();
    let mut next_code = INITIAL_CODES;
    let mut codes = Vec::new();

    let Some((&first, rest)) = input.split_first() else {
        return Ok(codes);
    };
    let mut w = u64::from(first);
    let mut phrase = vec![first];

    for &unit in rest {
        if let Some(&code) = dict.get(&(w, unit)) {
            w = code;
            phrase.push(unit);
            continue;
        }
        codes.push(w);
        if next_code > MAX_CODE {
            return Err(Error::InvalidInput(format!(
                "input needs more than {} dictionary codes",
                MAX_CODE + 1
            )));
        }
        dict.insert((w, unit), next_code);
        phrase.push(unit);
        on_insert(next_code, &phrase);
        next_code += 1;

        w = u64::from(unit);
        phrase.clear();
        phrase.push(unit);
    }
    codes.push(w);

    debug!("lzw: dictionary grew by {} entries", next_code - INITIAL_CODES);
    Ok(codes)
}

/// Inverse of [`encode_codes`], reporting every dictionary insertion to `on_insert`.
fn decode_codes<F>(codes: &[u64], mut on_insert: F) -> Result<Vec<u16>>
where
    F: FnMut(u64, &[u16]),
{
    // Entries for codes >= INITIAL_CODES; lower codes are the unit itself.
    let mut dict: Vec<Vec<u16>> = Vec::new();
    let mut result = Vec::new();

    let lookup = |dict: &[Vec<u16>], code: u64| -> Option<Vec<u16>> {
        if code < INITIAL_CODES {
            Some(vec![code as u16])
        } else {
            dict.get((code - INITIAL_CODES) as usize).cloned()
        }
    };

    let Some((&first, rest)) = codes.split_first() else {
        return Ok(result);
    };
    let mut w = lookup(&dict, first).ok_or_else(|| {
        Error::malformed(format!("first code {first} is not a single-symbol phrase"))
    })?;
    result.extend_from_slice(&w);

    for &code in rest {
        let next_code = INITIAL_CODES + dict.len() as u64;
        let entry = match code.cmp(&next_code) {
            std::cmp::Ordering::Less => lookup(&dict, code)
                .ok_or_else(|| Error::malformed(format!("code {code} was never assigned")))?,
            std::cmp::Ordering::Equal => {
                // The phrase being defined by this very step.
                let mut entry = w.clone();
                entry.push(w[0]);
                entry
            }
            std::cmp::Ordering::Greater => {
                return Err(Error::malformed(format!(
                    "code {code} requested before it was assigned (next is {next_code})"
                )));
            }
        };
        result.extend_from_slice(&entry);

        let mut new_entry = w;
        new_entry.push(entry[0]);
        on_insert(next_code, &new_entry);
        dict.push(new_entry);
        w = entry;
    }
    Ok(result)
}

fn pack_codes(codes: &[u64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(codes.len() * CODE_WIDTH);
    for &code in codes {
        out.extend_from_slice(&code.to_be_bytes()[8 - CODE_WIDTH..]);
    }
    out
}

fn unpack_codes(artifact: &[u8]) -> Result<Vec<u64>> {
    if artifact.len() % CODE_WIDTH != 0 {
        return Err(Error::malformed(format!(
            "artifact length {} is not a multiple of {CODE_WIDTH}",
            artifact.len()
        )));
    }
    Ok(artifact
        .chunks_exact(CODE_WIDTH)
        .map(|chunk| {
            chunk
                .iter()
                .fold(0u64, |acc, &byte| (acc << 8) | u64::from(byte))
        })
        .collect())
}

/// Compresses `input` with LZW into a flat sequence of 6-byte big-endian codes.
///
/// The dictionary starts with every UTF-16 code unit mapped to its own value
/// and gains one phrase per emitted code, starting at [`INITIAL_CODES`].
/// Empty input produces an empty artifact.
///
/// # Example
///
/// ```
/// use mediapress::compression::lzw::{lzw_compress, lzw_decompress};
///
/// let artifact = lzw_compress("TOBEORNOTTOBE").unwrap();
/// assert_eq!(artifact.len() % 6, 0);
/// assert_eq!(lzw_decompress(&artifact).unwrap(), "TOBEORNOTTOBE");
/// ```
pub fn lzw_compress(input: &str) -> Result<Vec<u8>> {
    let units: Vec<u16> = input.encode_utf16().collect();
    let codes = encode_codes(&units, |_, _| {})?;
    Ok(pack_codes(&codes))
}

/// Decompresses an artifact produced by [`lzw_compress`].
///
/// The decoder rebuilds the dictionary in lockstep with the encoder; the one
/// code that may be used before the decoder has stored it is the entry being
/// defined by the current step, which is always `previous + first(previous)`.
pub fn lzw_decompress(artifact: &[u8]) -> Result<String> {
    let codes = unpack_codes(artifact)?;
    let units = decode_codes(&codes, |_, _| {})?;
    String::from_utf16(&units)
        .map_err(|_| Error::malformed("decoded code units are not valid UTF-16"))
}

/// LZW codec over UTF-8 text.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lzw;

impl Compression for Lzw {
    fn name(&self) -> &'static str {
        "lzw-txt"
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let artifact = lzw_compress(as_text(data)?)?;
        info!("lzw: {} bytes -> {} bytes", data.len(), artifact.len());
        Ok(artifact)
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let text = lzw_decompress(data)?;
        info!("lzw: {} bytes -> {} bytes", data.len(), text.len());
        Ok(text.into_bytes())
    }
}

/// Dictionary insertions made while encoding `input`, in step order.
#[doc(hidden)]
pub fn encoder_growth(input: &str) -> Result<Vec<(u64, Vec<u16>)>> {
    let units: Vec<u16> = input.encode_utf16().collect();
    let mut growth = Vec::new();
    encode_codes(&units, |code, phrase| growth.push((code, phrase.to_vec())))?;
    Ok(growth)
}

/// Dictionary insertions made while decoding `artifact`, in step order.
#[doc(hidden)]
pub fn decoder_growth(artifact: &[u8]) -> Result<Vec<(u64, Vec<u16>)>> {
    let codes = unpack_codes(artifact)?;
    let mut growth = Vec::new();
    decode_codes(&codes, |code, phrase| growth.push((code, phrase.to_vec())))?;
    Ok(growth)
}
