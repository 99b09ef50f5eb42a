//! Huffman entropy coding over the characters of a text.
//!
//! The artifact is self-contained:
//!
//! ```text
//! [u16 BE entry count]
//! [entry count lines of "<symbol> <code>\n"]   newline symbol written as `\n`
//! [u64 BE symbol count]
//! [packed bitstream, MSB first, zero padded to a byte boundary]
//! ```
//!
//! The explicit symbol count lets the decoder stop before the padding bits,
//! which may otherwise spell a valid code.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use bitvec::prelude::*;
use log::{debug, info};

use crate::compression::{as_text, Compression, Result};
use crate::error::Error;

/// Represents a node in the Huffman tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HuffmanNode {
    /// A leaf node contains a symbol and its frequency.
    Leaf { symbol: char, freq: usize },
    /// An internal node with left and right children and combined frequency.
    Internal {
        freq: usize,
        left: Box<HuffmanNode>,
        right: Box<HuffmanNode>,
    },
}

impl HuffmanNode {
    /// Returns the frequency of the node.
    pub fn freq(&self) -> usize {
        match self {
            HuffmanNode::Leaf { freq, .. } => *freq,
            HuffmanNode::Internal { freq, .. } => *freq,
        }
    }

    /// Number of edges on the longest root-to-leaf path.
    pub fn height(&self) -> usize {
        match self {
            HuffmanNode::Leaf { .. } => 0,
            HuffmanNode::Internal { left, right, .. } => 1 + left.height().max(right.height()),
        }
    }
}

/// Heap entry ordering nodes by weight, then by creation order.
/// We want the lightest, oldest node to have the highest priority.
#[derive(Debug)]
struct HeapEntry {
    order: usize,
    node: Box<HuffmanNode>,
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .node
            .freq()
            .cmp(&self.node.freq())
            .then_with(|| other.order.cmp(&self.order))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

/// Mapping from symbol to its prefix-free bit string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Codebook {
    codes: HashMap<char, String>,
}

impl Codebook {
    /// Code assigned to `symbol`, as a string of `'0'` and `'1'`.
    pub fn get(&self, symbol: char) -> Option<&str> {
        self.codes.get(&symbol).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (char, &str)> {
        self.codes.iter().map(|(&symbol, code)| (symbol, code.as_str()))
    }

    /// Length of the longest code in the table.
    pub fn max_code_len(&self) -> usize {
        self.codes.values().map(String::len).max().unwrap_or(0)
    }

    /// True when no code is a prefix of another code in the table.
    pub fn is_prefix_free(&self) -> bool {
        let mut codes: Vec<&str> = self.codes.values().map(String::as_str).collect();
        codes.sort_unstable();
        // A prefix sorts immediately before some string it prefixes.
        codes.windows(2).all(|pair| !pair[1].starts_with(pair[0]))
    }

    /// Append the textual codebook header to `out`.
    fn write_to(&self, out: &mut Vec<u8>) -> Result<()> {
        let count = u16::try_from(self.codes.len()).map_err(|_| {
            Error::InvalidInput(format!(
                "{} distinct symbols exceed the codebook limit of {}",
                self.codes.len(),
                u16::MAX
            ))
        })?;
        out.extend_from_slice(&count.to_be_bytes());

        let mut entries: Vec<(&char, &String)> = self.codes.iter().collect();
        entries.sort_unstable();
        for (&symbol, code) in entries {
            match symbol {
                '\n' => out.extend_from_slice(b"\\n"),
                other => {
                    let mut buf = [0u8; 4];
                    out.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
                }
            }
            out.push(b' ');
            out.extend_from_slice(code.as_bytes());
            out.push(b'\n');
        }
        Ok(())
    }

    /// Parse a codebook header, returning it with the number of bytes consumed.
    fn read_from(data: &[u8]) -> Result<(Self, usize)> {
        let header = data
            .get(..2)
            .ok_or_else(|| Error::malformed("missing codebook entry count"))?;
        let count = u16::from_be_bytes([header[0], header[1]]) as usize;

        let mut pos = 2;
        let mut codes = HashMap::with_capacity(count);
        for _ in 0..count {
            let rest = &data[pos..];
            let end = rest
                .iter()
                .position(|&b| b == b'\n')
                .ok_or_else(|| Error::malformed("truncated codebook"))?;
            let line = std::str::from_utf8(&rest[..end])
                .map_err(|_| Error::malformed("codebook entry is not valid UTF-8"))?;
            pos += end + 1;

            let (symbol, code) = parse_entry(line)?;
            if codes.insert(symbol, code.to_string()).is_some() {
                return Err(Error::malformed(format!(
                    "symbol {symbol:?} appears twice in codebook"
                )));
            }
        }

        let codebook = Codebook { codes };
        if !codebook.is_prefix_free() {
            return Err(Error::malformed("codebook is not prefix-free"));
        }
        Ok((codebook, pos))
    }
}

fn parse_entry(line: &str) -> Result<(char, &str)> {
    let (symbol, rest) = match line.strip_prefix("\\n") {
        Some(rest) if rest.starts_with(' ') => ('\n', rest),
        _ => {
            let mut chars = line.chars();
            let symbol = chars
                .next()
                .ok_or_else(|| Error::malformed("empty codebook entry"))?;
            (symbol, chars.as_str())
        }
    };
    let code = rest
        .strip_prefix(' ')
        .ok_or_else(|| Error::malformed(format!("codebook entry {line:?} has no separator")))?;
    if code.is_empty() || !code.bytes().all(|b| b == b'0' || b == b'1') {
        return Err(Error::malformed(format!(
            "codebook entry {line:?} has an invalid code"
        )));
    }
    Ok((symbol, code))
}

/// Build the frequency table of `input`, listing symbols in order of first appearance.
pub fn build_frequency_table(input: &str) -> Vec<(char, usize)> {
    let mut index: HashMap<char, usize> = HashMap::new();
    let mut table: Vec<(char, usize)> = Vec::new();
    for ch in input.chars() {
        match index.get(&ch) {
            Some(&i) => table[i].1 += 1,
            None => {
                index.insert(ch, table.len());
                table.push((ch, 1));
            }
        }
    }
    table
}

/// Build the Huffman tree given a frequency table.
/// Returns `None` if the frequency table is empty.
///
/// Ties between equal weights are broken by creation order, so the same
/// table always yields the same tree.
pub fn build_huffman_tree(freq_table: &[(char, usize)]) -> Option<Box<HuffmanNode>> {
    let mut heap = BinaryHeap::with_capacity(freq_table.len());
    for (order, &(symbol, freq)) in freq_table.iter().enumerate() {
        heap.push(HeapEntry {
            order,
            node: Box::new(HuffmanNode::Leaf { symbol, freq }),
        });
    }

    let mut next_order = freq_table.len();
    while heap.len() > 1 {
        let (Some(left), Some(right)) = (heap.pop(), heap.pop()) else {
            break;
        };
        let freq = left.node.freq() + right.node.freq();
        heap.push(HeapEntry {
            order: next_order,
            node: Box::new(HuffmanNode::Internal {
                freq,
                left: left.node,
                right: right.node,
            }),
        });
        next_order += 1;
    }
    heap.pop().map(|entry| entry.node)
}

/// Walk the tree and build a fresh code table.
///
/// If the tree consists of a single leaf (i.e. one unique symbol), the code "0" is assigned.
pub fn build_code_table(node: &HuffmanNode) -> Codebook {
    let mut codes = HashMap::new();
    build_code_table_helper(node, String::new(), &mut codes);
    Codebook { codes }
}

fn build_code_table_helper(node: &HuffmanNode, prefix: String, codes: &mut HashMap<char, String>) {
    match node {
        HuffmanNode::Leaf { symbol, .. } => {
            let code = if prefix.is_empty() {
                "0".to_string()
            } else {
                prefix
            };
            codes.insert(*symbol, code);
        }
        HuffmanNode::Internal { left, right, .. } => {
            let mut left_prefix = prefix.clone();
            left_prefix.push('0');
            build_code_table_helper(left, left_prefix, codes);
            let mut right_prefix = prefix;
            right_prefix.push('1');
            build_code_table_helper(right, right_prefix, codes);
        }
    }
}

/// Encode `input`, returning the codebook used and the complete artifact.
pub fn huffman_encode(input: &str) -> Result<(Codebook, Vec<u8>)> {
    let freq_table = build_frequency_table(input);
    let codebook = match build_huffman_tree(&freq_table) {
        Some(tree) => {
            debug!(
                "huffman: tree over {} symbols has height {}",
                freq_table.len(),
                tree.height()
            );
            build_code_table(&tree)
        }
        None => Codebook::default(),
    };

    let mut bits: BitVec<u8, Msb0> = BitVec::new();
    let mut symbol_count = 0u64;
    for ch in input.chars() {
        let code = codebook
            .get(ch)
            .ok_or_else(|| Error::InvalidInput(format!("symbol {ch:?} missing from codebook")))?;
        bits.extend(code.bytes().map(|b| b == b'1'));
        symbol_count += 1;
    }
    while bits.len() % 8 != 0 {
        bits.push(false);
    }

    let mut artifact = Vec::new();
    codebook.write_to(&mut artifact)?;
    artifact.extend_from_slice(&symbol_count.to_be_bytes());
    artifact.extend_from_slice(bits.as_raw_slice());
    Ok((codebook, artifact))
}

/// Decode an artifact produced by [`huffman_encode`].
pub fn huffman_decode(artifact: &[u8]) -> Result<String> {
    let (codebook, pos) = Codebook::read_from(artifact)?;
    let count_bytes: [u8; 8] = artifact
        .get(pos..pos + 8)
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or_else(|| Error::malformed("missing symbol count"))?;
    let symbol_count = u64::from_be_bytes(count_bytes);
    let payload = &artifact[pos + 8..];

    let lookup: HashMap<&str, char> = codebook.iter().map(|(symbol, code)| (code, symbol)).collect();
    let longest = codebook.max_code_len();

    let mut output = String::with_capacity(payload.len());
    let mut candidate = String::with_capacity(longest);
    let mut emitted = 0u64;
    for bit in payload.view_bits::<Msb0>().iter().by_vals() {
        if emitted == symbol_count {
            break;
        }
        candidate.push(if bit { '1' } else { '0' });
        if let Some(&symbol) = lookup.get(candidate.as_str()) {
            output.push(symbol);
            emitted += 1;
            candidate.clear();
        } else if candidate.len() >= longest {
            return Err(Error::malformed(format!(
                "bit sequence {candidate} does not resolve to any code"
            )));
        }
    }

    if emitted < symbol_count {
        return Err(Error::malformed(format!(
            "bitstream exhausted after {emitted} of {symbol_count} symbols"
        )));
    }
    Ok(output)
}

/// Huffman codec over UTF-8 text.
#[derive(Debug, Clone, Copy, Default)]
pub struct Huffman;

impl Compression for Huffman {
    fn name(&self) -> &'static str {
        "huffman-txt"
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let text = as_text(data)?;
        let (codebook, artifact) = huffman_encode(text)?;
        info!(
            "huffman: {} bytes -> {} bytes ({} codebook entries)",
            data.len(),
            artifact.len(),
            codebook.len()
        );
        Ok(artifact)
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let text = huffman_decode(data)?;
        info!("huffman: {} bytes -> {} bytes", data.len(), text.len());
        Ok(text.into_bytes())
    }
}
