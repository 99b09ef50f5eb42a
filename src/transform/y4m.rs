//! Minimal YUV4MPEG2 stream reading and grayscale writing.
//!
//! Only the luma plane of each frame is kept; chroma planes are skipped on
//! read and the writer always emits a `Cmono` stream.

use std::io::{self, BufRead, Read, Write};

use ndarray::Array2;

use crate::error::{Error, Result};

const STREAM_MAGIC: &str = "YUV4MPEG2";
const FRAME_MAGIC: &str = "FRAME";
const MAX_HEADER_LEN: u64 = 1024;

/// Largest frame, luma and chroma together, a stream may declare.
pub const MAX_FRAME_LEN: usize = 1 << 28;

/// A grayscale frame, indexed `[row, column]`.
pub type GrayFrame = Array2<u8>;

/// Chroma layout of a stream, which decides how many bytes follow the luma plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Colorspace {
    Mono,
    C420,
    C422,
    C444,
    C444Alpha,
}

impl Colorspace {
    fn parse(tag: &str) -> Result<Self> {
        match tag {
            "mono" => Ok(Colorspace::Mono),
            t if t.starts_with("420") => Ok(Colorspace::C420),
            "422" => Ok(Colorspace::C422),
            "444" => Ok(Colorspace::C444),
            "444alpha" => Ok(Colorspace::C444Alpha),
            other => Err(Error::InvalidInput(format!(
                "unsupported y4m colorspace C{other}"
            ))),
        }
    }

    /// Bytes stored after the luma plane of a `width` × `height` frame.
    fn trailing_len(self, width: usize, height: usize) -> Option<usize> {
        let half_width = width.div_ceil(2);
        match self {
            Colorspace::Mono => Some(0),
            Colorspace::C420 => half_width.checked_mul(height.div_ceil(2))?.checked_mul(2),
            Colorspace::C422 => half_width.checked_mul(height)?.checked_mul(2),
            Colorspace::C444 => width.checked_mul(height)?.checked_mul(2),
            Colorspace::C444Alpha => width.checked_mul(height)?.checked_mul(3),
        }
    }
}

/// Parsed stream header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHeader {
    pub width: usize,
    pub height: usize,
    pub colorspace: Colorspace,
    /// Remaining tags (frame rate, interlacing, aspect, extensions) kept verbatim.
    pub tags: Vec<String>,
}

impl StreamHeader {
    /// A grayscale header with the given geometry and frame rate.
    pub fn mono(width: usize, height: usize, fps: u32) -> Self {
        StreamHeader {
            width,
            height,
            colorspace: Colorspace::Mono,
            tags: vec![format!("F{fps}:1"), "Ip".to_string(), "A1:1".to_string()],
        }
    }

    fn parse(line: &str) -> Result<Self> {
        let mut fields = line.split_ascii_whitespace();
        if fields.next() != Some(STREAM_MAGIC) {
            return Err(Error::InvalidInput("source is not a YUV4MPEG2 stream".into()));
        }

        let mut width = None;
        let mut height = None;
        let mut colorspace = Colorspace::C420;
        let mut tags = Vec::new();
        for field in fields {
            let mut chars = field.chars();
            let key = chars.next();
            let value = chars.as_str();
            match key {
                Some('W') => width = Some(parse_dimension(value)?),
                Some('H') => height = Some(parse_dimension(value)?),
                Some('C') => colorspace = Colorspace::parse(value)?,
                _ => tags.push(field.to_string()),
            }
        }

        let header = match (width, height) {
            (Some(width), Some(height)) => StreamHeader {
                width,
                height,
                colorspace,
                tags,
            },
            _ => {
                return Err(Error::InvalidInput(
                    "y4m header is missing its width or height".into(),
                ))
            }
        };
        header.plane_lens()?;
        Ok(header)
    }

    /// Luma plane and chroma trailer sizes of one frame, in bytes.
    fn plane_lens(&self) -> Result<(usize, usize)> {
        let luma = self.width.checked_mul(self.height);
        let trailing = self.colorspace.trailing_len(self.width, self.height);
        match (luma, trailing) {
            (Some(luma), Some(trailing))
                if luma
                    .checked_add(trailing)
                    .is_some_and(|total| total <= MAX_FRAME_LEN) =>
            {
                Ok((luma, trailing))
            }
            _ => Err(Error::InvalidInput(format!(
                "y4m frame of {}x{} exceeds {MAX_FRAME_LEN} bytes",
                self.width, self.height
            ))),
        }
    }

    /// Frame rate as `(numerator, denominator)`, when the stream declares one.
    pub fn frame_rate(&self) -> Option<(u32, u32)> {
        let rate = self.tags.iter().find_map(|t| t.strip_prefix('F'))?;
        let (num, den) = rate.split_once(':')?;
        Some((num.parse().ok()?, den.parse().ok()?))
    }
}

fn parse_dimension(value: &str) -> Result<usize> {
    match value.parse::<usize>() {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(Error::InvalidInput(format!("invalid y4m dimension {value:?}"))),
    }
}

/// Reads grayscale frames from a YUV4MPEG2 stream.
pub struct Y4mReader<R> {
    inner: R,
    header: StreamHeader,
    luma_len: usize,
    trailing_len: usize,
    line: Vec<u8>,
}

impl<R: BufRead> Y4mReader<R> {
    pub fn new(mut inner: R) -> Result<Self> {
        let mut line = Vec::new();
        (&mut inner)
            .take(MAX_HEADER_LEN)
            .read_until(b'\n', &mut line)?;
        if line.last() != Some(&b'\n') {
            return Err(Error::InvalidInput("missing or oversized y4m header".into()));
        }
        let text = std::str::from_utf8(&line)
            .map_err(|_| Error::InvalidInput("y4m header is not ASCII".into()))?;
        let header = StreamHeader::parse(text.trim_end())?;
        let (luma_len, trailing_len) = header.plane_lens()?;
        Ok(Y4mReader {
            inner,
            header,
            luma_len,
            trailing_len,
            line,
        })
    }

    pub fn header(&self) -> &StreamHeader {
        &self.header
    }

    /// Next frame's luma plane, or `None` at a clean end of stream.
    pub fn next_frame(&mut self) -> Result<Option<GrayFrame>> {
        self.line.clear();
        let read = (&mut self.inner)
            .take(MAX_HEADER_LEN)
            .read_until(b'\n', &mut self.line)?;
        if read == 0 {
            return Ok(None);
        }
        if !self.line.starts_with(FRAME_MAGIC.as_bytes()) || self.line.last() != Some(&b'\n') {
            return Err(Error::InvalidInput("malformed y4m frame header".into()));
        }

        let mut luma = vec![0u8; self.luma_len];
        self.inner.read_exact(&mut luma).map_err(truncated)?;

        let trailing = self.trailing_len as u64;
        let skipped = io::copy(&mut (&mut self.inner).take(trailing), &mut io::sink())?;
        if skipped != trailing {
            return Err(Error::InvalidInput("truncated y4m frame".into()));
        }

        Array2::from_shape_vec((self.header.height, self.header.width), luma)
            .map(Some)
            .map_err(|e| Error::InvalidInput(format!("bad frame shape: {e}")))
    }
}

fn truncated(err: io::Error) -> Error {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        Error::InvalidInput("truncated y4m frame".into())
    } else {
        Error::Io(err)
    }
}

/// Writes grayscale frames as a `Cmono` YUV4MPEG2 stream.
pub struct Y4mWriter<W: Write> {
    inner: W,
    width: usize,
    height: usize,
}

impl<W: Write> Y4mWriter<W> {
    /// Write the stream header, keeping the source's geometry and tags.
    pub fn new(mut inner: W, source: &StreamHeader) -> Result<Self> {
        write!(inner, "{STREAM_MAGIC} W{} H{}", source.width, source.height)?;
        for tag in &source.tags {
            write!(inner, " {tag}")?;
        }
        writeln!(inner, " Cmono")?;
        Ok(Y4mWriter {
            inner,
            width: source.width,
            height: source.height,
        })
    }

    pub fn write_frame(&mut self, frame: &GrayFrame) -> Result<()> {
        if frame.dim() != (self.height, self.width) {
            return Err(Error::InvalidInput(format!(
                "frame is {:?}, stream is {}x{}",
                frame.dim(),
                self.height,
                self.width
            )));
        }
        writeln!(self.inner, "{FRAME_MAGIC}")?;
        match frame.as_slice() {
            Some(samples) => self.inner.write_all(samples)?,
            None => {
                let samples: Vec<u8> = frame.iter().copied().collect();
                self.inner.write_all(&samples)?;
            }
        }
        Ok(())
    }

    /// Flush and hand back the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}
