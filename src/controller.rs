//! Codec selection and file-level workflow.
//!
//! The controller maps a codec name and a mode to a destination file, runs the
//! codec over the whole source file and reports the size of what it wrote.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::{debug, info};

use crate::compression::{Compression, Huffman, Lzw, Rle};
use crate::error::{Error, Result};
use crate::transform::image::{DctImage, ImageOptions, DEFAULT_MAX_DIMENSION};
use crate::transform::video::{default_workers, DctVideo, VideoOptions, DEFAULT_BATCH_SIZE};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// The codecs a user can pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecKind {
    HuffmanText,
    LzwText,
    RleText,
    DctImage,
    DctVideo,
}

impl CodecKind {
    pub const ALL: [CodecKind; 5] = [
        CodecKind::HuffmanText,
        CodecKind::LzwText,
        CodecKind::RleText,
        CodecKind::DctImage,
        CodecKind::DctVideo,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CodecKind::HuffmanText => "huffman-txt",
            CodecKind::LzwText => "lzw-txt",
            CodecKind::RleText => "rle-txt",
            CodecKind::DctImage => "dct-image",
            CodecKind::DctVideo => "dct-video",
        }
    }

    /// Extension of the compressed artifact.
    pub fn extension(self) -> &'static str {
        match self {
            CodecKind::HuffmanText | CodecKind::LzwText | CodecKind::RleText => "txt",
            CodecKind::DctImage => "dct",
            CodecKind::DctVideo => "y4m",
        }
    }

    /// Build the codec with the knobs from `config`.
    pub fn codec(self, config: &ControllerConfig) -> Result<Box<dyn Compression>> {
        Ok(match self {
            CodecKind::HuffmanText => Box::new(Huffman),
            CodecKind::LzwText => Box::new(Lzw),
            CodecKind::RleText => Box::new(Rle),
            CodecKind::DctImage => Box::new(DctImage::new(config.image_options())?),
            CodecKind::DctVideo => Box::new(DctVideo::new(config.video_options())?),
        })
    }
}

impl fmt::Display for CodecKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CodecKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        CodecKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| Error::UnknownCodec(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Compress,
    Decompress,
}

impl Mode {
    fn prefix(self) -> &'static str {
        match self {
            Mode::Compress => "comp",
            Mode::Decompress => "decomp",
        }
    }
}

/// Settings shared by every controller run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    pub output_dir: PathBuf,
    pub image_quality: u8,
    pub max_dimension: u32,
    pub video_quality: u8,
    pub batch_size: usize,
    pub workers: usize,
    /// Also write the reconstructed image next to a DCT image artifact.
    pub preview: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            output_dir: PathBuf::from("."),
            image_quality: 50,
            max_dimension: DEFAULT_MAX_DIMENSION,
            video_quality: 50,
            batch_size: DEFAULT_BATCH_SIZE,
            workers: default_workers(),
            preview: true,
        }
    }
}

impl ControllerConfig {
    pub fn image_options(&self) -> ImageOptions {
        ImageOptions {
            quality: self.image_quality,
            max_dimension: self.max_dimension,
        }
    }

    pub fn video_options(&self) -> VideoOptions {
        VideoOptions {
            quality: self.video_quality,
            batch_size: self.batch_size,
            workers: self.workers,
        }
    }
}

/// What a run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub destination: PathBuf,
    /// Size in bytes of the file written to `destination`.
    pub artifact_size: u64,
    /// Reconstructed image written alongside a DCT image artifact.
    pub preview: Option<PathBuf>,
}

impl Outcome {
    pub fn size_mb(&self) -> f64 {
        self.artifact_size as f64 / BYTES_PER_MB
    }
}

#[derive(Debug, Clone, Default)]
pub struct Controller {
    config: ControllerConfig,
}

impl Controller {
    pub fn new(config: ControllerConfig) -> Self {
        Controller { config }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Where a run of `kind` in `mode` writes its output.
    pub fn destination(&self, kind: CodecKind, mode: Mode) -> PathBuf {
        let extension = match mode {
            Mode::Compress => kind.extension(),
            Mode::Decompress => "txt",
        };
        self.config
            .output_dir
            .join(format!("{}-{kind}-output.{extension}", mode.prefix()))
    }

    fn preview_path(&self, kind: CodecKind) -> PathBuf {
        self.config.output_dir.join(format!("comp-{kind}-preview.png"))
    }

    /// Run `kind` over the file at `source` and write the result.
    pub fn run(&self, kind: CodecKind, mode: Mode, source: &Path) -> Result<Outcome> {
        let codec = kind.codec(&self.config)?;
        if mode == Mode::Decompress && !codec.supports_decompression() {
            return Err(Error::UnsupportedOperation {
                codec: codec.name(),
                operation: "decompression",
            });
        }

        let data = fs::read(source).map_err(|_| Error::InputNotFound {
            path: source.to_path_buf(),
        })?;
        if data.is_empty() {
            return Err(Error::EmptyInput);
        }
        debug!("{kind}: read {} bytes from {}", data.len(), source.display());

        let output = match mode {
            Mode::Compress => codec.compress(&data)?,
            Mode::Decompress => codec.decompress(&data)?,
        };
        if output.is_empty() {
            return Err(match mode {
                Mode::Compress => {
                    Error::InvalidInput(format!("{kind} produced an empty artifact"))
                }
                Mode::Decompress => Error::malformed(format!(
                    "{} decodes to no data",
                    source.display()
                )),
            });
        }

        fs::create_dir_all(&self.config.output_dir)?;
        let destination = self.destination(kind, mode);
        fs::write(&destination, &output)?;
        let artifact_size = fs::metadata(&destination)?.len();

        let preview = if kind == CodecKind::DctImage && mode == Mode::Compress && self.config.preview
        {
            let path = self.preview_path(kind);
            DctImage::new(self.config.image_options())?.reconstruct_to(&output, &path)?;
            Some(path)
        } else {
            None
        };

        info!(
            "{kind}: {} bytes -> {artifact_size} bytes at {}",
            data.len(),
            destination.display()
        );
        Ok(Outcome {
            destination,
            artifact_size,
            preview,
        })
    }
}

/// Run the codec named `codec_name` with the default configuration.
pub fn run(codec_name: &str, mode: Mode, source: &Path) -> Result<Outcome> {
    Controller::default().run(codec_name.parse()?, mode, source)
}
