//! Lossy DCT re-encoding of grayscale video.
//!
//! Frames flow through three stages connected by bounded channels:
//!
//! ```text
//! reader thread --batches--> compression stage (rayon pool) --ordered batches--> writer
//! ```
//!
//! The reader groups frames into fixed-size batches, the compression stage
//! compresses the frames of one batch in parallel and collects them back in
//! their original order, and the writer checks batch sequence numbers before
//! writing. Each channel holds at most one batch, which bounds the number of
//! frames in flight.

use std::io::{BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam::channel::{bounded, Receiver, Sender};
use log::{debug, info, warn};
use ndarray::ArrayView2;
use rayon::prelude::*;
use rayon::ThreadPool;

use crate::compression::Compression;
use crate::error::{Error, Result};
use crate::transform::blocks::{merge_blocks, split_into_blocks, to_samples};
use crate::transform::dct::{forward, inverse};
use crate::transform::quantize::QuantizationMatrix;
use crate::transform::y4m::{GrayFrame, Y4mReader, Y4mWriter};

/// Default quality factor for video frames.
pub const DEFAULT_QUALITY: u8 = 50;

/// Default number of frames per batch.
pub const DEFAULT_BATCH_SIZE: usize = 64;

/// Largest accepted batch size.
pub const MAX_BATCH_SIZE: usize = 4096;

/// Largest accepted worker count.
pub const MAX_WORKERS: usize = 1024;

/// Number of worker threads matching the available hardware parallelism.
pub fn default_workers() -> usize {
    thread::available_parallelism().map_or(1, |n| n.get())
}

/// Options for [`DctVideo`] and [`compress_video`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoOptions {
    pub quality: u8,
    pub batch_size: usize,
    pub workers: usize,
}

impl Default for VideoOptions {
    fn default() -> Self {
        VideoOptions {
            quality: DEFAULT_QUALITY,
            batch_size: DEFAULT_BATCH_SIZE,
            workers: default_workers(),
        }
    }
}

impl VideoOptions {
    fn validate(&self) -> Result<QuantizationMatrix> {
        if !(1..=MAX_BATCH_SIZE).contains(&self.batch_size) {
            return Err(Error::InvalidInput(format!(
                "batch size {} is outside 1..={MAX_BATCH_SIZE}",
                self.batch_size
            )));
        }
        if !(1..=MAX_WORKERS).contains(&self.workers) {
            return Err(Error::InvalidInput(format!(
                "worker count {} is outside 1..={MAX_WORKERS}",
                self.workers
            )));
        }
        QuantizationMatrix::with_quality(self.quality)
    }
}

/// Shared flag that stops a running encode from submitting further batches.
///
/// Batches already handed to the worker pool still complete and are written.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What a video encode did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoSummary {
    pub frames: usize,
    pub batches: usize,
    pub cancelled: bool,
}

#[derive(Debug)]
struct FrameBatch {
    index: usize,
    frames: Vec<GrayFrame>,
}

/// Transform, quantize, dequantize and inverse transform every block of one frame.
pub fn compress_frame(frame: ArrayView2<'_, u8>, matrix: &QuantizationMatrix) -> Result<GrayFrame> {
    let (height, width) = frame.dim();
    let blocks: Vec<_> = split_into_blocks(frame)
        .iter()
        .map(|block| inverse(&matrix.dequantize(&matrix.quantize(&forward(block)))))
        .collect();
    Ok(to_samples(&merge_blocks(&blocks, height, width)?))
}

fn compress_batch(pool: &ThreadPool, batch: FrameBatch, matrix: &QuantizationMatrix) -> Result<FrameBatch> {
    let frames = pool.install(|| {
        batch
            .frames
            .par_iter()
            .map(|frame| compress_frame(frame.view(), matrix))
            .collect::<Result<Vec<_>>>()
    })?;
    Ok(FrameBatch {
        index: batch.index,
        frames,
    })
}

/// Read frames into batches and submit them. Returns whether the read was cancelled.
fn submit_batches<R: BufRead>(
    mut reader: Y4mReader<R>,
    batch_size: usize,
    cancel: &CancelFlag,
    submit: Sender<FrameBatch>,
) -> Result<bool> {
    for index in 0.. {
        if cancel.is_cancelled() {
            warn!("dct-video: cancelled before batch {index}");
            return Ok(true);
        }

        let mut frames = Vec::with_capacity(batch_size.min(DEFAULT_BATCH_SIZE));
        while frames.len() < batch_size {
            match reader.next_frame()? {
                Some(frame) => frames.push(frame),
                None => break,
            }
        }
        if frames.is_empty() {
            break;
        }

        let last = frames.len() < batch_size;
        // A closed channel means a later stage failed; it reports the error.
        if submit.send(FrameBatch { index, frames }).is_err() || last {
            break;
        }
    }
    Ok(false)
}

fn run_compression_stage(
    pool: &ThreadPool,
    matrix: &QuantizationMatrix,
    batches: Receiver<FrameBatch>,
    done: Sender<Result<FrameBatch>>,
) {
    for batch in batches {
        let result = compress_batch(pool, batch, matrix);
        let failed = result.is_err();
        if done.send(result).is_err() || failed {
            break;
        }
    }
}

fn write_batches<W: Write>(
    writer: &mut Y4mWriter<W>,
    done: Receiver<Result<FrameBatch>>,
) -> Result<(usize, usize)> {
    let mut frames = 0;
    let mut batches = 0;
    for result in done {
        let batch = result?;
        if batch.index != batches {
            return Err(Error::InvalidInput(format!(
                "batch {} arrived while expecting batch {batches}",
                batch.index
            )));
        }
        for frame in &batch.frames {
            writer.write_frame(frame)?;
        }
        frames += batch.frames.len();
        batches += 1;
        info!("dct-video: processed {frames} frames");
    }
    Ok((frames, batches))
}

/// Compress every frame of `reader` into `writer`, preserving frame order.
///
/// A failure anywhere aborts the whole encode; frames are never skipped.
pub fn compress_video<R, W>(
    reader: Y4mReader<R>,
    writer: &mut Y4mWriter<W>,
    options: &VideoOptions,
    cancel: &CancelFlag,
) -> Result<VideoSummary>
where
    R: BufRead + Send,
    W: Write,
{
    let matrix = options.validate()?;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.workers)
        .thread_name(|i| format!("dct-video-{i}"))
        .build()
        .map_err(|e| Error::InvalidInput(format!("cannot start worker pool: {e}")))?;
    debug!(
        "dct-video: {}x{} frames, batches of {}, {} workers",
        reader.header().width,
        reader.header().height,
        options.batch_size,
        options.workers
    );

    let (submit_tx, submit_rx) = bounded::<FrameBatch>(1);
    let (done_tx, done_rx) = bounded::<Result<FrameBatch>>(1);
    let batch_size = options.batch_size;

    let (written, read) = thread::scope(|scope| {
        let reader_handle =
            scope.spawn(move || submit_batches(reader, batch_size, cancel, submit_tx));
        let pool = &pool;
        let matrix = &matrix;
        let stage_handle =
            scope.spawn(move || run_compression_stage(pool, matrix, submit_rx, done_tx));

        // Dropping the receiver on return unblocks the upstream stages.
        let written = write_batches(writer, done_rx);

        stage_handle
            .join()
            .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
        let read = reader_handle
            .join()
            .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
        (written, read)
    });

    let (frames, batches) = written?;
    let cancelled = read?;
    info!("dct-video: compression complete, {frames} frames in {batches} batches");
    Ok(VideoSummary {
        frames,
        batches,
        cancelled,
    })
}

/// DCT video codec over YUV4MPEG2 streams. Output is always grayscale.
#[derive(Debug, Clone, Default)]
pub struct DctVideo {
    options: VideoOptions,
    cancel: CancelFlag,
}

impl DctVideo {
    pub fn new(options: VideoOptions) -> Result<Self> {
        options.validate()?;
        Ok(DctVideo {
            options,
            cancel: CancelFlag::new(),
        })
    }

    /// Use `cancel` to stop future encodes started through this codec.
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn options(&self) -> &VideoOptions {
        &self.options
    }
}

impl Compression for DctVideo {
    fn name(&self) -> &'static str {
        "dct-video"
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let reader = Y4mReader::new(data)?;
        let mut writer = Y4mWriter::new(Vec::with_capacity(data.len()), reader.header())?;
        let summary = compress_video(reader, &mut writer, &self.options, &self.cancel)?;
        if summary.cancelled {
            return Err(Error::Cancelled);
        }
        writer.finish()
    }

    fn decompress(&self, _data: &[u8]) -> Result<Vec<u8>> {
        Err(Error::UnsupportedOperation {
            codec: "dct-video",
            operation: "decompression",
        })
    }

    fn supports_decompression(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::y4m::StreamHeader;
    use ndarray::Array2;
    use std::io::{self, Read};

    /// Raises `cancel` once `limit` bytes of `inner` have been consumed.
    struct CancelAfter<'a> {
        inner: &'a [u8],
        consumed: usize,
        limit: usize,
        cancel: CancelFlag,
    }

    impl CancelAfter<'_> {
        fn advance(&mut self, amount: usize) {
            self.consumed += amount;
            if self.consumed >= self.limit {
                self.cancel.cancel();
            }
        }
    }

    impl Read for CancelAfter<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.inner.read(buf)?;
            self.advance(n);
            Ok(n)
        }
    }

    impl BufRead for CancelAfter<'_> {
        fn fill_buf(&mut self) -> io::Result<&[u8]> {
            self.inner.fill_buf()
        }

        fn consume(&mut self, amount: usize) {
            self.inner.consume(amount);
            self.advance(amount);
        }
    }

    fn frame(seed: usize, height: usize, width: usize) -> GrayFrame {
        Array2::from_shape_fn((height, width), |(i, j)| ((seed * 17 + i * 3 + j * 5) % 256) as u8)
    }

    fn stream(frames: &[GrayFrame]) -> Vec<u8> {
        let (height, width) = frames[0].dim();
        let mut writer = Y4mWriter::new(Vec::new(), &StreamHeader::mono(width, height, 25)).unwrap();
        for f in frames {
            writer.write_frame(f).unwrap();
        }
        writer.finish().unwrap()
    }

    fn options(batch_size: usize, workers: usize) -> VideoOptions {
        VideoOptions {
            quality: 50,
            batch_size,
            workers,
        }
    }

    #[test]
    fn test_frame_geometry_is_kept() {
        let matrix = QuantizationMatrix::with_quality(50).unwrap();
        let source = frame(1, 13, 22);
        let out = compress_frame(source.view(), &matrix).unwrap();
        assert_eq!(out.dim(), (13, 22));
    }

    #[test]
    fn test_constant_frame_survives() {
        let matrix = QuantizationMatrix::with_quality(50).unwrap();
        let source = Array2::from_elem((16, 16), 128u8);
        let out = compress_frame(source.view(), &matrix).unwrap();
        assert_eq!(out, source);
    }

    #[test]
    fn test_output_order_matches_sequential() {
        let frames: Vec<GrayFrame> = (0..23).map(|i| frame(i, 16, 24)).collect();
        let data = stream(&frames);
        let matrix = QuantizationMatrix::with_quality(50).unwrap();

        let mut writer = Y4mWriter::new(Vec::new(), &StreamHeader::mono(24, 16, 25)).unwrap();
        let summary = compress_video(
            Y4mReader::new(data.as_slice()).unwrap(),
            &mut writer,
            &options(5, 4),
            &CancelFlag::new(),
        )
        .unwrap();
        assert_eq!(
            summary,
            VideoSummary {
                frames: 23,
                batches: 5,
                cancelled: false
            }
        );

        let output = writer.finish().unwrap();
        let mut reader = Y4mReader::new(output.as_slice()).unwrap();
        for source in &frames {
            let expected = compress_frame(source.view(), &matrix).unwrap();
            assert_eq!(reader.next_frame().unwrap().unwrap(), expected);
        }
        assert!(reader.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_exact_multiple_of_batch_size() {
        let frames: Vec<GrayFrame> = (0..8).map(|i| frame(i, 8, 8)).collect();
        let codec = DctVideo::new(options(4, 2)).unwrap();
        let output = codec.compress(&stream(&frames)).unwrap();
        let mut reader = Y4mReader::new(output.as_slice()).unwrap();
        let mut count = 0;
        while reader.next_frame().unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 8);
    }

    #[test]
    fn test_color_source_becomes_mono() {
        // 8x8 4:2:0 frame: 64 luma bytes then 2 * 16 chroma bytes.
        let mut data = b"YUV4MPEG2 W8 H8 F30:1 Ip A1:1 C420jpeg\nFRAME\n".to_vec();
        data.extend(std::iter::repeat(90u8).take(64));
        data.extend(std::iter::repeat(200u8).take(32));

        let output = DctVideo::default().compress(&data).unwrap();
        let mut reader = Y4mReader::new(output.as_slice()).unwrap();
        assert_eq!(reader.header().tags, vec!["F30:1", "Ip", "A1:1"]);
        let luma = reader.next_frame().unwrap().unwrap();
        assert!(luma.iter().all(|&v| v == 90));
    }

    #[test]
    fn test_cancelled_before_start() {
        let frames: Vec<GrayFrame> = (0..4).map(|i| frame(i, 8, 8)).collect();
        let data = stream(&frames);
        let cancel = CancelFlag::new();
        cancel.cancel();

        let mut writer = Y4mWriter::new(Vec::new(), &StreamHeader::mono(8, 8, 25)).unwrap();
        let summary = compress_video(
            Y4mReader::new(data.as_slice()).unwrap(),
            &mut writer,
            &options(2, 2),
            &cancel,
        )
        .unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.frames, 0);

        let codec = DctVideo::new(options(2, 2)).unwrap().with_cancel_flag(cancel);
        assert!(matches!(codec.compress(&data), Err(Error::Cancelled)));
    }

    #[test]
    fn test_cancelled_mid_stream_keeps_submitted_batches() {
        let (batch_size, total) = (3, 10);
        let frames: Vec<GrayFrame> = (0..total).map(|i| frame(i, 8, 8)).collect();
        let data = stream(&frames);
        let frame_len = b"FRAME\n".len() + 8 * 8;
        let header_len = data.len() - total * frame_len;

        // Raised as the last byte of the second batch is read.
        let cancel = CancelFlag::new();
        let source = CancelAfter {
            inner: &data,
            consumed: 0,
            limit: header_len + 2 * batch_size * frame_len,
            cancel: cancel.clone(),
        };

        let mut writer = Y4mWriter::new(Vec::new(), &StreamHeader::mono(8, 8, 25)).unwrap();
        let summary = compress_video(
            Y4mReader::new(source).unwrap(),
            &mut writer,
            &options(batch_size, 2),
            &cancel,
        )
        .unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.frames, summary.batches * batch_size);
        assert!(summary.frames > 0 && summary.frames < total);
        assert_eq!(summary.batches, 2);

        let matrix = QuantizationMatrix::with_quality(50).unwrap();
        let output = writer.finish().unwrap();
        let mut reader = Y4mReader::new(output.as_slice()).unwrap();
        for source in &frames[..summary.frames] {
            let expected = compress_frame(source.view(), &matrix).unwrap();
            assert_eq!(reader.next_frame().unwrap().unwrap(), expected);
        }
        assert!(reader.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_truncated_stream_aborts() {
        let frames: Vec<GrayFrame> = (0..3).map(|i| frame(i, 8, 8)).collect();
        let mut data = stream(&frames);
        data.truncate(data.len() - 10);
        assert!(matches!(
            DctVideo::new(options(1, 2)).unwrap().compress(&data),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_invalid_options() {
        assert!(matches!(
            DctVideo::new(options(0, 1)),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            DctVideo::new(options(1, 0)),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            DctVideo::new(options(usize::MAX, 2)),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            DctVideo::new(options(4, usize::MAX)),
            Err(Error::InvalidInput(_))
        ));

        let data = stream(&[frame(0, 8, 8)]);
        let mut writer = Y4mWriter::new(Vec::new(), &StreamHeader::mono(8, 8, 25)).unwrap();
        assert!(matches!(
            compress_video(
                Y4mReader::new(data.as_slice()).unwrap(),
                &mut writer,
                &options(usize::MAX, 2),
                &CancelFlag::new(),
            ),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            DctVideo::new(VideoOptions {
                quality: 0,
                ..VideoOptions::default()
            }),
            Err(Error::QualityOutOfRange(0))
        ));
    }

    #[test]
    fn test_decompression_unsupported() {
        let codec = DctVideo::default();
        assert!(!codec.supports_decompression());
        assert!(matches!(
            codec.decompress(b"anything"),
            Err(Error::UnsupportedOperation { .. })
        ));
    }
}
