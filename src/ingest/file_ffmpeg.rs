//! Local file frame source using FFmpeg.
//!
//! Frames are decoded in-memory and converted straight to 8-bit luminance
//! by the FFmpeg scaler.

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;

use super::source::SourceInfo;

struct Decoding {
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    eof_sent: bool,
}

pub(crate) struct FfmpegFileSource {
    path: String,
    state: Option<Decoding>,
}

impl FfmpegFileSource {
    pub(crate) fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            state: None,
        }
    }

    pub(crate) fn open(&mut self) -> Result<SourceInfo> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&self.path)
            .with_context(|| format!("failed to open file input '{}' with ffmpeg", self.path))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow!("file has no video track"))?;
        let stream_index = input_stream.index();
        let total_frames = input_stream.frames().max(0) as u64;
        let rate = input_stream.avg_frame_rate();
        let fps = if rate.denominator() != 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            0.0
        };
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::GRAY8,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        let info = SourceInfo {
            total_frames,
            fps,
            width: decoder.width(),
            height: decoder.height(),
        };
        self.state = Some(Decoding {
            input,
            stream_index,
            decoder,
            scaler,
            eof_sent: false,
        });
        Ok(info)
    }

    pub(crate) fn next_luma(&mut self) -> Result<Option<(Vec<u8>, u32, u32)>> {
        let Some(state) = self.state.as_mut() else {
            return Ok(None);
        };
        let mut decoded = ffmpeg::frame::Video::empty();

        loop {
            if state.decoder.receive_frame(&mut decoded).is_ok() {
                let mut gray = ffmpeg::frame::Video::empty();
                state
                    .scaler
                    .run(&decoded, &mut gray)
                    .context("scale frame to GRAY8")?;
                return frame_to_luma(&gray).map(Some);
            }
            if state.eof_sent {
                return Ok(None);
            }

            let mut fed = false;
            for (stream, packet) in state.input.packets() {
                if stream.index() != state.stream_index {
                    continue;
                }
                state
                    .decoder
                    .send_packet(&packet)
                    .context("send packet to ffmpeg decoder")?;
                fed = true;
                break;
            }
            if !fed {
                state.decoder.send_eof().context("flush ffmpeg decoder")?;
                state.eof_sent = true;
            }
        }
    }

    pub(crate) fn close(&mut self) {
        self.state = None;
    }
}

fn frame_to_luma(frame: &ffmpeg::frame::Video) -> Result<(Vec<u8>, u32, u32)> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = width as usize;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        let plane = data
            .get(..row_bytes * height as usize)
            .context("ffmpeg frame plane is truncated")?;
        return Ok((plane.to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }

    Ok((pixels, width, height))
}
