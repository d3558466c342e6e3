//! YUV4MPEG2 (`.y4m`) reader. Only the luma plane is used.

use anyhow::{anyhow, bail, Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::path::PathBuf;

use super::source::SourceInfo;

const MAGIC: &str = "YUV4MPEG2";
const MAX_HEADER_LINE: usize = 1024;
/// Largest frame payload the reader will allocate.
pub(crate) const MAX_FRAME_BYTES: usize = 256 * 1024 * 1024;

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Y4mHeader {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Bytes of the luma plane.
    pub luma_bytes: usize,
    /// Bytes of pixel data per frame (all planes).
    pub frame_bytes: usize,
}

pub(crate) fn parse_header(line: &str) -> Result<Y4mHeader> {
    let mut tokens = line.split_ascii_whitespace();
    if tokens.next() != Some(MAGIC) {
        bail!("not a YUV4MPEG2 stream");
    }
    let mut width = None;
    let mut height = None;
    let mut fps = 0.0;
    let mut colorspace = "420";
    for token in tokens {
        let Some(tag) = token.get(..1) else {
            continue;
        };
        let value = &token[1..];
        match tag {
            "W" => width = Some(value.parse::<u32>().context("invalid y4m width")?),
            "H" => height = Some(value.parse::<u32>().context("invalid y4m height")?),
            "F" => {
                let (num, den) = value
                    .split_once(':')
                    .ok_or_else(|| anyhow!("invalid y4m frame rate '{}'", value))?;
                let num: f64 = num.parse().context("invalid y4m frame rate")?;
                let den: f64 = den.parse().context("invalid y4m frame rate")?;
                if den > 0.0 {
                    fps = num / den;
                }
            }
            "C" => colorspace = value,
            _ => {}
        }
    }
    let width = width.ok_or_else(|| anyhow!("y4m header missing width"))?;
    let height = height.ok_or_else(|| anyhow!("y4m header missing height"))?;
    if width == 0 || height == 0 {
        bail!("y4m frame has zero size");
    }

    let (w, h) = (width as usize, height as usize);
    let plane = |cw: usize, ch: usize| cw.checked_mul(ch);
    let luma_bytes = plane(w, h);
    let chroma_bytes = match colorspace {
        "mono" => Some(0),
        c if c.starts_with("420") => plane(w.div_ceil(2), h.div_ceil(2)),
        c if c.starts_with("422") => plane(w.div_ceil(2), h),
        c if c.starts_with("444") => plane(w, h),
        other => bail!("unsupported y4m colorspace '{}'", other),
    };
    let sizes = luma_bytes.zip(chroma_bytes).and_then(|(luma, chroma)| {
        let frame = chroma.checked_mul(2)?.checked_add(luma)?;
        Some((luma, frame))
    });
    let Some((luma_bytes, frame_bytes)) = sizes.filter(|&(_, frame)| frame <= MAX_FRAME_BYTES)
    else {
        bail!(
            "y4m frame {}x{} exceeds the {} MiB frame limit",
            width,
            height,
            MAX_FRAME_BYTES >> 20
        );
    };
    Ok(Y4mHeader {
        width,
        height,
        fps,
        luma_bytes,
        frame_bytes,
    })
}

pub(crate) struct Y4mReader {
    path: PathBuf,
    reader: Option<BufReader<File>>,
    header: Option<Y4mHeader>,
    frame_buf: Vec<u8>,
}

impl Y4mReader {
    pub(crate) fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            reader: None,
            header: None,
            frame_buf: Vec::new(),
        }
    }

    pub(crate) fn open(&mut self) -> Result<SourceInfo> {
        let file = File::open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        let file_len = file.metadata().map(|m| m.len()).unwrap_or(0);
        let mut reader = BufReader::new(file);
        let line = read_line(&mut reader)?
            .ok_or_else(|| anyhow!("{} is empty", self.path.display()))?;
        let header = parse_header(&line)?;

        // Frame count is not declared by the format; estimate from size
        // assuming bare "FRAME\n" markers.
        let payload = file_len.saturating_sub(line.len() as u64 + 1);
        let per_frame = header.frame_bytes as u64 + 6;
        let total_frames = payload / per_frame;

        self.frame_buf = vec![0u8; header.frame_bytes];
        self.header = Some(header);
        self.reader = Some(reader);
        Ok(SourceInfo {
            total_frames,
            fps: header.fps,
            width: header.width,
            height: header.height,
        })
    }

    /// Luma plane of the next frame, or `None` at end of stream.
    pub(crate) fn next_luma(&mut self) -> Result<Option<(Vec<u8>, u32, u32)>> {
        let (Some(reader), Some(header)) = (self.reader.as_mut(), self.header) else {
            return Ok(None);
        };
        let Some(marker) = read_line(reader)? else {
            return Ok(None);
        };
        if !marker.starts_with("FRAME") {
            bail!("corrupt y4m stream: expected FRAME marker");
        }
        reader
            .read_exact(&mut self.frame_buf)
            .context("truncated y4m frame")?;
        let luma = self
            .frame_buf
            .get(..header.luma_bytes)
            .context("y4m frame shorter than its luma plane")?;
        Ok(Some((luma.to_vec(), header.width, header.height)))
    }

    pub(crate) fn close(&mut self) {
        self.reader = None;
    }
}

fn read_line<R: BufRead>(reader: &mut R) -> Result<Option<String>> {
    let mut bytes = Vec::new();
    let read = reader
        .by_ref()
        .take(MAX_HEADER_LINE as u64)
        .read_until(b'\n', &mut bytes);
    match read {
        Ok(0) => Ok(None),
        Ok(_) => {
            if bytes.last() != Some(&b'\n') {
                bail!("y4m header line too long or truncated");
            }
            bytes.pop();
            Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
        }
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e.into()),
    }
}
