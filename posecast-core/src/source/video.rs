use ffmpeg_next as ffmpeg;
use std::sync::Once;

use super::{Frame, FrameSource};
use crate::error::SourceError;

static FFMPEG_INIT: Once = Once::new();

fn video_err(context: &str, err: ffmpeg::Error) -> SourceError {
    SourceError::Video(format!("{context}: {err}"))
}

/// Decodes a video file, stream URL or capture device into RGB frames.
pub struct VideoSource {
    label: String,
    input: ffmpeg::format::context::Input,
    decoder: ffmpeg::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    stream_index: usize,
    draining: bool,
}

impl std::fmt::Debug for VideoSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoSource")
            .field("label", &self.label)
            .field("stream_index", &self.stream_index)
            .field("draining", &self.draining)
            .finish()
    }
}

impl VideoSource {
    /// Capture device by index; `0` is `/dev/video0`.
    pub fn camera(index: u32) -> Result<Self, SourceError> {
        Self::open(&format!("/dev/video{index}"))
    }

    pub fn open(location: &str) -> Result<Self, SourceError> {
        let mut init_error = None;
        FFMPEG_INIT.call_once(|| {
            if let Err(err) = ffmpeg::init() {
                init_error = Some(err);
            }
        });
        if let Some(err) = init_error {
            return Err(video_err("failed to initialize ffmpeg", err));
        }

        let input = ffmpeg::format::input(&location).map_err(|err| match err {
            ffmpeg::Error::Other { errno } if errno == ffmpeg::util::error::ENOENT => {
                SourceError::NotFound(location.to_string())
            }
            other => video_err(location, other),
        })?;

        let stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| {
                SourceError::Video(format!("{location}: no video stream"))
            })?;
        let stream_index = stream.index();

        let codec =
            ffmpeg::codec::context::Context::from_parameters(stream.parameters())
                .map_err(|err| video_err("unsupported codec parameters", err))?;
        let decoder = codec
            .decoder()
            .video()
            .map_err(|err| video_err("failed to create video decoder", err))?;

        if decoder.width() == 0 || decoder.height() == 0 {
            return Err(SourceError::Video(format!(
                "{location}: invalid video dimensions {}x{}",
                decoder.width(),
                decoder.height()
            )));
        }

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::format::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .map_err(|err| video_err("cannot create video scaler", err))?;

        tracing::info!(
            location,
            width = decoder.width(),
            height = decoder.height(),
            "opened video source"
        );

        Ok(Self {
            label: location.to_string(),
            input,
            decoder,
            scaler,
            stream_index,
            draining: false,
        })
    }

    /// Feeds the decoder one more packet; `false` once input is exhausted.
    fn feed(&mut self) -> Result<bool, SourceError> {
        loop {
            let next = self.input.packets().next();
            match next {
                Some((stream, packet)) if stream.index() == self.stream_index => {
                    if let Err(err) = self.decoder.send_packet(&packet) {
                        tracing::debug!("Failed to send packet: {}", err);
                    }
                    return Ok(true);
                }
                Some(_) => continue,
                None if !self.draining => {
                    self.draining = true;
                    self.decoder
                        .send_eof()
                        .map_err(|err| video_err("failed to flush decoder", err))?;
                    return Ok(true);
                }
                None => return Ok(false),
            }
        }
    }

    fn to_frame(
        &self,
        scaled: &ffmpeg::util::frame::video::Video,
    ) -> Result<Frame, SourceError> {
        let width = scaled.width();
        let height = scaled.height();
        let stride = scaled.stride(0);
        let data = scaled.data(0);
        let row_bytes = width as usize * 3;

        let rgb = if stride == row_bytes {
            data[..row_bytes * height as usize].to_vec()
        } else {
            let mut packed = Vec::with_capacity(row_bytes * height as usize);
            for y in 0..height as usize {
                let start = y * stride;
                packed.extend_from_slice(&data[start..start + row_bytes]);
            }
            packed
        };
        Frame::new(width, height, rgb)
    }
}

impl FrameSource for VideoSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        let mut decoded = ffmpeg::util::frame::video::Video::empty();
        loop {
            match self.decoder.receive_frame(&mut decoded) {
                Ok(()) => {
                    if decoded.width() == 0
                        || decoded.height() == 0
                        || decoded.format() == ffmpeg::format::Pixel::None
                    {
                        tracing::warn!("Skipping undecodable frame");
                        continue;
                    }
                    let mut scaled = ffmpeg::util::frame::video::Video::empty();
                    self.scaler
                        .run(&decoded, &mut scaled)
                        .map_err(|err| video_err("failed to scale frame", err))?;
                    return self.to_frame(&scaled).map(Some);
                }
                Err(ffmpeg::Error::Other { errno })
                    if errno == ffmpeg::util::error::EAGAIN =>
                {
                    if !self.feed()? {
                        return Ok(None);
                    }
                }
                Err(ffmpeg::Error::Eof) => return Ok(None),
                Err(err) => return Err(video_err("failed to decode frame", err)),
            }
        }
    }

    fn describe(&self) -> String {
        format!("video {}", self.label)
    }
}
