//! Still-frame capture: draw the displayed frame onto a raster at native
//! resolution and export it as a data URI.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::error::CaptureError;
use crate::platform::VideoSink;

pub const JPEG_MIME: &str = "image/jpeg";

/// Same default quality browsers use for JPEG exports.
const JPEG_QUALITY: u8 = 92;

/// What an empty (0x0) surface exports as.
const EMPTY_DATA_URI: &str = "data:,";

/// Drawing surface for a capture.
pub type Raster = RgbImage;

/// Draw the sink's current frame onto `target`, scaling if the sizes
/// differ. Without a frame the target is left as it is.
pub fn draw_current_frame(sink: &dyn VideoSink, target: &mut Raster) {
    if target.width() == 0 || target.height() == 0 {
        return;
    }
    let Some(frame) = sink.current_frame() else {
        return;
    };
    if !frame.is_complete() {
        tracing::debug!(
            "skipping draw of truncated {}x{} frame ({} bytes)",
            frame.width,
            frame.height,
            frame.data.len()
        );
        return;
    }
    let Some(source) = RgbImage::from_raw(frame.width, frame.height, frame.data.to_vec()) else {
        return;
    };

    if source.dimensions() == target.dimensions() {
        *target = source;
    } else {
        *target = imageops::resize(&source, target.width(), target.height(), FilterType::Triangle);
    }
}

/// Encode `raster` as a base64 data URI.
pub fn encode_to_data_uri(raster: &Raster, mime: &str) -> Result<String, CaptureError> {
    if mime != JPEG_MIME {
        return Err(CaptureError::UnsupportedMime(mime.to_string()));
    }
    if raster.width() == 0 || raster.height() == 0 {
        return Ok(EMPTY_DATA_URI.to_string());
    }

    let mut encoded = Vec::new();
    JpegEncoder::new_with_quality(&mut encoded, JPEG_QUALITY).encode_image(raster)?;
    Ok(format!("data:{};base64,{}", mime, STANDARD.encode(&encoded)))
}

/// Capture the sink's current frame as a JPEG data URI.
///
/// `Ok(None)` means there is no live sink to capture from.
pub fn snapshot(sink: &dyn VideoSink) -> Result<Option<String>, CaptureError> {
    if !sink.is_live() {
        return Ok(None);
    }
    let (width, height) = sink.video_dimensions();
    let mut raster = Raster::new(width, height);
    draw_current_frame(sink, &mut raster);
    encode_to_data_uri(&raster, JPEG_MIME).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::MediaStream;
    use crate::testing::FakeStream;
    use crate::video::{VideoElement, VideoFrame};
    use std::sync::Arc;

    fn decode(uri: &str) -> image::DynamicImage {
        let payload = uri
            .strip_prefix("data:image/jpeg;base64,")
            .expect("jpeg data uri");
        let bytes = STANDARD.decode(payload).expect("valid base64");
        image::load_from_memory(&bytes).expect("valid jpeg")
    }

    #[test]
    fn test_snapshot_without_live_sink_is_none() {
        let element = VideoElement::new();
        element.unmount();
        assert!(snapshot(&element).unwrap().is_none());
    }

    #[test]
    fn test_snapshot_matches_native_dimensions() {
        let element = VideoElement::new();
        let stream: Arc<dyn MediaStream> = FakeStream::with_frame("s1", 640, 480);
        element.attach(Arc::downgrade(&stream));

        let uri = snapshot(&element).unwrap().expect("snapshot");
        let image = decode(&uri);
        assert_eq!((image.width(), image.height()), (640, 480));
    }

    #[test]
    fn test_snapshot_before_first_frame_is_empty_uri() {
        let element = VideoElement::new();
        assert_eq!(snapshot(&element).unwrap().as_deref(), Some("data:,"));
    }

    #[test]
    fn test_draw_keeps_pixels() {
        let element = VideoElement::new();
        let stream: Arc<dyn MediaStream> = FakeStream::with_frame("s1", 4, 4);
        element.attach(Arc::downgrade(&stream));

        let mut raster = Raster::new(4, 4);
        draw_current_frame(&element, &mut raster);
        assert_eq!(raster.get_pixel(0, 0).0, FakeStream::FRAME_COLOR);
    }

    #[test]
    fn test_draw_scales_to_target() {
        let element = VideoElement::new();
        let stream: Arc<dyn MediaStream> = FakeStream::with_frame("s1", 8, 8);
        element.attach(Arc::downgrade(&stream));

        let mut raster = Raster::new(4, 2);
        draw_current_frame(&element, &mut raster);
        assert_eq!(raster.dimensions(), (4, 2));
        assert_eq!(raster.get_pixel(3, 1).0, FakeStream::FRAME_COLOR);
    }

    #[test]
    fn test_draw_without_frame_leaves_raster_blank() {
        let element = VideoElement::new();
        let mut raster = Raster::new(2, 2);
        draw_current_frame(&element, &mut raster);
        assert!(raster.pixels().all(|p| p.0 == [0, 0, 0]));
    }

    #[test]
    fn test_draw_ignores_truncated_frame() {
        let stream = FakeStream::with_frame("s1", 4, 4);
        stream.set_frame(VideoFrame::new(4, 4, bytes::Bytes::from_static(&[255; 6])));
        let as_dyn: Arc<dyn MediaStream> = stream.clone();
        let element = VideoElement::new();
        element.attach(Arc::downgrade(&as_dyn));

        let mut raster = Raster::new(4, 4);
        draw_current_frame(&element, &mut raster);
        assert_eq!(raster.get_pixel(0, 0).0, [0, 0, 0]);
    }

    #[test]
    fn test_encode_rejects_other_formats() {
        let raster = Raster::new(2, 2);
        assert!(matches!(
            encode_to_data_uri(&raster, "image/png"),
            Err(CaptureError::UnsupportedMime(_))
        ));
    }
}
