//! Scribecast platform core contracts.
//!
//! This crate contains the media data structures shared by the capture and
//! render crates without coupling them to a concrete device backend.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Kind of a device track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

/// Which devices a stream request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConstraints {
    pub audio: bool,
    pub video: bool,
}

impl StreamConstraints {
    /// Microphone only.
    pub const AUDIO_ONLY: Self = Self {
        audio: true,
        video: false,
    };

    /// Camera and microphone.
    pub const AUDIO_VIDEO: Self = Self {
        audio: true,
        video: true,
    };

    /// Track kinds this request yields, audio first.
    pub fn kinds(&self) -> Vec<MediaKind> {
        let mut kinds = Vec::with_capacity(2);
        if self.audio {
            kinds.push(MediaKind::Audio);
        }
        if self.video {
            kinds.push(MediaKind::Video);
        }
        kinds
    }
}

/// Lifecycle of a single device track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackState {
    Live,
    Ended,
}

/// A finished recording: the concatenated chunks plus the container type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaBlob {
    mime_type: String,
    data: Bytes,
}

impl MediaBlob {
    pub fn new(mime_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    /// Container media type, for example `audio/webm`.
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Size in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Conventional file extension for the container.
    pub fn extension(&self) -> &'static str {
        let subtype = self.mime_type.split(';').next().unwrap_or_default();
        match subtype.trim() {
            "audio/webm" | "video/webm" => "webm",
            "audio/ogg" | "video/ogg" => "ogg",
            "audio/mp4" | "video/mp4" => "mp4",
            "audio/wav" | "audio/x-wav" => "wav",
            "video/x-matroska" => "mkv",
            _ => "bin",
        }
    }
}

/// One decoded camera frame, tightly packed opaque RGBA8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub data: Bytes,
}

impl VideoFrame {
    pub fn new(width: u32, height: u32, data: impl Into<Bytes>) -> Self {
        Self {
            width,
            height,
            data: data.into(),
        }
    }

    /// A frame filled with a single opaque colour.
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize * 4);
        for _ in 0..(width as usize * height as usize) {
            data.extend_from_slice(&[rgb[0], rgb[1], rgb[2], 255]);
        }
        Self::new(width, height, data)
    }

    /// Whether the buffer length matches the declared dimensions.
    pub fn is_well_formed(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.data.len() == self.width as usize * self.height as usize * 4
    }
}

/// A point in canvas backing-store pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanvasPoint {
    pub x: f32,
    pub y: f32,
}

impl CanvasPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// On-screen rectangle occupied by a canvas, in client coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingRect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingRect {
    pub fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }
}

/// Raw pointer input as delivered by the surrounding UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PointerInput {
    Mouse { client_x: f32, client_y: f32 },
    Touch { touches: Vec<(f32, f32)> },
}

impl PointerInput {
    /// Client coordinate of the primary contact.
    pub fn client_position(&self) -> Option<(f32, f32)> {
        match self {
            Self::Mouse { client_x, client_y } => Some((*client_x, *client_y)),
            Self::Touch { touches } => touches.first().copied(),
        }
    }
}

/// Map pointer input onto canvas backing-store coordinates.
///
/// Mouse and touch go through the same path: the primary contact is offset
/// by the bounding rectangle origin and scaled by backing size over
/// displayed size. Returns `None` for a touch event without contacts.
pub fn normalize_pointer(
    input: &PointerInput,
    rect: &BoundingRect,
    canvas_width: u32,
    canvas_height: u32,
) -> Option<CanvasPoint> {
    let (client_x, client_y) = input.client_position()?;
    let scale_x = if rect.width > 0.0 {
        canvas_width as f32 / rect.width
    } else {
        1.0
    };
    let scale_y = if rect.height > 0.0 {
        canvas_height as f32 / rect.height
    } else {
        1.0
    };
    Some(CanvasPoint::new(
        (client_x - rect.left) * scale_x,
        (client_y - rect.top) * scale_y,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn constraints_list_kinds_audio_first() {
        assert_eq!(StreamConstraints::AUDIO_ONLY.kinds(), vec![MediaKind::Audio]);
        assert_eq!(
            StreamConstraints::AUDIO_VIDEO.kinds(),
            vec![MediaKind::Audio, MediaKind::Video]
        );
    }

    #[test]
    fn blob_extension_follows_container() {
        assert_eq!(MediaBlob::new("audio/webm", vec![1u8]).extension(), "webm");
        assert_eq!(
            MediaBlob::new("video/webm;codecs=vp8", Vec::<u8>::new()).extension(),
            "webm"
        );
        assert_eq!(MediaBlob::new("video/mp4", vec![0u8; 3]).extension(), "mp4");
        assert_eq!(MediaBlob::new("application/x-foo", vec![0u8]).extension(), "bin");
    }

    #[test]
    fn solid_frame_is_well_formed() {
        let frame = VideoFrame::solid(4, 3, [10, 20, 30]);
        assert!(frame.is_well_formed());
        assert_eq!(&frame.data[0..4], &[10, 20, 30, 255]);
    }

    #[test]
    fn unscaled_canvas_only_subtracts_origin() {
        let rect = BoundingRect::new(100.0, 50.0, 640.0, 480.0);
        let point = normalize_pointer(
            &PointerInput::Mouse {
                client_x: 110.0,
                client_y: 70.0,
            },
            &rect,
            640,
            480,
        )
        .unwrap();
        assert_eq!(point, CanvasPoint::new(10.0, 20.0));
    }

    #[test]
    fn touch_without_contacts_is_ignored() {
        let rect = BoundingRect::new(0.0, 0.0, 640.0, 480.0);
        let touch = PointerInput::Touch { touches: vec![] };
        assert!(normalize_pointer(&touch, &rect, 640, 480).is_none());
    }

    proptest! {
        #[test]
        fn mouse_and_touch_normalize_identically(
            left in -500.0f32..500.0,
            top in -500.0f32..500.0,
            width in 1.0f32..2000.0,
            height in 1.0f32..2000.0,
            cx in -1000.0f32..3000.0,
            cy in -1000.0f32..3000.0,
        ) {
            let rect = BoundingRect::new(left, top, width, height);
            let mouse = PointerInput::Mouse { client_x: cx, client_y: cy };
            let touch = PointerInput::Touch { touches: vec![(cx, cy), (0.0, 0.0)] };
            prop_assert_eq!(
                normalize_pointer(&mouse, &rect, 640, 480),
                normalize_pointer(&touch, &rect, 640, 480)
            );
        }

        #[test]
        fn rect_corners_map_to_canvas_corners(
            left in -500.0f32..500.0,
            top in -500.0f32..500.0,
            width in 1.0f32..2000.0,
            height in 1.0f32..2000.0,
        ) {
            let rect = BoundingRect::new(left, top, width, height);
            let far = PointerInput::Mouse { client_x: left + width, client_y: top + height };
            let point = normalize_pointer(&far, &rect, 640, 480).unwrap();
            prop_assert!((point.x - 640.0).abs() < 0.5);
            prop_assert!((point.y - 480.0).abs() < 0.5);
        }
    }
}
