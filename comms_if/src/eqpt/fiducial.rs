//! # Fiducial Observation Feed Communications Module
//!
//! The observation feed acquires camera frames, extracts fiducial markers and publishes one
//! [`FiducialFrame`] per camera frame. The encoded camera image travels with the frame so that
//! the docking controller can record video evidence without a second camera connection.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Serialize, Deserialize};
use chrono::{DateTime, Utc, serde::ts_milliseconds};
use image::{DynamicImage, ImageResult};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Topic prefix on which the feed publishes frames.
pub const FRAME_TOPIC: &str = "frame";

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// One camera frame worth of marker detections.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FiducialFrame {
    /// UTC timestamp at which the frame was acquired
    #[serde(with = "ts_milliseconds")]
    pub timestamp: DateTime<Utc>,

    /// Width of the camera frame in pixels
    pub width_px: u32,

    /// Height of the camera frame in pixels
    pub height_px: u32,

    /// All markers detected in this frame, in detector order
    pub markers: Vec<MarkerDetection>,

    /// The encoded camera image, if the feed is configured to forward images
    #[serde(default)]
    pub image: Option<FrameImage>,
}

/// A single marker detected in a frame.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MarkerDetection {
    /// Identifier encoded in the marker
    pub id: u32,

    /// Corner points in image pixels, ordered top-left, top-right, bottom-right, bottom-left
    pub corners: [[f64; 2]; 4],
}

/// An encoded camera image.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FrameImage {
    /// The format of the encoded data
    pub format: ImageFormat,

    /// The encoded image data, base64 on the wire
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Possible formats for camera images. This is used rather than image::ImageFormat to:
///     1. Restrict the formats that can be sent back and forth
///     2. Allow serialisation as image::ImageFormat does not implement serde.
#[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq)]
pub enum ImageFormat {
    /// PNG image
    Png,

    /// JPEG image with a quality value between 1 and 100, where 100 is best.
    Jpeg(u8)
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl FiducialFrame {
    /// Serialise the frame into the topic-prefixed message published by the feed.
    pub fn to_message(&self) -> Result<String, serde_json::Error> {
        Ok(format!("{} {}", FRAME_TOPIC, serde_json::to_string(self)?))
    }

    /// Parse a topic-prefixed message published by the feed.
    pub fn from_message(msg: &str) -> Result<Self, serde_json::Error> {
        let body = msg
            .strip_prefix(FRAME_TOPIC)
            .map(str::trim_start)
            .unwrap_or(msg);

        serde_json::from_str(body)
    }
}

impl FrameImage {
    /// Encode a dynamic image into a frame image with the given format
    pub fn from_dyn_image(image: &DynamicImage, format: ImageFormat) -> ImageResult<Self> {
        let mut data = Vec::<u8>::new();

        // Get the output format type
        let output_format = match format {
            ImageFormat::Png => image::ImageOutputFormat::Png,
            ImageFormat::Jpeg(q)  => image::ImageOutputFormat::Jpeg(q)
        };

        image.write_to(&mut data, output_format)?;

        Ok(Self {
            format,
            data
        })
    }

    /// Decode this frame image into a dynamic image
    pub fn to_dyn_image(&self) -> ImageResult<DynamicImage> {
        let format = match self.format {
            ImageFormat::Png => image::ImageFormat::Png,
            ImageFormat::Jpeg(_) => image::ImageFormat::Jpeg
        };

        image::load_from_memory_with_format(&self.data, format)
    }
}

// ------------------------------------------------------------------------------------------------
// SERDE HELPERS
// ------------------------------------------------------------------------------------------------

/// Serialise byte buffers as base64 strings rather than JSON arrays of numbers.
pub(crate) mod base64_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        base64::decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
