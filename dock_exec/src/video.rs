//! # Video Capture
//!
//! Records the camera frames of a docking attempt as evidence. Frames are appended to a raw
//! MJPEG stream (concatenated JPEG images) which is sealed when the attempt ends, whether it
//! succeeded or not. A recording is never discarded, even when sealing it fails.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    fs::{self, File}, 
    io::{BufWriter, Write}, 
    path::{Path, PathBuf}
};
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;

use comms_if::{
    dispatch::{Direction, SessionId},
    eqpt::fiducial::{FrameImage, ImageFormat}
};
use util::session::TIMESTAMP_FORMAT;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// An open capture for one docking session.
pub struct VideoCapture {
    writer: Box<dyn Write + Send>,

    path: PathBuf,

    frame_count: usize,

    created_at: DateTime<Utc>,

    /// Quality used when transcoding non-JPEG frames
    jpeg_quality: u8,
}

/// Where and how captures are recorded.
#[derive(Debug, Clone)]
pub struct VideoSettings {
    /// Directory captures are written to
    pub root: PathBuf,

    /// Quality used when transcoding non-JPEG frames
    pub jpeg_quality: u8,
}

/// A sealed recording.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VideoArtifact {
    pub path: PathBuf,

    pub frame_count: usize,

    pub created_at: DateTime<Utc>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum VideoError {
    #[error("Video file IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not transcode the frame to JPEG: {0}")]
    Transcode(#[from] image::ImageError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl VideoCapture {
    /// Open a new capture in `dir`, named after the session, direction and start time.
    pub fn start(
        dir: &Path, 
        session_id: &SessionId, 
        direction: Direction, 
        jpeg_quality: u8
    ) -> Result<Self, VideoError> {
        fs::create_dir_all(dir)?;

        let created_at = Utc::now();
        let path = dir.join(format!(
            "{}_{}_{}.mjpeg",
            file_safe(&session_id.to_string()),
            direction,
            created_at.format(TIMESTAMP_FORMAT)
        ));

        let writer = BufWriter::new(File::create(&path)?);

        info!("Video capture started: {:?}", path);

        Ok(Self::with_writer(path, Box::new(writer), created_at, jpeg_quality))
    }

    /// Create a capture recording into `writer`, which stands for the file at `path`.
    pub(crate) fn with_writer(
        path: PathBuf,
        writer: Box<dyn Write + Send>,
        created_at: DateTime<Utc>,
        jpeg_quality: u8
    ) -> Self {
        Self {
            writer,
            path,
            frame_count: 0,
            created_at,
            jpeg_quality
        }
    }

    /// Append one frame. PNG frames are transcoded to JPEG.
    ///
    /// The frame count only increases if the whole frame was written.
    pub fn append(&mut self, image: &FrameImage) -> Result<(), VideoError> {
        match image.format {
            ImageFormat::Jpeg(_) => self.writer.write_all(&image.data)?,
            ImageFormat::Png => {
                let jpeg = FrameImage::from_dyn_image(
                    &image.to_dyn_image()?, 
                    ImageFormat::Jpeg(self.jpeg_quality)
                )?;
                self.writer.write_all(&jpeg.data)?;
            }
        }

        self.frame_count += 1;

        Ok(())
    }

    /// Seal the capture, returning the artifact.
    ///
    /// If the buffered frames cannot be written out the error is returned together with the
    /// artifact, which holds whatever reached the file.
    pub fn finalize(mut self) -> Result<VideoArtifact, (VideoError, VideoArtifact)> {
        if let Err(e) = self.writer.flush() {
            return Err((e.into(), self.artifact()))
        }

        info!(
            "Video capture sealed with {} frames: {:?}", 
            self.frame_count, 
            self.path
        );

        Ok(self.artifact())
    }

    /// Seal the capture after an abnormal termination. Never fails, whatever was captured is kept.
    pub fn abort(mut self) -> VideoArtifact {
        if let Err(e) = self.writer.flush() {
            warn!("Could not flush aborted video capture {:?}: {}", self.path, e);
        }

        info!(
            "Video capture aborted with {} frames: {:?}", 
            self.frame_count, 
            self.path
        );

        self.artifact()
    }

    fn artifact(&self) -> VideoArtifact {
        VideoArtifact {
            path: self.path.clone(),
            frame_count: self.frame_count,
            created_at: self.created_at
        }
    }
}

impl VideoArtifact {
    /// Read the recording and encode it as base64 for upload.
    pub fn to_base64(&self) -> Result<String, VideoError> {
        Ok(base64::encode(fs::read(&self.path)?))
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Replace characters which are not safe in file names.
pub(crate) fn file_safe(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use std::io;
    use image::{DynamicImage, RgbImage};

    /// A sink which accepts frames but can never write them out
    pub(crate) struct BrokenSink;

    impl Write for BrokenSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "device full"))
        }
    }

    /// A unique scratch directory under the system temp directory
    pub(crate) fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "dock_exec_{}_{}_{}", 
            name, 
            std::process::id(),
            Utc::now().timestamp_nanos()
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    pub(crate) fn jpeg_frame() -> FrameImage {
        FrameImage {
            format: ImageFormat::Jpeg(80),
            data: vec![0xFF, 0xD8, 0x01, 0x02, 0xFF, 0xD9]
        }
    }

    #[test]
    fn test_finalize_counts_frames() {
        let dir = scratch_dir("finalize");
        let mut cap = VideoCapture::start(
            &dir, &SessionId::Num(42), Direction::Pickup, 80
        ).unwrap();

        for _ in 0..5 {
            cap.append(&jpeg_frame()).unwrap();
        }
        let artifact = cap.finalize().map_err(|(e, _)| e).unwrap();

        assert_eq!(artifact.frame_count, 5);
        assert_eq!(fs::read(&artifact.path).unwrap().len(), 5 * jpeg_frame().data.len());

        let name = artifact.path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("42_pickup_"));
        assert!(name.ends_with(".mjpeg"));

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_abort_keeps_frames() {
        let dir = scratch_dir("abort");
        let mut cap = VideoCapture::start(
            &dir, &SessionId::Text("r/7".into()), Direction::Return, 80
        ).unwrap();

        cap.append(&jpeg_frame()).unwrap();
        cap.append(&jpeg_frame()).unwrap();
        let artifact = cap.abort();

        assert_eq!(artifact.frame_count, 2);
        assert!(artifact.path.exists());
        assert!(!artifact.to_base64().unwrap().is_empty());

        let name = artifact.path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("r_7_return_"));

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_png_transcoded() {
        let dir = scratch_dir("png");
        let mut cap = VideoCapture::start(
            &dir, &SessionId::Num(1), Direction::Pickup, 80
        ).unwrap();

        let png = FrameImage::from_dyn_image(
            &DynamicImage::ImageRgb8(RgbImage::new(8, 8)), 
            ImageFormat::Png
        ).unwrap();
        cap.append(&png).unwrap();
        let artifact = cap.finalize().map_err(|(e, _)| e).unwrap();

        // JPEG start of image marker
        let data = fs::read(&artifact.path).unwrap();
        assert_eq!(&data[..2], &[0xFF, 0xD8]);

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_failed_seal_keeps_artifact() {
        let path = PathBuf::from("/var/dock/video/9_pickup.mjpeg");
        let mut cap = VideoCapture::with_writer(path.clone(), Box::new(BrokenSink), Utc::now(), 80);

        for _ in 0..3 {
            cap.append(&jpeg_frame()).unwrap();
        }

        match cap.finalize() {
            Err((VideoError::Io(_), artifact)) => {
                assert_eq!(artifact.path, path);
                assert_eq!(artifact.frame_count, 3);
            },
            other => panic!("expected a failed seal, got {:?}", other.map(|a| a.frame_count))
        }
    }
}
