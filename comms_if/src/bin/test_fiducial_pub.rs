//! Simple fiducial feed test
//!
//! Publishes synthetic frames at 10 Hz containing a single marker which starts offset, rotated
//! and small, and converges on the centre of the frame at docking size. The marker drops out
//! for a few frames each run to exercise the lost-marker behaviour.

use chrono::Utc;
use comms_if::{
    eqpt::fiducial::{FiducialFrame, FrameImage, ImageFormat, MarkerDetection},
    net::{MonitoredSocket, SocketOptions}
};
use image::DynamicImage;

const WIDTH_PX: u32 = 640;
const HEIGHT_PX: u32 = 360;

/// Marker id published
const MARKER_ID: u32 = 1;

/// Frames in one approach
const RUN_FRAMES: u32 = 100;

fn main() -> Result<(), Box<dyn std::error::Error>> {

    // Create zmq context
    let ctx = zmq::Context::new();

    // Create socket options
    let socket_options = SocketOptions {
        bind: true,
        block_on_first_connect: false,
        ..Default::default()
    };

    // Create the socket
    let socket = MonitoredSocket::new(
        &ctx,
        zmq::PUB,
        socket_options,
        "tcp://*:5030"
    )?;

    println!("Fiducial feed open on port 5030");

    // A blank image stands in for the camera so that video recording can be exercised
    let image = FrameImage::from_dyn_image(
        &DynamicImage::new_rgb8(WIDTH_PX / 4, HEIGHT_PX / 4),
        ImageFormat::Jpeg(80)
    )?;

    let mut frame_num = 0u32;

    loop {
        let progress = (frame_num % RUN_FRAMES) as f64 / RUN_FRAMES as f64;

        // Drop the marker out for a short while in the middle of the run
        let dropout = (40..45).contains(&(frame_num % RUN_FRAMES));

        let markers = if dropout {
            vec![]
        }
        else {
            vec![synthetic_marker(progress)]
        };

        let frame = FiducialFrame {
            timestamp: Utc::now(),
            width_px: WIDTH_PX,
            height_px: HEIGHT_PX,
            markers,
            image: Some(image.clone())
        };

        match socket.send(&frame.to_message()?, 0) {
            Ok(_) => (),
            Err(e) => println!("Failed to send frame: {}", e)
        }

        frame_num = frame_num.wrapping_add(1);
        std::thread::sleep(std::time::Duration::from_millis(100));
    }
}

/// Build the marker for a point along the approach, 0.0 is the start and 1.0 is docked.
fn synthetic_marker(progress: f64) -> MarkerDetection {
    let remaining = 1.0 - progress.min(1.0);

    let cx = WIDTH_PX as f64 / 2.0 + 120.0 * remaining;
    let cy = HEIGHT_PX as f64 / 2.0;

    // Side length grows to the docking size (sqrt of 8000 px^2)
    let side = 40.0 + 49.4 * progress;
    let half = side / 2.0;

    // Tilt the top edge, shrinking to level
    let tilt = 0.2 * remaining * half;

    MarkerDetection {
        id: MARKER_ID,
        corners: [
            [cx - half, cy - half - tilt],
            [cx + half, cy - half + tilt],
            [cx + half, cy + half + tilt],
            [cx - half, cy + half - tilt],
        ]
    }
}
