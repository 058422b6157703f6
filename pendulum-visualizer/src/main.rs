use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Builder;
use image::{ImageBuffer, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn, LevelFilter};
use minimp4::Mp4Muxer;
use openh264::encoder::{BitRate, Encoder, EncoderConfig, FrameRate};
use openh264::formats::YUVBuffer;
use palette::{FromColor, Hsv, Srgb};
use pendulum_common::{FrameSnapshot, OutputFormat, Vec2, Viewport};
use rand::Rng;
use rayon::prelude::*;
use std::fs::{self, File};
use std::io::{BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Command-line arguments for the visualizer
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input snapshot file path (.bin, .json or .msgpack)
    #[arg(short, long)]
    input: PathBuf,

    /// Output video file path (.mp4)
    #[arg(short, long, default_value = "pendulum_grid.mp4")]
    output: PathBuf,

    /// Width of the output video in pixels (defaults to the first snapshot's viewport)
    #[arg(long)]
    width: Option<u32>,

    /// Height of the output video in pixels (defaults to the first snapshot's viewport)
    #[arg(long)]
    height: Option<u32>,

    /// Frames per second for the output video
    #[arg(long, default_value_t = 60)]
    fps: u32,

    /// Arm color - use "palette" for one color per pendulum, or a specific color name
    /// (black, white, red, green, blue, yellow, cyan, magenta)
    #[arg(long, default_value = "white")]
    color: String,

    /// Background color - name of the color outside the pendulum square
    #[arg(long, default_value = "white")]
    bg_color: String,

    /// Number of frames rendered in parallel before encoding
    #[arg(long, default_value_t = 64)]
    chunk_size: usize,
}

// Color definitions for named colors (RGBA format)
const COLOR_MAP: &[(&str, [u8; 4])] = &[
    ("black", [0, 0, 0, 255]),
    ("white", [255, 255, 255, 255]),
    ("red", [255, 0, 0, 255]),
    ("green", [0, 255, 0, 255]),
    ("blue", [0, 0, 255, 255]),
    ("yellow", [255, 255, 0, 255]),
    ("cyan", [0, 255, 255, 255]),
    ("magenta", [255, 0, 255, 255]),
];

/// Square backdrop: rgba(20, 20, 20, 0.9).
const SQUARE_FILL: [u8; 3] = [20, 20, 20];
const SQUARE_ALPHA: f32 = 0.9;
/// Square border: #444, 4px.
const BORDER_COLOR: [u8; 4] = [0x44, 0x44, 0x44, 255];
const BORDER_WIDTH: i32 = 4;
/// Arm stroke width in viewport pixels.
const ARM_STROKE: f64 = 1.5;

/// Parse a color name to RGBA values
fn parse_color(color_name: &str) -> [u8; 4] {
    for &(name, color) in COLOR_MAP {
        if name.eq_ignore_ascii_case(color_name) {
            return color;
        }
    }
    // Default to white if color not found
    warn!("Color '{}' not recognized, using white.", color_name);
    [255, 255, 255, 255]
}

/// Generate a color palette with a specified number of colors
fn generate_color_palette(count: usize) -> Vec<[u8; 4]> {
    let mut colors = Vec::with_capacity(count);
    let mut rng = rand::rng();

    for i in 0..count {
        // Use HSV color space for better distribution
        let hue = (i as f32) / (count as f32);
        let saturation = 0.7 + rng.random_range(-0.1..0.1);
        let value = 0.9 + rng.random_range(-0.1..0.1);

        let hsv: Hsv = Hsv::new(hue * 360.0, saturation, value);
        let rgb: Srgb = Srgb::from_color(hsv);

        colors.push([(rgb.red * 255.0) as u8, (rgb.green * 255.0) as u8, (rgb.blue * 255.0) as u8, 255]);
    }

    // Shuffle the colors so neighbouring cells differ
    use rand::seq::SliceRandom;
    colors.shuffle(&mut rng);

    colors
}

/// Composites a translucent color over an opaque background.
fn blend_over(fg: [u8; 3], alpha: f32, bg: [u8; 4]) -> [u8; 4] {
    let mix = |f: u8, b: u8| (f as f32 * alpha + b as f32 * (1.0 - alpha)).round() as u8;
    [mix(fg[0], bg[0]), mix(fg[1], bg[1]), mix(fg[2], bg[2]), 255]
}

/// Colors used to draw every frame.
struct FrameStyle {
    background: [u8; 4],
    square_fill: [u8; 4],
    arm_palette: Vec<[u8; 4]>,
}

/// Maps viewport coordinates onto the output image, preserving aspect ratio and centering.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ViewTransform {
    scale: f64,
    offset_x: f64,
    offset_y: f64,
}

impl ViewTransform {
    fn fit(viewport: Viewport, width: u32, height: u32) -> Self {
        if viewport.width <= 0.0 || viewport.height <= 0.0 {
            return ViewTransform { scale: 0.0, offset_x: width as f64 / 2.0, offset_y: height as f64 / 2.0 };
        }
        let scale = (width as f64 / viewport.width).min(height as f64 / viewport.height);
        ViewTransform {
            scale,
            offset_x: (width as f64 - viewport.width * scale) / 2.0,
            offset_y: (height as f64 - viewport.height * scale) / 2.0,
        }
    }

    fn apply(&self, p: Vec2) -> (f32, f32) {
        ((self.offset_x + p.x * self.scale) as f32, (self.offset_y + p.y * self.scale) as f32)
    }
}

/// Draws a segment `thickness` pixels wide as parallel 1px lines.
fn draw_thick_segment(image: &mut RgbaImage, start: (f32, f32), end: (f32, f32), thickness: u32, color: Rgba<u8>) {
    let (dx, dy) = (end.0 - start.0, end.1 - start.1);
    let len = (dx * dx + dy * dy).sqrt();
    if thickness <= 1 || len < 1e-6 {
        draw_line_segment_mut(image, start, end, color);
        return;
    }
    let (nx, ny) = (-dy / len, dx / len);
    for k in 0..thickness {
        let shift = k as f32 - (thickness - 1) as f32 / 2.0;
        draw_line_segment_mut(
            image,
            (start.0 + nx * shift, start.1 + ny * shift),
            (end.0 + nx * shift, end.1 + ny * shift),
            color,
        );
    }
}

/// Renders one snapshot: backdrop square with border, then both arms of every pendulum.
fn draw_frame(snapshot: &FrameSnapshot, width: u32, height: u32, style: &FrameStyle) -> RgbaImage {
    let mut image = ImageBuffer::from_pixel(width, height, Rgba(style.background));
    let view = ViewTransform::fit(snapshot.viewport, width, height);

    let (sx, sy) = view.apply(Vec2::new(snapshot.square.x, snapshot.square.y));
    let size = (snapshot.square.size * view.scale).round() as i32;
    if size > 0 {
        let (x, y) = (sx.round() as i32, sy.round() as i32);
        draw_filled_rect_mut(&mut image, Rect::at(x, y).of_size(size as u32, size as u32), Rgba(style.square_fill));
        // Border straddles the square edge
        for k in -(BORDER_WIDTH / 2)..(BORDER_WIDTH / 2) {
            let side = size - 2 * k;
            if side > 0 {
                draw_hollow_rect_mut(
                    &mut image,
                    Rect::at(x + k, y + k).of_size(side as u32, side as u32),
                    Rgba(BORDER_COLOR),
                );
            }
        }
    }

    let thickness = (ARM_STROKE * view.scale).round().max(1.0) as u32;
    for (i, pose) in snapshot.poses.iter().enumerate() {
        if !(pose.origin.is_finite() && pose.elbow.is_finite() && pose.tip.is_finite()) {
            continue;
        }
        let color = Rgba(style.arm_palette[i % style.arm_palette.len()]);
        let origin = view.apply(pose.origin);
        let elbow = view.apply(pose.elbow);
        let tip = view.apply(pose.tip);
        draw_thick_segment(&mut image, origin, elbow, thickness, color);
        draw_thick_segment(&mut image, elbow, tip, thickness, color);
    }

    image
}

/// RGB to YUV conversion for video encoding
fn rgb_to_yuv420(image: &RgbaImage) -> Vec<u8> {
    let width = image.width() as usize;
    let height = image.height() as usize;

    // OpenH264 expects YUV 4:2:0: full-size Y plane, quarter-size U and V planes
    let y_plane_size = width * height;
    let mut yuv = vec![0u8; y_plane_size + y_plane_size / 2];

    for y in 0..height {
        for x in 0..width {
            let pixel = image.get_pixel(x as u32, y as u32);
            let (r, g, b) = (pixel[0] as f32, pixel[1] as f32, pixel[2] as f32);
            // BT.601
            yuv[y * width + x] = (0.299 * r + 0.587 * g + 0.114 * b).round() as u8;
        }
    }

    let u_plane_offset = y_plane_size;
    let v_plane_offset = y_plane_size + y_plane_size / 4;
    let uv_width = width / 2;

    // Average U and V over each 2x2 block
    for y in (0..height).step_by(2) {
        for x in (0..width).step_by(2) {
            let mut sum_u = 0f32;
            let mut sum_v = 0f32;
            let mut count = 0;
            for dy in 0..2 {
                for dx in 0..2 {
                    if y + dy < height && x + dx < width {
                        let pixel = image.get_pixel((x + dx) as u32, (y + dy) as u32);
                        let (r, g, b) = (pixel[0] as f32, pixel[1] as f32, pixel[2] as f32);
                        sum_u += -0.169 * r - 0.331 * g + 0.5 * b + 128.0;
                        sum_v += 0.5 * r - 0.419 * g - 0.081 * b + 128.0;
                        count += 1;
                    }
                }
            }
            let idx = (y / 2) * uv_width + x / 2;
            yuv[u_plane_offset + idx] = (sum_u / count as f32).round() as u8;
            yuv[v_plane_offset + idx] = (sum_v / count as f32).round() as u8;
        }
    }

    yuv
}

/// Reads a recorded snapshot sequence, picking the decoder from the file extension.
fn load_snapshots(path: &Path) -> Result<Vec<FrameSnapshot>> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let format = OutputFormat::from_extension(ext).unwrap_or_else(|| {
        warn!("Unknown snapshot extension '{}', assuming bincode.", ext);
        OutputFormat::Bincode
    });
    let file = File::open(path).with_context(|| format!("Failed to open input file: {}", path.display()))?;
    let reader = BufReader::new(file);
    let snapshots = match format {
        OutputFormat::Json => serde_json::from_reader(reader).context("Failed to parse JSON snapshots")?,
        OutputFormat::Bincode => bincode::deserialize_from(reader).context("Failed to decode bincode snapshots")?,
        OutputFormat::MessagePack => rmp_serde::decode::from_read(reader).context("Failed to decode MessagePack snapshots")?,
    };
    Ok(snapshots)
}

/// H.264 needs even frame dimensions.
fn even_dimension(value: u32) -> u32 {
    (value & !1).max(2)
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    run_with_args(args)
}

fn run_with_args(args: Args) -> Result<()> {
    // Initialize logger
    Builder::from_default_env()
        .filter(None, LevelFilter::Info)
        .init();

    info!("Starting Pendulum Grid Visualizer...");
    info!("Input file: {}", args.input.display());
    info!("Output video: {}", args.output.display());
    info!("Video FPS: {}", args.fps);

    let snapshots = load_snapshots(&args.input)?;
    info!("Found {} snapshots in the file", snapshots.len());
    let Some(first) = snapshots.first() else {
        warn!("Input file contains no snapshots. Exiting.");
        return Ok(());
    };
    debug!(
        "First snapshot: frame {} | {} pendulums | viewport {}x{} | {}",
        first.frame,
        first.poses.len(),
        first.viewport.width,
        first.viewport.height,
        first.params
    );

    // --- Output Dimensions ---
    let requested_width = args.width.unwrap_or(first.viewport.width.round() as u32);
    let requested_height = args.height.unwrap_or(first.viewport.height.round() as u32);
    let width = even_dimension(requested_width);
    let height = even_dimension(requested_height);
    if (width, height) != (requested_width, requested_height) {
        warn!("Adjusted video size from {}x{} to {}x{} for H.264.", requested_width, requested_height, width, height);
    }
    info!("Video dimensions: {}x{}", width, height);

    // --- Set up Colors ---
    let background = parse_color(&args.bg_color);
    let max_pendulums = snapshots.iter().map(|s| s.poses.len()).max().unwrap_or(0).max(1);
    let arm_palette = if args.color.eq_ignore_ascii_case("palette") {
        info!("Using color palette mode for arm coloring");
        generate_color_palette(max_pendulums)
    } else {
        let single_color = parse_color(&args.color);
        info!("Using single color for all arms: {:?}", single_color);
        vec![single_color]
    };
    let style = FrameStyle {
        background,
        square_fill: blend_over(SQUARE_FILL, SQUARE_ALPHA, background),
        arm_palette,
    };

    // --- Initialize video encoder ---
    info!("Setting up video encoder...");
    let mut encoder = Encoder::with_api_config(
        openh264::OpenH264API::from_source(),
        EncoderConfig::new()
            .max_frame_rate(FrameRate::from_hz(args.fps as f32))
            .bitrate(BitRate::from_bps(5_000_000)), // 5 Mbps
    )
    .context("Failed to initialize H.264 encoder")?;
    let mut h264_data = Vec::new();

    let progress_bar = ProgressBar::new(snapshots.len() as u64);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} frames ({percent}%) [{eta}]")?
            .progress_chars("#>-"),
    );

    let start_time = Instant::now();
    let mut frame_count = 0usize;
    let chunk_size = args.chunk_size.max(1);

    // Render a chunk in parallel, then encode it in order
    for chunk in snapshots.chunks(chunk_size) {
        let yuv_frames: Vec<Vec<u8>> = chunk
            .par_iter()
            .map(|snapshot| rgb_to_yuv420(&draw_frame(snapshot, width, height, &style)))
            .collect();

        for yuv_data in yuv_frames {
            let yuv_source = YUVBuffer::from_vec(yuv_data, width as usize, height as usize);
            let bitstream = encoder
                .encode(&yuv_source)
                .with_context(|| format!("Failed to encode frame {}", frame_count))?;
            bitstream.write_vec(&mut h264_data);
            frame_count += 1;
            progress_bar.inc(1);
        }
    }
    progress_bar.finish_with_message(format!("Encoded {} frames", frame_count));

    // --- Mux into MP4 ---
    info!("Creating MP4 file...");
    let mut video_buffer = Cursor::new(Vec::new());
    let mut mp4muxer = Mp4Muxer::new(&mut video_buffer);
    let video_description = format!("Double pendulum grid - {} pendulums", first.poses.len());
    mp4muxer.init_video(width as i32, height as i32, false, &video_description);
    mp4muxer.write_video(&h264_data);
    mp4muxer.close();

    video_buffer.seek(SeekFrom::Start(0))?;
    let mut video_bytes = Vec::new();
    video_buffer.read_to_end(&mut video_bytes)?;
    fs::write(&args.output, &video_bytes)
        .with_context(|| format!("Failed to write video file to {}", args.output.display()))?;

    let duration = start_time.elapsed();
    info!(
        "Video generation completed in {:.2?} ({:.1} frames per second)",
        duration,
        frame_count as f64 / duration.as_secs_f64()
    );
    info!("Output saved to: {}", args.output.display());

    Ok(())
}
