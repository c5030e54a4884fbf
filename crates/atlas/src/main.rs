//! Offline SDF bitmap-font atlas generator.
//!
//! Rasterizes the printable ASCII range (32..128) from a TTF, converts
//! each glyph's coverage bitmap into a signed distance field, packs the
//! glyphs into a 16-column grid aligned on the font's ascent, and writes a
//! single-channel PNG the game samples at runtime.
//!
//! Encoding: 128 sits exactly on the glyph edge, values above are inside,
//! values below fall off with distance at `DISTANCE_SCALE` units per
//! pixel. This matches what the quad fragment shader expects.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

/// First and one-past-last codepoints in the atlas.
const FIRST_GLYPH: u32 = 32;
const LAST_GLYPH: u32 = 128;

/// Grid layout: 16 columns of 32x64 pixel cells.
const COLUMNS: u32 = 16;
const CELL_WIDTH: u32 = 32;
const CELL_HEIGHT: u32 = 64;

/// SDF value on the glyph edge and its per-pixel falloff.
const EDGE_VALUE: f32 = 128.0;
const DISTANCE_SCALE: f32 = 20.0;

struct Args {
    font: PathBuf,
    out: PathBuf,
    pixel_height: f32,
    padding: u32,
}

fn print_help() {
    eprintln!(
        "Abrogue SDF font atlas generator

USAGE:
    abrogue-atlas --font <PATH> [OPTIONS]

OPTIONS:
    --font <PATH>      TTF font to rasterize (required)
    --out <PATH>       Output PNG path (default: atlas.png)
    --px <HEIGHT>      Glyph pixel height (default: 32)
    --padding <N>      SDF padding in pixels around each glyph (default: 4)
    -h, --help         Print this help message"
    );
}

fn parse_args() -> Result<Args> {
    let mut font = None;
    let mut out = PathBuf::from("atlas.png");
    let mut pixel_height = 32.0f32;
    let mut padding = 4u32;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--font" => {
                font = Some(PathBuf::from(
                    args.next().context("--font needs a path")?,
                ));
            }
            "--out" => {
                out = PathBuf::from(args.next().context("--out needs a path")?);
            }
            "--px" => {
                pixel_height = args
                    .next()
                    .context("--px needs a value")?
                    .parse()
                    .context("--px must be a number")?;
            }
            "--padding" => {
                padding = args
                    .next()
                    .context("--padding needs a value")?
                    .parse()
                    .context("--padding must be a number")?;
            }
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            other => bail!("unknown argument: {other}"),
        }
    }

    let Some(font) = font else {
        print_help();
        bail!("--font is required");
    };

    Ok(Args {
        font,
        out,
        pixel_height,
        padding,
    })
}

fn main() -> Result<()> {
    let args = parse_args()?;

    let font_data = std::fs::read(&args.font)
        .with_context(|| format!("couldn't read font {}", args.font.display()))?;
    let font = fontdue::Font::from_bytes(font_data.as_slice(), fontdue::FontSettings::default())
        .map_err(|e| anyhow::anyhow!("couldn't parse font: {e}"))?;

    let line_metrics = font
        .horizontal_line_metrics(args.pixel_height)
        .context("font has no horizontal metrics")?;
    let ascent = line_metrics.ascent.round() as i64;
    println!(
        "font ascent: {} descent: {} line gap: {}",
        line_metrics.ascent, line_metrics.descent, line_metrics.line_gap
    );

    let glyph_count = LAST_GLYPH - FIRST_GLYPH;
    let rows = glyph_count.div_ceil(COLUMNS);
    let atlas_width = COLUMNS * CELL_WIDTH;
    let atlas_height = rows * CELL_HEIGHT;
    let mut atlas = vec![0u8; (atlas_width * atlas_height) as usize];

    for (index, codepoint) in (FIRST_GLYPH..LAST_GLYPH).enumerate() {
        let Some(character) = char::from_u32(codepoint) else {
            continue;
        };

        let (metrics, coverage) = font.rasterize(character, args.pixel_height);
        let sdf = distance_field(&coverage, metrics.width, metrics.height, args.padding);
        let sdf_width = metrics.width + 2 * args.padding as usize;
        let sdf_height = metrics.height + 2 * args.padding as usize;

        println!(
            "'{}' {}x{} xmin: {} ymin: {} advance: {:.1}",
            character, metrics.width, metrics.height, metrics.xmin, metrics.ymin, metrics.advance_width
        );

        let (origin_x, origin_y) = cell_origin(index as u32);

        // Baseline-align within the cell: the glyph top sits ascent minus
        // its height-above-baseline below the cell top, shifted up and left
        // by the SDF padding.
        let top_from_baseline = metrics.height as i64 + metrics.ymin as i64;
        let cell_x = i64::from(origin_x) + metrics.xmin as i64 - args.padding as i64;
        let cell_y = i64::from(origin_y) + ascent - top_from_baseline - args.padding as i64;

        for y in 0..sdf_height {
            for x in 0..sdf_width {
                let atlas_x = cell_x + x as i64;
                let atlas_y = cell_y + y as i64;
                if atlas_x < 0
                    || atlas_y < 0
                    || atlas_x >= i64::from(atlas_width)
                    || atlas_y >= i64::from(atlas_height)
                {
                    continue;
                }
                let dst = (atlas_y * i64::from(atlas_width) + atlas_x) as usize;
                atlas[dst] = atlas[dst].max(sdf[y * sdf_width + x]);
            }
        }
    }

    let image = image::GrayImage::from_raw(atlas_width, atlas_height, atlas)
        .context("atlas buffer size mismatch")?;
    image
        .save(&args.out)
        .with_context(|| format!("couldn't write {}", args.out.display()))?;

    println!(
        "wrote {} ({}x{}, {} glyphs)",
        args.out.display(),
        atlas_width,
        atlas_height,
        glyph_count
    );
    Ok(())
}

/// Top-left corner of a glyph's grid cell, 16 columns per row.
fn cell_origin(glyph_index: u32) -> (u32, u32) {
    let column = glyph_index % COLUMNS;
    let row = glyph_index / COLUMNS;
    (column * CELL_WIDTH, row * CELL_HEIGHT)
}

/// Converts a coverage bitmap into a signed distance field.
///
/// The output is padded by `padding` pixels on every side. Each output
/// pixel encodes its distance to the nearest edge: [`EDGE_VALUE`] on the
/// edge, brighter inside, darker outside, saturating at
/// `EDGE_VALUE / DISTANCE_SCALE` pixels out. A pixel counts as inside when
/// its coverage is at least half.
fn distance_field(coverage: &[u8], width: usize, height: usize, padding: u32) -> Vec<u8> {
    let padding = padding as i64;
    let out_width = width as i64 + 2 * padding;
    let out_height = height as i64 + 2 * padding;

    let inside_at = |x: i64, y: i64| -> bool {
        if x < 0 || y < 0 || x >= width as i64 || y >= height as i64 {
            return false;
        }
        coverage[y as usize * width + x as usize] >= 128
    };

    // Distances saturate beyond this radius, so the search stays local.
    let max_radius = (EDGE_VALUE / DISTANCE_SCALE).ceil() as i64 + 1;

    let mut field = vec![0u8; (out_width * out_height) as usize];
    for out_y in 0..out_height {
        for out_x in 0..out_width {
            let x = out_x - padding;
            let y = out_y - padding;
            let inside = inside_at(x, y);

            // Nearest pixel of the opposite state within the search radius.
            let mut nearest_squared = max_radius * max_radius;
            for dy in -max_radius..=max_radius {
                for dx in -max_radius..=max_radius {
                    let squared = dx * dx + dy * dy;
                    if squared >= nearest_squared {
                        continue;
                    }
                    if inside_at(x + dx, y + dy) != inside {
                        nearest_squared = squared;
                    }
                }
            }

            let distance = (nearest_squared as f32).sqrt();
            let signed = if inside { distance } else { -distance };
            let value = EDGE_VALUE + signed * DISTANCE_SCALE;
            field[(out_y * out_width + out_x) as usize] = value.clamp(0.0, 255.0) as u8;
        }
    }

    field
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_advances_sixteen_columns_per_row() {
        assert_eq!(cell_origin(0), (0, 0));
        assert_eq!(cell_origin(1), (CELL_WIDTH, 0));
        assert_eq!(cell_origin(15), (15 * CELL_WIDTH, 0));
        assert_eq!(cell_origin(16), (0, CELL_HEIGHT));
        assert_eq!(cell_origin(33), (CELL_WIDTH, 2 * CELL_HEIGHT));
    }

    #[test]
    fn empty_glyph_is_all_outside() {
        let field = distance_field(&[], 0, 0, 2);
        assert_eq!(field.len(), 16);
        assert!(field.iter().all(|&v| v < EDGE_VALUE as u8));
    }

    #[test]
    fn field_is_centered_on_the_edge() {
        // A solid 4x4 block: the center is far inside, the padded border
        // far outside, and values decrease monotonically outward.
        let coverage = vec![255u8; 16];
        let padding = 3;
        let field = distance_field(&coverage, 4, 4, padding);
        let width = 4 + 2 * padding as usize;

        let at = |x: usize, y: usize| field[y * width + x];

        let center = at(width / 2, width / 2);
        let edge = at(padding as usize, width / 2);
        let corner = at(0, 0);

        assert!(center > EDGE_VALUE as u8, "center = {center}");
        assert!(edge >= EDGE_VALUE as u8, "edge = {edge}");
        assert!(corner < EDGE_VALUE as u8, "corner = {corner}");
        assert!(center >= edge && edge > corner);
    }

    #[test]
    fn distance_falls_off_at_the_configured_scale() {
        let coverage = vec![255u8; 16];
        let padding = 4;
        let field = distance_field(&coverage, 4, 4, padding);
        let width = 4 + 2 * padding as usize;

        // One pixel outside the block along a row through its middle.
        let row = width / 2;
        let just_outside = field[row * width + padding as usize - 1];
        let expected = (EDGE_VALUE - DISTANCE_SCALE) as u8;
        assert_eq!(just_outside, expected);
    }
}
