//! Pixel encoders
//!
//! PNG, JPEG, GIF, BMP, TIFF and PPM go through the `image` crate. XBM, XPM
//! and MNG are small enough to write directly, and PostScript pagination
//! emits Level 2 `colorimage` pages from the rendered raster.

use crate::{CaptureError, PageSize, RasterFormat};
use image::codecs::pnm::{PnmSubtype, SampleEncoding};
use image::{DynamicImage, ImageOutputFormat, RgbaImage};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::Cursor;
use std::path::Path;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const MNG_SIGNATURE: [u8; 8] = [0x8A, b'M', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// XPM pixel characters, in allocation order.
const XPM_CHARS: &[u8] =
    b" .XoO+@#$%&*=-;:>,<1234567890qwertyuipasdfghjklzxcvbnmMNBVCZASDFGHJKLPIUYTREWQ!~^/()_`'][{}|";

#[derive(Debug, Clone)]
pub struct EncodeOptions {
    pub jpeg_quality: u8,
    /// C identifier used inside XBM and XPM sources
    pub symbol: String,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            jpeg_quality: 90,
            symbol: "snapshot".to_string(),
        }
    }
}

pub fn encode_raster(
    image: &RgbaImage,
    format: RasterFormat,
    options: &EncodeOptions,
) -> Result<Vec<u8>, CaptureError> {
    match format {
        RasterFormat::Png => write_with(image, ImageOutputFormat::Png),
        RasterFormat::Jpeg => write_rgb_with(image, ImageOutputFormat::Jpeg(options.jpeg_quality)),
        RasterFormat::Gif => write_with(image, ImageOutputFormat::Gif),
        RasterFormat::Bmp => write_with(image, ImageOutputFormat::Bmp),
        RasterFormat::Tiff => write_with(image, ImageOutputFormat::Tiff),
        RasterFormat::Ppm => write_rgb_with(
            image,
            ImageOutputFormat::Pnm(PnmSubtype::Pixmap(SampleEncoding::Binary)),
        ),
        RasterFormat::Mng => {
            let png = write_with(image, ImageOutputFormat::Png)?;
            encode_mng(&png, image.width(), image.height())
        }
        RasterFormat::Xbm => Ok(encode_xbm(image, &options.symbol).into_bytes()),
        RasterFormat::Xpm => Ok(encode_xpm(image, &options.symbol).into_bytes()),
    }
}

fn write_with(image: &RgbaImage, format: ImageOutputFormat) -> Result<Vec<u8>, CaptureError> {
    let mut cursor = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(image.clone()).write_to(&mut cursor, format)?;
    Ok(cursor.into_inner())
}

/// For encodings without an alpha channel; composites over white first.
fn write_rgb_with(image: &RgbaImage, format: ImageOutputFormat) -> Result<Vec<u8>, CaptureError> {
    let rgb = image::RgbImage::from_fn(image.width(), image.height(), |x, y| {
        image::Rgb(over_white(image.get_pixel(x, y).0))
    });
    let mut cursor = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(rgb).write_to(&mut cursor, format)?;
    Ok(cursor.into_inner())
}

fn over_white([r, g, b, a]: [u8; 4]) -> [u8; 3] {
    let blend = |c: u8| ((c as u32 * a as u32 + 255 * (255 - a as u32)) / 255) as u8;
    [blend(r), blend(g), blend(b)]
}

/// C identifier derived from the output file stem.
pub fn symbol_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut symbol: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if symbol.is_empty() {
        symbol.push_str("snapshot");
    } else if symbol.starts_with(|c: char| c.is_ascii_digit()) {
        symbol.insert(0, '_');
    }
    symbol
}

fn crc32(bytes: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in bytes {
        crc ^= byte as u32;
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (0xEDB8_8320 & mask);
        }
    }
    !crc
}

fn push_chunk(out: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    let start = out.len();
    out.extend_from_slice(kind);
    out.extend_from_slice(data);
    let crc = crc32(&out[start..]);
    out.extend_from_slice(&crc.to_be_bytes());
}

/// Wrap a PNG datastream as a single-frame MNG.
fn encode_mng(png: &[u8], width: u32, height: u32) -> Result<Vec<u8>, CaptureError> {
    let chunks = png
        .strip_prefix(&PNG_SIGNATURE[..])
        .ok_or_else(|| CaptureError::EncodingFailed("PNG encoder produced no signature".into()))?;

    let mut mhdr = Vec::with_capacity(28);
    for field in [width, height, 1, 1, 1, 1, 1] {
        mhdr.extend_from_slice(&u32::to_be_bytes(field));
    }

    let mut out = Vec::with_capacity(png.len() + 64);
    out.extend_from_slice(&MNG_SIGNATURE);
    push_chunk(&mut out, b"MHDR", &mhdr);
    out.extend_from_slice(chunks);
    push_chunk(&mut out, b"MEND", &[]);
    Ok(out)
}

fn is_dark(pixel: [u8; 4]) -> bool {
    let [r, g, b] = over_white(pixel);
    let luma = (299 * r as u32 + 587 * g as u32 + 114 * b as u32) / 1000;
    luma < 128
}

/// X11 bitmap: one bit per pixel, LSB first, set bits are dark pixels.
fn encode_xbm(image: &RgbaImage, symbol: &str) -> String {
    let (width, height) = image.dimensions();
    let row_bytes = width.div_ceil(8);
    let mut bytes = Vec::with_capacity((row_bytes * height) as usize);

    for y in 0..height {
        for chunk in 0..row_bytes {
            let mut byte = 0u8;
            for bit in 0..8 {
                let x = chunk * 8 + bit;
                if x < width && is_dark(image.get_pixel(x, y).0) {
                    byte |= 1 << bit;
                }
            }
            bytes.push(byte);
        }
    }

    let mut out = String::new();
    let _ = writeln!(out, "#define {symbol}_width {width}");
    let _ = writeln!(out, "#define {symbol}_height {height}");
    let _ = writeln!(out, "static unsigned char {symbol}_bits[] = {{");
    for (i, line) in bytes.chunks(12).enumerate() {
        let hex: Vec<String> = line.iter().map(|b| format!("0x{b:02x}")).collect();
        let last = (i + 1) * 12 >= bytes.len();
        let _ = writeln!(out, " {}{}", hex.join(", "), if last { "" } else { "," });
    }
    out.push_str("};\n");
    out
}

/// XPM key for a pixel; `None` marks transparency.
fn xpm_key(pixel: [u8; 4]) -> Option<[u8; 3]> {
    (pixel[3] >= 128).then(|| [pixel[0], pixel[1], pixel[2]])
}

fn xpm_code(mut index: usize, chars_per_pixel: usize) -> String {
    let base = XPM_CHARS.len();
    let mut code = Vec::with_capacity(chars_per_pixel);
    for _ in 0..chars_per_pixel {
        code.push(XPM_CHARS[index % base]);
        index /= base;
    }
    String::from_utf8_lossy(&code).into_owned()
}

/// X11 pixmap with an exact palette, widening codes as colours demand.
fn encode_xpm(image: &RgbaImage, symbol: &str) -> String {
    let mut palette: HashMap<Option<[u8; 3]>, usize> = HashMap::new();
    let mut order: Vec<Option<[u8; 3]>> = Vec::new();
    for pixel in image.pixels() {
        let key = xpm_key(pixel.0);
        palette.entry(key).or_insert_with(|| {
            order.push(key);
            order.len() - 1
        });
    }

    let mut chars_per_pixel = 1;
    while XPM_CHARS.len().pow(chars_per_pixel as u32) < order.len().max(1) {
        chars_per_pixel += 1;
    }

    let (width, height) = image.dimensions();
    let mut out = String::new();
    out.push_str("/* XPM */\n");
    let _ = writeln!(out, "static char *{symbol}[] = {{");
    out.push_str("/* columns rows colors chars-per-pixel */\n");
    let _ = writeln!(out, "\"{width} {height} {} {chars_per_pixel}\",", order.len());
    for (index, key) in order.iter().enumerate() {
        let code = xpm_code(index, chars_per_pixel);
        match key {
            Some([r, g, b]) => {
                let _ = writeln!(out, "\"{code} c #{r:02X}{g:02X}{b:02X}\",");
            }
            None => {
                let _ = writeln!(out, "\"{code} c None\",");
            }
        }
    }
    for y in 0..height {
        let mut row = String::with_capacity(width as usize * chars_per_pixel);
        for x in 0..width {
            let index = palette[&xpm_key(image.get_pixel(x, y).0)];
            row.push_str(&xpm_code(index, chars_per_pixel));
        }
        let last = y + 1 == height;
        let _ = writeln!(out, "\"{row}\"{}", if last { "" } else { "," });
    }
    out.push_str("};\n");
    out
}

/// Paginate a rendered page onto fixed-size PostScript pages.
///
/// The page is scaled down to the paper width (never up) and cut into
/// paper-height slices, top to bottom.
pub fn paginate_postscript(image: &RgbaImage, page_size: PageSize) -> Vec<u8> {
    let (page_w, page_h) = page_size.points();
    let (width, height) = image.dimensions();
    let scale = if width == 0 {
        1.0
    } else {
        (page_w / width as f64).min(1.0)
    };
    let rows_per_page = ((page_h / scale).floor() as u32).max(1);
    let pages = height.div_ceil(rows_per_page).max(1);

    let mut out = String::new();
    out.push_str("%!PS-Adobe-3.0\n");
    out.push_str("%%Creator: page-capture\n");
    let _ = writeln!(out, "%%Pages: {pages}");
    let _ = writeln!(out, "%%BoundingBox: 0 0 {} {}", page_w as u32, page_h as u32);
    out.push_str("%%LanguageLevel: 2\n");
    out.push_str("%%DocumentData: Clean7Bit\n");
    out.push_str("%%EndComments\n");

    for page in 0..pages {
        let top = page * rows_per_page;
        let rows = rows_per_page.min(height.saturating_sub(top));
        let _ = writeln!(out, "%%Page: {} {}", page + 1, page + 1);
        out.push_str("gsave\n");
        if rows > 0 && width > 0 {
            let draw_w = width as f64 * scale;
            let draw_h = rows as f64 * scale;
            let _ = writeln!(out, "0 {:.3} translate", page_h - draw_h);
            let _ = writeln!(out, "{draw_w:.3} {draw_h:.3} scale");
            let _ = writeln!(
                out,
                "{width} {rows} 8 [{width} 0 0 -{rows} 0 {rows}] currentfile /ASCIIHexDecode filter false 3 colorimage"
            );
            let mut line = String::with_capacity(128);
            for y in top..top + rows {
                for x in 0..width {
                    for channel in over_white(image.get_pixel(x, y).0) {
                        let _ = write!(line, "{channel:02x}");
                        if line.len() >= 128 {
                            out.push_str(&line);
                            out.push('\n');
                            line.clear();
                        }
                    }
                }
            }
            out.push_str(&line);
            out.push_str(">\n");
        }
        out.push_str("grestore\nshowpage\n");
    }
    out.push_str("%%EOF\n");
    out.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn checker(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            if (x + y) % 2 == 0 {
                Rgba([0, 0, 0, 255])
            } else {
                Rgba([255, 255, 255, 255])
            }
        })
    }

    #[test]
    fn crc_matches_png_iend() {
        // IEND always carries the same CRC.
        assert_eq!(crc32(b"IEND"), 0xAE42_6082);
    }

    #[test]
    fn png_and_mng_signatures() {
        let image = checker(3, 2);
        let options = EncodeOptions::default();

        let png = encode_raster(&image, RasterFormat::Png, &options).unwrap();
        assert!(png.starts_with(&PNG_SIGNATURE));

        let mng = encode_raster(&image, RasterFormat::Mng, &options).unwrap();
        assert!(mng.starts_with(&MNG_SIGNATURE));
        assert_eq!(&mng[12..16], b"MHDR");
        assert_eq!(&mng[16..20], &3u32.to_be_bytes());
        assert_eq!(&mng[20..24], &2u32.to_be_bytes());
        assert_eq!(&mng[mng.len() - 8..mng.len() - 4], b"MEND");
    }

    #[test]
    fn library_backed_formats_have_expected_magic() {
        let image = checker(4, 4);
        let options = EncodeOptions::default();

        let jpeg = encode_raster(&image, RasterFormat::Jpeg, &options).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let gif = encode_raster(&image, RasterFormat::Gif, &options).unwrap();
        assert_eq!(&gif[..3], b"GIF");
        let bmp = encode_raster(&image, RasterFormat::Bmp, &options).unwrap();
        assert_eq!(&bmp[..2], b"BM");
        let ppm = encode_raster(&image, RasterFormat::Ppm, &options).unwrap();
        assert_eq!(&ppm[..2], b"P6");
        let tiff = encode_raster(&image, RasterFormat::Tiff, &options).unwrap();
        assert!(tiff.starts_with(b"II*\0") || tiff.starts_with(b"MM\0*"));
    }

    #[test]
    fn xbm_packs_dark_pixels_lsb_first() {
        let xbm = encode_xbm(&checker(9, 1), "shot");
        assert!(xbm.contains("#define shot_width 9"));
        assert!(xbm.contains("#define shot_height 1"));
        // Dark at x = 0, 2, 4, 6, 8.
        assert!(xbm.contains("0x55, 0x01"));
    }

    #[test]
    fn xpm_palette_covers_transparency() {
        let mut image = checker(2, 2);
        image.put_pixel(1, 1, Rgba([10, 20, 30, 0]));
        let xpm = encode_xpm(&image, "shot");

        assert!(xpm.starts_with("/* XPM */"));
        assert!(xpm.contains("\"2 2 3 1\","));
        assert!(xpm.contains("c #000000"));
        assert!(xpm.contains("c #FFFFFF"));
        assert!(xpm.contains("c None"));
    }

    #[test]
    fn xpm_widens_codes_for_large_palettes() {
        let image = RgbaImage::from_fn(100, 1, |x, _| Rgba([x as u8, 0, 0, 255]));
        let xpm = encode_xpm(&image, "wide");
        assert!(xpm.contains("\"100 1 100 2\","));
    }

    #[test]
    fn symbol_name_is_a_c_identifier() {
        assert_eq!(symbol_name(Path::new("out/my-shot.xbm")), "my_shot");
        assert_eq!(symbol_name(Path::new("1st.xpm")), "_1st");
        assert_eq!(symbol_name(Path::new("")), "snapshot");
    }

    #[test]
    fn postscript_splits_tall_pages() {
        // 595 px wide at scale 1.0; 842 rows per A4 page.
        let image = RgbaImage::from_pixel(595, 842 * 2 + 10, Rgba([255, 0, 0, 255]));
        let ps = String::from_utf8(paginate_postscript(&image, PageSize::A4)).unwrap();

        assert!(ps.starts_with("%!PS-Adobe-3.0"));
        assert!(ps.contains("%%Pages: 3"));
        assert!(ps.contains("%%Page: 3 3"));
        assert!(ps.contains("595 10 8 [595 0 0 -10 0 10]"));
        assert_eq!(ps.matches("showpage").count(), 3);
        assert!(ps.trim_end().ends_with("%%EOF"));
    }
}
