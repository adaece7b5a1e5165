//! Output formats and the extension/identifier table
//!
//! The table order is significant: suffix inference takes the first entry
//! whose extension matches, case-insensitively.

use crate::CaptureError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Every snapshot encoding the tool can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Svg,
    Pdf,
    PostScript,
    InnerText,
    Html,
    RenderTree,
    Jpeg,
    Png,
    Mng,
    Tiff,
    Gif,
    Bmp,
    Ppm,
    Xbm,
    Xpm,
}

/// Pixel encodings, the raster subset of [`OutputFormat`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RasterFormat {
    Jpeg,
    Png,
    Mng,
    Tiff,
    Gif,
    Bmp,
    Ppm,
    Xbm,
    Xpm,
}

/// Text encodings, the textual subset of [`OutputFormat`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextFormat {
    /// Extracted visible text
    InnerText,
    /// Serialized document markup
    Html,
    /// Engine layout-tree diagnostic dump
    RenderTree,
}

/// Print encodings, the paginated subset of [`OutputFormat`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum PrintFormat {
    Pdf,
    PostScript,
}

/// How a format is produced from the rendered page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatKind {
    Vector,
    Print(PrintFormat),
    Text(TextFormat),
    Raster(RasterFormat),
}

/// One row of the format table
#[derive(Debug, Clone, Copy)]
pub struct FormatEntry {
    pub format: OutputFormat,
    /// Canonical extension, including the leading dot
    pub extension: &'static str,
    /// Identifier accepted by `--out-format`
    pub identifier: &'static str,
}

pub const FORMAT_TABLE: &[FormatEntry] = &[
    FormatEntry { format: OutputFormat::Svg, extension: ".svg", identifier: "svg" },
    FormatEntry { format: OutputFormat::Pdf, extension: ".pdf", identifier: "pdf" },
    FormatEntry { format: OutputFormat::PostScript, extension: ".ps", identifier: "ps" },
    FormatEntry { format: OutputFormat::InnerText, extension: ".txt", identifier: "itext" },
    FormatEntry { format: OutputFormat::Html, extension: ".html", identifier: "html" },
    FormatEntry { format: OutputFormat::RenderTree, extension: ".rtree", identifier: "rtree" },
    FormatEntry { format: OutputFormat::Jpeg, extension: ".jpeg", identifier: "jpeg" },
    FormatEntry { format: OutputFormat::Png, extension: ".png", identifier: "png" },
    FormatEntry { format: OutputFormat::Mng, extension: ".mng", identifier: "mng" },
    FormatEntry { format: OutputFormat::Tiff, extension: ".tiff", identifier: "tiff" },
    FormatEntry { format: OutputFormat::Gif, extension: ".gif", identifier: "gif" },
    FormatEntry { format: OutputFormat::Bmp, extension: ".bmp", identifier: "bmp" },
    FormatEntry { format: OutputFormat::Ppm, extension: ".ppm", identifier: "ppm" },
    FormatEntry { format: OutputFormat::Xbm, extension: ".xbm", identifier: "xbm" },
    FormatEntry { format: OutputFormat::Xpm, extension: ".xpm", identifier: "xpm" },
];

impl OutputFormat {
    fn entry(self) -> &'static FormatEntry {
        FORMAT_TABLE
            .iter()
            .find(|entry| entry.format == self)
            .unwrap_or_else(|| unreachable!("{self:?} missing from FORMAT_TABLE"))
    }

    pub fn extension(self) -> &'static str {
        self.entry().extension
    }

    pub fn identifier(self) -> &'static str {
        self.entry().identifier
    }

    /// Look up an explicit identifier such as `"itext"` or `"png"`.
    pub fn from_identifier(identifier: &str) -> Result<Self, CaptureError> {
        FORMAT_TABLE
            .iter()
            .find(|entry| entry.identifier == identifier)
            .map(|entry| entry.format)
            .ok_or_else(|| CaptureError::UnknownFormat(identifier.to_string()))
    }

    /// Infer the format from the output path suffix; first table match wins.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.to_string_lossy().to_ascii_lowercase();
        FORMAT_TABLE
            .iter()
            .find(|entry| name.ends_with(entry.extension))
            .map(|entry| entry.format)
    }

    /// Explicit identifier when given, otherwise the suffix of `path`.
    pub fn resolve(identifier: Option<&str>, path: &Path) -> Result<Self, CaptureError> {
        match identifier {
            Some(identifier) => Self::from_identifier(identifier),
            None => Self::from_path(path)
                .ok_or_else(|| CaptureError::FormatNotInferred(path.to_path_buf())),
        }
    }

    pub fn kind(self) -> FormatKind {
        match self {
            OutputFormat::Svg => FormatKind::Vector,
            OutputFormat::Pdf => FormatKind::Print(PrintFormat::Pdf),
            OutputFormat::PostScript => FormatKind::Print(PrintFormat::PostScript),
            OutputFormat::InnerText => FormatKind::Text(TextFormat::InnerText),
            OutputFormat::Html => FormatKind::Text(TextFormat::Html),
            OutputFormat::RenderTree => FormatKind::Text(TextFormat::RenderTree),
            OutputFormat::Jpeg => FormatKind::Raster(RasterFormat::Jpeg),
            OutputFormat::Png => FormatKind::Raster(RasterFormat::Png),
            OutputFormat::Mng => FormatKind::Raster(RasterFormat::Mng),
            OutputFormat::Tiff => FormatKind::Raster(RasterFormat::Tiff),
            OutputFormat::Gif => FormatKind::Raster(RasterFormat::Gif),
            OutputFormat::Bmp => FormatKind::Raster(RasterFormat::Bmp),
            OutputFormat::Ppm => FormatKind::Raster(RasterFormat::Ppm),
            OutputFormat::Xbm => FormatKind::Raster(RasterFormat::Xbm),
            OutputFormat::Xpm => FormatKind::Raster(RasterFormat::Xpm),
        }
    }

    pub fn is_raster(self) -> bool {
        matches!(self.kind(), FormatKind::Raster(_))
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = CaptureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_identifier(s)
    }
}
