//! Snapshot serialization
//!
//! Resizes the page to its natural content size and dispatches on the
//! configured [`OutputFormat`] to produce the output file.

use crate::encode::{encode_raster, symbol_name, EncodeOptions};
use crate::{
    CaptureConfig, CaptureError, FormatKind, OutputFormat, PageHost, PageSize, PrintSurface,
    RenderSurface, TextFormat, Viewport,
};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// What was written.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotSummary {
    pub path: PathBuf,
    pub format: OutputFormat,
    /// Viewport the page was captured at
    pub viewport: Viewport,
    pub bytes: usize,
}

#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    output: PathBuf,
    format: OutputFormat,
    page_size: PageSize,
    print_backgrounds: bool,
    encode: EncodeOptions,
}

impl SnapshotWriter {
    pub fn new(output: impl Into<PathBuf>, format: OutputFormat) -> Self {
        let output = output.into();
        let encode = EncodeOptions {
            symbol: symbol_name(&output),
            ..Default::default()
        };
        Self {
            output,
            format,
            page_size: PageSize::default(),
            print_backgrounds: false,
            encode,
        }
    }

    pub fn from_config(config: &CaptureConfig) -> Self {
        let mut writer = Self::new(config.output.clone(), config.format);
        writer.page_size = config.settings.page_size;
        writer.print_backgrounds = config.settings.engine.print_backgrounds;
        writer.encode.jpeg_quality = config.settings.jpeg_quality;
        writer
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Serialize the page and write it to the output path.
    pub async fn write<H>(&self, host: &mut H) -> Result<SnapshotSummary, CaptureError>
    where
        H: PageHost + ?Sized,
    {
        let viewport = host.content_size().await?;
        if viewport.is_empty() {
            return Err(CaptureError::EmptyViewport {
                width: viewport.width,
                height: viewport.height,
            });
        }
        host.set_viewport_size(viewport).await?;
        debug!(
            "Capturing {} at {}x{}",
            self.format, viewport.width, viewport.height
        );

        let data = self.render(host, viewport).await?;
        tokio::fs::write(&self.output, &data)
            .await
            .map_err(|e| CaptureError::output(&self.output, e))?;

        info!(
            "Wrote {} snapshot to {} ({} bytes)",
            self.format,
            self.output.display(),
            data.len()
        );

        Ok(SnapshotSummary {
            path: self.output.clone(),
            format: self.format,
            viewport,
            bytes: data.len(),
        })
    }

    async fn render<H>(&self, host: &mut H, viewport: Viewport) -> Result<Vec<u8>, CaptureError>
    where
        H: PageHost + ?Sized,
    {
        match self.format.kind() {
            FormatKind::Vector => {
                let mut surface = RenderSurface::vector(viewport);
                host.render_into(&mut surface).await?;
                match surface {
                    RenderSurface::Vector(canvas) if canvas.is_blank() => {
                        Err(CaptureError::EncodingFailed(
                            "page host drew nothing onto the vector surface".to_string(),
                        ))
                    }
                    RenderSurface::Vector(canvas) => Ok(canvas.to_svg().into_bytes()),
                    RenderSurface::Raster(_) => Err(CaptureError::PageError(
                        "page host replaced the vector surface".to_string(),
                    )),
                }
            }
            FormatKind::Print(format) => {
                let mut surface =
                    PrintSurface::new(format, self.page_size, self.print_backgrounds);
                host.paginate_into(&mut surface).await?;
                if surface.is_empty() {
                    return Err(CaptureError::EncodingFailed(format!(
                        "page host produced an empty {} document",
                        self.format
                    )));
                }
                Ok(surface.into_bytes())
            }
            FormatKind::Text(text) => {
                let text = match text {
                    TextFormat::InnerText => host.extract_text().await?,
                    TextFormat::Html => host.extract_html().await?,
                    TextFormat::RenderTree => host.extract_layout_dump().await?,
                };
                Ok(text.into_bytes())
            }
            FormatKind::Raster(raster) => {
                let mut surface = RenderSurface::raster(viewport);
                host.render_into(&mut surface).await?;
                match surface {
                    RenderSurface::Raster(image) => encode_raster(&image, raster, &self.encode),
                    RenderSurface::Vector(_) => Err(CaptureError::PageError(
                        "page host replaced the raster surface".to_string(),
                    )),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page_host::MockPageHost;
    use image::Rgba;
    use mockall::predicate::eq;
    use mockall::Sequence;

    #[tokio::test]
    async fn resizes_to_content_before_painting() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.png");
        let mut host = MockPageHost::new();
        let mut seq = Sequence::new();

        host.expect_content_size()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(Viewport::new(1024, 2000)));
        host.expect_set_viewport_size()
            .with(eq(Viewport::new(1024, 2000)))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        host.expect_render_into()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|surface| {
                assert_eq!(surface.size(), Viewport::new(1024, 2000));
                if let RenderSurface::Raster(image) = surface {
                    image.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
                }
                Ok(())
            });

        let summary = SnapshotWriter::new(&path, OutputFormat::Png)
            .write(&mut host)
            .await
            .unwrap();

        assert_eq!(summary.viewport, Viewport::new(1024, 2000));
        let decoded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (1024, 2000));
        assert_eq!(decoded.get_pixel(0, 0), &Rgba([255, 0, 0, 255]));
    }

    #[tokio::test]
    async fn zero_area_viewport_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.png");
        let mut host = MockPageHost::new();
        host.expect_content_size()
            .returning(|| Ok(Viewport::new(0, 600)));
        host.expect_set_viewport_size().never();
        host.expect_render_into().never();

        let err = SnapshotWriter::new(&path, OutputFormat::Png)
            .write(&mut host)
            .await
            .unwrap_err();
        assert!(matches!(err, CaptureError::EmptyViewport { width: 0, .. }));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn text_formats_use_matching_extractor() {
        let dir = tempfile::tempdir().unwrap();
        for (format, expected) in [
            (OutputFormat::InnerText, "plain"),
            (OutputFormat::Html, "<html></html>"),
            (OutputFormat::RenderTree, "layer at (0,0)"),
        ] {
            let mut host = MockPageHost::new();
            host.expect_content_size()
                .returning(|| Ok(Viewport::new(800, 600)));
            host.expect_set_viewport_size().returning(|_| Ok(()));
            host.expect_extract_text()
                .returning(|| Ok("plain".to_string()));
            host.expect_extract_html()
                .returning(|| Ok("<html></html>".to_string()));
            host.expect_extract_layout_dump()
                .returning(|| Ok("layer at (0,0)".to_string()));

            let path = dir.path().join(format!("page{}", format.extension()));
            SnapshotWriter::new(&path, format)
                .write(&mut host)
                .await
                .unwrap();
            assert_eq!(std::fs::read_to_string(&path).unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn print_formats_paginate_with_configured_page_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.pdf");
        let mut host = MockPageHost::new();
        host.expect_content_size()
            .returning(|| Ok(Viewport::new(800, 600)));
        host.expect_set_viewport_size().returning(|_| Ok(()));
        host.expect_render_into().never();
        host.expect_paginate_into().times(1).returning(|surface| {
            assert_eq!(surface.page_size, PageSize::Letter);
            surface.set_document(b"%PDF-1.7 fake".to_vec());
            Ok(())
        });

        let mut writer = SnapshotWriter::new(&path, OutputFormat::Pdf);
        writer.page_size = PageSize::Letter;
        writer.write(&mut host).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.7 fake");
    }

    #[tokio::test]
    async fn unwritable_output_is_reported() {
        let mut host = MockPageHost::new();
        host.expect_content_size()
            .returning(|| Ok(Viewport::new(10, 10)));
        host.expect_set_viewport_size().returning(|_| Ok(()));
        host.expect_extract_html()
            .returning(|| Ok("<p>x</p>".to_string()));

        let err = SnapshotWriter::new("/nonexistent-dir/for/sure/page.html", OutputFormat::Html)
            .write(&mut host)
            .await
            .unwrap_err();
        assert!(matches!(err, CaptureError::OutputFailed { .. }));
        assert_eq!(err.exit_code(), 1);
    }
}
