//! Texture loading and upload
//!
//! Pixels are kept with a bottom-left origin: row 0 is the bottom row of the
//! image, so a texture coordinate of `v = 0` samples the bottom edge.

use crate::backend::traits::*;
use crate::backend::types::*;
use image::{imageops::FilterType, DynamicImage, GenericImageView, RgbaImage};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Texture loading error
#[derive(Error, Debug)]
pub enum TextureError {
    #[error("Failed to read texture {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to decode texture {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("Texture {0} has no pixels")]
    Empty(String),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Loaded texture data
#[derive(Debug, Clone, PartialEq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    /// RGBA8 pixels, bottom row first
    pub data: Vec<u8>,
    pub name: String,
}

impl TextureData {
    /// Load texture from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, TextureError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        let img = image::open(path).map_err(|e| match e {
            image::ImageError::IoError(source) => TextureError::Io {
                path: path.to_path_buf(),
                source,
            },
            source => TextureError::Decode {
                path: path.to_path_buf(),
                source,
            },
        })?;
        Self::from_image(img, &name)
    }

    /// Load texture from encoded bytes
    pub fn from_bytes(bytes: &[u8], name: &str) -> Result<Self, TextureError> {
        let img = image::load_from_memory(bytes).map_err(|source| TextureError::Decode {
            path: PathBuf::from(name),
            source,
        })?;
        Self::from_image(img, name)
    }

    fn from_image(img: DynamicImage, name: &str) -> Result<Self, TextureError> {
        let (width, height) = img.dimensions();
        if width == 0 || height == 0 {
            return Err(TextureError::Empty(name.to_string()));
        }

        Ok(Self {
            width,
            height,
            format: TextureFormat::Rgba8UnormSrgb,
            data: img.flipv().to_rgba8().into_raw(),
            name: name.to_string(),
        })
    }

    /// Create a solid color texture
    pub fn solid_color(color: [u8; 4], name: &str) -> Self {
        Self {
            width: 1,
            height: 1,
            format: TextureFormat::Rgba8UnormSrgb,
            data: color.to_vec(),
            name: name.to_string(),
        }
    }

    /// Create a default white texture
    pub fn white() -> Self {
        Self::solid_color([255, 255, 255, 255], "white")
    }

    /// Number of levels in a full mip chain down to 1x1
    pub fn mip_level_count(&self) -> u32 {
        32 - self.width.max(self.height).max(1).leading_zeros()
    }

    /// Every mip level, starting with this image, each half the size of the last.
    pub fn mip_chain(&self) -> Vec<TextureData> {
        let mut levels = vec![self.clone()];
        let Some(mut image) = RgbaImage::from_raw(self.width, self.height, self.data.clone()) else {
            return levels;
        };
        while image.width() > 1 || image.height() > 1 {
            let (width, height) = ((image.width() / 2).max(1), (image.height() / 2).max(1));
            image = image::imageops::resize(&image, width, height, FilterType::Triangle);
            levels.push(TextureData {
                width,
                height,
                format: self.format,
                data: image.as_raw().clone(),
                name: self.name.clone(),
            });
        }
        levels
    }

    /// Create the texture, upload its pixels and attach `sampler`.
    ///
    /// When the sampler has a mipmap filter the full mip chain is uploaded.
    pub fn upload(
        &self,
        backend: &mut dyn GraphicsBackend,
        sampler: &SamplerDescriptor,
    ) -> Result<TextureHandle, TextureError> {
        let levels = if sampler.mipmap_filter.is_some() {
            self.mip_chain()
        } else {
            vec![self.clone()]
        };

        let handle = backend.create_texture(&TextureDescriptor {
            label: Some(self.name.clone()),
            width: self.width,
            height: self.height,
            mip_levels: levels.len() as u32,
            format: self.format,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
        })?;
        for (level, data) in levels.iter().enumerate() {
            backend.write_texture(handle, level as u32, data.width, data.height, &data.data)?;
        }
        backend.set_texture_sampler(handle, sampler)?;
        log::debug!(
            "Uploaded texture {} ({}x{}, {} levels)",
            self.name,
            self.width,
            self.height,
            levels.len()
        );
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageOutputFormat, Rgba};
    use std::io::Cursor;

    fn encoded(width: u32, height: u32) -> Vec<u8> {
        // Top row red, everything else blue
        let img = RgbaImage::from_fn(width, height, |_, y| {
            if y == 0 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 255, 255])
            }
        });
        let mut bytes = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut bytes, ImageOutputFormat::Png)
            .unwrap();
        bytes.into_inner()
    }

    #[test]
    fn test_rows_are_bottom_up() {
        let texture = TextureData::from_bytes(&encoded(2, 3), "rows").unwrap();
        assert_eq!((texture.width, texture.height), (2, 3));
        let last_row = &texture.data[(2 * 2 * 4)..];
        assert_eq!(&last_row[..4], &[255, 0, 0, 255]);
        assert_eq!(&texture.data[..4], &[0, 0, 255, 255]);
    }

    #[test]
    fn test_mip_chain_halves_to_one() {
        let texture = TextureData::from_bytes(&encoded(8, 2), "mips").unwrap();
        let sizes: Vec<_> = texture.mip_chain().iter().map(|l| (l.width, l.height)).collect();
        assert_eq!(sizes, vec![(8, 2), (4, 1), (2, 1), (1, 1)]);
        assert_eq!(texture.mip_level_count(), 4);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = TextureData::from_file("does/not/exist.png");
        assert!(matches!(result, Err(TextureError::Io { .. })));
    }
}
