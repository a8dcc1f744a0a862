//! Image file input/output
//!
//! Decoding goes through two layers: the extension-guided decoder first, then a
//! content-sniffing decoder that ignores the file name entirely. The second
//! layer also recognises AVIF by its ISO-BMFF brand, including files whose
//! major brand is generic (`mif1`, `msf1`), and decodes them through dav1d when
//! the `avif-support` feature is enabled. Everything the pipeline writes is PNG.

use crate::error::{BgTrimError, Result};
use image::{DynamicImage, ImageFormat, ImageReader};
use std::{
    io::{Cursor, Read},
    path::{Path, PathBuf},
};

const SNIFF_BYTES: u64 = 64;

/// ISO-BMFF brands that mark AVIF images and image sequences
const AVIF_BRANDS: [&[u8]; 2] = [b"avif", b"avis"];

/// Name of the temporary full-resolution copy written next to the input
pub const TEMP_ORIGINAL_FILE: &str = "_temp_original.png";

/// Name of the raw remover output written next to the input
pub const DEBUG_MASK_FILE: &str = "_debug_mask.png";

/// Suffix appended to the output stem for the final image
pub const CLEAN_SUFFIX: &str = "_clean.png";

/// Service for handling image file input/output operations
pub struct ImageIOService;

impl ImageIOService {
    /// Load an image from a file path
    ///
    /// The extension picks the decoder. When that fails the magic bytes are
    /// sniffed, which rescues files whose extension lies about their content.
    ///
    /// # Examples
    /// ```rust,no_run
    /// use bgtrim::services::ImageIOService;
    ///
    /// let image = ImageIOService::load_image("input.jpg")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    ///
    /// # Errors
    /// - [`BgTrimError::InputNotFound`] when the path does not exist
    /// - [`BgTrimError::UnsupportedFormat`] when neither decoder recognises the data
    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            return Err(BgTrimError::InputNotFound(path_ref.to_path_buf()));
        }

        match image::open(path_ref) {
            Ok(img) => Ok(img),
            Err(primary) => {
                log::debug!(
                    "Extension-based loading failed for {}: {}. Sniffing content.",
                    path_ref.display(),
                    primary
                );
                Self::load_sniffed(path_ref).map_err(|fallback| {
                    BgTrimError::unsupported_format(format!(
                        "{}: extension decoder: {primary}; content decoder: {fallback}",
                        path_ref.display()
                    ))
                })
            },
        }
    }

    /// Decode using only the content's magic bytes
    ///
    /// # Errors
    /// - Unreadable file, unknown signature or corrupt data
    /// - AVIF content in a build without `avif-support`
    pub fn load_sniffed(path: &Path) -> Result<DynamicImage> {
        let format = Self::detect_format(path)?
            .ok_or_else(|| BgTrimError::unsupported_format("unrecognised file signature"))?;
        log::debug!("Sniffed {:?} content in {}", format, path.display());

        if format == ImageFormat::Avif && !cfg!(feature = "avif-support") {
            return Err(BgTrimError::unsupported_format(format!(
                "{} is AVIF; rebuild with the avif-support feature to decode it",
                path.display()
            )));
        }

        let mut reader = ImageReader::open(path)
            .map_err(|e| BgTrimError::file_io_error("open image", path, &e))?;
        reader.set_format(format);
        Ok(reader.decode()?)
    }

    /// Guess the format of a file from its first bytes
    ///
    /// # Errors
    /// - Unreadable file
    pub fn detect_format(path: &Path) -> Result<Option<ImageFormat>> {
        let mut header = Vec::with_capacity(SNIFF_BYTES as usize);
        std::fs::File::open(path)
            .and_then(|file| file.take(SNIFF_BYTES).read_to_end(&mut header))
            .map_err(|e| BgTrimError::file_io_error("read image header", path, &e))?;

        if is_avif_header(&header) {
            return Ok(Some(ImageFormat::Avif));
        }
        Ok(image::guess_format(&header).ok())
    }

    /// Save as PNG, creating the parent directory if needed
    ///
    /// # Errors
    /// - Directory creation or encoding failures
    pub fn save_png<P: AsRef<Path>>(image: &DynamicImage, path: P) -> Result<()> {
        let path_ref = path.as_ref();

        if let Some(parent) = path_ref.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| BgTrimError::file_io_error("create output directory", parent, &e))?;
        }

        image
            .save_with_format(path_ref, ImageFormat::Png)
            .map_err(|e| {
                BgTrimError::processing_stage_error(
                    "image save",
                    &format!("Failed to save as PNG: {e}"),
                    Some(&format!("path: {}", path_ref.display())),
                )
            })
    }

    /// Encode to PNG bytes for upload
    ///
    /// # Errors
    /// - Encoder failures
    pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, ImageFormat::Png)?;
        Ok(buffer.into_inner())
    }
}

/// Whether `header` starts with an ISO-BMFF `ftyp` box naming an AVIF brand
fn is_avif_header(header: &[u8]) -> bool {
    if header.get(4..8) != Some(b"ftyp".as_slice()) {
        return false;
    }

    let box_len = header
        .get(0..4)
        .and_then(|len| <[u8; 4]>::try_from(len).ok())
        .map_or(0, |len| u32::from_be_bytes(len) as usize)
        .min(header.len());

    // Major brand, then compatible brands after the minor version
    let major = header.get(8..12);
    let compatible = header.get(16..box_len).unwrap_or_default().chunks_exact(4);
    major
        .into_iter()
        .chain(compatible)
        .any(|brand| AVIF_BRANDS.contains(&brand))
}

/// Local files the pipeline writes for one input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub clean: PathBuf,
    pub temp_original: PathBuf,
    pub debug_mask: PathBuf,
}

impl OutputPaths {
    /// All paths sit in the input's directory
    #[must_use]
    pub fn for_input(input: &Path, output_name: &str) -> Self {
        let dir = input.parent().unwrap_or_else(|| Path::new(""));
        Self {
            clean: dir.join(format!("{output_name}{CLEAN_SUFFIX}")),
            temp_original: dir.join(TEMP_ORIGINAL_FILE),
            debug_mask: dir.join(DEBUG_MASK_FILE),
        }
    }
}

/// Removes a scratch file when dropped
///
/// Deletion failures are logged and otherwise ignored.
#[derive(Debug)]
pub struct TempFileGuard {
    path: PathBuf,
}

impl TempFileGuard {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => log::debug!("Removed temporary file {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => log::warn!(
                "Failed to remove temporary file {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use tempfile::TempDir;

    fn sample() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 6, Rgba([10, 20, 30, 200])))
    }

    #[test]
    fn test_load_nonexistent_file() {
        let err = ImageIOService::load_image("/definitely/not/here.png").unwrap_err();
        assert!(matches!(err, BgTrimError::InputNotFound(_)));
    }

    #[test]
    fn test_save_and_load_png() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("out.png");
        let gradient = RgbaImage::from_fn(37, 23, |x, y| {
            Rgba([(x * 7) as u8, (y * 11) as u8, ((x + y) * 3) as u8, (x * y % 256) as u8])
        });

        ImageIOService::save_png(&DynamicImage::ImageRgba8(gradient.clone()), &path).unwrap();
        let loaded = ImageIOService::load_image(&path).unwrap();

        assert_eq!(loaded.color(), image::ColorType::Rgba8);
        assert_eq!(loaded.to_rgba8(), gradient);
    }

    #[test]
    fn test_mislabelled_file_rescued_by_sniffing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("photo.jpg");
        std::fs::write(&path, ImageIOService::encode_png(&sample()).unwrap()).unwrap();

        assert_eq!(
            ImageIOService::detect_format(&path).unwrap(),
            Some(ImageFormat::Png)
        );
        let loaded = ImageIOService::load_image(&path).unwrap();
        assert!(loaded.color().has_alpha());
    }

    /// `ftyp` box with the given major brand and compatible brands
    fn ftyp(major: &[u8; 4], compatible: &[&[u8; 4]]) -> Vec<u8> {
        let len = 16 + 4 * compatible.len() as u32;
        let mut bytes = len.to_be_bytes().to_vec();
        bytes.extend_from_slice(b"ftyp");
        bytes.extend_from_slice(major);
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        for brand in compatible {
            bytes.extend_from_slice(*brand);
        }
        bytes.extend_from_slice(&[0, 0, 0, 8, b'm', b'e', b't', b'a']);
        bytes
    }

    #[test]
    fn test_avif_brands_recognised() {
        assert!(is_avif_header(&ftyp(b"avif", &[b"mif1"])));
        assert!(is_avif_header(&ftyp(b"mif1", &[b"miaf", b"avif"])));
        assert!(is_avif_header(&ftyp(b"msf1", &[b"avis"])));
        assert!(!is_avif_header(&ftyp(b"heic", &[b"mif1", b"heic"])));
        assert!(!is_avif_header(b"\x89PNG\r\n\x1a\n"));
        assert!(!is_avif_header(&[]));
    }

    #[test]
    fn test_generic_brand_avif_is_sniffed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shot.jpg");
        std::fs::write(&path, ftyp(b"mif1", &[b"miaf", b"avif"])).unwrap();

        assert_eq!(
            ImageIOService::detect_format(&path).unwrap(),
            Some(ImageFormat::Avif)
        );
    }

    #[cfg(not(feature = "avif-support"))]
    #[test]
    fn test_avif_without_decoder_names_feature() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shot.jpg");
        std::fs::write(&path, ftyp(b"avif", &[b"mif1"])).unwrap();

        let err = ImageIOService::load_image(&path).unwrap_err();
        assert!(matches!(err, BgTrimError::UnsupportedFormat(_)));
        assert!(err.to_string().contains("avif-support"));
    }

    #[cfg(feature = "avif-support")]
    #[test]
    fn test_mislabelled_avif_decoded_by_fallback() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shot.jpg");
        let source = DynamicImage::ImageRgba8(RgbaImage::from_fn(48, 32, |x, y| {
            Rgba([(x * 5) as u8, (y * 7) as u8, 128, 255])
        }));

        let mut encoded = Cursor::new(Vec::new());
        source.write_to(&mut encoded, ImageFormat::Avif).unwrap();
        std::fs::write(&path, encoded.into_inner()).unwrap();

        assert!(image::open(&path).is_err());
        assert_eq!(
            ImageIOService::detect_format(&path).unwrap(),
            Some(ImageFormat::Avif)
        );
        let loaded = ImageIOService::load_image(&path).unwrap();
        assert_eq!((loaded.width(), loaded.height()), (48, 32));
    }

    #[test]
    fn test_garbage_is_unsupported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.png");
        std::fs::write(&path, b"this is not an image").unwrap();

        let err = ImageIOService::load_image(&path).unwrap_err();
        assert!(matches!(err, BgTrimError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_encode_png_signature() {
        let bytes = ImageIOService::encode_png(&sample()).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn test_output_paths() {
        let paths = OutputPaths::for_input(Path::new("/data/in/shot.jpg"), "blue-dream");
        assert_eq!(paths.clean, PathBuf::from("/data/in/blue-dream_clean.png"));
        assert_eq!(paths.temp_original, PathBuf::from("/data/in/_temp_original.png"));
        assert_eq!(paths.debug_mask, PathBuf::from("/data/in/_debug_mask.png"));
    }

    #[test]
    fn test_temp_guard_removes_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(TEMP_ORIGINAL_FILE);
        std::fs::write(&path, b"x").unwrap();

        {
            let guard = TempFileGuard::new(path.clone());
            assert!(guard.path().exists());
        }
        assert!(!path.exists());

        // Already gone is fine
        drop(TempFileGuard::new(path));
    }
}
