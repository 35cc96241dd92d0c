use std::io::Write;
use std::path::Path;

use image::RgbaImage;

use crate::{PaaResult, PaaError, PaaFormat, PaaImage, PaaMipmap};
use crate::PaaError::*;


/// Stateful facade over the codec pipeline
///
/// A `Paa` is either empty, parsed from container bytes, or loaded from
/// a raster image (which eagerly builds the pyramid, statistics and
/// computed taggs).  Operations that fail leave the previous state
/// untouched, and file output goes through a temporary file renamed into
/// place, so no partial PAA ever lands on disk.
#[derive(Default, Debug, Clone)]
pub struct Paa {
	image: PaaImage,
}


impl Paa {
	/// Create an empty `Paa` (default DXT5 format, no mipmaps).
	pub fn new() -> Self {
		Self::default()
	}


	/// Parse a PAA file from disk.
	///
	/// # Errors
	/// - [`IoError`]: the file could not be opened.
	/// - other: see [`PaaImage::read_from`].
	pub fn read_file<P: AsRef<Path>>(path: P) -> PaaResult<Self> {
		let mut file = std::fs::File::open(path)?;
		let image = PaaImage::read_from(&mut file)?;
		Ok(Self { image })
	}


	/// Parse a PAA from an in-memory byte buffer.
	///
	/// # Errors
	/// See [`PaaImage::from_bytes`].
	pub fn from_bytes(bytes: &[u8]) -> PaaResult<Self> {
		let image = PaaImage::from_bytes(bytes)?;
		Ok(Self { image })
	}


	/// Replace the current state with pixels decoded from a raster file
	/// (PNG, TGA, JPEG, ...); the pyramid and computed taggs are built
	/// immediately.
	///
	/// # Errors
	/// - [`ImageError`], [`IoError`]: the collaborator failed to decode
	///   the file.
	/// - [`DimensionError`]: the decoded dimensions do not fit the
	///   container.
	pub fn load_image_file<P: AsRef<Path>>(&mut self, path: P) -> PaaResult<()> {
		let rgba = image::open(path)?.into_rgba8();
		self.load_rgba(rgba)
	}


	/// Replace the current state with the given RGBA8 image; the pyramid
	/// and computed taggs are built immediately.
	///
	/// # Errors
	/// - [`DimensionError`]: zero-sized image, a width beyond the 15
	///   usable bits of the width word, or a height beyond 16 bits.
	pub fn load_rgba(&mut self, rgba: RgbaImage) -> PaaResult<()> {
		let image = PaaImage::from_rgba(rgba)?;
		self.image = image;
		Ok(())
	}


	/// Serialize and atomically write a PAA file.  `format` `None` picks
	/// DXT5 or DXT1 from the transparency flag.  The in-memory pyramid
	/// keeps its uncompressed pixels.
	///
	/// # Errors
	/// - [`IoError`]: the temporary sink could not be created, written,
	///   or renamed into place.
	/// - other: see [`PaaImage::to_bytes`].
	pub fn write_paa<P: AsRef<Path>>(&self, path: P, format: Option<PaaFormat>) -> PaaResult<()> {
		let path = path.as_ref();
		let bytes = self.image.to_bytes(format)?;

		let dir = match path.parent() {
			Some(parent) if !parent.as_os_str().is_empty() => parent,
			_ => Path::new("."),
		};

		let mut sink = tempfile::NamedTempFile::new_in(dir)?;
		sink.write_all(&bytes)?;
		sink.persist(path).map_err(|e| PaaError::from(e.error))?;

		Ok(())
	}


	/// Serialize to an in-memory buffer, see [`PaaImage::to_bytes`].
	///
	/// # Errors
	/// See [`PaaImage::to_bytes`].
	pub fn to_paa_bytes(&self, format: Option<PaaFormat>) -> PaaResult<Vec<u8>> {
		self.image.to_bytes(format)
	}


	/// Decode mipmap `level` and write it as PNG.
	///
	/// # Errors
	/// - [`MipmapIndexOutOfRange`]: `level` is outside the pyramid.
	/// - [`ImageError`], [`IoError`]: the collaborator failed to encode
	///   or write the file.
	pub fn write_image<P: AsRef<Path>>(&self, path: P, level: usize) -> PaaResult<()> {
		let mip = self.image.mipmaps.get(level).ok_or(MipmapIndexOutOfRange)?;
		let rgba = mip.to_rgba()?;
		rgba.save_with_format(path, image::ImageFormat::Png)?;
		Ok(())
	}


	/// Borrow the pixel buffer of mipmap `level` (RGBA8 rows for DXT
	/// sources and loaded images, format-native bytes for uncompressed
	/// pixel formats).
	///
	/// # Errors
	/// - [`MipmapIndexOutOfRange`]: `level` is outside the pyramid.
	pub fn raw_pixel_data(&self, level: usize) -> PaaResult<&[u8]> {
		self.image.mipmaps
			.get(level)
			.map(|m| &m.data[..])
			.ok_or(MipmapIndexOutOfRange)
	}


	/// Replace the pixel buffer of mipmap `level` in place.  The buffer
	/// must match the level's dimensions and representation.
	///
	/// # Errors
	/// - [`MipmapIndexOutOfRange`]: `level` is outside the pyramid.
	/// - [`InvalidMipmap`]: `data` has the wrong length for the level.
	pub fn set_raw_pixel_data(&mut self, data: Vec<u8>, level: usize) -> PaaResult<()> {
		let mip = self.image.mipmaps
			.get_mut(level)
			.ok_or(MipmapIndexOutOfRange)?;

		if data.len() != mip.expected_data_len() {
			return Err(InvalidMipmap(mip.width, mip.height, data.len()));
		};

		mip.data = data;
		Ok(())
	}


	/// Pixel format of the parsed container (default DXT5 for fresh
	/// images; the serialization target is chosen at write time).
	pub fn format(&self) -> PaaFormat {
		self.image.format
	}


	/// The mipmap pyramid, largest level first.
	pub fn mipmaps(&self) -> &[PaaMipmap] {
		&self.image.mipmaps
	}


	/// True if the texture carries a transparency flag.
	pub fn has_alpha(&self) -> bool {
		self.image.has_transparency()
	}


	/// Borrow the underlying container value.
	pub fn image(&self) -> &PaaImage {
		&self.image
	}


	/// Consume self and return the underlying container value.
	pub fn into_image(self) -> PaaImage {
		self.image
	}
}


impl From<PaaImage> for Paa {
	fn from(image: PaaImage) -> Self {
		Self { image }
	}
}


#[test]
fn test_file_roundtrip() {
	let dir = tempfile::TempDir::new().unwrap();
	let paa_path = dir.path().join("gradient_co.paa");
	let png_path = dir.path().join("gradient_co.png");

	let mut paa = Paa::new();
	paa.load_rgba(crate::solid_rgba(16, 8, [90, 60, 30, 255])).unwrap();
	assert_eq!(paa.mipmaps().len(), 2);

	paa.write_paa(&paa_path, None).unwrap();

	let parsed = Paa::read_file(&paa_path).unwrap();
	assert_eq!(parsed.format(), PaaFormat::Dxt1);
	assert_eq!(parsed.mipmaps().len(), 2);
	assert!(!parsed.has_alpha());

	parsed.write_image(&png_path, 0).unwrap();
	let png = image::open(&png_path).unwrap().into_rgba8();
	assert_eq!(png.dimensions(), (16, 8));
}


#[test]
fn test_write_error_leaves_no_file() {
	let dir = tempfile::TempDir::new().unwrap();
	let paa_path = dir.path().join("empty.paa");

	// Empty state cannot serialize; nothing may appear on disk
	let paa = Paa::new();
	assert!(paa.write_paa(&paa_path, None).is_err());
	assert!(!paa_path.exists());
}


#[test]
fn test_failed_load_keeps_state() {
	let mut paa = Paa::new();
	paa.load_rgba(crate::solid_rgba(8, 8, [1, 1, 1, 255])).unwrap();

	assert!(paa.load_image_file("/nonexistent/definitely_missing.png").is_err());
	assert_eq!(paa.mipmaps().len(), 2);

	assert!(paa.load_rgba(RgbaImage::new(0, 0)).is_err());
	assert_eq!(paa.mipmaps().len(), 2);
}


#[test]
fn test_raw_pixel_data_accessors() {
	let mut paa = Paa::new();
	paa.load_rgba(crate::solid_rgba(8, 8, [9, 9, 9, 255])).unwrap();

	assert_eq!(paa.raw_pixel_data(0).unwrap().len(), 8 * 8 * 4);
	assert!(matches!(paa.raw_pixel_data(9), Err(MipmapIndexOutOfRange)));

	let replacement = vec![0x7Fu8; 8 * 8 * 4];
	paa.set_raw_pixel_data(replacement.clone(), 0).unwrap();
	assert_eq!(paa.raw_pixel_data(0).unwrap(), &replacement[..]);

	assert!(matches!(
		paa.set_raw_pixel_data(vec![0u8; 3], 0),
		Err(InvalidMipmap(8, 8, 3))
	));
}
