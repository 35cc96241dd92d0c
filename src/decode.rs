use crate::PaaImage;
use crate::PaaResult;
use crate::PaaError::*;

use image::RgbaImage;


/// Wrapper around [`PaaImage`] that decodes mipmaps into
/// [`image::RgbaImage`]
#[allow(missing_debug_implementations)]
#[derive(Clone)]
pub struct PaaDecoder {
	paa: PaaImage,
}


impl PaaDecoder {
	/// Create an instance of `Self` from a [`PaaImage`].
	pub fn with_paa(paa: PaaImage) -> Self {
		Self { paa }
	}


	/// Decode the mipmap at [`PaaImage::mipmaps`]`[index]`.
	///
	/// # Errors
	/// - [`MipmapIndexOutOfRange`]: `index` is outside the pyramid.
	/// - other: the mipmap's pixel buffer is inconsistent with its
	///   dimensions or representation.
	pub fn decode_nth(&self, index: usize) -> PaaResult<RgbaImage> {
		self.paa.mipmaps
			.get(index)
			.ok_or(MipmapIndexOutOfRange)?
			.to_rgba()
	}


	/// Decode the first (largest) mipmap, see
	/// [`decode_nth`][PaaDecoder::decode_nth].
	///
	/// # Errors
	/// - [`MipmapIndexOutOfRange`]: the pyramid is empty.
	pub fn decode_first(&self) -> PaaResult<RgbaImage> {
		self.decode_nth(0)
	}
}


#[test]
fn test_decode_nth() {
	let image = PaaImage::from_rgba(crate::solid_rgba(8, 8, [5, 6, 7, 255])).unwrap();
	let decoder = PaaDecoder::with_paa(image);

	let top = decoder.decode_first().unwrap();
	assert_eq!(top.dimensions(), (8, 8));
	assert_eq!(top.get_pixel(0, 0).0, [5, 6, 7, 255]);

	let lower = decoder.decode_nth(1).unwrap();
	assert_eq!(lower.dimensions(), (4, 4));

	assert!(matches!(decoder.decode_nth(2), Err(MipmapIndexOutOfRange)));
}
