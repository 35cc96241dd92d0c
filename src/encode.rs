use crate::{PaaResult, PaaFormat, PaaImage};

use image::RgbaImage;


/// Wrapper that encodes an [`image::RgbaImage`] into a [`PaaImage`] with
/// a freshly built pyramid and computed taggs
///
/// The container format is decided at serialization time; `format` here
/// only overrides the transparency-based default.
#[allow(missing_debug_implementations)]
#[derive(Clone)]
pub struct PaaEncoder {
	image: RgbaImage,
	format: Option<PaaFormat>,
}


impl PaaEncoder {
	/// Create an encoder with the transparency-based format default.
	pub fn with_image(image: RgbaImage) -> Self {
		Self { image, format: None }
	}


	/// Create an encoder forcing a container format.
	pub fn with_image_and_format(image: RgbaImage, format: PaaFormat) -> Self {
		Self { image, format: Some(format) }
	}


	/// Build the [`PaaImage`]: pyramid, statistics and computed taggs.
	///
	/// # Errors
	/// - [`DimensionError`][crate::PaaError::DimensionError]: zero-sized
	///   input, or a dimension beyond the width word.
	pub fn encode(&self) -> PaaResult<PaaImage> {
		PaaImage::from_rgba(self.image.clone())
	}


	/// Build and serialize in one step.
	///
	/// # Errors
	/// Same as [`encode`][Self::encode] plus
	/// [`PaaImage::to_bytes`] failures.
	pub fn encode_to_bytes(&self) -> PaaResult<Vec<u8>> {
		self.encode()?.to_bytes(self.format)
	}
}


#[test]
fn test_encoder_forced_format() {
	let image = crate::solid_rgba(8, 8, [1, 2, 3, 255]);

	// Opaque input would auto-pick DXT1; the override wins
	let bytes = PaaEncoder::with_image_and_format(image.clone(), PaaFormat::Dxt5)
		.encode_to_bytes()
		.unwrap();
	assert_eq!(&bytes[0..2], &[0x05, 0xFF]);

	let bytes = PaaEncoder::with_image(image).encode_to_bytes().unwrap();
	assert_eq!(&bytes[0..2], &[0x01, 0xFF]);
}
