use std::borrow::Cow;
use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt};
#[cfg(test)] use byteorder::ByteOrder;
use image::RgbaImage;
use static_assertions::const_assert;
use texpresso::Format as TextureFormat;

use crate::PaaResult;
use crate::PaaError::*;
use crate::PaaFormat;
use crate::pixconv;
use crate::ReadExt;
use crate::ExtendExt;
#[cfg(doc)] use crate::PaaImage;


/// Encoding of the in-memory pixel buffer of a [`PaaMipmap`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelRepr {
	/// Tightly packed RGBA8 rows, top-left origin.  Produced by the DXT
	/// decoder and by the image loader.
	Rgba8,

	/// Format-native bytes passed through from the container
	/// (uncompressed pixel formats).
	Native(PaaFormat),
}


/// A single level of the mipmap pyramid of a [`PaaImage`]
///
/// `data` holds logical pixels, not serialized payload: the container
/// reader decompresses DXT levels into RGBA8 rows and leaves the
/// uncompressed pixel formats as native bytes, as recorded by `repr`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaaMipmap {
	/// Width in pixels.  Must fit 15 bits; the width word's high bit is
	/// the LZO flag.
	pub width: u16,
	/// Height in pixels.
	pub height: u16,
	/// Encoding of `data`.
	pub repr: PixelRepr,
	/// The serialized payload of this level was LZO-wrapped in the input
	/// it was read from.
	pub lzo: bool,
	/// Pixel data per `repr`.
	pub data: Vec<u8>,
}


impl PaaMipmap {
	/// Wrap an RGBA8 image as a mipmap level.
	///
	/// # Errors
	/// - [`DimensionError`]: a dimension is zero, the width is beyond
	///   its 15 usable bits, or the height is beyond 16 bits.
	pub fn from_rgba(image: RgbaImage) -> PaaResult<Self> {
		let (w, h) = image.dimensions();

		if w == 0 || h == 0 || w > 0x7FFF || h > 0xFFFF {
			return Err(DimensionError(w, h));
		};

		#[allow(clippy::cast_possible_truncation)]
		let (width, height) = (w as u16, h as u16);

		Ok(PaaMipmap {
			width,
			height,
			repr: PixelRepr::Rgba8,
			lzo: false,
			data: image.into_raw(),
		})
	}


	/// Read one mipmap record: width word (with the LZO flag in the high
	/// bit), height word, 3-byte payload length, payload.  LZO-wrapped
	/// payloads are unwrapped; DXT payloads are then decompressed into
	/// RGBA8 rows; other pixel formats stay native.
	///
	/// # Errors
	/// - [`Truncated`], [`IoError`]: stream failure in the header words.
	/// - [`InvalidMipmap`]: zero dimension, payload shorter than
	///   declared, failed LZO unwrap, or a DXT payload that does not
	///   match the block-compressed size for the dimensions.
	/// - [`UnsupportedCompression`]: an uncompressed-format payload
	///   whose length differs from the raw pixel size (legacy
	///   entropy-coded mipmaps are not decoded by this codec).
	/// - [`ArithmeticOverflow`]: decompressed size overflows `usize`.
	///
	/// # Panics
	/// - If the LZO codec fails to initialize.
	pub fn read_from<R: Read>(input: &mut R, format: PaaFormat) -> PaaResult<Self> {
		let mut width = input.read_u16::<LittleEndian>()?;
		let height = input.read_u16::<LittleEndian>()?;

		let mut lzo = false;

		if width & 0x8000 != 0 {
			width ^= 0x8000;
			lzo = true;
		};

		if width == 0 || height == 0 {
			return Err(InvalidMipmap(width, height, 0));
		};

		const_assert!(std::mem::size_of::<usize>() >= 3);
		#[allow(clippy::cast_possible_truncation)]
		let payload_length = input.read_uint::<LittleEndian>(3)? as usize;

		let payload = input.read_exact_buffered(payload_length)
			.map_err(|e| if matches!(e, Truncated) { InvalidMipmap(width, height, payload_length) } else { e })?;

		let expected = encoded_len(format, width, height);

		let payload = if lzo {
			let lzo_codec = minilzo_rs::LZO::init().unwrap();
			lzo_codec.decompress_safe(&payload[..], expected)
				.map_err(|_| InvalidMipmap(width, height, payload_length))?
		}
		else {
			payload
		};

		if let Some(tex) = texture_format(format) {
			if payload.len() != expected {
				return Err(InvalidMipmap(width, height, payload.len()));
			};

			let buf_len = usize::from(width)
				.checked_mul(height.into())
				.and_then(|n| n.checked_mul(4))
				.ok_or(ArithmeticOverflow)?;

			let mut data = vec![0u8; buf_len];
			tex.decompress(&payload, width.into(), height.into(), &mut data);

			Ok(PaaMipmap { width, height, repr: PixelRepr::Rgba8, lzo, data })
		}
		else {
			if payload.len() != expected {
				// Legacy LZSS-coded payloads of old RGB PAAs land here
				return Err(UnsupportedCompression);
			};

			Ok(PaaMipmap { width, height, repr: PixelRepr::Native(format), lzo, data: payload })
		}
	}


	/// Decode this level into an [`image::RgbaImage`], converting native
	/// pixel formats as needed.
	///
	/// # Errors
	/// - [`InvalidMipmap`]: the pixel buffer does not match the
	///   dimensions.
	/// - [`InvalidBlock`]: a native buffer is not a whole number of
	///   pixels.
	pub fn to_rgba(&self) -> PaaResult<RgbaImage> {
		let bytes = self.rgba_bytes()?.into_owned();

		RgbaImage::from_vec(self.width.into(), self.height.into(), bytes)
			.ok_or(InvalidMipmap(self.width, self.height, self.data.len()))
	}


	/// Serialize this level for the given container format.
	///
	/// When `repr` already carries native bytes of the same format the
	/// payload is passed through byte-exactly; otherwise the pixels are
	/// converted to RGBA8 first and block-compressed (DXT1/DXT5) or
	/// packed (ARGB formats).
	///
	/// # Errors
	/// - [`UnsupportedCompression`]: `format` is Dxt2/3/4, or gray+alpha
	///   from a non-native source.
	/// - [`InvalidMipmap`], [`InvalidBlock`]: the pixel buffer is
	///   inconsistent with the dimensions.
	///
	/// # Panics
	/// - If a DXT format fails to map to its block codec (should never
	///   happen).
	pub fn encode(&self, format: PaaFormat) -> PaaResult<EncodedMipmap> {
		use PaaFormat::*;

		if let PixelRepr::Native(src) = self.repr {
			if src == format {
				return Ok(EncodedMipmap {
					width: self.width,
					height: self.height,
					lzo: false,
					payload: self.data.clone(),
				});
			};
		};

		let rgba = self.rgba_bytes()?;

		match format {
			Dxt1 | Dxt5 => {
				let tex = texture_format(format).expect("DXT format maps to a texture codec");
				let mut payload = vec![0u8; tex.compressed_size(self.width.into(), self.height.into())];
				let params = texpresso::Params {
					algorithm: texpresso::Algorithm::IterativeClusterFit,
					..Default::default()
				};
				tex.compress(&rgba, self.width.into(), self.height.into(), params, &mut payload);

				Ok(EncodedMipmap { width: self.width, height: self.height, lzo: false, payload })
			},

			Rgba4444 | Rgba5551 | Rgba8888 => {
				let payload = pixconv::from_rgba8(format, &rgba)?;
				Ok(EncodedMipmap { width: self.width, height: self.height, lzo: false, payload })
			},

			Dxt2 | Dxt3 | Dxt4 | GrayAlpha => Err(UnsupportedCompression),
		}
	}


	/// Byte count `data` must have for the current dimensions and
	/// representation.
	pub fn expected_data_len(&self) -> usize {
		match self.repr {
			PixelRepr::Rgba8 => usize::from(self.width) * usize::from(self.height) * 4,
			PixelRepr::Native(format) => format.predict_size(self.width, self.height),
		}
	}


	fn rgba_bytes(&self) -> PaaResult<Cow<[u8]>> {
		let bytes = match self.repr {
			PixelRepr::Rgba8 => Cow::Borrowed(&self.data[..]),
			PixelRepr::Native(src) => Cow::Owned(pixconv::to_rgba8(src, &self.data)?),
		};

		let expected = usize::from(self.width) * usize::from(self.height) * 4;

		if bytes.len() != expected {
			return Err(InvalidMipmap(self.width, self.height, bytes.len()));
		};

		Ok(bytes)
	}
}


/// A mipmap serialized for a specific container format: block-compressed
/// or packed payload, optionally LZO-wrapped
///
/// This is the transient form the container writer lays out and measures
/// before committing the offsets tagg.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedMipmap {
	/// Width in pixels; the LZO flag bit is applied on serialization.
	pub width: u16,
	/// Height in pixels.
	pub height: u16,
	/// Payload is LZO-wrapped.
	pub lzo: bool,
	/// Bytes exactly as they follow the mipmap header on disk.
	pub payload: Vec<u8>,
}


impl EncodedMipmap {
	/// On-disk size of the width/height/length header preceding the
	/// payload.
	pub const HEADER_LEN: usize = 2 + 2 + 3;


	/// LZO-wrap the payload in place.  The stored data length becomes
	/// the wrapped size; the flag is carried in the width word's high
	/// bit.  No-op if already wrapped.
	///
	/// # Errors
	/// - [`UnsupportedCompression`]: the LZO compressor rejected the
	///   payload.
	///
	/// # Panics
	/// - If the LZO codec fails to initialize.
	pub fn lzo_wrap(&mut self) -> PaaResult<()> {
		if self.lzo {
			return Ok(());
		};

		let mut lzo_codec = minilzo_rs::LZO::init().unwrap();
		self.payload = lzo_codec.compress(&self.payload[..])
			.map_err(|_| UnsupportedCompression)?;
		self.lzo = true;

		Ok(())
	}


	/// Serialize header and payload.
	///
	/// # Errors
	/// - [`DimensionError`]: the width does not fit 15 bits, or the
	///   payload length does not fit the 24-bit length field.
	pub fn to_bytes(&self) -> PaaResult<Vec<u8>> {
		if self.width >= 0x8000 {
			return Err(DimensionError(self.width.into(), self.height.into()));
		};

		const_assert!(std::mem::size_of::<usize>() >= 4);

		if self.payload.len() > 0xFF_FF_FF {
			return Err(DimensionError(self.width.into(), self.height.into()));
		};

		let mut bytes: Vec<u8> = Vec::with_capacity(self.payload.len() + Self::HEADER_LEN);

		let width = if self.lzo { self.width | 0x8000 } else { self.width };

		bytes.extend_with_uint::<LittleEndian, _, 2>(width);
		bytes.extend_with_uint::<LittleEndian, _, 2>(self.height);
		#[allow(clippy::cast_possible_truncation)]
		bytes.extend_with_uint::<LittleEndian, u32, 3>(self.payload.len() as u32);
		bytes.extend(&self.payload[..]);

		Ok(bytes)
	}
}


/// Map the DXT container formats to their block codec.
pub(crate) fn texture_format(format: PaaFormat) -> Option<TextureFormat> {
	use PaaFormat::*;

	match format {
		Dxt1 => Some(TextureFormat::Bc1),
		Dxt2 | Dxt3 => Some(TextureFormat::Bc2),
		Dxt4 | Dxt5 => Some(TextureFormat::Bc3),
		_ => None,
	}
}


/// Size of the serialized (pre-LZO) payload for the given format and
/// dimensions, with DXT partial blocks rounded up.
pub(crate) fn encoded_len(format: PaaFormat, width: u16, height: u16) -> usize {
	match texture_format(format) {
		Some(tex) => tex.compressed_size(width.into(), height.into()),
		None => format.predict_size(width, height),
	}
}


#[cfg(test)]
fn gradient_rgba(width: u32, height: u32) -> RgbaImage {
	RgbaImage::from_fn(width, height, |x, y| {
		#[allow(clippy::cast_possible_truncation)]
		image::Rgba([(x * 13) as u8, (y * 17) as u8, ((x + y) * 7) as u8, 255])
	})
}


#[test]
fn test_dxt1_roundtrip_quality() {
	let image = gradient_rgba(16, 16);
	let mip = PaaMipmap::from_rgba(image.clone()).unwrap();

	let encoded = mip.encode(crate::PaaFormat::Dxt1).unwrap();
	assert_eq!(encoded.payload.len(), 16 * 16 / 2);

	let bytes = encoded.to_bytes().unwrap();
	assert_eq!(bytes.len(), EncodedMipmap::HEADER_LEN + 128);

	let mut cursor = std::io::Cursor::new(&bytes);
	let decoded = PaaMipmap::read_from(&mut cursor, crate::PaaFormat::Dxt1).unwrap();
	assert_eq!((decoded.width, decoded.height), (16, 16));
	assert_eq!(decoded.repr, PixelRepr::Rgba8);

	let mut error = [0u64; 4];
	for (a, b) in image.as_raw().chunks(4).zip(decoded.data.chunks(4)) {
		for c in 0..4 {
			error[c] += u64::from(a[c].abs_diff(b[c]));
		};
	};

	let pixels = 16u64 * 16;
	for (c, sum) in error.iter().enumerate() {
		assert!(sum / pixels <= 8, "mean channel {c} error {} exceeds the DXT1 bound", sum / pixels);
	};

	// Opaque input stays opaque through the 1-bit alpha mode
	assert_eq!(error[3], 0);
}


#[test]
fn test_dxt5_alpha_quality() {
	let mut image = gradient_rgba(8, 8);
	for (i, pixel) in image.pixels_mut().enumerate() {
		#[allow(clippy::cast_possible_truncation)]
		{ pixel.0[3] = (i * 4) as u8 };
	};

	let mip = PaaMipmap::from_rgba(image.clone()).unwrap();
	let encoded = mip.encode(crate::PaaFormat::Dxt5).unwrap();
	assert_eq!(encoded.payload.len(), 8 * 8);

	let bytes = encoded.to_bytes().unwrap();
	let mut cursor = std::io::Cursor::new(&bytes);
	let decoded = PaaMipmap::read_from(&mut cursor, crate::PaaFormat::Dxt5).unwrap();

	let mut alpha_error = 0u64;
	for (a, b) in image.as_raw().chunks(4).zip(decoded.data.chunks(4)) {
		alpha_error += u64::from(a[3].abs_diff(b[3]));
	};

	assert!(alpha_error / 64 <= 8);
}


#[test]
fn test_lzo_wrap_roundtrip() {
	let image = gradient_rgba(8, 8);
	let mip = PaaMipmap::from_rgba(image).unwrap();

	let plain = mip.encode(crate::PaaFormat::Dxt1).unwrap();

	let mut wrapped = plain.clone();
	wrapped.lzo_wrap().unwrap();
	assert!(wrapped.lzo);

	let bytes = wrapped.to_bytes().unwrap();

	// Width word carries the flag; the length field holds the wrapped size
	assert_ne!(LittleEndian::read_u16(&bytes[0..2]) & 0x8000, 0);
	assert_eq!(bytes.len(), EncodedMipmap::HEADER_LEN + wrapped.payload.len());

	let mut cursor = std::io::Cursor::new(&bytes);
	let decoded = PaaMipmap::read_from(&mut cursor, crate::PaaFormat::Dxt1).unwrap();
	assert!(decoded.lzo);

	let mut cursor = std::io::Cursor::new(plain.to_bytes().unwrap());
	let plain_decoded = PaaMipmap::read_from(&mut cursor, crate::PaaFormat::Dxt1).unwrap();

	assert_eq!(decoded.data, plain_decoded.data);
}


#[test]
fn test_native_passthrough() {
	let data: Vec<u8> = (0..32u8).collect();
	let mip = PaaMipmap {
		width: 4,
		height: 4,
		repr: PixelRepr::Native(crate::PaaFormat::Rgba4444),
		lzo: false,
		data: data.clone(),
	};

	let encoded = mip.encode(crate::PaaFormat::Rgba4444).unwrap();
	assert_eq!(encoded.payload, data);
}


#[test]
fn test_partial_block_rounds_up() {
	let image = gradient_rgba(6, 6);
	let mip = PaaMipmap::from_rgba(image).unwrap();

	let encoded = mip.encode(crate::PaaFormat::Dxt1).unwrap();
	// Two by two blocks of 8 bytes, not 6*6/2
	assert_eq!(encoded.payload.len(), 32);

	let bytes = encoded.to_bytes().unwrap();
	let mut cursor = std::io::Cursor::new(&bytes);
	let decoded = PaaMipmap::read_from(&mut cursor, crate::PaaFormat::Dxt1).unwrap();
	assert_eq!(decoded.data.len(), 6 * 6 * 4);
}


#[test]
fn test_legacy_lzss_reported_unsupported() {
	// 4x4 ARGB4444 mipmap whose payload length differs from the raw
	// pixel size: an LZSS stream this codec does not decode
	let mut bytes: Vec<u8> = vec![];
	bytes.extend_with_uint::<LittleEndian, _, 2>(4u16);
	bytes.extend_with_uint::<LittleEndian, _, 2>(4u16);
	bytes.extend_with_uint::<LittleEndian, u32, 3>(10u32);
	bytes.extend([0u8; 10]);

	let mut cursor = std::io::Cursor::new(&bytes);
	let result = PaaMipmap::read_from(&mut cursor, crate::PaaFormat::Rgba4444);
	assert!(matches!(result, Err(UnsupportedCompression)));
}


#[test]
fn test_reject_unencodable_targets() {
	let mip = PaaMipmap::from_rgba(gradient_rgba(4, 4)).unwrap();

	for format in [crate::PaaFormat::Dxt2, crate::PaaFormat::Dxt3, crate::PaaFormat::Dxt4, crate::PaaFormat::GrayAlpha] {
		assert!(matches!(mip.encode(format), Err(UnsupportedCompression)));
	};
}


#[test]
fn test_dxt234_decode_only() {
	// Hand-built BC2 block: explicit full alpha, solid red endpoints,
	// all indices selecting the first color
	let mut block = vec![0xFFu8; 8];
	block.extend([0x00, 0xF8, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);

	let mut bytes: Vec<u8> = vec![];
	bytes.extend_with_uint::<LittleEndian, _, 2>(4u16);
	bytes.extend_with_uint::<LittleEndian, _, 2>(4u16);
	bytes.extend_with_uint::<LittleEndian, u32, 3>(16u32);
	bytes.extend(&block);

	for format in [crate::PaaFormat::Dxt2, crate::PaaFormat::Dxt3] {
		let mut cursor = std::io::Cursor::new(&bytes);
		let decoded = PaaMipmap::read_from(&mut cursor, format).unwrap();
		assert_eq!((decoded.width, decoded.height), (4, 4));
		assert_eq!(decoded.repr, PixelRepr::Rgba8);
		assert!(decoded.data.chunks(4).all(|p| p == [255, 0, 0, 255]));
	};

	// DXT4 shares the BC3 codec with DXT5
	let mip = PaaMipmap::from_rgba(gradient_rgba(8, 8)).unwrap();
	let bytes = mip.encode(crate::PaaFormat::Dxt5).unwrap().to_bytes().unwrap();

	let mut cursor = std::io::Cursor::new(&bytes);
	let as_dxt4 = PaaMipmap::read_from(&mut cursor, crate::PaaFormat::Dxt4).unwrap();
	let mut cursor = std::io::Cursor::new(&bytes);
	let as_dxt5 = PaaMipmap::read_from(&mut cursor, crate::PaaFormat::Dxt5).unwrap();
	assert_eq!(as_dxt4.data, as_dxt5.data);
}


#[test]
fn test_tall_mipmap_header() {
	let tall = EncodedMipmap { width: 4, height: 40_000, lzo: false, payload: vec![0u8; 8] };
	let bytes = tall.to_bytes().unwrap();
	assert_eq!(LittleEndian::read_u16(&bytes[0..2]), 4);
	assert_eq!(LittleEndian::read_u16(&bytes[2..4]), 40_000);

	let wide = EncodedMipmap { width: 40_000, height: 4, lzo: false, payload: vec![0u8; 8] };
	assert!(matches!(wide.to_bytes(), Err(DimensionError(40_000, 4))));
}


#[test]
fn test_zero_width_is_invalid() {
	let mut bytes: Vec<u8> = vec![];
	bytes.extend_with_uint::<LittleEndian, _, 2>(0u16);
	bytes.extend_with_uint::<LittleEndian, _, 2>(4u16);
	bytes.extend_with_uint::<LittleEndian, u32, 3>(0u32);

	let mut cursor = std::io::Cursor::new(&bytes);
	assert!(matches!(
		PaaMipmap::read_from(&mut cursor, crate::PaaFormat::Dxt1),
		Err(InvalidMipmap(0, 4, 0))
	));
}
