use byteorder::{LittleEndian, ByteOrder};

use crate::PaaResult;
use crate::PaaError::*;
use crate::PaaFormat;


/// Decode format-native bytes into tightly packed RGBA8 rows.
pub(crate) fn to_rgba8(format: PaaFormat, data: &[u8]) -> PaaResult<Vec<u8>> {
	use PaaFormat::*;

	match format {
		Rgba4444 => argb4444_to_rgba8888(data),
		Rgba5551 => argb1555_to_rgba8888(data),
		Rgba8888 => reverse_channel_order(data),
		GrayAlpha => ai88_to_rgba8888(data),
		f => Err(UnsupportedFormat(f)),
	}
}


/// Pack tightly packed RGBA8 rows into format-native bytes.
///
/// Gray+alpha has no RGBA-sourced encoder; textures of that format only
/// round-trip natively.
pub(crate) fn from_rgba8(format: PaaFormat, data: &[u8]) -> PaaResult<Vec<u8>> {
	use PaaFormat::*;

	match format {
		Rgba4444 => rgba8888_to_argb4444(data),
		Rgba5551 => rgba8888_to_argb1555(data),
		Rgba8888 => reverse_channel_order(data),
		_ => Err(UnsupportedCompression),
	}
}


/// Rescale an unsigned subpixel between bit widths, rounding to nearest.
const fn scale_subpixel(value: u8, from_bits: u8, into_bits: u8) -> u8 {
	let range_from = (1u32 << from_bits) - 1;
	let range_into = (1u32 << into_bits) - 1;
	let bias = range_from / 2; // needed for symmetry
	((value as u32 * range_into + bias) / range_from) as u8
}


fn argb4444_to_rgba8888(data: &[u8]) -> PaaResult<Vec<u8>> {
	if data.len() % 2 != 0 {
		return Err(InvalidBlock);
	};

	let mut result = Vec::with_capacity(data.len() * 2);

	for pixel in data.chunks(2) {
		let v = LittleEndian::read_u16(pixel);

		let a = ((v >> 12) & 0x0F) as u8;
		let r = ((v >> 8) & 0x0F) as u8;
		let g = ((v >> 4) & 0x0F) as u8;
		let b = (v & 0x0F) as u8;

		result.extend([
			scale_subpixel(r, 4, 8),
			scale_subpixel(g, 4, 8),
			scale_subpixel(b, 4, 8),
			scale_subpixel(a, 4, 8),
		]);
	};

	Ok(result)
}


fn rgba8888_to_argb4444(data: &[u8]) -> PaaResult<Vec<u8>> {
	if data.len() % 4 != 0 {
		return Err(InvalidBlock);
	};

	let mut result = Vec::with_capacity(data.len() / 2);

	for pixel in data.chunks(4) {
		let a = u16::from(scale_subpixel(pixel[3], 8, 4));
		let r = u16::from(scale_subpixel(pixel[0], 8, 4));
		let g = u16::from(scale_subpixel(pixel[1], 8, 4));
		let b = u16::from(scale_subpixel(pixel[2], 8, 4));

		let v = a << 12 | r << 8 | g << 4 | b;

		result.extend(v.to_le_bytes());
	};

	Ok(result)
}


fn argb1555_to_rgba8888(data: &[u8]) -> PaaResult<Vec<u8>> {
	if data.len() % 2 != 0 {
		return Err(InvalidBlock);
	};

	let mut result = Vec::with_capacity(data.len() * 2);

	for pixel in data.chunks(2) {
		let v = LittleEndian::read_u16(pixel);

		let a = (v >> 15) as u8;
		let r = ((v >> 10) & 0x1F) as u8;
		let g = ((v >> 5) & 0x1F) as u8;
		let b = (v & 0x1F) as u8;

		result.extend([
			scale_subpixel(r, 5, 8),
			scale_subpixel(g, 5, 8),
			scale_subpixel(b, 5, 8),
			a * 0xFF,
		]);
	};

	Ok(result)
}


fn rgba8888_to_argb1555(data: &[u8]) -> PaaResult<Vec<u8>> {
	if data.len() % 4 != 0 {
		return Err(InvalidBlock);
	};

	let mut result = Vec::with_capacity(data.len() / 2);

	for pixel in data.chunks(4) {
		let a = u16::from(scale_subpixel(pixel[3], 8, 1));
		let r = u16::from(scale_subpixel(pixel[0], 8, 5));
		let g = u16::from(scale_subpixel(pixel[1], 8, 5));
		let b = u16::from(scale_subpixel(pixel[2], 8, 5));

		let v = a << 15 | r << 10 | g << 5 | b;

		result.extend(v.to_le_bytes());
	};

	Ok(result)
}


// The 8888 layout is RGBA8 with the channel order reversed per pixel;
// the transform is its own inverse
fn reverse_channel_order(data: &[u8]) -> PaaResult<Vec<u8>> {
	if data.len() % 4 != 0 {
		return Err(InvalidBlock);
	};

	let mut result = Vec::with_capacity(data.len());

	for pixel in data.chunks(4) {
		result.extend(pixel.iter().rev());
	};

	Ok(result)
}


fn ai88_to_rgba8888(data: &[u8]) -> PaaResult<Vec<u8>> {
	if data.len() % 2 != 0 {
		return Err(InvalidBlock);
	};

	let mut result = Vec::with_capacity(data.len() * 2);

	for pixel in data.chunks(2) {
		let [gray, alpha] = [pixel[0], pixel[1]];
		result.extend([gray, gray, gray, alpha]);
	};

	Ok(result)
}


#[test]
fn test_argb1555_bytes() {
	let purple_rgba = vec![0x6B, 0x00, 0x94, 0xFF];
	let purple_1555 = vec![0x12, 0xB4];
	assert_eq!(from_rgba8(PaaFormat::Rgba5551, &purple_rgba).unwrap(), purple_1555);
	assert_eq!(to_rgba8(PaaFormat::Rgba5551, &purple_1555).unwrap(), purple_rgba);

	let manual_1555 = vec![0x12, 0x34];
	let manual_rgba = vec![0x6B, 0x00, 0x94, 0x00];
	assert_eq!(from_rgba8(PaaFormat::Rgba5551, &manual_rgba).unwrap(), manual_1555);
	assert_eq!(to_rgba8(PaaFormat::Rgba5551, &manual_1555).unwrap(), manual_rgba);
}


#[test]
fn test_argb4444_bytes() {
	let native = vec![0x12u8, 0xB4];
	let rgba = to_rgba8(PaaFormat::Rgba4444, &native).unwrap();
	assert_eq!(rgba, vec![68, 17, 34, 187]);
	assert_eq!(from_rgba8(PaaFormat::Rgba4444, &rgba).unwrap(), native);
}


#[test]
fn test_argb8888_reversal_is_involution() {
	let native = vec![1u8, 2, 3, 4, 5, 6, 7, 8];
	let rgba = to_rgba8(PaaFormat::Rgba8888, &native).unwrap();
	assert_eq!(rgba, vec![4, 3, 2, 1, 8, 7, 6, 5]);
	assert_eq!(from_rgba8(PaaFormat::Rgba8888, &rgba).unwrap(), native);
}


#[test]
fn test_gray_alpha_decodes() {
	let native = vec![0x40u8, 0x80, 0xFF, 0x00];
	let rgba = to_rgba8(PaaFormat::GrayAlpha, &native).unwrap();
	assert_eq!(rgba, vec![0x40, 0x40, 0x40, 0x80, 0xFF, 0xFF, 0xFF, 0x00]);

	assert!(matches!(from_rgba8(PaaFormat::GrayAlpha, &rgba), Err(UnsupportedCompression)));
}


#[test]
fn test_odd_length_is_invalid() {
	assert!(matches!(to_rgba8(PaaFormat::Rgba4444, &[0u8; 3]), Err(InvalidBlock)));
	assert!(matches!(from_rgba8(PaaFormat::Rgba5551, &[0u8; 5]), Err(InvalidBlock)));
}
