#![warn(missing_docs, unreachable_pub, clippy::all)]
#![warn(clippy::missing_errors_doc, clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::wildcard_imports, clippy::enum_glob_use)]


#![doc = include_str!("../README.md")]


mod macros;
mod imageops;
mod pixconv;
mod mipmap;
mod decode;
mod encode;
mod paa;

pub use mipmap::*;
pub use decode::*;
pub use encode::*;
pub use paa::*;


use std::io::{Read, Seek, SeekFrom, Cursor};
use std::iter::Extend;

#[cfg(feature = "arbitrary")] use arbitrary::{Arbitrary, Unstructured, Result as ArbitraryResult};
use bstr::BString;
use byteorder::{LittleEndian, ByteOrder, ReadBytesExt};
#[cfg(test)] use byteorder::BigEndian;
use deku::prelude::*;
use derive_more::{Display, Error};
use enum_utils::FromStr;
use image::RgbaImage;
use static_assertions::const_assert;
use tap::prelude::*;

use PaaError::*;

/// [`std::result::Result`] parameterized with [`PaaError`]
pub type PaaResult<T> = Result<T, PaaError>;


/// `rvpaa`'s [`std::error::Error`]
#[derive(Debug, Display, Error, Clone)]
#[non_exhaustive]
pub enum PaaError {
	/// The input stream ended in the middle of a record.
	#[display(fmt = "Unexpected end of input")]
	Truncated,

	/// Unexpected I/O error that is not an early EOF.
	#[display(fmt = "Unexpected I/O error: {:?}", _0)]
	IoError(#[error(ignore)] std::io::ErrorKind),

	/// Unexpected integer conversion error.
	#[display(fmt = "Unexpected integer conversion error: {}", _0)]
	UnexpectedTryFromIntError(std::num::TryFromIntError),

	/// The magic word at offset 0 does not map to a known pixel format.
	#[display(fmt = "Unknown PAA magic: {:02x?}", _0)]
	UnknownMagic(#[error(ignore)] [u8; 2]),

	/// A tagg's declared payload length is inconsistent with its
	/// signature or with the remaining bytes of the stream.
	#[display(fmt = "Malformed TAGG record")]
	InvalidTagg,

	/// A mipmap's dimensions or declared data length are inconsistent,
	/// or its payload does not decompress to the size computed from its
	/// dimensions and pixel format.  Members are width, height and the
	/// actual payload size.
	#[error(ignore)]
	#[display(fmt = "Malformed {}x{} mipmap (payload size {})", _0, _1, _2)]
	InvalidMipmap(u16, u16, usize),

	/// Encountered a compression scheme this codec does not implement
	/// (legacy entropy-coded mipmaps), or a serialization target it
	/// cannot encode (DXT2/3/4, gray+alpha from RGBA source).
	#[display(fmt = "Unsupported PAA compression scheme or encoding target")]
	UnsupportedCompression,

	/// Decoding was requested for a pixel format this build does not
	/// handle.
	#[display(fmt = "Unsupported pixel format: {:?}", _0)]
	UnsupportedFormat(#[error(ignore)] PaaFormat),

	/// Zero-sized or out-of-range image: the width does not fit the 15
	/// usable bits of the width word (the high bit is the LZO flag), the
	/// height does not fit 16 bits, or a payload length does not fit the
	/// 24-bit mipmap length field.  Members are width and height.
	#[error(ignore)]
	#[display(fmt = "Image dimensions out of range: {}x{}", _0, _1)]
	DimensionError(u32, u32),

	/// A pixel block is structurally invalid (its size is not a multiple
	/// of the pixel or block stride).
	#[display(fmt = "Structurally invalid pixel block")]
	InvalidBlock,

	/// More mipmaps than the 16 slots of the offsets tagg can describe.
	#[display(fmt = "Mipmap count overflows the 16-slot offsets tagg")]
	TooManyMipmaps,

	/// The palette blob length overflows its 16-bit length prefix.
	#[display(fmt = "Palette length overflows a u16")]
	PaletteTooLarge,

	/// A checked size computation triggered an unexpected overflow.
	#[display(fmt = "A checked size computation triggered an unexpected overflow")]
	ArithmeticOverflow,

	/// A mipmap index is out of range for the current pyramid.
	#[display(fmt = "Mipmap index out of range")]
	MipmapIndexOutOfRange,

	/// The image I/O collaborator failed to decode or encode a raster
	/// file.
	#[display(fmt = "Image file error: {}", _0)]
	ImageError(#[error(ignore)] String),
}


impl From<std::io::Error> for PaaError {
	fn from(error: std::io::Error) -> Self {
		match error.kind() {
			std::io::ErrorKind::UnexpectedEof => Truncated,
			kind => IoError(kind),
		}
	}
}


impl From<std::num::TryFromIntError> for PaaError {
	fn from(error: std::num::TryFromIntError) -> Self {
		UnexpectedTryFromIntError(error)
	}
}


impl From<image::ImageError> for PaaError {
	fn from(error: image::ImageError) -> Self {
		match error {
			image::ImageError::IoError(e) => e.into(),
			e => ImageError(e.to_string()),
		}
	}
}


/// Pixel format shared by all mipmaps of a PAA, identified by the magic
/// word at file offset 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromStr, DekuRead, DekuWrite)]
#[cfg_attr(feature = "arbitrary", derive(Arbitrary))]
#[enumeration(case_insensitive)]
#[deku(id_type = "u16", endian = "little")]
pub enum PaaFormat {
	/// DXT1 (BC1): RGB with 1-bit alpha, 8 bytes per 4x4 block.
	#[deku(id = "0xFF_01")]
	Dxt1,

	/// DXT2 (BC2, premultiplied alpha).  Decode only.
	#[deku(id = "0xFF_02")]
	Dxt2,

	/// DXT3 (BC2).  Decode only.
	#[deku(id = "0xFF_03")]
	Dxt3,

	/// DXT4 (BC3, premultiplied alpha).  Decode only.
	#[deku(id = "0xFF_04")]
	Dxt4,

	/// DXT5 (BC3): RGBA, 16 bytes per 4x4 block.
	#[deku(id = "0xFF_05")]
	Dxt5,

	/// ARGB 4:4:4:4 in a little-endian 2-byte integer.
	#[deku(id = "0x44_44")]
	Rgba4444,

	/// ARGB 1:5:5:5 in a little-endian 2-byte integer.
	#[deku(id = "0x15_55")]
	Rgba5551,

	/// 32-bit color, stored channel-reversed relative to RGBA8 rows.
	#[deku(id = "0x88_88")]
	Rgba8888,

	/// 8 bits grayscale, 8 bits alpha.
	#[deku(id = "0x80_80")]
	GrayAlpha,
}


impl Default for PaaFormat {
	/// Returns [`Dxt5`][`PaaFormat::Dxt5`].
	fn default() -> Self {
		PaaFormat::Dxt5
	}
}


impl PaaFormat {
	/// Calculate the size in bytes of serialized mipmap data from its
	/// dimensions in pixels.
	///
	/// For the DXT formats this is exact only when both dimensions are
	/// multiples of the 4-pixel block side; the mipmap codec rounds
	/// partial blocks up.
	pub const fn predict_size(&self, width: u16, height: u16) -> usize {
		use PaaFormat::*;

		const_assert!(std::mem::size_of::<usize>() >= 4);

		let mut result = width as usize * height as usize;

		match self {
			Dxt1 => { result /= 2 },
			Dxt2 | Dxt3 | Dxt4 | Dxt5 => (),
			Rgba4444 | Rgba5551 | GrayAlpha => { result *= 2 },
			Rgba8888 => { result *= 4 },
		};

		result
	}


	/// Return true if the [`PaaFormat`] is DXTn.
	///
	/// # Example
	/// ```
	/// # use rvpaa::PaaFormat;
	/// assert!(PaaFormat::Dxt5.is_dxtn());
	/// assert!(!PaaFormat::Rgba4444.is_dxtn());
	/// ```
	pub const fn is_dxtn(&self) -> bool {
		use PaaFormat::*;
		matches!(self, Dxt1 | Dxt2 | Dxt3 | Dxt4 | Dxt5)
	}
}


/// The color data used in the average and maximum color taggs, stored in
/// R:G:B:A byte order
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, DekuRead, DekuWrite)]
#[cfg_attr(feature = "arbitrary", derive(Arbitrary))]
pub struct Rgba8888Pixel {
	#[allow(missing_docs)]
	pub r: u8,
	#[allow(missing_docs)]
	pub g: u8,
	#[allow(missing_docs)]
	pub b: u8,
	#[allow(missing_docs)]
	pub a: u8,
}


impl std::fmt::Display for Rgba8888Pixel {
	#[allow(clippy::cast_lossless)]
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "<r={:.3}> <g={:.3}> <b={:.3}> <a={:.3}>",
			self.r as f32 / 255.0, self.g as f32 / 255.0, self.b as f32 / 255.0, self.a as f32 / 255.0)
	}
}


impl From<image::Rgba<u8>> for Rgba8888Pixel {
	fn from(rgba: image::Rgba<u8>) -> Self {
		let [r, g, b, a] = rgba.0;
		Self { r, g, b, a }
	}
}


/// Alpha interpolation mode recorded in the transparency flag tagg
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, DekuRead, DekuWrite)]
#[cfg_attr(feature = "arbitrary", derive(Arbitrary))]
#[deku(id_type = "u8")]
pub enum Transparency {
	/// Transparency disabled
	#[display(fmt = "<no transparency>")]
	#[deku(id = "0x00")]
	None,

	/// Transparency enabled, alpha channel interpolation enabled
	#[display(fmt = "<transparent, interpolated alpha>")]
	#[deku(id = "0x01")]
	AlphaInterpolated,

	/// Transparency enabled, alpha channel interpolation disabled
	#[display(fmt = "<transparent, non-interpolated alpha>")]
	#[deku(id = "0x02")]
	AlphaNotInterpolated,
}


impl Default for Transparency {
	fn default() -> Self {
		Transparency::AlphaInterpolated
	}
}


/// Metadata record from the PAA header
///
/// The computed kinds ([`Avgc`][Self::Avgc], [`Maxc`][Self::Maxc],
/// [`Flag`][Self::Flag]) are rebuilt from pixel data whenever the pyramid
/// is regenerated; [`Offs`][Self::Offs] is always rebuilt by the
/// container writer; any other signature round-trips verbatim as
/// [`Foreign`][Self::Foreign].
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum Tagg {
	/// Average color over the top mipmap.
	#[display(fmt = "Avgc {{ {} }}", rgba)]
	Avgc {
		/// Channel-wise integer mean.
		rgba: Rgba8888Pixel,
	},

	/// Maximum color over the top mipmap.
	#[display(fmt = "Maxc {{ {} }}", rgba)]
	Maxc {
		/// Channel-wise maximum.
		rgba: Rgba8888Pixel,
	},

	/// Transparency flag.
	#[display(fmt = "Flag {{ {} }}", transparency)]
	Flag {
		/// Texture transparency type.
		transparency: Transparency,
	},

	/// Mipmap offsets table.
	#[display(fmt = "{:X?}", self)]
	Offs {
		/// Absolute byte offsets from file start to each mipmap header.
		offsets: Vec<u32>,
	},

	/// Any signature this codec does not compute; preserved bit-exactly.
	#[display(fmt = "{:?}", self)]
	Foreign {
		/// The 8 signature bytes in on-disk order.
		signature: [u8; 8],
		/// Uninterpreted payload.
		payload: BString,
	},
}


impl Tagg {
	const SIG_AVGC: [u8; 8] = *b"GGATCGVA";
	const SIG_MAXC: [u8; 8] = *b"GGATCXAM";
	const SIG_FLAG: [u8; 8] = *b"GGATGALF";
	const SIG_OFFS: [u8; 8] = *b"GGATSFFO";

	/// Slot count of the offsets table; the tagg payload is always
	/// `4 * OFFS_SLOTS` bytes with unused slots zero.
	pub const OFFS_SLOTS: usize = 16;


	/// Return the 8 signature bytes as they appear on disk (e.g.
	/// `"GGATSFFO"` for the offsets tagg).
	pub fn signature(&self) -> [u8; 8] {
		match self {
			Self::Avgc { .. } => Self::SIG_AVGC,
			Self::Maxc { .. } => Self::SIG_MAXC,
			Self::Flag { .. } => Self::SIG_FLAG,
			Self::Offs { .. } => Self::SIG_OFFS,
			Self::Foreign { signature, .. } => *signature,
		}
	}


	/// Return true for the tagg kinds that are computed from pixel data
	/// ([`Avgc`][Self::Avgc], [`Maxc`][Self::Maxc], [`Flag`][Self::Flag]).
	pub const fn is_computed(&self) -> bool {
		matches!(self, Self::Avgc { .. } | Self::Maxc { .. } | Self::Flag { .. })
	}


	/// Serialize into PAA-ready data: signature, little-endian payload
	/// length, payload.
	///
	/// # Panics
	/// - If [`deku::DekuContainerWrite::to_bytes()`] fails.
	pub fn to_bytes(&self) -> Vec<u8> {
		#[allow(clippy::cast_possible_truncation)]
		const U32_SIZE: u32 = std::mem::size_of::<u32>() as u32;

		let mut bytes: Vec<u8> = Vec::with_capacity(96);
		bytes.extend(self.signature());

		match self {
			Self::Avgc { rgba } | Self::Maxc { rgba } => {
				bytes.extend_with_uint::<LittleEndian, _, 4>(U32_SIZE);
				bytes.extend(rgba.to_bytes().unwrap());
			},

			Self::Flag { transparency } => {
				bytes.extend_with_uint::<LittleEndian, _, 4>(U32_SIZE);
				bytes.extend(transparency.to_bytes().unwrap());
				bytes.extend([0xFFu8, 0xFF, 0xFF]);
			},

			Self::Offs { offsets } => {
				#[allow(clippy::cast_possible_truncation)]
				let len = (Self::OFFS_SLOTS * std::mem::size_of::<u32>()) as u32;
				bytes.extend_with_uint::<LittleEndian, _, 4>(len);

				let mut buf = [0u8; Self::OFFS_SLOTS * 4];
				let mut offsets = offsets.clone();
				if offsets.len() != Self::OFFS_SLOTS {
					offsets.resize(Self::OFFS_SLOTS, 0);
				};

				LittleEndian::write_u32_into(&offsets[..], &mut buf);
				bytes.extend(&buf);
			},

			Self::Foreign { payload, .. } => {
				// Payloads read from a file always fit; the length field
				// they came from is a u32
				#[allow(clippy::cast_possible_truncation)]
				let len = payload.len() as u32;
				bytes.extend_with_uint::<LittleEndian, _, 4>(len);
				bytes.extend(&payload[..]);
			},
		};

		bytes
	}


	/// Construct a [`Tagg`] from its on-disk signature and payload.
	/// Unrecognized signatures yield [`Foreign`][Self::Foreign].
	///
	/// # Errors
	/// - [`InvalidTagg`]: a recognized signature carries a payload of an
	///   unexpected length, or a transparency byte with an unknown value.
	///
	/// # Panics
	/// - If [`deku::DekuContainerRead::from_bytes`] fails on a 4-byte
	///   color payload (should never happen).
	pub fn from_signature_and_payload(signature: [u8; 8], payload: &[u8]) -> PaaResult<Self> {
		match signature {
			Self::SIG_AVGC | Self::SIG_MAXC => {
				if payload.len() != 4 {
					return Err(InvalidTagg);
				};

				let (_, rgba) = Rgba8888Pixel::from_bytes((payload, 0)).unwrap();

				if signature == Self::SIG_AVGC {
					Ok(Self::Avgc { rgba })
				}
				else {
					Ok(Self::Maxc { rgba })
				}
			},

			Self::SIG_FLAG => {
				if payload.len() != 4 {
					return Err(InvalidTagg);
				};

				let (_, transparency) = Transparency::from_bytes((&payload[0..1], 0))
					.map_err(|_| InvalidTagg)?;
				Ok(Self::Flag { transparency })
			},

			Self::SIG_OFFS => {
				// [NOTE] Offset tables that are not of length 16 do not
				// apparently occur; we allow them nonetheless
				if payload.len() % std::mem::size_of::<u32>() != 0 {
					return Err(InvalidTagg);
				};

				let slot_count = payload.len() / std::mem::size_of::<u32>();
				let mut offsets = vec![0u32; slot_count];

				LittleEndian::read_u32_into(payload, &mut offsets[..]);

				if let Some(idx) = offsets.iter().position(|x| *x == 0) {
					offsets.truncate(idx);
				};

				Ok(Self::Offs { offsets })
			},

			_ => Ok(Self::Foreign { signature, payload: BString::from(payload) }),
		}
	}


	/// Try to read a [`Tagg`] from a [`Read`][std::io::Read].  Returns
	/// `Ok(None)` when the next byte is the tagg-list terminator (the
	/// low byte of the palette length word), leaving the stream
	/// untouched.  If a read fails mid-record, this function seeks back
	/// to the starting position before returning the error.
	///
	/// # Errors
	/// - [`Truncated`], [`IoError`]: stream failure while reading the
	///   signature or length words.
	/// - [`InvalidTagg`]: declared payload length exceeds the remaining
	///   bytes, or a recognized signature carries a malformed payload.
	///
	/// # Panics
	/// - If the backtracking seek fails after an error occurs.
	pub fn read_from<R: Read + Seek>(input: &mut R) -> PaaResult<Option<Self>> {
		if peek_u8(input)? == 0 {
			return Ok(None);
		};

		let start_position = input.stream_position()?;

		let get_tagg = |input: &mut R| -> PaaResult<Self> {
			let mut signature = [0u8; 8];
			input.read_exact(&mut signature)?;
			let payload_length = input.read_u32::<LittleEndian>()?;
			let payload = input.read_exact_buffered(payload_length.try_into()?)
				.map_err(|e| if matches!(e, Truncated) { InvalidTagg } else { e })?;
			Tagg::from_signature_and_payload(signature, &payload)
		};

		let tagg = get_tagg(input)
			.tap_err(|_| { let _ = input.seek(SeekFrom::Start(start_position)).expect("Backtracking seek failed"); })?;

		Ok(Some(tagg))
	}
}


#[cfg(feature = "arbitrary")]
impl<'a> Arbitrary<'a> for Tagg {
	fn arbitrary(input: &mut Unstructured) -> ArbitraryResult<Self> {
		use Tagg::*;

		let variant: usize = input.int_in_range(1..=5)?;

		let result = match variant {
			1 => Avgc { rgba: input.arbitrary()? },

			2 => Maxc { rgba: input.arbitrary()? },

			3 => Flag { transparency: input.arbitrary()? },

			4 => {
				let slot_count: usize = input.int_in_range(0..=Self::OFFS_SLOTS)?;
				let mut offsets: Vec<u32> = vec![0u32; slot_count];

				for o in &mut offsets {
					*o = input.arbitrary()?;
				};

				if let Some(idx) = offsets.iter().position(|x| *x == 0) {
					offsets.truncate(idx);
				};

				Offs { offsets }
			},

			5 => {
				let mut signature = [0u8; 8];
				input.fill_buffer(&mut signature)?;
				let payload = BString::from(<Vec<u8> as Arbitrary>::arbitrary(input)?);
				Foreign { signature, payload }
			},

			_ => unreachable!(),
		};

		Ok(result)
	}
}


/// Opaque palette blob preserved across round-trips
///
/// The container stores it as a 16-bit byte count followed by the bytes;
/// this codec never generates palette data of its own.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Palette {
	/// Raw palette bytes; empty means no palette.
	pub data: Vec<u8>,
}


impl Palette {
	/// Return true if the palette is absent.
	pub fn is_empty(&self) -> bool {
		self.data.is_empty()
	}


	/// Serialize as a length word followed by the blob.
	///
	/// # Errors
	/// - [`PaletteTooLarge`]: the blob length overflows a [`u16`].
	pub fn to_bytes(&self) -> PaaResult<Vec<u8>> {
		const_assert!(std::mem::size_of::<usize>() >= std::mem::size_of::<u16>());

		let length: u16 = self.data.len().try_into().map_err(|_| PaletteTooLarge)?;

		let mut buf: Vec<u8> = Vec::with_capacity(self.data.len() + 2);
		buf.extend_with_uint::<LittleEndian, _, 2>(length);
		buf.extend(&self.data);

		Ok(buf)
	}


	/// Read a palette blob; a zero length word yields an empty palette.
	///
	/// # Errors
	/// - [`Truncated`], [`IoError`]: stream ended or failed before the
	///   declared byte count was read.
	pub fn read_from<R: Read>(input: &mut R) -> PaaResult<Self> {
		let length = input.read_u16::<LittleEndian>()?;
		let data = input.read_exact_buffered(length.into())?;
		Ok(Self { data })
	}
}


/// A single PAA texture represented as a struct
///
/// Computed taggs live in [`computed`][Self::computed], foreign taggs in
/// [`taggs`][Self::taggs] in their input order; the offsets tagg is not
/// stored at all, the writer rebuilds it from actual serialized sizes.
#[derive(Default, Debug, Clone)]
pub struct PaaImage {
	/// Pixel format of all mipmaps, per the magic word.
	pub format: PaaFormat,
	/// Foreign taggs preserved for round-trip, in on-disk order.
	pub taggs: Vec<Tagg>,
	/// Computed taggs: average color, maximum color, transparency flag.
	pub computed: Vec<Tagg>,
	/// Palette blob, if the input carried one.
	pub palette: Palette,
	/// Mipmap pyramid, largest level first.
	pub mipmaps: Vec<PaaMipmap>,
}


impl PaaImage {
	/// Maximum number of mipmaps, as limited by the slot count of
	/// [`Tagg::Offs`].
	pub const MAX_MIPMAPS: usize = Tagg::OFFS_SLOTS;

	/// Top-mipmap width beyond which mipmaps get LZO-wrapped on write.
	pub const LZO_WIDTH_THRESHOLD: u16 = 128;


	/// Read a [`PaaImage`][Self] from a seekable [`std::io::Read`].
	///
	/// The reader is all-or-nothing: on error no partially parsed image
	/// is produced.  DXT mipmaps are decompressed to RGBA8 rows;
	/// uncompressed pixel formats pass through as format-native bytes
	/// (see [`PixelRepr`]).
	///
	/// # Errors
	/// - [`UnknownMagic`]: the magic word maps to no known format.
	/// - [`Truncated`], [`IoError`]: the stream ended or failed
	///   mid-record.
	/// - [`InvalidTagg`], [`InvalidMipmap`]: a record's declared length
	///   is inconsistent with its content or the remaining bytes.
	/// - [`UnsupportedCompression`]: a non-DXT mipmap whose payload does
	///   not match its raw size (legacy entropy coding).
	pub fn read_from<R: Read + Seek>(input: &mut R) -> PaaResult<Self> {
		let mut magic = [0u8; 2];
		input.read_exact(&mut magic).map_err(PaaError::from)?;
		let (_, format) = PaaFormat::from_bytes((&magic, 0))
			.map_err(|_| UnknownMagic(magic))?;

		let mut taggs: Vec<Tagg> = Vec::with_capacity(8);
		let mut computed: Vec<Tagg> = Vec::with_capacity(4);

		while let Some(tagg) = Tagg::read_from(input)? {
			match tagg {
				// Offsets are rebuilt on write; mipmaps are read
				// sequentially, so the stored table is only advisory
				Tagg::Offs { .. } => (),
				t if t.is_computed() => computed.push(t),
				t => taggs.push(t),
			};
		};

		let palette = Palette::read_from(input)?;

		let mut mipmaps: Vec<PaaMipmap> = Vec::with_capacity(8);

		while peek_u16(input)? != 0 {
			mipmaps.push(PaaMipmap::read_from(input, format)?);
		};

		Ok(PaaImage { format, taggs, computed, palette, mipmaps })
	}


	/// Wrap `input` with a [`Cursor`][std::io::Cursor] and
	/// [`read_from`][`Self::read_from`] it.
	///
	/// # Errors
	/// Same as [`read_from`][Self::read_from].
	pub fn from_bytes(input: &[u8]) -> PaaResult<Self> {
		let mut cursor = Cursor::new(input);
		Self::read_from(&mut cursor)
	}


	/// Build a fresh image from RGBA8 pixels: downsample pyramid,
	/// channel statistics, and the computed taggs (the transparency flag
	/// is present iff the average alpha is below 255).
	///
	/// # Errors
	/// - [`DimensionError`]: zero-sized image, a width beyond the 15
	///   usable bits of the width word, or a height beyond 16 bits.
	pub fn from_rgba(image: RgbaImage) -> PaaResult<Self> {
		let (width, height) = image.dimensions();

		if width == 0 || height == 0 || width > 0x7FFF || height > 0xFFFF {
			return Err(DimensionError(width, height));
		};

		if !width.is_power_of_two() || !height.is_power_of_two() {
			macros::log!(warn, "Input image is {}x{}; non-power-of-two textures degrade engine mipmapping", width, height);
		};

		let pyramid = imageops::build_pyramid(image);

		let (avgc, maxc) = imageops::channel_stats(&pyramid[0]);

		let mut computed = vec![
			Tagg::Avgc { rgba: avgc },
			Tagg::Maxc { rgba: maxc },
		];

		if avgc.a < 255 {
			computed.push(Tagg::Flag { transparency: Transparency::AlphaInterpolated });
		};

		let mipmaps = pyramid
			.into_iter()
			.map(PaaMipmap::from_rgba)
			.collect::<PaaResult<Vec<PaaMipmap>>>()?;

		Ok(PaaImage {
			format: PaaFormat::default(),
			taggs: vec![],
			computed,
			palette: Palette::default(),
			mipmaps,
		})
	}


	/// Return true if the computed transparency flag marks this texture
	/// as non-opaque.
	pub fn has_transparency(&self) -> bool {
		self.computed
			.iter()
			.any(|t| matches!(t, Tagg::Flag { transparency } if !matches!(transparency, Transparency::None)))
	}


	/// Serialize to PAA data.
	///
	/// When `format` is `None` the target is picked from the
	/// transparency flag: [`Dxt5`][PaaFormat::Dxt5] for transparent
	/// textures, [`Dxt1`][PaaFormat::Dxt1] otherwise.  A pyramid with a
	/// single level is regenerated (pyramid, statistics, computed taggs)
	/// on a working copy first; `self` is never mutated.  When the top
	/// mipmap is wider than
	/// [`LZO_WIDTH_THRESHOLD`][Self::LZO_WIDTH_THRESHOLD], mipmaps are
	/// LZO-wrapped from the top down to the first level at or below the
	/// threshold.
	///
	/// The emitted offsets tagg is bit-exact with the byte positions of
	/// the mipmap headers in the returned buffer.
	///
	/// # Errors
	/// - [`DimensionError`]: empty pyramid, or a payload overflowing the
	///   24-bit length field.
	/// - [`TooManyMipmaps`]: more levels than offsets slots.
	/// - [`UnsupportedCompression`]: target format this codec cannot
	///   encode (DXT2/3/4; gray+alpha from an RGBA source).
	/// - [`ArithmeticOverflow`]: total size overflows the offset words.
	/// - [`PaletteTooLarge`]: palette blob overflows its length prefix.
	///
	/// # Panics
	/// - If [`deku::DekuContainerWrite::to_bytes()`] fails.
	pub fn to_bytes(&self, format: Option<PaaFormat>) -> PaaResult<Vec<u8>> {
		let (mipmaps, computed) = if self.mipmaps.len() <= 1 {
			let top = self.mipmaps.first().ok_or(DimensionError(0, 0))?;
			let rebuilt = Self::from_rgba(top.to_rgba()?)?;
			(rebuilt.mipmaps, rebuilt.computed)
		}
		else {
			(self.mipmaps.clone(), self.computed.clone())
		};

		let has_transparency = computed
			.iter()
			.any(|t| matches!(t, Tagg::Flag { transparency } if !matches!(transparency, Transparency::None)));

		let format = format.unwrap_or(if has_transparency { PaaFormat::Dxt5 } else { PaaFormat::Dxt1 });

		if mipmaps.len() > Self::MAX_MIPMAPS {
			return Err(TooManyMipmaps);
		};

		let mut encoded = mipmaps
			.iter()
			.map(|m| m.encode(format))
			.collect::<PaaResult<Vec<EncodedMipmap>>>()?;

		if encoded.first().map_or(false, |m| m.width > Self::LZO_WIDTH_THRESHOLD) {
			for mip in encoded.iter_mut() {
				if mip.width <= Self::LZO_WIDTH_THRESHOLD {
					break;
				};

				mip.lzo_wrap()?;
			};
		};

		let mut buf: Vec<u8> = Vec::with_capacity(64 * 1024);

		buf.extend(format.to_bytes().unwrap());

		for t in &self.taggs {
			if let Tagg::Offs { .. } = t {
				continue;
			};

			buf.extend(t.to_bytes());
		};

		for t in &computed {
			buf.extend(t.to_bytes());
		};

		let offs_length = Tagg::Offs { offsets: vec![] }.to_bytes().len();

		let palette_data = self.palette.to_bytes()?;

		let mipmaps_offset = buf.len()
			.checked_add(offs_length)
			.and_then(|n| n.checked_add(palette_data.len()))
			.ok_or(ArithmeticOverflow)?;

		let mipmap_blocks = encoded
			.iter()
			.map(EncodedMipmap::to_bytes)
			.collect::<PaaResult<Vec<Vec<u8>>>>()?;

		let mut offsets: Vec<u32> = Vec::with_capacity(mipmap_blocks.len());
		let mut position = mipmaps_offset;

		for block in &mipmap_blocks {
			offsets.push(position.try_into().map_err(|_| ArithmeticOverflow)?);
			position = position.checked_add(block.len()).ok_or(ArithmeticOverflow)?;
		};

		buf.extend(Tagg::Offs { offsets }.to_bytes());

		buf.extend(palette_data);

		for block in mipmap_blocks {
			buf.extend(block);
		};

		buf.extend([0u8; 6]);

		Ok(buf)
	}
}


pub(crate) fn peek_u8<R: Read + Seek>(input: &mut R) -> PaaResult<u8> {
	let position = input.stream_position()?;
	let mut buf = [0u8; 1];
	let result = input.read_exact(&mut buf);
	input.seek(SeekFrom::Start(position))?;
	result?;
	Ok(buf[0])
}


pub(crate) fn peek_u16<R: Read + Seek>(input: &mut R) -> PaaResult<u16> {
	let position = input.stream_position()?;
	let mut buf = [0u8; 2];
	let result = input.read_exact(&mut buf);
	input.seek(SeekFrom::Start(position))?;
	result?;
	Ok(LittleEndian::read_u16(&buf))
}


pub(crate) trait ExtendExt: Extend<u8> {
	/// Convenience function which extends an [`std::iter::Extend<u8>`]
	/// with a [`byteorder::ByteOrder`]-encoded integer.
	fn extend_with_uint<B: ByteOrder, T: Into<u64>, const N: usize>(&mut self, v: T) {
		let mut buf = vec![0u8; N];
		B::write_uint(&mut buf[..], v.into(), N);
		self.extend(buf.into_iter());
	}
}


impl<T> ExtendExt for T where T: Extend<u8> {}


pub(crate) trait ReadExt: Read {
	const SINGLE_READ_SIZE: usize = 64;

	fn read_exact_buffered(&mut self, len: usize) -> PaaResult<Vec<u8>> {
		let mut data: Vec<u8> = Vec::with_capacity(len);
		let mut total = 0usize;

		loop {
			if total == len {
				break;
			};

			let bufsize = std::cmp::min(Self::SINGLE_READ_SIZE, len-total);
			let mut buf = vec![0u8; bufsize];
			self.read_exact(&mut buf)?;
			data.extend(&buf[..]);
			total += bufsize;
		};

		Ok(data)
	}
}


impl<T> ReadExt for T where T: Read { }


#[cfg(test)]
pub(crate) fn solid_rgba(width: u32, height: u32, rgba: [u8; 4]) -> RgbaImage {
	RgbaImage::from_pixel(width, height, image::Rgba(rgba))
}


#[test]
fn test_extend_with_uint() {
	let mut dest: Vec<u8> = vec![];

	dest.extend_with_uint::<LittleEndian, _, 2>(1234u16);
	assert_eq!(dest, vec![0xD2, 0x04]);

	dest.extend_with_uint::<LittleEndian, _, 3>(1234u32);
	assert_eq!(dest, vec![0xD2, 0x04, 0xD2, 0x04, 0x00]);

	dest.extend_with_uint::<BigEndian, _, 4>(5678u32);
	assert_eq!(dest, vec![0xD2, 0x04, 0xD2, 0x04, 0x00, 0x00, 0x00, 0x16, 0x2E]);
}


#[test]
fn test_read_exact_buffered() {
	let mut input = Cursor::new(vec![0x41u8, 0x42, 0x43, 0x44, 0x45, 0x46]);
	assert_eq!(input.read_exact_buffered(1).unwrap(), vec![0x41u8]);
	assert_eq!(input.read_exact_buffered(2).unwrap(), vec![0x42u8, 0x43]);
	assert_eq!(input.read_exact_buffered(3).unwrap(), vec![0x44u8, 0x45, 0x46]);
	assert!(matches!(input.read_exact_buffered(1), Err(Truncated)));
}


#[test]
fn test_peek() {
	let mut input = Cursor::new(vec![0x41u8, 0x42]);
	assert_eq!(peek_u8(&mut input).unwrap(), 0x41);
	assert_eq!(peek_u16(&mut input).unwrap(), 0x4241);
	assert_eq!(input.stream_position().unwrap(), 0);
	assert_eq!(input.read_u16::<LittleEndian>().unwrap(), 0x4241);
	assert!(matches!(peek_u8(&mut input), Err(Truncated)));
}


#[test]
fn test_magic_words() {
	assert_eq!(PaaFormat::Dxt1.to_bytes().unwrap(), vec![0x01, 0xFF]);
	assert_eq!(PaaFormat::Dxt5.to_bytes().unwrap(), vec![0x05, 0xFF]);
	assert_eq!(PaaFormat::Rgba4444.to_bytes().unwrap(), vec![0x44, 0x44]);
	assert_eq!(PaaFormat::Rgba5551.to_bytes().unwrap(), vec![0x55, 0x15]);
	assert_eq!(PaaFormat::GrayAlpha.to_bytes().unwrap(), vec![0x80, 0x80]);

	let (_, format) = PaaFormat::from_bytes((&[0x05u8, 0xFF], 0)).unwrap();
	assert_eq!(format, PaaFormat::Dxt5);

	assert!(matches!(PaaImage::from_bytes(&[0x34, 0x12]), Err(UnknownMagic([0x34, 0x12]))));
}


#[test]
fn test_tagg_roundtrip() {
	let taggs = [
		Tagg::Avgc { rgba: Rgba8888Pixel { r: 0x80, g: 0x81, b: 0x82, a: 0xFF } },
		Tagg::Maxc { rgba: Rgba8888Pixel { r: 0xFF, g: 0xFF, b: 0xFF, a: 0xFF } },
		Tagg::Flag { transparency: Transparency::AlphaInterpolated },
		Tagg::Offs { offsets: vec![0x76, 0x100, 0x200] },
		Tagg::Foreign { signature: *b"ABCDEFGH", payload: BString::from(&b"\x01\x02\x03"[..]) },
	];

	for tagg in taggs {
		let bytes = tagg.to_bytes();
		assert_eq!(&bytes[0..8], tagg.signature());

		let mut cursor = Cursor::new(&bytes);
		let parsed = Tagg::read_from(&mut cursor).unwrap().unwrap();
		assert_eq!(parsed, tagg);
	};
}


#[test]
fn test_tagg_flag_padding() {
	let bytes = Tagg::Flag { transparency: Transparency::AlphaInterpolated }.to_bytes();
	assert_eq!(bytes, b"GGATGALF\x04\x00\x00\x00\x01\xFF\xFF\xFF".to_vec());
}


#[test]
fn test_tagg_terminator_peek() {
	// A zero first byte is the palette length word, not a tagg
	let mut cursor = Cursor::new(vec![0x00u8, 0x00]);
	assert!(Tagg::read_from(&mut cursor).unwrap().is_none());
	assert_eq!(cursor.stream_position().unwrap(), 0);
}


#[test]
fn test_malformed_tagg() {
	// Known signature with a bad payload length
	let mut bytes: Vec<u8> = b"GGATGALF".to_vec();
	bytes.extend_with_uint::<LittleEndian, _, 4>(2u32);
	bytes.extend([0x01u8, 0xFF]);

	let mut cursor = Cursor::new(&bytes);
	assert!(matches!(Tagg::read_from(&mut cursor), Err(InvalidTagg)));
	// The failed read backtracks
	assert_eq!(cursor.stream_position().unwrap(), 0);

	// Declared length runs past the end of the stream
	let mut bytes: Vec<u8> = b"ABCDEFGH".to_vec();
	bytes.extend_with_uint::<LittleEndian, _, 4>(100u32);
	bytes.extend([0u8; 3]);

	let mut cursor = Cursor::new(&bytes);
	assert!(matches!(Tagg::read_from(&mut cursor), Err(InvalidTagg)));
}


#[test]
fn test_truncated_container() {
	assert!(matches!(PaaImage::from_bytes(&[0x01]), Err(Truncated)));

	// Valid magic, nothing else
	assert!(matches!(PaaImage::from_bytes(&[0x01, 0xFF]), Err(Truncated)));
}


#[test]
fn test_offs_tagg_is_64_bytes() {
	let bytes = Tagg::Offs { offsets: vec![0x76] }.to_bytes();
	assert_eq!(bytes.len(), 8 + 4 + 64);
	assert_eq!(LittleEndian::read_u32(&bytes[8..12]), 64);
	assert_eq!(LittleEndian::read_u32(&bytes[12..16]), 0x76);
	assert!(bytes[16..].iter().all(|b| *b == 0));
}


#[test]
fn test_write_opaque_dxt1_auto() {
	// 16x16 solid gray, auto format
	let image = PaaImage::from_rgba(solid_rgba(16, 16, [128, 128, 128, 255])).unwrap();
	let bytes = image.to_bytes(None).unwrap();

	assert_eq!(&bytes[0..2], &[0x01, 0xFF]);

	let parsed = PaaImage::from_bytes(&bytes).unwrap();
	assert_eq!(parsed.format, PaaFormat::Dxt1);
	assert_eq!(parsed.mipmaps.len(), 3);
	assert_eq!((parsed.mipmaps[0].width, parsed.mipmaps[0].height), (16, 16));
	assert_eq!((parsed.mipmaps[2].width, parsed.mipmaps[2].height), (4, 4));

	assert!(!parsed.has_transparency());
	assert!(parsed.computed.iter().all(|t| !matches!(t, Tagg::Flag { .. })));

	let avgc = parsed.computed.iter().find_map(|t| match t {
		Tagg::Avgc { rgba } => Some(*rgba),
		_ => None,
	});
	assert_eq!(avgc, Some(Rgba8888Pixel { r: 0x80, g: 0x80, b: 0x80, a: 0xFF }));
}


#[test]
fn test_write_transparent_dxt5_auto() {
	// 4x4 with alphas {0, 64, 128, 255} repeated
	let mut image = solid_rgba(4, 4, [10, 20, 30, 255]);
	for (i, pixel) in image.pixels_mut().enumerate() {
		pixel.0[3] = [0u8, 64, 128, 255][i % 4];
	};

	let paa = PaaImage::from_rgba(image).unwrap();
	let bytes = paa.to_bytes(None).unwrap();

	assert_eq!(&bytes[0..2], &[0x05, 0xFF]);

	let parsed = PaaImage::from_bytes(&bytes).unwrap();
	assert_eq!(parsed.format, PaaFormat::Dxt5);
	assert_eq!(parsed.mipmaps.len(), 1);
	assert!(parsed.has_transparency());
}


#[test]
fn test_offsets_invariant() {
	// Re-parse the emitted bytes and compare every offsets slot with the
	// actual position of the corresponding mipmap header
	let image = PaaImage::from_rgba(solid_rgba(256, 128, [1, 2, 3, 255])).unwrap();
	let bytes = image.to_bytes(Some(PaaFormat::Dxt5)).unwrap();

	assert_eq!(&bytes[0..2], &[0x05, 0xFF]);

	let offsets = {
		let mut cursor = Cursor::new(&bytes[..]);
		cursor.seek(SeekFrom::Start(2)).unwrap();
		let mut found = None;

		while let Some(tagg) = Tagg::read_from(&mut cursor).unwrap() {
			if let Tagg::Offs { offsets } = tagg {
				found = Some(offsets);
			};
		};

		found.expect("No offsets tagg in output")
	};

	assert_eq!(offsets.len(), 6);

	let expected_dims = [(256u16, 128u16), (128, 64), (64, 32), (32, 16), (16, 8), (8, 4)];

	for (slot, dims) in offsets.iter().zip(expected_dims) {
		let header = &bytes[*slot as usize..];
		let width = LittleEndian::read_u16(&header[0..2]);
		let height = LittleEndian::read_u16(&header[2..4]);

		assert_eq!(width & 0x7FFF, dims.0);
		assert_eq!(height, dims.1);
	};

	// Top mipmap (and only it) is LZO-wrapped at 256 wide
	assert_ne!(LittleEndian::read_u16(&bytes[offsets[0] as usize..][0..2]) & 0x8000, 0);
	assert_eq!(LittleEndian::read_u16(&bytes[offsets[1] as usize..][0..2]) & 0x8000, 0);

	// Decodes back to the full pyramid
	let parsed = PaaImage::from_bytes(&bytes).unwrap();
	assert_eq!(parsed.mipmaps.len(), 6);
	assert_eq!((parsed.mipmaps[0].width, parsed.mipmaps[0].height), (256, 128));
	assert!(parsed.mipmaps[0].lzo);
}


#[test]
fn test_foreign_tagg_roundtrip() {
	let mut image = PaaImage::from_rgba(solid_rgba(8, 8, [200, 100, 50, 255])).unwrap();
	image.taggs.push(Tagg::Foreign {
		signature: *b"ABCDEFGH",
		payload: BString::from(&b"\xDE\xAD\xBE\xEF"[..]),
	});

	let bytes = image.to_bytes(None).unwrap();
	let parsed = PaaImage::from_bytes(&bytes).unwrap();

	assert_eq!(parsed.taggs.len(), 1);
	assert_eq!(parsed.taggs[0], image.taggs[0]);

	// Round-trip once more; the foreign tagg must stay put
	let bytes2 = parsed.to_bytes(Some(parsed.format)).unwrap();
	let parsed2 = PaaImage::from_bytes(&bytes2).unwrap();
	assert_eq!(parsed2.taggs, parsed.taggs);
	assert_eq!(parsed2.computed, parsed.computed);
}


#[test]
fn test_uncompressed_passthrough_roundtrip() {
	// Hand-assembled gray+alpha container: no taggs, no palette, two
	// mipmaps, zero terminator
	let mip0: Vec<u8> = (0..128u8).collect();
	let mip1: Vec<u8> = (0..32u8).map(|b| b.wrapping_mul(3)).collect();

	let mut bytes: Vec<u8> = vec![0x80, 0x80];
	bytes.extend([0x00, 0x00]); // palette
	bytes.extend_with_uint::<LittleEndian, _, 2>(8u16);
	bytes.extend_with_uint::<LittleEndian, _, 2>(8u16);
	bytes.extend_with_uint::<LittleEndian, u32, 3>(128u32);
	bytes.extend(&mip0);
	bytes.extend_with_uint::<LittleEndian, _, 2>(4u16);
	bytes.extend_with_uint::<LittleEndian, _, 2>(4u16);
	bytes.extend_with_uint::<LittleEndian, u32, 3>(32u32);
	bytes.extend(&mip1);
	bytes.extend([0u8; 6]);

	let parsed = PaaImage::from_bytes(&bytes).unwrap();
	assert_eq!(parsed.format, PaaFormat::GrayAlpha);
	assert_eq!(parsed.mipmaps.len(), 2);
	assert_eq!(parsed.mipmaps[0].repr, PixelRepr::Native(PaaFormat::GrayAlpha));
	assert_eq!(parsed.mipmaps[0].data, mip0);

	// Native payloads pass through byte-exactly on rewrite
	let rewritten = parsed.to_bytes(Some(PaaFormat::GrayAlpha)).unwrap();
	let reparsed = PaaImage::from_bytes(&rewritten).unwrap();
	assert_eq!(reparsed.mipmaps[0].data, mip0);
	assert_eq!(reparsed.mipmaps[1].data, mip1);

	// First mipmap header sits right after magic, offsets tagg and
	// palette length word
	let offs_start = 2 + 12;
	assert_eq!(&rewritten[0..2], &[0x80, 0x80]);
	assert_eq!(&rewritten[2..10], b"GGATSFFO");
	assert_eq!(LittleEndian::read_u32(&rewritten[offs_start..offs_start+4]), 2 + 76 + 2);
}


#[test]
fn test_terminator() {
	let image = PaaImage::from_rgba(solid_rgba(4, 4, [0, 0, 0, 255])).unwrap();
	let bytes = image.to_bytes(None).unwrap();
	assert_eq!(&bytes[bytes.len()-6..], &[0u8; 6]);
}


#[test]
fn test_dimension_error() {
	let image = solid_rgba(70_000, 10, [0, 0, 0, 255]);
	assert!(matches!(PaaImage::from_rgba(image), Err(DimensionError(70_000, 10))));

	let too_tall = solid_rgba(10, 70_000, [0, 0, 0, 255]);
	assert!(matches!(PaaImage::from_rgba(too_tall), Err(DimensionError(10, 70_000))));

	let empty = RgbaImage::new(0, 0);
	assert!(matches!(PaaImage::from_rgba(empty), Err(DimensionError(0, 0))));

	// Only the width word carries the LZO flag bit; heights use the
	// full 16-bit range
	let tall = solid_rgba(4, 40_000, [0, 0, 0, 255]);
	assert!(PaaImage::from_rgba(tall).is_ok());
	let wide = solid_rgba(40_000, 4, [0, 0, 0, 255]);
	assert!(matches!(PaaImage::from_rgba(wide), Err(DimensionError(40_000, 4))));
}


#[test]
fn assert_traits() {
	fn assert_impl<T: std::fmt::Debug + std::fmt::Display + std::error::Error + Send + Sync>() {}
	assert_impl::<PaaError>();
}
