#![no_main]
use libfuzzer_sys::fuzz_target;

use std::io::Cursor;

use rvpaa::PaaImage;

fuzz_target!(|data: &[u8]| {
	let mut cursor = Cursor::new(data);
	let image = PaaImage::read_from(&mut cursor);

	if let Ok(image) = image {
		let _ = image.to_bytes(Some(image.format));
	};
});
