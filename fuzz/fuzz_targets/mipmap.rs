#![no_main]
use libfuzzer_sys::fuzz_target;

use std::io::Cursor;

use rvpaa::{PaaFormat, PaaMipmap};

fuzz_target!(|input: (PaaFormat, &[u8])| {
	let (format, data) = input;
	let mut cursor = Cursor::new(data);
	let _ = PaaMipmap::read_from(&mut cursor, format);
});
