use rvpaa::*;
use anyhow::{Context, Result as AnyhowResult};
use bstr::ByteSlice;


pub fn command_info(matches: &clap::ArgMatches) -> AnyhowResult<()> {
	let brief = matches.is_present("brief");
	let serialize = matches.is_present("serialize_back");

	let mut result = Ok(());

	for path in matches.values_of("input").expect("INPUT required") {
		let result_now = paa_path_info(path, brief, serialize);

		if result_now.is_err() {
			result = result_now;
		};
	};

	result
}


fn paa_path_info(path: &str, brief: bool, serialize_back: bool) -> AnyhowResult<()> {
	let brief_prefix = if brief {
		"".to_string()
	}
	else {
		format!("{}: ", path)
	};

	let mut file = std::fs::File::open(path).with_context(|| format!("Could not open file: {path}"))?;
	let filesize = file.metadata().with_context(|| format!("Could not read metadata to determine size: {path}"))?.len();
	let image = PaaImage::read_from(&mut file).with_context(|| format!("Could not read PaaImage: {path}"))?;

	println!("{brief_prefix}File size: {filesize} (0x{filesize:X})");
	println!("{brief_prefix}PaaFormat: {:?}", image.format);
	println!("{brief_prefix}Transparency: {}", image.has_transparency());

	for (pos, tagg) in image.computed.iter().enumerate() {
		println!("{brief_prefix}Computed tagg #{}: {tagg}", pos+1);
	};

	for (pos, tagg) in image.taggs.iter().enumerate() {
		let signature = tagg.signature();
		println!("{brief_prefix}Foreign tagg #{}: {:?}", pos+1, signature.as_bstr());
	};

	if !image.palette.is_empty() {
		println!("{brief_prefix}Palette: {} bytes", image.palette.data.len());
	};

	for (pos, m) in image.mipmaps.iter().enumerate() {
		println!("{brief_prefix}Mipmap #{}, {}x{} [{:?}{}], size={}",
			pos+1,
			m.width,
			m.height,
			m.repr,
			if m.lzo { ", LZO" } else { "" },
			m.data.len());
	};

	if serialize_back {
		tracing::trace!("Attempting to serialize PaaImage back");

		let data = image.to_bytes(Some(image.format)).context("Could not serialize image to bytes")?;
		println!("{brief_prefix}Serialized back to {} bytes", data.len());
	};

	Ok(())
}
