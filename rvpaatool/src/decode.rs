use rvpaa::*;
use anyhow::{Context, ensure, Result as AnyhowResult};


pub fn command_decode(matches: &clap::ArgMatches) -> AnyhowResult<()> {
	let paa_path = matches.value_of("paa").expect("PAA required");
	let png_path = matches.value_of("png").expect("PNG required");

	let mip_idx: usize = matches.value_of("mipmap").unwrap_or("1")
		.parse()
		.context("Mipmap index is not a number")?;
	ensure!(mip_idx > 0, "Mipmap index is 1-based");

	let paa = Paa::read_file(paa_path)
		.with_context(|| format!("{paa_path}: Failed to parse PAA"))?;

	let mip_count = paa.mipmaps().len();
	tracing::debug!("{paa_path}: {:?}, {mip_count} mipmap levels, transparency={}",
		paa.format(),
		paa.has_alpha());

	paa.write_image(png_path, mip_idx - 1)
		.with_context(|| format!("{png_path}: Failed to write mipmap #{mip_idx} (of {mip_count})"))?;

	Ok(())
}
