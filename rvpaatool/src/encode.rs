use rvpaa::*;
use anyhow::{Context, anyhow, Result as AnyhowResult};
use tap::prelude::*;


pub fn command_encode(matches: &clap::ArgMatches) -> AnyhowResult<()> {
	let img_path = matches.value_of("img").expect("IMG required");
	let paa_path = matches.value_of("paa").expect("PAA required");

	let format = matches.value_of("format")
		.map(|s| s.parse::<PaaFormat>()
			.map_err(|_| anyhow!("{s:?}: not a known PAA format"))
			.tap_ok(|f| tracing::trace!("Forcing output format {f:?}")))
		.transpose()?;

	let mut paa = Paa::new();
	paa.load_image_file(img_path)
		.with_context(|| format!("{img_path}: Failed to load input image"))?;

	tracing::info!("{img_path}: {} mipmap levels, transparency={}",
		paa.mipmaps().len(),
		paa.has_alpha());

	paa.write_paa(paa_path, format)
		.with_context(|| format!("{paa_path}: Failed to write PAA"))?;

	Ok(())
}
