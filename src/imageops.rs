use image::RgbaImage;

use crate::Rgba8888Pixel;


/// Halve an image with a 2x2 box filter: each output channel is the
/// truncating integer mean of the four source pixels.
pub(crate) fn downsample_box(src: &RgbaImage) -> RgbaImage {
	let (width, height) = src.dimensions();
	let (new_width, new_height) = (width / 2, height / 2);

	let mut result = RgbaImage::new(new_width, new_height);

	for y in 0..new_height {
		for x in 0..new_width {
			let (sx, sy) = (x * 2, y * 2);

			let mut acc = [0u32; 4];

			for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
				let pixel = src.get_pixel(sx + dx, sy + dy);

				for (channel, value) in acc.iter_mut().zip(pixel.0) {
					*channel += u32::from(value);
				};
			};

			#[allow(clippy::cast_possible_truncation)]
			result.put_pixel(x, y, image::Rgba(acc.map(|c| (c / 4) as u8)));
		};
	};

	result
}


/// Build the downsample pyramid, top level first.  Each successor halves
/// the previous level; generation stops once the smaller side would drop
/// to 4 or below.
pub(crate) fn build_pyramid(top: RgbaImage) -> Vec<RgbaImage> {
	let mut result = Vec::with_capacity(hint_mipmap_count(top.dimensions()));
	result.push(top);

	loop {
		let current = result.last().expect("Pyramid always has a top level");
		let (width, height) = current.dimensions();

		if std::cmp::min(width, height) <= 4 {
			break;
		};

		let next = downsample_box(current);
		result.push(next);
	};

	result
}


pub(crate) fn hint_mipmap_count((w, h): (u32, u32)) -> usize {
	let smaller = std::cmp::min(w, h).max(1) as f64;
	#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
	let hint = (smaller.log2() - 2.0).ceil() as usize;
	std::cmp::max(hint, 1usize)
}


/// Channel-wise integer mean and maximum over an image, accumulated in
/// u64 (wide enough for `255 * w * h` at the 15-bit dimension cap).
pub(crate) fn channel_stats(image: &RgbaImage) -> (Rgba8888Pixel, Rgba8888Pixel) {
	if image.dimensions() == (0, 0) {
		return (Rgba8888Pixel::default(), Rgba8888Pixel::default());
	};

	let mut avgc: [u64; 4] = [0; 4];
	let mut maxc: [u8; 4] = [0; 4];

	for pixel in image.pixels() {
		for (i, c) in pixel.0.iter().enumerate() {
			avgc[i] += u64::from(*c);
			maxc[i] = std::cmp::max(maxc[i], *c);
		};
	};

	let pix_count = u64::from(image.width()) * u64::from(image.height());

	#[allow(clippy::cast_possible_truncation)]
	let avgc = avgc.map(|c: u64| (c / pix_count) as u8);

	(image::Rgba::<u8>(avgc).into(), image::Rgba::<u8>(maxc).into())
}


#[test]
fn test_downsample_truncates() {
	let mut image = RgbaImage::new(4, 4);
	for (i, pixel) in image.pixels_mut().enumerate() {
		#[allow(clippy::cast_possible_truncation)]
		{ *pixel = image::Rgba([i as u8, 1, 2, 255]) };
	};

	let half = downsample_box(&image);
	assert_eq!(half.dimensions(), (2, 2));

	// Top-left 2x2 block of the red channel is {0, 1, 4, 5}; the box
	// mean 2.5 truncates to 2
	assert_eq!(half.get_pixel(0, 0).0, [2, 1, 2, 255]);
	assert_eq!(half.get_pixel(1, 0).0, [4, 1, 2, 255]);
	assert_eq!(half.get_pixel(0, 1).0, [10, 1, 2, 255]);
}


#[test]
fn test_pyramid_termination() {
	let count = |w, h| build_pyramid(RgbaImage::new(w, h)).len();

	assert_eq!(count(4, 4), 1);
	assert_eq!(count(8, 8), 2);
	assert_eq!(count(16, 16), 3);
	assert_eq!(count(256, 128), 6);
	assert_eq!(count(16, 4), 1);
	assert_eq!(count(1, 1), 1);
}


#[test]
fn test_pyramid_halving_dims() {
	let pyramid = build_pyramid(RgbaImage::new(256, 128));
	let dims: Vec<(u32, u32)> = pyramid.iter().map(image::RgbaImage::dimensions).collect();
	assert_eq!(dims, vec![(256, 128), (128, 64), (64, 32), (32, 16), (16, 8), (8, 4)]);
}


#[test]
fn test_channel_stats() {
	let mut image = RgbaImage::new(2, 2);
	image.put_pixel(0, 0, image::Rgba([0, 10, 255, 255]));
	image.put_pixel(1, 0, image::Rgba([1, 20, 0, 255]));
	image.put_pixel(0, 1, image::Rgba([2, 30, 0, 255]));
	image.put_pixel(1, 1, image::Rgba([4, 40, 0, 252]));

	let (avgc, maxc) = channel_stats(&image);

	// (0+1+2+4)/4 truncates to 1; alpha (255*3+252)/4 truncates to 254
	assert_eq!(avgc, Rgba8888Pixel { r: 1, g: 25, b: 63, a: 254 });
	assert_eq!(maxc, Rgba8888Pixel { r: 4, g: 40, b: 255, a: 255 });
}
