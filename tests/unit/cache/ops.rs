use super::*;

use crate::cache::image::{ImageKey, ImageParams};
use crate::foundation::core::{NodeHash, NodeId, ViewIdx};
use crate::graph::effect::FramesNeeded;

fn image(bounds: RectI, mip: MipLevel, components: ImageComponents, depth: BitDepth) -> Image {
    Image::new(
        ImageKey::new(NodeId(0), NodeHash(1), 0.0, ViewIdx(0), true),
        ImageParams {
            rod: bounds.upscale_pow2(mip).to_canonical(MipLevel::FULL, 1.0),
            bounds,
            mip,
            pixel_aspect: 1.0,
            components,
            depth,
            frames_needed: FramesNeeded::default(),
        },
        false,
    )
    .unwrap()
}

#[test]
fn missing_alpha_becomes_opaque_and_missing_color_zero() {
    let src = image(
        RectI::new(0, 0, 2, 2),
        MipLevel::FULL,
        ImageComponents::rgb(),
        BitDepth::Float,
    );
    let mut buf =
        PlaneBuffer::new(src.bounds(), ImageComponents::rgb(), BitDepth::Float).unwrap();
    buf.fill(&[0.2, 0.4, 0.6]);
    src.paste_buffer(&buf, src.bounds());

    let dst = image(
        RectI::new(0, 0, 2, 2),
        MipLevel::FULL,
        ImageComponents::rgba(),
        BitDepth::Float,
    );
    dst.copy_region_from(&src, dst.bounds());
    assert_eq!(dst.read().pixel(1, 1), Some(&[0.2, 0.4, 0.6, 1.0][..]));

    let alpha = image(
        RectI::new(0, 0, 2, 2),
        MipLevel::FULL,
        ImageComponents::alpha(),
        BitDepth::Float,
    );
    alpha.copy_region_from(&src, alpha.bounds());
    assert_eq!(alpha.read().pixel(0, 0), Some(&[1.0][..]));
}

#[test]
fn byte_depth_quantizes_on_copy() {
    let src = image(
        RectI::new(0, 0, 1, 1),
        MipLevel::FULL,
        ImageComponents::alpha(),
        BitDepth::Float,
    );
    let mut buf =
        PlaneBuffer::new(src.bounds(), ImageComponents::alpha(), BitDepth::Float).unwrap();
    buf.fill(&[1.5]);
    src.paste_buffer(&buf, src.bounds());

    let dst = image(
        RectI::new(0, 0, 1, 1),
        MipLevel::FULL,
        ImageComponents::alpha(),
        BitDepth::Byte,
    );
    dst.copy_region_from(&src, dst.bounds());
    assert_eq!(dst.read().pixel(0, 0), Some(&[1.0][..]));
}

#[test]
fn paste_only_touches_requested_rect() {
    let dst = image(
        RectI::new(0, 0, 4, 4),
        MipLevel::FULL,
        ImageComponents::alpha(),
        BitDepth::Float,
    );
    let mut buf =
        PlaneBuffer::new(dst.bounds(), ImageComponents::alpha(), BitDepth::Float).unwrap();
    buf.fill(&[0.5]);
    dst.paste_buffer(&buf, RectI::new(0, 0, 2, 4));
    let px = dst.read();
    assert_eq!(px.pixel(1, 3), Some(&[0.5][..]));
    assert_eq!(px.pixel(2, 3), Some(&[0.0][..]));
}

#[test]
fn downscale_averages_each_block() {
    let src = image(
        RectI::new(0, 0, 4, 2),
        MipLevel::FULL,
        ImageComponents::alpha(),
        BitDepth::Float,
    );
    let mut buf =
        PlaneBuffer::new(src.bounds(), ImageComponents::alpha(), BitDepth::Float).unwrap();
    for (x, v) in [(0, 0.0), (1, 1.0), (2, 1.0), (3, 1.0)] {
        buf.pixel_mut(x, 0).unwrap()[0] = v;
        buf.pixel_mut(x, 1).unwrap()[0] = v;
    }
    src.paste_buffer(&buf, src.bounds());

    let dst = image(
        RectI::new(0, 0, 2, 1),
        MipLevel(1),
        ImageComponents::alpha(),
        BitDepth::Float,
    );
    dst.downscale_from(&src, dst.bounds());
    let px = dst.read();
    assert_eq!(px.pixel(0, 0), Some(&[0.5][..]));
    assert_eq!(px.pixel(1, 0), Some(&[1.0][..]));
}

#[test]
fn downscale_skips_samples_outside_source() {
    let src = image(
        RectI::new(0, 0, 3, 2),
        MipLevel::FULL,
        ImageComponents::alpha(),
        BitDepth::Float,
    );
    let mut buf =
        PlaneBuffer::new(src.bounds(), ImageComponents::alpha(), BitDepth::Float).unwrap();
    buf.fill(&[0.75]);
    src.paste_buffer(&buf, src.bounds());

    let dst = image(
        RectI::new(0, 0, 2, 1),
        MipLevel(1),
        ImageComponents::alpha(),
        BitDepth::Float,
    );
    dst.downscale_from(&src, dst.bounds());
    assert_eq!(dst.read().pixel(1, 0), Some(&[0.75][..]));
}
