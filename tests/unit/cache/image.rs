use super::*;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn params(bounds: RectI) -> ImageParams {
    ImageParams {
        rod: bounds.to_canonical(MipLevel::FULL, 1.0),
        bounds,
        mip: MipLevel::FULL,
        pixel_aspect: 1.0,
        components: ImageComponents::rgba(),
        depth: BitDepth::Float,
        frames_needed: FramesNeeded::default(),
    }
}

fn key() -> ImageKey {
    ImageKey::new(NodeId(1), NodeHash(7), 3.0, ViewIdx(0), true)
}

#[test]
fn non_frame_varying_outputs_share_one_key() {
    let a = ImageKey::new(NodeId(1), NodeHash(7), 3.0, ViewIdx(0), false);
    let b = ImageKey::new(NodeId(1), NodeHash(7), 12.5, ViewIdx(0), false);
    assert_eq!(a, b);
    assert_ne!(key(), ImageKey::new(NodeId(1), NodeHash(7), 4.0, ViewIdx(0), true));
}

#[test]
fn byte_size_accounts_for_components_and_depth() {
    let mut p = params(RectI::new(0, 0, 10, 10));
    assert_eq!(p.byte_size(), 10 * 10 * 4 * 4);
    p.depth = BitDepth::Byte;
    p.components = ImageComponents::alpha();
    assert_eq!(p.byte_size(), 100);
}

#[test]
fn empty_bounds_are_rejected() {
    let err = Image::new(key(), params(RectI::new(0, 0, 0, 5)), true).unwrap_err();
    assert!(matches!(err, FxError::Validation(_)));
}

#[test]
fn ids_are_unique() {
    let a = Image::new(key(), params(RectI::new(0, 0, 2, 2)), true).unwrap();
    let b = Image::new(key(), params(RectI::new(0, 0, 2, 2)), true).unwrap();
    assert_ne!(a.id(), b.id());
}

#[test]
fn claim_then_failed_release_returns_region_to_unrendered() {
    let img = Image::new(key(), params(RectI::new(0, 0, 8, 8)), true).unwrap();
    let roi = RectI::new(0, 0, 8, 4);
    let claim = img.claim(roi);
    assert!(!claim.pending_elsewhere);
    assert!(img.has_pending(roi));
    assert!(img.rest_to_render(roi).is_empty());

    img.release_claim(&claim.claimed, false);
    assert!(!img.has_pending(roi));
    assert_eq!(img.rest_to_render(roi).as_slice(), &[roi]);
}

#[test]
fn wait_pending_wakes_when_claim_is_released() {
    let img = Arc::new(Image::new(key(), params(RectI::new(0, 0, 8, 8)), true).unwrap());
    let roi = RectI::new(0, 0, 8, 8);
    let claim = img.claim(roi);

    let waiter = {
        let img = Arc::clone(&img);
        thread::spawn(move || img.wait_pending(roi))
    };
    thread::sleep(Duration::from_millis(20));
    img.release_claim(&claim.claimed, true);

    assert!(waiter.join().unwrap());
    assert!(img.is_fully_rendered(roi));
}

#[test]
fn read_view_exposes_pixels_by_coordinate() {
    let img = Image::new(key(), params(RectI::new(2, 2, 4, 4)), true).unwrap();
    let mut buf = PlaneBuffer::new(RectI::new(2, 2, 4, 4), ImageComponents::rgba(), BitDepth::Float)
        .unwrap();
    buf.fill(&[0.25, 0.5, 0.75, 1.0]);
    img.paste_buffer(&buf, img.bounds());

    let px = img.read();
    assert_eq!(px.pixel(3, 3), Some(&[0.25, 0.5, 0.75, 1.0][..]));
    assert_eq!(px.pixel(0, 0), None);
}

#[test]
fn plane_buffer_counts_non_finite_values() {
    let mut buf =
        PlaneBuffer::new(RectI::new(0, 0, 2, 1), ImageComponents::rgb(), BitDepth::Float).unwrap();
    buf.pixel_mut(1, 0).unwrap()[1] = f32::NAN;
    buf.pixel_mut(0, 0).unwrap()[0] = f32::INFINITY;
    assert_eq!(buf.count_non_finite(), 2);
}
