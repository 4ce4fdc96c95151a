use super::*;

fn needed(produced: Vec<ImageComponents>, pass_through: Option<usize>) -> PlanesNeeded {
    PlanesNeeded {
        produced,
        pass_through_input: pass_through,
        input_planes: BTreeMap::new(),
    }
}

fn motion() -> ImageComponents {
    ImageComponents::new("Motion", &["U", "V"]).unwrap()
}

#[test]
fn requested_planes_map_onto_produced_ones() {
    let plan = plan_planes(
        &[ImageComponents::rgb(), ImageComponents::rgba()],
        &needed(vec![ImageComponents::rgba()], Some(0)),
    );
    assert_eq!(plan.produced, vec![ImageComponents::rgba()]);
    assert_eq!(
        plan.mapping,
        vec![
            (ImageComponents::rgb(), ImageComponents::rgba()),
            (ImageComponents::rgba(), ImageComponents::rgba()),
        ]
    );
    assert!(plan.passthrough.is_empty());
}

#[test]
fn unproduced_planes_pass_through() {
    let plan = plan_planes(
        &[ImageComponents::rgba(), motion()],
        &needed(vec![ImageComponents::rgba()], Some(0)),
    );
    assert_eq!(plan.produced, vec![ImageComponents::rgba()]);
    assert_eq!(plan.passthrough, vec![motion()]);
}

#[test]
fn retimed_request_drops_caller_hints() {
    let req = RenderRequest::new(3.0, RectI::new(0, 0, 8, 8))
        .with_mip(MipLevel(1))
        .with_rod(Rect::new(0.0, 0.0, 16.0, 16.0))
        .with_input_images(Arc::new(InputImages::default()));
    let r = req.retimed(5.0);
    assert_eq!(r.time, 5.0);
    assert_eq!(r.mip, MipLevel(1));
    assert_eq!(r.roi, req.roi);
    assert!(r.rod.is_none());
    assert!(r.input_images.is_none());
}

#[test]
fn output_lookup_by_plane() {
    let mut out = RenderOutput::default();
    assert!(out.is_empty() && out.first().is_none());
    let bounds = RectI::new(0, 0, 2, 2);
    let img = Image::new(
        ImageKey::new(NodeId(0), Default::default(), 0.0, ViewIdx(0), false),
        ImageParams {
            rod: bounds.to_canonical(MipLevel::FULL, 1.0),
            bounds,
            mip: MipLevel::FULL,
            pixel_aspect: 1.0,
            components: ImageComponents::rgba(),
            depth: BitDepth::Float,
            frames_needed: FramesNeeded::default(),
        },
        false,
    )
    .unwrap();
    out.insert(ImageComponents::rgba(), Arc::new(img));
    assert_eq!(out.len(), 1);
    assert!(out.get(&ImageComponents::rgba()).is_some());
    assert!(out.get(&motion()).is_none());
}
