use super::*;

#[test]
fn identical_plane_rects_are_kept_as_is() {
    let a: RectList = smallvec![RectI::new(0, 0, 4, 4), RectI::new(8, 0, 12, 4)];
    let merged = merge_plane_rects(&[a.clone(), a.clone()]);
    assert_eq!(merged, a);
}

#[test]
fn differing_plane_rects_collapse_to_bbox() {
    let a: RectList = smallvec![RectI::new(0, 0, 4, 4)];
    let b: RectList = smallvec![RectI::new(8, 2, 12, 6)];
    let merged = merge_plane_rects(&[a, b]);
    assert_eq!(merged.as_slice(), &[RectI::new(0, 0, 12, 6)]);
}

#[test]
fn all_empty_means_nothing_to_render() {
    assert!(merge_plane_rects(&[]).is_empty());
    assert!(merge_plane_rects(&[RectList::new(), RectList::new()]).is_empty());
}
