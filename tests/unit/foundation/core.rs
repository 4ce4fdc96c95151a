use super::*;

#[test]
fn mip_scale_halves_per_level() {
    assert_eq!(MipLevel(0).scale(), 1.0);
    assert_eq!(MipLevel(1).scale(), 0.5);
    assert_eq!(MipLevel(3).scale(), 0.125);
    assert_eq!(MipLevel(3).alignment(), 8);
}

#[test]
fn time_key_merges_signed_zero() {
    assert_eq!(TimeKey::new(0.0), TimeKey::new(-0.0));
    assert_ne!(TimeKey::new(1.0), TimeKey::new(1.5));
    assert_eq!(TimeKey::new(12.25).time(), 12.25);
}

#[test]
fn bit_depth_orders_by_precision_and_quantizes() {
    assert!(BitDepth::Byte < BitDepth::Short);
    assert!(BitDepth::Half < BitDepth::Float);
    assert_eq!(BitDepth::Byte.quantize(2.0), 1.0);
    assert_eq!(BitDepth::Byte.quantize(0.5), 128.0 / 255.0);
    assert_eq!(BitDepth::Float.quantize(-3.5), -3.5);
}

#[test]
fn color_layouts_convert_but_other_layers_need_channels() {
    let rgba = ImageComponents::rgba();
    let alpha = ImageComponents::alpha();
    assert!(alpha.is_subset_of(&rgba));
    assert!(!rgba.is_subset_of(&alpha));
    assert!(rgba.can_convert_from(&alpha));

    let motion = ImageComponents::new("Motion", &["U", "V"]).unwrap();
    let motion_u = ImageComponents::new("Motion", &["U"]).unwrap();
    assert!(motion_u.can_convert_from(&motion));
    assert!(!motion.can_convert_from(&motion_u));
    assert!(!motion.can_convert_from(&rgba));
    assert!(ImageComponents::new("Empty", &[]).is_err());
    assert_eq!(rgba.to_string(), "Color.RGBA");
}

#[test]
fn project_format_rect_applies_pixel_aspect() {
    let f = ProjectFormat {
        width: 100,
        height: 50,
        pixel_aspect: 2.0,
    };
    assert_eq!(f.rect(), Rect::new(0.0, 0.0, 200.0, 50.0));
    assert_eq!(ProjectFormat::default().rect(), Rect::new(0.0, 0.0, 1920.0, 1080.0));
}
