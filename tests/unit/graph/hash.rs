use super::*;

fn hash_of(f: impl FnOnce(&mut StableHasher)) -> NodeHash {
    let mut h = StableHasher::new();
    f(&mut h);
    h.finish()
}

#[test]
fn same_input_same_hash() {
    let a = hash_of(|h| {
        h.write_str("gain");
        h.write_u64(3);
    });
    let b = hash_of(|h| {
        h.write_str("gain");
        h.write_u64(3);
    });
    assert_eq!(a, b);
}

#[test]
fn length_prefix_separates_adjacent_strings() {
    let a = hash_of(|h| {
        h.write_str("ab");
        h.write_str("c");
    });
    let b = hash_of(|h| {
        h.write_str("a");
        h.write_str("bc");
    });
    assert_ne!(a, b);
}

#[test]
fn flags_change_hash() {
    let a = hash_of(|h| h.write_bool(false));
    let b = hash_of(|h| h.write_bool(true));
    assert_ne!(a, b);
}
