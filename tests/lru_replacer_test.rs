use bramble::buffer::LruReplacer;
use bramble::common::FrameId;

#[test]
fn test_victim_follows_unpin_order() {
    let replacer = LruReplacer::new(7);

    replacer.unpin(FrameId::new(1));
    replacer.unpin(FrameId::new(2));
    replacer.unpin(FrameId::new(3));
    replacer.unpin(FrameId::new(4));
    replacer.unpin(FrameId::new(5));
    replacer.unpin(FrameId::new(6));
    assert_eq!(replacer.size(), 6);

    assert_eq!(replacer.victim(), Some(FrameId::new(1)));
    assert_eq!(replacer.victim(), Some(FrameId::new(2)));
    assert_eq!(replacer.victim(), Some(FrameId::new(3)));
    assert_eq!(replacer.size(), 3);
}

#[test]
fn test_pin_removes_from_consideration() {
    let replacer = LruReplacer::new(7);

    for i in 1..=6 {
        replacer.unpin(FrameId::new(i));
    }

    replacer.pin(FrameId::new(3));
    replacer.pin(FrameId::new(4));
    assert_eq!(replacer.size(), 4);

    assert_eq!(replacer.victim(), Some(FrameId::new(1)));
    assert_eq!(replacer.victim(), Some(FrameId::new(2)));
    assert_eq!(replacer.victim(), Some(FrameId::new(5)));
    assert_eq!(replacer.victim(), Some(FrameId::new(6)));
    assert_eq!(replacer.victim(), None);
}

#[test]
fn test_unpin_after_victim_reinserts() {
    let replacer = LruReplacer::new(3);

    replacer.unpin(FrameId::new(0));
    replacer.unpin(FrameId::new(1));

    assert_eq!(replacer.victim(), Some(FrameId::new(0)));

    // 0 was evicted; unpinning it again makes it the most recent entry
    replacer.unpin(FrameId::new(0));
    assert_eq!(replacer.victim(), Some(FrameId::new(1)));
    assert_eq!(replacer.victim(), Some(FrameId::new(0)));
    assert_eq!(replacer.victim(), None);
}

#[test]
fn test_reunpin_keeps_position() {
    let replacer = LruReplacer::new(4);

    replacer.unpin(FrameId::new(1));
    replacer.unpin(FrameId::new(2));
    replacer.unpin(FrameId::new(1));
    replacer.unpin(FrameId::new(1));

    assert_eq!(replacer.size(), 2);
    assert_eq!(replacer.victim(), Some(FrameId::new(1)));
    assert_eq!(replacer.victim(), Some(FrameId::new(2)));
}

#[test]
fn test_capacity_is_bounded() {
    let replacer = LruReplacer::new(3);

    for i in 0..10 {
        replacer.unpin(FrameId::new(i));
    }
    assert_eq!(replacer.size(), 3);

    assert_eq!(replacer.victim(), Some(FrameId::new(0)));
    assert_eq!(replacer.victim(), Some(FrameId::new(1)));
    assert_eq!(replacer.victim(), Some(FrameId::new(2)));
    assert_eq!(replacer.victim(), None);
}
