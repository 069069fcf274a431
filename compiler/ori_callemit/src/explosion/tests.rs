use pretty_assertions::assert_eq;

use super::*;

fn v(raw: u32) -> ValueId {
    ValueId::from_raw(raw)
}

#[test]
fn claims_in_order() {
    let mut e = Explosion::from_values(ExplosionLevel::Maximal, &[v(1), v(2), v(3)]);
    assert_eq!(e.level(), ExplosionLevel::Maximal);
    assert_eq!(e.claim_next(), v(1));
    assert_eq!(e.claim(2), &[v(2), v(3)]);
    assert_eq!(e.remaining(), 0);
    assert_eq!(e.len(), 3);
}

#[test]
fn claim_all_drains_the_rest() {
    let mut e = Explosion::new(ExplosionLevel::Minimal);
    e.add(v(4));
    e.add_all([v(5), v(6)]);
    assert_eq!(e.claim_next(), v(4));
    assert_eq!(e.claim_all(), &[v(5), v(6)]);
    assert!(e.claim_all().is_empty());
}

#[test]
fn claim_zero_is_allowed_on_empty() {
    let mut e = Explosion::new(ExplosionLevel::Minimal);
    assert!(e.is_empty());
    assert!(e.claim(0).is_empty());
}

#[test]
#[should_panic(expected = "claimed past the end")]
fn claiming_past_the_end_panics() {
    let mut e = Explosion::from_values(ExplosionLevel::Minimal, &[v(1)]);
    e.claim_next();
    e.claim_next();
}

#[test]
#[should_panic(expected = "claimed 3 values but only 2 remain")]
fn over_claiming_panics() {
    let mut e = Explosion::from_values(ExplosionLevel::Minimal, &[v(1), v(2)]);
    e.claim(3);
}

#[test]
fn default_level_is_minimal() {
    assert_eq!(ExplosionLevel::default(), ExplosionLevel::Minimal);
}
