use super::*;
use crate::sourcepref::SourcePref;
use crate::store::RelationStore;

fn prefs() -> SourcePref {
    SourcePref::none()
}

#[test]
fn test_equal_filter_matches() {
    let mut store = RelationStore::new();
    store.add("url", Value::new_string("a"), "artist", Value::new_string("X"), "id3");

    let cond = Condition::equal("artist", Value::new_string("X"), CmpMode::Binary, prefs());
    let rows = cond.evaluate(&store).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].pivot_val.as_str().unwrap(), "a");
}

#[test]
fn test_exists_filter() {
    let mut store = RelationStore::new();
    store.add("url", Value::new_string("a"), "artist", Value::new_string("X"), "id3");
    store.add("url", Value::new_string("b"), "tracknr", Value::new_int(3), "id3");

    let cond = Condition::exists("artist", prefs());
    let rows = cond.evaluate(&store).unwrap();
    assert_eq!(rows.len(), 1);
}

#[test]
fn test_greater_range_scan() {
    let mut store = RelationStore::new();
    store.add("url", Value::new_string("a"), "tracknr", Value::new_int(7), "id3");

    let above = Condition::greater("tracknr", Value::new_int(5), CmpMode::Binary, prefs());
    assert_eq!(above.evaluate(&store).unwrap().len(), 1);

    let below = Condition::greater("tracknr", Value::new_int(10), CmpMode::Binary, prefs());
    assert_eq!(below.evaluate(&store).unwrap().len(), 0);
}

#[test]
fn test_and_short_circuits_on_false() {
    let mut store = RelationStore::new();
    store.add("url", Value::new_string("a"), "artist", Value::new_string("X"), "id3");

    let cond = Condition::and(vec![
        Condition::exists("url", prefs()),
        Condition::equal("artist", Value::new_string("Y"), CmpMode::Binary, prefs()),
    ]);
    assert_eq!(cond.evaluate(&store).unwrap().len(), 0);
}

#[test]
fn test_or_matches_either_branch() {
    let mut store = RelationStore::new();
    store.add("url", Value::new_string("a"), "artist", Value::new_string("X"), "id3");

    // Both operands share the driver key ("artist"), so a single index
    // scan on that key produces a candidate set the OR can be fully
    // evaluated over regardless of which operand the planner drives on.
    let cond = Condition::or(vec![
        Condition::equal("artist", Value::new_string("X"), CmpMode::Binary, prefs()),
        Condition::equal("artist", Value::new_string("nope"), CmpMode::Binary, prefs()),
    ]);
    assert_eq!(cond.evaluate(&store).unwrap().len(), 1);
}

#[test]
fn test_not_inverts() {
    let mut store = RelationStore::new();
    store.add("url", Value::new_string("a"), "artist", Value::new_string("X"), "id3");

    let cond = Condition::not(Condition::equal("artist", Value::new_string("X"), CmpMode::Binary, prefs()));
    assert_eq!(cond.evaluate(&store).unwrap().len(), 0);
}

#[test]
fn test_match_filter_uses_glob() {
    let mut store = RelationStore::new();
    store.add("url", Value::new_string("a"), "artist", Value::new_string("The Beatles"), "id3");

    let cond = Condition::matches("artist", "The *", prefs()).unwrap();
    assert_eq!(cond.evaluate(&store).unwrap().len(), 1);
}

#[test]
fn test_token_filter_whitespace_contains() {
    let mut store = RelationStore::new();
    store.add("url", Value::new_string("a"), "tags", Value::new_string("rock indie live"), "user");

    let cond = Condition::token("tags", Value::new_string("indie"), CmpMode::Binary, prefs());
    assert_eq!(cond.evaluate(&store).unwrap().len(), 1);

    let miss = Condition::token("tags", Value::new_string("indi"), CmpMode::Binary, prefs());
    assert_eq!(miss.evaluate(&store).unwrap().len(), 0);
}

#[test]
fn test_source_preference_restricts_candidates() {
    let mut store = RelationStore::new();
    store.add("url", Value::new_string("a"), "artist", Value::new_string("Wrong"), "guess");
    store.add("url", Value::new_string("a"), "artist", Value::new_string("Right"), "id3");

    let pref = SourcePref::create(&["id3", "guess"]).unwrap();
    let cond = Condition::equal("artist", Value::new_string("Right"), CmpMode::Binary, pref);
    assert_eq!(cond.evaluate(&store).unwrap().len(), 1);

    // swap which source wins: now "Wrong" (the guess source) is the
    // only value that survives restriction to the best source.
    let pref2 = SourcePref::create(&["guess", "id3"]).unwrap();
    let cond2 = Condition::equal("artist", Value::new_string("Right"), CmpMode::Binary, pref2);
    assert_eq!(cond2.evaluate(&store).unwrap().len(), 0);
}

#[test]
fn test_unknown_key_fails_bind() {
    let store = RelationStore::new();
    let cond = Condition::exists("nosuchkey", prefs());
    assert!(cond.evaluate(&store).is_err());
}

#[test]
fn test_parent_flag_follows_anchor_side() {
    let mut store = RelationStore::new();
    store.add("url", Value::new_string("a"), "artist", Value::new_string("X"), "id3");
    store.add("artist", Value::new_string("X"), "country", Value::new_string("UK"), "user");

    // driver matches on "artist" == "X"; two-sided indexing means the
    // value "X" is registered under the "artist" index from *both*
    // entries (once as val_b of the first, once as val_a of the
    // second), so the driver scan yields two candidate rows: one
    // pivoting on "url"/"a" (no "country" neighbor) and one pivoting on
    // "country"/"UK" itself. PARENT resolves "country" relative to the
    // shared anchor ("artist"/"X") instead of either row's own pivot,
    // so both rows see the anchor's "country" neighbor and survive.
    let with_parent = Condition::and(vec![
        Condition::equal("artist", Value::new_string("X"), CmpMode::Binary, prefs()),
        Condition::exists("country", prefs()).with_parent(true),
    ]);
    assert_eq!(with_parent.evaluate(&store).unwrap().len(), 2);

    let without_parent = Condition::and(vec![
        Condition::equal("artist", Value::new_string("X"), CmpMode::Binary, prefs()),
        Condition::exists("country", prefs()),
    ]);
    assert_eq!(without_parent.evaluate(&store).unwrap().len(), 0);
}

struct CustomEven;
impl FilterFn for CustomEven {
    fn matches(&self, value: &Value) -> bool {
        value.as_int().map(|i| i % 2 == 0).unwrap_or(false)
    }
}

#[test]
fn test_custom_filter() {
    let mut store = RelationStore::new();
    store.add("url", Value::new_string("a"), "tracknr", Value::new_int(4), "id3");
    store.add("url", Value::new_string("b"), "tracknr", Value::new_int(5), "id3");

    let cond = Condition::custom_filter("tracknr", prefs(), std::sync::Arc::new(CustomEven));
    assert_eq!(cond.evaluate(&store).unwrap().len(), 1);
}
