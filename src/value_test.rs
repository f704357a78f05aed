use super::*;

#[test]
fn test_string_int_never_equal() {
    let s = Value::new_string("7");
    let i = Value::new_int(7);
    assert_ne!(s, i);
}

#[test]
fn test_int_orders_before_string() {
    let s = Value::new_string("a");
    let i = Value::new_int(100);
    assert_eq!(i.compare(&s, CmpMode::Binary), Ordering::Less);
    assert_eq!(s.compare(&i, CmpMode::Binary), Ordering::Greater);
}

#[test]
fn test_int_numeric_order() {
    let a = Value::new_int(5);
    let b = Value::new_int(10);
    assert_eq!(a.compare(&b, CmpMode::Binary), Ordering::Less);
}

#[test]
fn test_wrong_type_accessors() {
    let i = Value::new_int(1);
    assert!(i.as_str().is_err());
    assert!(i.as_caseless().is_err());
    assert!(i.as_collated().is_err());

    let s = Value::new_string("x");
    assert!(s.as_int().is_err());
}

#[test]
fn test_caseless_compare() {
    let a = Value::new_string("Artist");
    let b = Value::new_string("artist");
    assert_ne!(a, b);
    assert_eq!(a.compare(&b, CmpMode::Caseless), Ordering::Equal);
    assert_ne!(a.compare(&b, CmpMode::Binary), Ordering::Equal);
}

#[test]
fn test_collate_accents() {
    let beta = Value::new_string("béta");
    let alpha = Value::new_string("alpha");
    let gamma = Value::new_string("gamma");
    assert_eq!(alpha.compare(&beta, CmpMode::Collate), Ordering::Less);
    assert_eq!(beta.compare(&gamma, CmpMode::Collate), Ordering::Less);
}

#[test]
fn test_caseless_cached_stable() {
    let a = Value::new_string("MiXeD");
    let first = a.as_caseless().unwrap();
    let second = a.as_caseless().unwrap();
    assert_eq!(first, second);
    assert_eq!(first, "mixed");
}
