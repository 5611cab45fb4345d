use regex::Regex;
use std::{fmt::Debug, iter::zip};

pub fn assert_re(pattern: &str, haystack: &str) {
    let re = Regex::new(pattern).unwrap();
    assert!(re.is_match(haystack), "{:?} did not match {:?}", haystack, re);
}

/// Asserts that `res` is an error whose Display text matches `pattern`.
pub fn assert_err_re<T: Debug, E: std::fmt::Display>(
    pattern: &str,
    res: Result<T, E>,
) {
    match res {
        Ok(v) => panic!("Expected error matching {:?}, got Ok({:?})", pattern, v),
        Err(e) => assert_re(pattern, &e.to_string()),
    }
}

pub fn assert_vec_eq<T: PartialEq + Debug>(left: Vec<T>, right: Vec<T>) {
    assert_vecr_eq(&left, &right);
}

pub fn assert_vecr_eq<T: PartialEq + Debug>(left: &Vec<T>, right: &Vec<T>) {
    if left == right {
        return;
    }

    let mut err_str = "left != right. left: [\n".to_string();
    for o in left {
        err_str += &format!("{:?},\n", o);
    }
    err_str += "] != right: [\n";
    for o in right {
        err_str += &format!("{:?},\n", o);
    }
    eprintln!("{}]", err_str);

    if left.len() != right.len() {
        panic!("size of left ({}) != size of right ({})", left.len(), right.len());
    }
    for (i, (l, r)) in zip(left, right).enumerate() {
        if l != r {
            eprintln!("Mismatch at index {}:", i);
            eprintln!("left: {:#?} != right: {:#?}", l, r);
        }
    }
    panic!();
}
