use nuri::monitoring::metrics::parse_buckets_env;

#[test]
fn test_parse_buckets_env_valid() {
    std::env::set_var("NURI_TEST_RETRIEVAL_BUCKETS", "50, 10, 5, 250");
    let parsed = parse_buckets_env("NURI_TEST_RETRIEVAL_BUCKETS");
    assert_eq!(parsed, Some(vec![5.0, 10.0, 50.0, 250.0]));
    std::env::remove_var("NURI_TEST_RETRIEVAL_BUCKETS");
}

#[test]
fn test_parse_buckets_env_invalid_token_falls_back() {
    std::env::set_var("NURI_TEST_BAD_BUCKETS", "50, abc, 100");
    // invalid token causes None (fallback to defaults at call site)
    assert_eq!(parse_buckets_env("NURI_TEST_BAD_BUCKETS"), None);
    std::env::set_var("NURI_TEST_BAD_BUCKETS", "10, -5");
    assert_eq!(parse_buckets_env("NURI_TEST_BAD_BUCKETS"), None);
    std::env::remove_var("NURI_TEST_BAD_BUCKETS");
}

#[test]
fn test_parse_buckets_env_empty_falls_back() {
    std::env::set_var("NURI_TEST_EMPTY_BUCKETS", "   ");
    assert_eq!(parse_buckets_env("NURI_TEST_EMPTY_BUCKETS"), None);
    std::env::remove_var("NURI_TEST_EMPTY_BUCKETS");
    assert_eq!(parse_buckets_env("NURI_TEST_EMPTY_BUCKETS"), None);
}
