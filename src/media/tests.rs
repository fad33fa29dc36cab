use super::{InvalidHeaderFormat, MediaRangeList};

#[test]
fn test_parse_single_range() {
    let list = MediaRangeList::parse("application/json").expect("parse");
    assert_eq!(list.ranges().len(), 1);
    assert_eq!(list.ranges()[0].main_type, "application");
    assert_eq!(list.ranges()[0].subtype, "json");
    assert!(list.ranges()[0].parameters.is_empty());
}

#[test]
fn test_parse_list_with_spacing() {
    let list = MediaRangeList::parse("text/html, application/json ,*/*").expect("parse");
    let names: Vec<String> = list.ranges().iter().map(ToString::to_string).collect();
    assert_eq!(names, vec!["text/html", "application/json", "*/*"]);
}

#[test]
fn test_parse_lowercases_types_and_param_names() {
    let list = MediaRangeList::parse("Text/HTML;Charset=UTF-8").expect("parse");
    let range = &list.ranges()[0];
    assert_eq!(range.main_type, "text");
    assert_eq!(range.subtype, "html");
    assert_eq!(range.parameters, vec![("charset".to_string(), "UTF-8".to_string())]);
}

#[test]
fn test_parse_quoted_value_with_escapes() {
    let list = MediaRangeList::parse(r#"text/plain;note="a \"quoted\" \\ value""#).expect("parse");
    assert_eq!(
        list.ranges()[0].parameters,
        vec![("note".to_string(), r#"a "quoted" \ value"#.to_string())]
    );
}

#[test]
fn test_parse_keeps_duplicate_params_in_order() {
    let list = MediaRangeList::parse("a/b;x=1;x=2;y=3").expect("parse");
    assert_eq!(
        list.ranges()[0].parameters,
        vec![
            ("x".to_string(), "1".to_string()),
            ("x".to_string(), "2".to_string()),
            ("y".to_string(), "3".to_string()),
        ]
    );
}

#[test]
fn test_parse_params_with_surrounding_space() {
    let list = MediaRangeList::parse("a/b ; x=1 ; y=\"2\" , c/d").expect("parse");
    assert_eq!(list.ranges().len(), 2);
    assert_eq!(list.ranges()[0].parameters.len(), 2);
    assert_eq!(list.ranges()[1].main_type, "c");
}

#[test]
fn test_error_reports_exact_position() {
    // '/' twice: the second slash is not a tchar in subtype position
    let err = MediaRangeList::parse("text/ht/ml").unwrap_err();
    assert_eq!(
        err,
        InvalidHeaderFormat::UnexpectedByte {
            position: 7,
            byte: b'/'
        }
    );

    let err = MediaRangeList::parse("text/html;q==1").unwrap_err();
    assert_eq!(
        err,
        InvalidHeaderFormat::UnexpectedByte {
            position: 12,
            byte: b'='
        }
    );
}

#[test]
fn test_error_position_on_substituted_byte() {
    // Substituting an invalid byte at each position of a valid header must
    // report exactly that position.
    let valid = "ab/cd;e=f";
    for position in 0..valid.len() {
        let mut bytes = valid.as_bytes().to_vec();
        bytes[position] = b'\x00';
        let header = String::from_utf8_lossy(&bytes).into_owned();
        match MediaRangeList::parse(&header) {
            Err(InvalidHeaderFormat::UnexpectedByte { position: p, byte }) => {
                assert_eq!(p, position, "header {header:?}");
                assert_eq!(byte, 0);
            }
            other => panic!("expected positional error for {header:?}, got {other:?}"),
        }
    }
}

#[test]
fn test_end_of_input_categories() {
    assert_eq!(
        MediaRangeList::parse("").unwrap_err(),
        InvalidHeaderFormat::NoSubtype
    );
    assert_eq!(
        MediaRangeList::parse("text").unwrap_err(),
        InvalidHeaderFormat::NoSubtype
    );
    assert_eq!(
        MediaRangeList::parse("text/").unwrap_err(),
        InvalidHeaderFormat::NoSubtype
    );
    assert_eq!(
        MediaRangeList::parse("text/html ").unwrap_err(),
        InvalidHeaderFormat::EndedWithWhitespace
    );
    assert_eq!(
        MediaRangeList::parse("text/html;").unwrap_err(),
        InvalidHeaderFormat::UnterminatedParameter
    );
    assert_eq!(
        MediaRangeList::parse("text/html;q").unwrap_err(),
        InvalidHeaderFormat::UnterminatedParameter
    );
    assert_eq!(
        MediaRangeList::parse("text/html;q=").unwrap_err(),
        InvalidHeaderFormat::UnterminatedParameter
    );
    assert_eq!(
        MediaRangeList::parse("text/html;q=\"a").unwrap_err(),
        InvalidHeaderFormat::UnterminatedParameter
    );
    assert_eq!(
        MediaRangeList::parse("text/html,").unwrap_err(),
        InvalidHeaderFormat::NoSubtype
    );
}

#[test]
fn test_truncation_fails_everywhere_inside_params() {
    // Every strict prefix of this header that cuts into the parameter section
    // must fail; the parser never accepts a dangling parameter.
    let valid = "a/b;x=\"v\"";
    for end in 4..valid.len() {
        assert!(
            MediaRangeList::parse(&valid[..end]).is_err(),
            "prefix {:?} unexpectedly parsed",
            &valid[..end]
        );
    }
    assert!(MediaRangeList::parse(valid).is_ok());
}

#[test]
fn test_match_wildcard_subtype() {
    let list = MediaRangeList::parse("abc/*").expect("parse");
    assert!(list.matches("abc/def"));
    assert!(list.matches("abc/uvw"));
    assert!(!list.matches("xyz/uvw"));
}

#[test]
fn test_match_full_wildcard() {
    let list = MediaRangeList::parse("*/*").expect("parse");
    assert!(list.matches("anything/at-all"));
    assert!(list.matches("text/plain; charset=utf-8"));
}

#[test]
fn test_match_concrete_requires_delimiter() {
    let list = MediaRangeList::parse("application/json").expect("parse");
    assert!(list.matches("application/json"));
    assert!(list.matches("application/json; charset=utf-8"));
    assert!(list.matches("application/json;charset=utf-8"));
    assert!(list.matches("application/json\tx"));
    assert!(!list.matches("application/jsonseq"));
    assert!(!list.matches("application/jso"));
}

#[test]
fn test_match_is_case_insensitive() {
    let list = MediaRangeList::parse("Application/JSON").expect("parse");
    assert!(list.matches("application/json"));
    let list = MediaRangeList::parse("application/json").expect("parse");
    assert!(list.matches("Application/Json; Charset=UTF-8"));
}

#[test]
fn test_declared_wildcard_range_covers_concrete_header() {
    // The consumer direction: the declared range is parsed and the raw
    // incoming Content-Type value is the candidate.
    let declared = MediaRangeList::parse("application/*").expect("parse");
    assert!(declared.matches("application/json; charset=utf-8"));
    assert!(!declared.matches("text/plain"));
}
