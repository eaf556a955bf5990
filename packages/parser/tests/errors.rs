use idyll_parser::{parse, validate_document, ParseError, ParsedDocument, ValidationErrorType};

#[test]
fn test_malformed_xml() {
    for source in ["<document><p>unclosed</document>", "<document>", "", "<document/><document/>"] {
        let err = parse(source).unwrap_err();
        assert!(matches!(err, ParseError::MalformedXml { .. }), "{source}: {err:?}");
        assert!(err.path().is_none());
    }
}

#[test]
fn test_errors_carry_paths() {
    let err = parse(r#"<document id="d"><ul id="l"><li id="a"><p>no</p></li></ul></document>"#).unwrap_err();
    assert!(matches!(err, ParseError::InvalidChild { ref parent, ref child, .. } if parent == "li" && child == "p"));
    assert_eq!(err.path(), Some("/document/ul[0]/li[0]"));
}

#[test]
fn test_attribute_errors_are_collected() {
    let err = parse(r#"<document id="d"><fncall id="bad id" enabled="yes"/></document>"#).unwrap_err();
    let ParseError::InvalidAttributes { errors, .. } = err else {
        panic!("Expected attribute errors, got {err:?}");
    };

    let kinds: Vec<_> = errors.iter().map(|e| e.error_type).collect();
    assert!(kinds.contains(&ValidationErrorType::PatternMismatch));
    assert!(kinds.contains(&ValidationErrorType::MissingAttribute));
    assert!(kinds.contains(&ValidationErrorType::InvalidAttributeValue));
}

#[test]
fn test_params_must_be_an_object() {
    for params in ["not json", "[1, 2]", "\"text\""] {
        let source = format!(r#"<document id="d"><fncall id="f" idyll-fn="x"><params>{params}</params></fncall></document>"#);
        assert!(matches!(parse(&source), Err(ParseError::InvalidJson { .. })), "{params}");
    }
}

#[test]
fn test_duplicate_ids_are_a_validation_error() {
    let parsed = parse(r#"<document id="d"><p id="x">a</p><ul id="l"><li id="x">b</li></ul></document>"#).unwrap();
    let ParsedDocument::Idyll(doc) = parsed else {
        panic!("Expected idyll document");
    };

    let errors = validate_document(&doc);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].error_type, ValidationErrorType::DuplicateId);
}
