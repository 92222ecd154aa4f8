mod common;

use common::{consensus, vote, R_LINE};
use rstest::rstest;
use tordesc::{parse_consensus, parse_vote, DocumentParseError, Fingerprint, Flavor, ParseOptions};

fn strict_consensus(raw: &str) -> Result<tordesc::Consensus, DocumentParseError> {
    parse_consensus(raw.as_bytes(), &ParseOptions::strict())
}

#[rstest]
#[case("min=-2147483648", true)]
#[case("min=-2147483649", false)]
#[case("max=2147483647", true)]
#[case("max=2147483648", false)]
#[case("bwweightscale=10000 CircuitPriorityHalflifeMsec=30000", true)]
#[case("max=12.5", false)]
#[case("max", false)]
fn params_are_bounded_to_i32(#[case] params: &str, #[case] ok: bool) {
    let raw = consensus(&format!("params {}\n", params), "");
    let result = strict_consensus(&raw);
    assert_eq!(result.is_ok(), ok, "{:?}", result);
    if let Ok(doc) = result {
        assert!(!doc.params.is_empty());
    }
}

#[test]
fn params_boundaries_keep_their_values() {
    let raw = consensus("params max=2147483647 min=-2147483648\n", "");
    let doc = strict_consensus(&raw).unwrap();
    assert_eq!(doc.params["max"], i32::MAX);
    assert_eq!(doc.params["min"], i32::MIN);
}

#[test]
fn empty_params_is_an_empty_map() {
    let doc = strict_consensus(&consensus("params\n", "")).unwrap();
    assert!(doc.params.is_empty());
    let doc = strict_consensus(&consensus("", "")).unwrap();
    assert!(doc.params.is_empty());
}

#[test]
fn fingerprint_from_base64_is_canonical() {
    let entry = "r relay ADQ6gCT3DiFHKPDFr3rODBUI8HM bOzQ0RNlBtVY9a6RHG3b0f6CX7g 2019-05-31 23:13:53 1.2.3.4 9001 0\ns Running\n";
    let doc = strict_consensus(&consensus("", entry)).unwrap();
    let fingerprint = *doc.relays.keys().next().unwrap();
    assert_eq!(
        fingerprint.to_string(),
        "00343A8024F70E214728F0C5AF7ACE0C1508F073"
    );
    // hex and base64 forms name the same relay
    let from_hex = Fingerprint::from_str_hex(&fingerprint.to_string()).unwrap();
    assert_eq!(from_hex, fingerprint);
    assert_eq!(
        Fingerprint::from_str_b64("ADQ6gCT3DiFHKPDFr3rODBUI8HM").unwrap(),
        fingerprint
    );
    assert!(doc.relays.contains_key(&from_hex));
}

#[rstest]
#[case("ADQ6gCT3DiFHKPDFr3rODBUI8HM=")]
#[case("ADQ6gCT3DiFHKPDFr3rODBUI8H")]
#[case("ADQ6gCT3DiFHKPDFr3rODBUI8HM!")]
fn malformed_base64_identities(#[case] identity: &str) {
    let entry = format!(
        "r relay {} bOzQ0RNlBtVY9a6RHG3b0f6CX7g 2019-05-31 23:13:53 1.2.3.4 9001 0\ns Running\n",
        identity
    );
    assert!(strict_consensus(&consensus("", &entry)).is_err());
}

#[test]
fn network_status_version_comes_first() {
    let raw = consensus("", "").replacen(
        "network-status-version 3\nvote-status consensus\n",
        "vote-status consensus\nnetwork-status-version 3\n",
        1,
    );
    assert!(matches!(
        strict_consensus(&raw).unwrap_err(),
        DocumentParseError::WrongFirstKeyword { .. }
    ));
}

#[test]
fn header_lines_after_entries_are_out_of_order() {
    let raw = consensus("", &format!("{}s Running\nclient-versions 0.4.0.5\n", R_LINE));
    assert!(matches!(
        strict_consensus(&raw).unwrap_err(),
        DocumentParseError::UnexpectedKeyword { .. }
    ));
}

#[rstest]
#[case("valid-after 2019-06-01 00:00:00\n")]
#[case("known-flags Running\n")]
#[case("params a=1\nparams b=2\n")]
fn duplicate_header_lines_in_consensus(#[case] duplicate: &str) {
    let raw = consensus(duplicate, "");
    assert!(matches!(
        strict_consensus(&raw).unwrap_err(),
        DocumentParseError::DuplicateKeyword { .. }
    ));
}

#[test]
fn duplicate_entry_lines() {
    let raw = consensus("", &format!("{}s Running\nw Bandwidth=1\nw Bandwidth=2\n", R_LINE));
    assert!(matches!(
        strict_consensus(&raw).unwrap_err(),
        DocumentParseError::DuplicateKeyword { .. }
    ));
}

#[rstest]
#[case("s Running\ns Running\n")]
#[case("s Running\nv Tor 0.4.0.5\nv Tor 0.4.0.5\n")]
#[case("s Running\np accept 80\np reject 25\n")]
fn duplicate_lines_within_one_consensus_entry(#[case] lines: &str) {
    let raw = consensus("", &format!("{}{}", R_LINE, lines));
    for options in [ParseOptions::strict(), ParseOptions::lenient()].iter() {
        assert!(matches!(
            parse_consensus(raw.as_bytes(), options).unwrap_err(),
            DocumentParseError::DuplicateKeyword { .. }
        ));
    }
}

#[test]
fn same_line_in_separate_entries() {
    let second = "r other ADQ6gCT3DiFHKPDFr3rODBUI8HM bOzQ0RNlBtVY9a6RHG3b0f6CX7g 2019-05-31 23:13:53 1.2.3.4 9001 0\n";
    let raw = consensus("", &format!("{}s Running\n{}s Running\n", R_LINE, second));
    let doc = strict_consensus(&raw).unwrap();
    assert_eq!(doc.relays.len(), 2);
}

#[test]
fn duplicate_vote_header_lines() {
    let raw = vote("published 2019-06-01 00:00:00\n", "");
    assert!(matches!(
        parse_vote(raw.as_bytes(), &ParseOptions::strict()).unwrap_err(),
        DocumentParseError::DuplicateKeyword { .. }
    ));
}

#[test]
fn unrecognized_lines_in_consensus() {
    let raw = consensus("unrecognized-line 1\n", "");
    assert!(matches!(
        strict_consensus(&raw).unwrap_err(),
        DocumentParseError::UnrecognizedLine { .. }
    ));
    let doc = parse_consensus(raw.as_bytes(), &ParseOptions::lenient()).unwrap();
    assert_eq!(doc.unrecognized_lines, vec!["unrecognized-line 1"]);
}

#[test]
fn unrecognized_lines_do_not_relax_known_keywords() {
    let raw = consensus("params max=2147483648\n", "");
    assert!(parse_consensus(raw.as_bytes(), &ParseOptions::lenient()).is_err());
}

#[test]
fn microdesc_consensus() {
    let raw = consensus(
        "",
        "r seele AAoQ1DAR6kkoo19hBAX5K0QztNw 2019-05-31 23:13:53 67.161.31.147 9001 0\n\
         s Fast Running\n\
         m Xr0ZB4VFgkKWWpaaMDYk7k2JRNc9DLsgBzrf7yBHHdQ\n",
    )
    .replacen("network-status-version 3\n", "network-status-version 3 microdesc\n", 1);
    let doc = strict_consensus(&raw).unwrap();
    assert_eq!(doc.flavor, Flavor::Microdesc);
    let entry = doc.relays.values().next().unwrap();
    assert_eq!(entry.descriptor_digest, None);
    assert_eq!(entry.microdescriptor_digests.len(), 1);
}

#[test]
fn vote_entries_and_params() {
    let raw = vote(
        "params CircuitPriorityHalflifeMsec=30000\n",
        &format!("{}s Running Valid\nw Bandwidth=20 Measured=30\n", R_LINE),
    );
    let doc = parse_vote(raw.as_bytes(), &ParseOptions::strict()).unwrap();
    assert_eq!(doc.params["CircuitPriorityHalflifeMsec"], 30000);
    assert_eq!(doc.authority.nickname, "dannenberg");
    let entry = doc.entries.values().next().unwrap();
    assert_eq!(entry.measured, Some(30));
}

#[test]
fn non_ascii_fails_even_when_lenient() {
    let raw = consensus("", "").replace("Peter Palfrader", "Peter P\u{e4}lfrader");
    assert!(matches!(
        parse_consensus(raw.as_bytes(), &ParseOptions::lenient()).unwrap_err(),
        DocumentParseError::NonAscii { .. }
    ));
}
