//! Feed frame vector tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use watchman_core::protocol::{ChangeKind, Envelope};

use vector_loader::load;

#[test]
fn change_vectors() {
    let files = [
        "change_insert.json",
        "change_hint.json",
        "change_delete_odd_payload.json",
        "change_bad_version.json",
        "change_unknown_kind.json",
        "change_missing_data.json",
        "sys_authed.json",
    ];

    for f in files {
        let v = load(f);
        let res = Envelope::parse(&v.frame).and_then(|env| {
            let notice = env.change_notice()?;
            Ok((env.seq, notice))
        });

        if let Some(err) = v.expect_error {
            let e = res.expect_err("expected error");
            assert_eq!(e.client_code().as_str(), err.code, "vector={}", v.description);
            continue;
        }

        let (seq, notice) = res.expect("expected ok notice");
        let ex = v.expect.expect("missing expect block");

        assert_eq!(notice.kind.as_str(), ex["kind"].as_str().unwrap(), "vector={}", v.description);
        assert_eq!(seq, ex["seq"].as_u64(), "vector={}", v.description);
        assert_eq!(
            notice.payload.is_some(),
            ex["has_payload"].as_bool().unwrap(),
            "vector={}",
            v.description
        );
    }
}

#[test]
fn notice_serializes_without_payload_when_hint() {
    let s = serde_json::to_string(&watchman_core::protocol::ChangeNotice::hint()).unwrap();
    assert_eq!(s, r#"{"kind":"update"}"#);
}

#[test]
fn row_notice_carries_user_ref() {
    let n = watchman_core::protocol::ChangeNotice::for_row(ChangeKind::Delete, "u-ben");
    assert_eq!(n.payload.unwrap().get(), r#"{"user_id":"u-ben"}"#);
}
