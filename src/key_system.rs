use crate::error::{HlsError, Result};
use crate::playlist::KeyDescriptor;

/// `KEYFORMAT` URN used by Widevine-flavored `EXT-X-KEY`/`EXT-X-SESSION-KEY`
/// entries (`pywidevine.cdm.Cdm.urn` in `devine`).
pub const WIDEVINE_URN: &str = "urn:uuid:edef8ba9-79d6-4ace-a3c8-27dcd51d21ed";

fn is_supported(key: &KeyDescriptor) -> bool {
    key.method == "AES-128"
        || key.method == "ISO-23001-7"
        || key
            .keyformat
            .as_deref()
            .is_some_and(|f| f.eq_ignore_ascii_case(WIDEVINE_URN))
}

/// Choose the one supported key system from a non-empty list of candidates.
///
/// `Ok(None)` is the "plaintext sentinel" — at least one descriptor was
/// `method=NONE`, so segments under it are unencrypted. Ground truth:
/// `devine/core/manifests/hls.py::get_supported_key`.
pub fn select_key_system(keys: &[KeyDescriptor]) -> Result<Option<KeyDescriptor>> {
    if keys.iter().any(KeyDescriptor::is_none_method) {
        return Ok(None);
    }

    if let Some(key) = keys.iter().find(|k| is_supported(k)) {
        return Ok(Some(key.clone()));
    }

    let unsupported = keys
        .iter()
        .map(|k| match &k.keyformat {
            Some(fmt) => format!("{} ({fmt})", k.method),
            None => k.method.clone(),
        })
        .collect();
    Err(HlsError::UnsupportedKeySystems(unsupported))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn key(method: &str, keyformat: Option<&str>) -> KeyDescriptor {
        KeyDescriptor {
            method: method.to_string(),
            keyformat: keyformat.map(str::to_string),
            uri: Some("https://example/key".into()),
            extra: BTreeMap::new(),
        }
    }

    #[test]
    fn none_wins_regardless_of_position() {
        let keys = vec![key("AES-128", None), key("NONE", None)];
        assert!(select_key_system(&keys).unwrap().is_none());
    }

    #[test]
    fn picks_first_acceptable_in_order() {
        let keys = vec![key("SAMPLE-AES", None), key("AES-128", None), key("ISO-23001-7", None)];
        let selected = select_key_system(&keys).unwrap().unwrap();
        assert_eq!(selected.method, "AES-128");
    }

    #[test]
    fn widevine_urn_is_case_insensitive() {
        let keys = vec![key("com.widevine", Some(&WIDEVINE_URN.to_uppercase()))];
        assert!(select_key_system(&keys).unwrap().is_some());
    }

    #[test]
    fn unsupported_only_fails_with_methods_listed() {
        let keys = vec![key("SAMPLE-AES", None), key("AES-CTR", None)];
        match select_key_system(&keys) {
            Err(HlsError::UnsupportedKeySystems(methods)) => {
                assert_eq!(methods, vec!["SAMPLE-AES".to_string(), "AES-CTR".to_string()]);
            }
            other => panic!("expected UnsupportedKeySystems, got {other:?}"),
        }
    }
}
