//! Digest-style authentication.
//!
//! The camera issues a realm and a nonce after login. The client answers with
//! `md5(md5("user:realm:password") + ":" + nonce)` as lowercase hex, carried
//! in every subsequent envelope.

use md5::{Digest, Md5};

/// Derives the session auth token from the credentials and the challenge.
pub fn auth_token(username: &str, password: &str, realm: &str, nonce: &str) -> String {
    let inner = md5_hex(&format!("{}:{}:{}", username, realm, password));
    md5_hex(&format!("{}:{}", inner, nonce))
}

fn md5_hex(text: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_token() {
        // md5("admin:X:secret") = 6372d3c20fe208047532534f38c586ec
        assert_eq!(md5_hex("admin:X:secret"), "6372d3c20fe208047532534f38c586ec");
        assert_eq!(
            auth_token("admin", "secret", "X", "Y"),
            "64ded122b308311a60eb76af24b704f4"
        );
        assert_eq!(
            auth_token("user", "pass", "realm", "nonce"),
            "9fae7332e57be92217303ad9df3915b2"
        );
    }

    #[test]
    fn test_token_format() {
        let token = auth_token("a", "b", "c", "d");
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    proptest! {
        #[test]
        fn prop_token_is_deterministic(
            user in "[a-z]{1,8}", pass in "[a-z0-9]{1,8}",
            realm in "[A-Za-z]{1,8}", nonce in "[0-9a-f]{1,16}"
        ) {
            prop_assert_eq!(
                auth_token(&user, &pass, &realm, &nonce),
                auth_token(&user, &pass, &realm, &nonce)
            );
        }

        #[test]
        fn prop_each_input_changes_token(
            user in "[a-z]{1,8}", pass in "[a-z0-9]{1,8}",
            realm in "[A-Za-z]{1,8}", nonce in "[0-9a-f]{1,16}"
        ) {
            let base = auth_token(&user, &pass, &realm, &nonce);
            let other_user = format!("{}x", user);
            let other_pass = format!("{}x", pass);
            let other_realm = format!("{}x", realm);
            let other_nonce = format!("{}x", nonce);
            prop_assert_ne!(&base, &auth_token(&other_user, &pass, &realm, &nonce));
            prop_assert_ne!(&base, &auth_token(&user, &other_pass, &realm, &nonce));
            prop_assert_ne!(&base, &auth_token(&user, &pass, &other_realm, &nonce));
            prop_assert_ne!(&base, &auth_token(&user, &pass, &realm, &other_nonce));
        }
    }
}
