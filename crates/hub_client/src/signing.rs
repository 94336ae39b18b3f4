//! HMAC-SHA1 request signing.
//!
//! Envelope signature: `hex(HMAC-SHA1(key = secret, contents ‖ time ‖ token))`.
//! Link signature:     `hex(HMAC-SHA1(key = secret, link_token ‖ time))`.
//!
//! Concatenation is raw string concatenation; `time` is rendered in decimal.
//! The secret keys the MAC and is never part of any request.

use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// An identity that can sign hub requests: a public token and the secret
/// paired with it. Both halves always come from the same credential record.
pub trait SigningIdentity {
    fn token(&self) -> &str;
    fn secret(&self) -> &str;
}

/// Lowercase hex HMAC-SHA1 of `message` keyed by `key`.
pub fn hmac_sha1_hex(key: &str, message: &str) -> String {
    let mut mac = HmacSha1::new_from_slice(key.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a hex signature against `message` keyed by `key`.
pub fn verify_hmac_sha1_hex(key: &str, message: &str, signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };
    let mut mac = HmacSha1::new_from_slice(key.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(message.as_bytes());
    mac.verify_slice(&expected).is_ok()
}

fn envelope_message(contents: &str, time: i64, token: &str) -> String {
    format!("{}{}{}", contents, time, token)
}

/// Signature over serialized `contents` and `time` for `identity`.
pub fn envelope_signature(contents: &str, time: i64, identity: &dyn SigningIdentity) -> String {
    hmac_sha1_hex(identity.secret(), &envelope_message(contents, time, identity.token()))
}

/// Check an envelope signature produced by [`envelope_signature`].
pub fn verify_envelope_signature(
    contents: &str,
    time: i64,
    identity: &dyn SigningIdentity,
    signature: &str,
) -> bool {
    verify_hmac_sha1_hex(
        identity.secret(),
        &envelope_message(contents, time, identity.token()),
        signature,
    )
}

/// Signature carried by a remote login link.
pub fn link_signature(link_token: &str, time: i64, secret: &str) -> String {
    hmac_sha1_hex(secret, &format!("{}{}", link_token, time))
}
