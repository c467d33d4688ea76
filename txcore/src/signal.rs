//! The out-of-band error/signal protocol of the signed-submission flow.
//!
//! When a write path lacks credentials the core answers with one of two
//! machine-readable strings; the client parses them, signs, and resubmits.
//! The strings are part of the wire contract and must match bit-exactly:
//!
//! ```text
//! Error(2): Public Key required
//! Error(3): Signature required:<hex_tx_bytes>::<hex_sign_data>
//! ```

use crate::error::CoreError;

/// The code-2 wire string.
pub const PUBKEY_REQUIRED_MESSAGE: &str = "Error(2): Public Key required";

/// Prefix of the code-3 wire string.
pub const SIGNATURE_REQUIRED_PREFIX: &str = "Error(3): Signature required:";

/// Renders a control signal into its `(code, wire string)` form; `None` for
/// every real error.
pub fn format_special_error_message(error: &CoreError) -> Option<(u8, String)> {
    match error {
        CoreError::PubKeyRequired => Some((2, PUBKEY_REQUIRED_MESSAGE.to_string())),
        CoreError::SignatureRequired {
            tx_bytes,
            sign_data,
        } => Some((
            3,
            format!(
                "{SIGNATURE_REQUIRED_PREFIX}{}::{}",
                hex::encode(tx_bytes),
                hex::encode(sign_data)
            ),
        )),
        _ => None,
    }
}

/// Client side of code 3: recovers `(tx_bytes, sign_data)` from the wire
/// string.
pub fn parse_signature_request(message: &str) -> Option<(Vec<u8>, Vec<u8>)> {
    let rest = message.strip_prefix(SIGNATURE_REQUIRED_PREFIX)?;
    let (tx_hex, sign_hex) = rest.split_once("::")?;
    Some((hex::decode(tx_hex).ok()?, hex::decode(sign_hex).ok()?))
}

//---------------------------------------------------------------------------------------------------- Tests
#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn pubkey_required_is_bit_exact() {
        let (code, message) = format_special_error_message(&CoreError::PubKeyRequired).unwrap();
        assert_eq!(code, 2);
        assert_eq!(message, "Error(2): Public Key required");
    }

    #[test]
    fn signature_required_round_trips() {
        let error = CoreError::SignatureRequired {
            tx_bytes: vec![0xde, 0xad],
            sign_data: [0x11; 32],
        };
        let (code, message) = format_special_error_message(&error).unwrap();
        assert_eq!(code, 3);
        assert_eq!(
            message,
            format!("Error(3): Signature required:dead::{}", "11".repeat(32))
        );

        let (tx_bytes, sign_data) = parse_signature_request(&message).unwrap();
        assert_eq!(tx_bytes, vec![0xde, 0xad]);
        assert_eq!(sign_data, vec![0x11; 32]);
    }

    #[test]
    fn real_errors_are_not_signals() {
        assert_eq!(
            format_special_error_message(&CoreError::PubKeyRequired).map(|(c, _)| c),
            Some(2)
        );
        assert!(format_special_error_message(&CoreError::NotInPool([0; 32])).is_none());
        assert!(parse_signature_request("Error(2): Public Key required").is_none());
    }
}
