//! Address to ElectrumX script hash derivation.
//!
//! ElectrumX indexes outputs by the byte-reversed SHA-256 of their output
//! script. Wallet addresses are mapped onto the P2PKH script template, so
//! this is only meaningful for legacy pay-to-pubkey-hash addresses.

use std::collections::HashMap;

use bitcoin::hashes::{sha256, Hash};
use bitcoin::{PubkeyHash, ScriptBuf};
use tracing::warn;

use crate::error::CoreError;
use crate::types::ScriptHash;

const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Version prefix and checksum suffix around the hash in a decoded address.
const VERSION_LEN: usize = 1;
const CHECKSUM_LEN: usize = 4;

/// Syntactic check only: every character is in the base-58 alphabet.
/// The checksum is not verified.
#[must_use]
pub fn is_valid_address(address: &str) -> bool {
    !address.is_empty() && address.chars().all(|c| BASE58_ALPHABET.contains(c))
}

/// Keep the addresses that pass [`is_valid_address`], in order.
pub fn filter_valid_addresses<I, S>(addresses: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    addresses
        .into_iter()
        .map(Into::into)
        .filter(|address| is_valid_address(address))
        .collect()
}

/// Derive the ElectrumX script hash of `address`.
pub fn script_hash(address: &str) -> Result<ScriptHash, CoreError> {
    if !is_valid_address(address) {
        return Err(CoreError::Param(format!(
            "address `{address}` is not base58"
        )));
    }

    let payload = bitcoin::base58::decode(address)
        .map_err(|e| CoreError::Param(format!("decode address `{address}`: {e}")))?;
    if payload.len() < VERSION_LEN + CHECKSUM_LEN {
        return Err(CoreError::Param(format!(
            "address `{address}` is too short"
        )));
    }

    let hash_bytes = &payload[VERSION_LEN..payload.len() - CHECKSUM_LEN];
    let hash: [u8; 20] = hash_bytes.try_into().map_err(|_| {
        CoreError::Param(format!(
            "address `{address}` carries a {}-byte hash, expected 20",
            hash_bytes.len()
        ))
    })?;

    let script = ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array(hash));
    let mut digest = sha256::Hash::hash(script.as_bytes()).to_byte_array();
    digest.reverse();
    Ok(ScriptHash(hex::encode(digest)))
}

/// Map a batch of addresses to script hashes, keeping the reverse mapping.
///
/// The returned list is aligned with `addresses`; a slot is `None` when that
/// address has no script hash. Derivable positions are the request ids used
/// for batched ElectrumX calls.
pub fn script_hashes(
    addresses: &[String],
) -> (Vec<Option<ScriptHash>>, HashMap<ScriptHash, String>) {
    let mut list = Vec::with_capacity(addresses.len());
    let mut by_hash = HashMap::with_capacity(addresses.len());
    for address in addresses {
        match script_hash(address) {
            Ok(hash) => {
                by_hash.insert(hash.clone(), address.clone());
                list.push(Some(hash));
            }
            Err(e) => {
                warn!(%address, error = %e, "address has no script hash");
                list.push(None);
            }
        }
    }
    (list, by_hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    // (address, expected script hash) pairs.
    const GOLDEN: &[(&str, &str)] = &[
        (
            "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa",
            "8b01df4e368ea28f8dc0423bcf7a4923e3a12d307c875e47a0cfbf90b5c39161",
        ),
        (
            "1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2",
            "eafd9bc024177ba93572c1cc3a83f555dadbb81ca94cd9761ef5211ce794cea9",
        ),
        (
            "mipcBbFg9gMiCh81Kj8tqqdgoZub1ZJRfn",
            "7bd6809f7b634c856912c8de25f39daf3b6f5692050d2160046ab4ddd5861aab",
        ),
    ];

    #[test]
    fn golden_vectors() {
        for (address, expected) in GOLDEN {
            let hash = script_hash(address).expect("golden address must hash");
            assert_eq!(hash.as_str(), *expected, "script hash of {address}");
        }
    }

    #[test]
    fn derivation_is_deterministic() {
        let a = script_hash(GOLDEN[0].0).unwrap();
        let b = script_hash(GOLDEN[0].0).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn p2sh_address_is_hashed_with_p2pkh_template() {
        // Only the payload matters; the version byte is discarded.
        let hash = script_hash("3J98t1WpEZ73CNmQviecrnyiWrnqRhWNLy").unwrap();
        assert_eq!(
            hash.as_str(),
            "06c4fee7ad2321d04d96f97ea46104a6f7999269a48fc79f9baf03a4786d30cd"
        );
    }

    #[test]
    fn rejects_characters_outside_alphabet() {
        assert!(!is_valid_address("1A1zP1eP5QGefi2DMPTfTL5SLmv7Div0Na"));
        assert!(!is_valid_address("bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq"));
        assert!(!is_valid_address(""));
        let err = script_hash("0OIl").unwrap_err();
        assert!(matches!(err, CoreError::Param(_)));
    }

    #[test]
    fn rejects_payload_without_twenty_byte_hash() {
        let err = script_hash("1111111").unwrap_err();
        assert!(err.to_string().contains("too short") || err.to_string().contains("hash"));
        let err = script_hash("2NEpo7TZRRrLZSi2U").unwrap_err();
        assert!(matches!(err, CoreError::Param(_)));
    }

    #[test]
    fn filter_keeps_order_and_drops_invalid() {
        let kept = filter_valid_addresses(["1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2", "bad0", "1A1z"]);
        assert_eq!(kept, vec!["1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2", "1A1z"]);
    }

    #[test]
    fn batch_mapping_round_trips_to_addresses() {
        let addresses: Vec<String> = GOLDEN.iter().map(|(a, _)| a.to_string()).collect();
        let (list, by_hash) = script_hashes(&addresses);
        assert_eq!(list.len(), addresses.len());
        for (hash, address) in list.iter().zip(&addresses) {
            assert_eq!(by_hash.get(hash.as_ref().unwrap()), Some(address));
        }
    }

    #[test]
    fn underivable_address_leaves_its_slot_empty() {
        let addresses = vec![GOLDEN[0].0.to_string(), "1A1z".to_string(), GOLDEN[1].0.to_string()];
        let (list, by_hash) = script_hashes(&addresses);
        assert_eq!(list.len(), 3);
        assert_eq!(list[0].as_ref().map(ScriptHash::as_str), Some(GOLDEN[0].1));
        assert!(list[1].is_none());
        assert_eq!(list[2].as_ref().map(ScriptHash::as_str), Some(GOLDEN[1].1));
        assert_eq!(by_hash.len(), 2);
    }
}
