//! Self-contained bech32/bech32m codec (BIP-173 / BIP-350).
//!
//! Used as the fallback path for chains the native address codec does not
//! cover. Pure functions over byte slices, no allocation beyond the output
//! buffers, exhaustively property-tested below.

use crate::error::BtcError;

const CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";

/// Generator coefficients for the BCH checksum polymod.
const GENERATOR: [u32; 5] = [
    0x3b6a_57b2,
    0x2650_8e6d,
    0x1ea1_19fa,
    0x3d42_33dd,
    0x2a14_62b3,
];

/// Residue constant distinguishing bech32m from bech32 (which uses 1).
const BECH32M_CONST: u32 = 0x2bc8_30a3;

/// Checksum flavor of an encoded string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Bech32,
    Bech32m,
}

impl Variant {
    fn residue(self) -> u32 {
        match self {
            Variant::Bech32 => 1,
            Variant::Bech32m => BECH32M_CONST,
        }
    }

    /// Checksum flavor required for a given witness version (BIP-350).
    pub fn for_witness_version(version: u8) -> Variant {
        if version == 0 {
            Variant::Bech32
        } else {
            Variant::Bech32m
        }
    }
}

fn polymod(values: &[u8]) -> u32 {
    let mut chk: u32 = 1;
    for &v in values {
        let top = chk >> 25;
        chk = ((chk & 0x01ff_ffff) << 5) ^ u32::from(v);
        for (i, gen) in GENERATOR.iter().enumerate() {
            if (top >> i) & 1 == 1 {
                chk ^= gen;
            }
        }
    }
    chk
}

fn hrp_expand(hrp: &str) -> Vec<u8> {
    let bytes = hrp.as_bytes();
    let mut out = Vec::with_capacity(bytes.len() * 2 + 1);
    out.extend(bytes.iter().map(|b| b >> 5));
    out.push(0);
    out.extend(bytes.iter().map(|b| b & 0x1f));
    out
}

fn verify_checksum(hrp: &str, data: &[u8]) -> Option<Variant> {
    let mut values = hrp_expand(hrp);
    values.extend_from_slice(data);
    match polymod(&values) {
        1 => Some(Variant::Bech32),
        BECH32M_CONST => Some(Variant::Bech32m),
        _ => None,
    }
}

fn create_checksum(hrp: &str, data: &[u8], variant: Variant) -> [u8; 6] {
    let mut values = hrp_expand(hrp);
    values.extend_from_slice(data);
    values.extend_from_slice(&[0; 6]);
    let residue = polymod(&values) ^ variant.residue();
    let mut checksum = [0u8; 6];
    for (i, c) in checksum.iter_mut().enumerate() {
        *c = ((residue >> (5 * (5 - i))) & 0x1f) as u8;
    }
    checksum
}

/// Encode 5-bit groups under the given HRP and checksum variant.
pub fn encode(hrp: &str, data: &[u8], variant: Variant) -> Result<String, BtcError> {
    if hrp.is_empty() || hrp.len() > 83 {
        return Err(BtcError::Bech32(format!("invalid hrp length {}", hrp.len())));
    }
    if !hrp
        .bytes()
        .all(|b| (33..=126).contains(&b) && !b.is_ascii_uppercase())
    {
        return Err(BtcError::Bech32("hrp must be lowercase printable ascii".into()));
    }
    if let Some(&bad) = data.iter().find(|&&v| v > 31) {
        return Err(BtcError::Bech32(format!("data value {bad} exceeds 5 bits")));
    }

    let checksum = create_checksum(hrp, data, variant);
    let mut out = String::with_capacity(hrp.len() + 1 + data.len() + 6);
    out.push_str(hrp);
    out.push('1');
    for &v in data.iter().chain(checksum.iter()) {
        out.push(CHARSET[v as usize] as char);
    }
    Ok(out)
}

/// Decode a bech32/bech32m string into `(hrp, 5-bit groups, variant)`.
///
/// The checksum symbols are stripped from the returned data.
pub fn decode(encoded: &str) -> Result<(String, Vec<u8>, Variant), BtcError> {
    if encoded.len() > 90 {
        return Err(BtcError::Bech32(format!(
            "encoded string too long: {} chars",
            encoded.len()
        )));
    }
    let has_lower = encoded.bytes().any(|b| b.is_ascii_lowercase());
    let has_upper = encoded.bytes().any(|b| b.is_ascii_uppercase());
    if has_lower && has_upper {
        return Err(BtcError::Bech32("mixed-case string".into()));
    }
    let lowered = encoded.to_ascii_lowercase();

    let sep = lowered
        .rfind('1')
        .ok_or_else(|| BtcError::Bech32("missing separator".into()))?;
    if sep == 0 || sep + 7 > lowered.len() {
        return Err(BtcError::Bech32("invalid separator position".into()));
    }

    let hrp = &lowered[..sep];
    if !hrp.bytes().all(|b| (33..=126).contains(&b)) {
        return Err(BtcError::Bech32("invalid hrp character".into()));
    }

    let mut data = Vec::with_capacity(lowered.len() - sep - 1);
    for c in lowered[sep + 1..].bytes() {
        let value = CHARSET
            .iter()
            .position(|&ch| ch == c)
            .ok_or_else(|| BtcError::Bech32(format!("invalid data character '{}'", c as char)))?;
        data.push(value as u8);
    }

    let variant = verify_checksum(hrp, &data)
        .ok_or_else(|| BtcError::Bech32("checksum mismatch".into()))?;

    data.truncate(data.len() - 6);
    Ok((hrp.to_string(), data, variant))
}

/// Regroup a bit stream between arbitrary group sizes.
///
/// With `pad` set, trailing bits are flushed zero-padded (8→5 direction).
/// Without it, trailing bits must be zero and shorter than an input group
/// (5→8 direction), otherwise the input is rejected.
pub fn convert_bits(data: &[u8], from: u32, to: u32, pad: bool) -> Result<Vec<u8>, BtcError> {
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let maxv: u32 = (1 << to) - 1;
    let mut out = Vec::with_capacity(data.len() * from as usize / to as usize + 1);

    for &value in data {
        if u32::from(value) >> from != 0 {
            return Err(BtcError::Bech32(format!(
                "input value {value} exceeds {from} bits"
            )));
        }
        acc = (acc << from) | u32::from(value);
        bits += from;
        while bits >= to {
            bits -= to;
            out.push(((acc >> bits) & maxv) as u8);
        }
    }

    if pad {
        if bits > 0 {
            out.push(((acc << (to - bits)) & maxv) as u8);
        }
    } else if bits >= from || ((acc << (to - bits)) & maxv) != 0 {
        return Err(BtcError::Bech32("invalid padding bits".into()));
    }

    Ok(out)
}

/// Encode a segwit address from witness version and program.
pub fn encode_witness(hrp: &str, version: u8, program: &[u8]) -> Result<String, BtcError> {
    if version > 16 {
        return Err(BtcError::Bech32(format!("witness version {version} out of range")));
    }
    if program.len() < 2 || program.len() > 40 {
        return Err(BtcError::Bech32(format!(
            "witness program length {} out of range",
            program.len()
        )));
    }
    if version == 0 && program.len() != 20 && program.len() != 32 {
        return Err(BtcError::Bech32(
            "version 0 program must be 20 or 32 bytes".into(),
        ));
    }

    let mut data = vec![version];
    data.extend(convert_bits(program, 8, 5, true)?);
    encode(hrp, &data, Variant::for_witness_version(version))
}

/// Decode a segwit address into `(witness version, program)`, enforcing the
/// BIP-350 version/checksum pairing and the expected HRP.
pub fn decode_witness(address: &str, expected_hrp: &str) -> Result<(u8, Vec<u8>), BtcError> {
    let (hrp, data, variant) = decode(address)?;
    if hrp != expected_hrp {
        return Err(BtcError::Bech32(format!(
            "hrp mismatch: expected {expected_hrp}, got {hrp}"
        )));
    }
    if data.is_empty() {
        return Err(BtcError::Bech32("empty witness data".into()));
    }

    let version = data[0];
    if version > 16 {
        return Err(BtcError::Bech32(format!("witness version {version} out of range")));
    }
    if variant != Variant::for_witness_version(version) {
        return Err(BtcError::Bech32(
            "checksum variant does not match witness version".into(),
        ));
    }

    // Strict mode: non-zero or over-long padding is a hard error.
    let program = convert_bits(&data[1..], 5, 8, false)?;
    if program.len() < 2 || program.len() > 40 {
        return Err(BtcError::Bech32(format!(
            "witness program length {} out of range",
            program.len()
        )));
    }
    if version == 0 && program.len() != 20 && program.len() != 32 {
        return Err(BtcError::Bech32(
            "version 0 program must be 20 or 32 bytes".into(),
        ));
    }

    Ok((version, program))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// BIP-173 P2WPKH example: program is HASH160 of the generator pubkey.
    const V0_ADDR: &str = "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4";
    const V0_PROGRAM: &str = "751e76e8199196d454941c45d1b3a323f1433bd6";

    /// BIP-350 P2TR example: program is the generator point x coordinate.
    const V1_ADDR: &str = "bc1p0xlxvlhemja6c4dqv22uapctqupfhlxm9h8z3k2e72q4k9hcz7vqzk5jj0";
    const V1_PROGRAM: &str = "79be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";

    #[test]
    fn decode_bip173_p2wpkh_vector() {
        let (version, program) = decode_witness(V0_ADDR, "bc").unwrap();
        assert_eq!(version, 0);
        assert_eq!(hex::encode(program), V0_PROGRAM);
    }

    #[test]
    fn decode_bip350_p2tr_vector() {
        let (version, program) = decode_witness(V1_ADDR, "bc").unwrap();
        assert_eq!(version, 1);
        assert_eq!(hex::encode(program), V1_PROGRAM);
    }

    #[test]
    fn encode_matches_known_vectors() {
        let program = hex::decode(V0_PROGRAM).unwrap();
        assert_eq!(encode_witness("bc", 0, &program).unwrap(), V0_ADDR);

        let program = hex::decode(V1_PROGRAM).unwrap();
        assert_eq!(encode_witness("bc", 1, &program).unwrap(), V1_ADDR);
    }

    #[test]
    fn uppercase_input_is_accepted() {
        let upper = V0_ADDR.to_ascii_uppercase();
        let (version, program) = decode_witness(&upper, "bc").unwrap();
        assert_eq!(version, 0);
        assert_eq!(hex::encode(program), V0_PROGRAM);
    }

    #[test]
    fn mixed_case_rejected() {
        let mut chars: Vec<char> = V0_ADDR.chars().collect();
        chars[3] = chars[3].to_ascii_uppercase();
        let mixed: String = chars.into_iter().collect();
        assert!(decode(&mixed).is_err());
    }

    #[test]
    fn v0_with_bech32m_checksum_rejected() {
        // Valid checksum, wrong flavor for version 0.
        let program = hex::decode(V0_PROGRAM).unwrap();
        let mut data = vec![0u8];
        data.extend(convert_bits(&program, 8, 5, true).unwrap());
        let addr = encode("bc", &data, Variant::Bech32m).unwrap();
        assert!(decode_witness(&addr, "bc").is_err());
    }

    #[test]
    fn v1_with_bech32_checksum_rejected() {
        let program = hex::decode(V1_PROGRAM).unwrap();
        let mut data = vec![1u8];
        data.extend(convert_bits(&program, 8, 5, true).unwrap());
        let addr = encode("bc", &data, Variant::Bech32).unwrap();
        assert!(decode_witness(&addr, "bc").is_err());
    }

    #[test]
    fn hrp_mismatch_rejected() {
        assert!(decode_witness(V0_ADDR, "tb").is_err());
    }

    #[test]
    fn strict_conversion_rejects_nonzero_padding() {
        // A single 5-bit group cannot carry a whole byte; padding bits set.
        assert!(convert_bits(&[0x1f], 5, 8, false).is_err());
        // Zero-padded but over-long trailing group.
        assert!(convert_bits(&[0x00, 0x00], 5, 8, false).is_err());
    }

    #[test]
    fn padded_conversion_roundtrips() {
        let bytes = [0xde, 0xad, 0xbe, 0xef];
        let groups = convert_bits(&bytes, 8, 5, true).unwrap();
        let back = convert_bits(&groups, 5, 8, false).unwrap();
        assert_eq!(back, bytes);
    }

    #[test]
    fn checksum_residue_separates_variants() {
        let encoded = encode("test", &[0, 1, 2, 3], Variant::Bech32).unwrap();
        let (_, _, variant) = decode(&encoded).unwrap();
        assert_eq!(variant, Variant::Bech32);

        let encoded = encode("test", &[0, 1, 2, 3], Variant::Bech32m).unwrap();
        let (_, _, variant) = decode(&encoded).unwrap();
        assert_eq!(variant, Variant::Bech32m);
    }

    #[test]
    fn separator_edge_cases() {
        assert!(decode("1qqqqqq").is_err()); // empty hrp
        assert!(decode("bcqqqqqq").is_err()); // no separator
        assert!(decode("bc1qqq").is_err()); // checksum too short
    }

    #[test]
    fn overlong_string_rejected() {
        let long = format!("bc1{}", "q".repeat(92));
        assert!(decode(&long).is_err());
    }

    proptest! {
        #[test]
        fn roundtrip_v0_programs(program in proptest::collection::vec(any::<u8>(), 20)) {
            let addr = encode_witness("bc", 0, &program).unwrap();
            let (version, decoded) = decode_witness(&addr, "bc").unwrap();
            prop_assert_eq!(version, 0);
            prop_assert_eq!(decoded, program);
        }

        #[test]
        fn roundtrip_v1_programs(program in proptest::collection::vec(any::<u8>(), 32)) {
            let addr = encode_witness("tb", 1, &program).unwrap();
            let (version, decoded) = decode_witness(&addr, "tb").unwrap();
            prop_assert_eq!(version, 1);
            prop_assert_eq!(decoded, program);
        }

        #[test]
        fn single_character_corruption_detected(
            program in proptest::collection::vec(any::<u8>(), 20),
            pos in 0usize..38,
            replacement in 0usize..32,
        ) {
            let addr = encode_witness("bc", 0, &program).unwrap();
            let mut chars: Vec<char> = addr.chars().collect();
            // Corrupt one data character (skip the hrp and separator).
            let idx = 3 + pos % (chars.len() - 3);
            let new_char = CHARSET[replacement] as char;
            prop_assume!(chars[idx] != new_char);
            chars[idx] = new_char;
            let corrupted: String = chars.into_iter().collect();
            prop_assert!(decode_witness(&corrupted, "bc").is_err());
        }
    }
}
