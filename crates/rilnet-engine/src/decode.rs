//! Response decoders.
//!
//! Stateless, pure functions that turn raw response parcels into typed
//! records. Decode failures never touch engine state — the caller logs
//! and keeps its cached value.
//!
//! Registration responses are a string array whose leading `i32` names
//! the number of fields that follow. The minimum seen in the wild is 3;
//! everything past the status field is optional and version-skewed, so
//! the decoder is sparse by count and tolerant of truncation beyond the
//! mandatory prefix.

use rilnet_core::{Error, RadioAccessMode, RegistrationState, RegistrationStatus, Result};

use crate::parcel::Parcel;

/// Fallback for peers that omit the max-calls field. Two simultaneous
/// data calls is the safe minimum any peer supports.
const DEFAULT_MAX_CALLS: u32 = 2;

/// Raw peer radio-technology codes, as they appear in registration
/// responses and in the `+tech` suffix of operator numerics.
pub mod radio_tech {
    /// GPRS (2G).
    pub const GPRS: i32 = 1;
    /// EDGE (2G).
    pub const EDGE: i32 = 2;
    /// UMTS (3G).
    pub const UMTS: i32 = 3;
    /// HSDPA (3G).
    pub const HSDPA: i32 = 9;
    /// HSUPA (3G).
    pub const HSUPA: i32 = 10;
    /// HSPA (3G).
    pub const HSPA: i32 = 11;
    /// LTE (4G).
    pub const LTE: i32 = 14;
    /// HSPA+ (3G).
    pub const HSPAP: i32 = 15;
    /// Plain GSM (2G).
    pub const GSM: i32 = 16;
}

/// Decoded operator response: three alpha/numeric strings, any of which
/// the peer may leave null.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorReply {
    /// Long-format alphanumeric operator name.
    pub long_name: Option<String>,
    /// Short-format alphanumeric operator name.
    pub short_name: Option<String>,
    /// 5-7 digit MCC+MNC, possibly with a `+tech` suffix.
    pub numeric: Option<String>,
}

/// Parsed MCC/MNC split of an operator numeric.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MccMnc {
    /// Mobile country code, 3 digits.
    pub mcc: String,
    /// Mobile network code, 2-3 digits.
    pub mnc: String,
    /// Technology from the `+tech` suffix, when present and mapped.
    pub tech: Option<RadioAccessMode>,
}

/// Decode a voice or data registration response.
///
/// Fails only on the structural preconditions: fewer than 3 fields
/// announced, a missing status field, or a status that is not an
/// integer. Missing or unparsable optional fields decode to their
/// unknown sentinels.
pub fn decode_registration(payload: &[u8]) -> Result<RegistrationState> {
    let mut p = Parcel::new(payload);
    let nparams = p.read_i32()?;
    if nparams < 3 {
        return Err(Error::Malformed(format!(
            "registration response with {nparams} fields"
        )));
    }

    let mut reg = RegistrationState::unknown();

    let sstatus = p
        .read_string()
        .ok()
        .flatten()
        .ok_or_else(|| Error::Malformed("registration response without status".into()))?;
    let raw_status: i32 = sstatus
        .trim()
        .parse()
        .map_err(|_| Error::Malformed(format!("unparsable status \"{sstatus}\"")))?;
    reg.status = RegistrationStatus::from_raw(raw_status);

    let slac = p.read_string().ok().flatten();
    let sci = p.read_string().ok().flatten();
    let stech = if nparams > 3 {
        p.read_string().ok().flatten()
    } else {
        None
    };

    reg.lac = parse_int(slac.as_deref(), 16).unwrap_or(-1);
    reg.ci = parse_int(sci.as_deref(), 16).unwrap_or(-1);

    let (tech, raw_tech) = parse_tech(stech.as_deref());
    reg.tech = tech;
    reg.raw_tech = raw_tech;

    // Voice responses carry up to 15 fields and data responses 6; the
    // first four line up, field 4 is a denial reason and field 5 the
    // max simultaneous data calls.
    if nparams > 4 {
        let _sreason = p.read_string().ok().flatten();
        if nparams > 5 {
            if let Some(smax) = p.read_string().ok().flatten() {
                reg.max_calls = parse_int(Some(&smax), 10)
                    .and_then(|v| u32::try_from(v).ok())
                    .unwrap_or(0);
            }
        }
    }

    // Older peers omit max calls entirely.
    if reg.max_calls < 1 {
        reg.max_calls = DEFAULT_MAX_CALLS;
    }

    Ok(reg)
}

/// Decode an operator response.
///
/// The payload is an `i32` string-count placeholder followed by long
/// alpha, short alpha, and numeric strings.
pub fn decode_operator(payload: &[u8]) -> Result<OperatorReply> {
    let mut p = Parcel::new(payload);
    p.read_i32()?;
    Ok(OperatorReply {
        long_name: p.read_string().ok().flatten(),
        short_name: p.read_string().ok().flatten(),
        numeric: p.read_string().ok().flatten(),
    })
}

/// Decode a get-preferred-network-type response into the raw RAT code.
///
/// Returns `-1` when the payload is too short to carry one — unknown,
/// not an error, matching how the engine treats an unknown RAT.
pub fn decode_pref_mode(payload: &[u8]) -> i32 {
    let mut p = Parcel::new(payload);
    if p.read_i32().is_err() {
        return -1;
    }
    p.read_i32().unwrap_or(-1)
}

/// Map a raw peer technology string to an access-mode bucket plus the
/// raw code retained verbatim.
///
/// Missing, unparsable, zero, or negative input maps to `(None, -1)`;
/// an unknown positive code keeps the raw code but no bucket.
pub fn parse_tech(stech: Option<&str>) -> (Option<RadioAccessMode>, i32) {
    let code = match stech.and_then(|s| parse_int(Some(s), 10)) {
        Some(code) if code > 0 => code,
        _ => return (None, -1),
    };
    let mode = match code {
        radio_tech::GPRS | radio_tech::EDGE | radio_tech::GSM => Some(RadioAccessMode::Gsm),
        radio_tech::UMTS
        | radio_tech::HSDPA
        | radio_tech::HSUPA
        | radio_tech::HSPA
        | radio_tech::HSPAP => Some(RadioAccessMode::Umts),
        radio_tech::LTE => Some(RadioAccessMode::Lte),
        _ => None,
    };
    (mode, code)
}

/// Split an operator numeric into MCC, MNC, and an optional technology.
///
/// The numeric is 5-7 ASCII digits, optionally followed by `+` and a
/// technology code. MCC is the first 3 digits. MNC is the next 2 digits
/// by default; with a separator it is everything between the MCC and
/// the `+`; without one, a 7-digit numeric splits as a 3-digit MNC.
/// The 7-digit split looks CDMA-specific and possibly wrong, but
/// operator-name matching downstream depends on it, so it stays.
pub fn parse_mcc_mnc(numeric: &str) -> Option<MccMnc> {
    let (digits, suffix) = match numeric.find('+') {
        Some(pos) => (&numeric[..pos], Some(&numeric[pos + 1..])),
        None => (numeric, None),
    };

    if digits.len() < 5 || digits.len() > 7 {
        return None;
    }
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let mcc = &digits[..3];
    let mnc = if suffix.is_some() {
        &digits[3..]
    } else if digits.len() == 7 {
        &digits[3..6]
    } else {
        &digits[3..5]
    };

    let tech = match suffix {
        Some(t) if !t.is_empty() => parse_tech(Some(t)).0,
        _ => None,
    };

    Some(MccMnc {
        mcc: mcc.to_owned(),
        mnc: mnc.to_owned(),
        tech,
    })
}

/// Parse a trimmed integer in the given radix, rejecting anything that
/// does not fit an `i32`.
fn parse_int(s: Option<&str>, radix: u32) -> Option<i32> {
    let t = s?.trim();
    if t.is_empty() {
        return None;
    }
    i64::from_str_radix(t, radix)
        .ok()
        .and_then(|v| i32::try_from(v).ok())
}
