//! Core domain types shared by the engine, the transport contract, and
//! the test harness.
//!
//! These model the peer-reported registration state, the current
//! operator, and the data-profile records that the engine keeps in sync
//! with the peer.

use std::fmt;

/// Radio access mode, as used by the RAT policy.
///
/// The numeric values double as SIM technology capability bits (see
/// [`AccessModes`]), and the ordering `Any < Gsm < Umts < Lte` is a
/// design invariant: combining a user preference with a cross-modem
/// ceiling picks the numerically smaller mode.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RadioAccessMode {
    /// No preference — resolves to the best mode the SIM supports.
    Any = 0,
    /// 2G only.
    Gsm = 1,
    /// Up to 3G.
    Umts = 2,
    /// Up to 4G.
    Lte = 4,
}

impl fmt::Display for RadioAccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RadioAccessMode::Any => "any",
            RadioAccessMode::Gsm => "gsm",
            RadioAccessMode::Umts => "umts",
            RadioAccessMode::Lte => "lte",
        };
        write!(f, "{s}")
    }
}

/// Bitmask of radio access modes a SIM (or slot) is capable of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct AccessModes(u32);

impl AccessModes {
    /// No technologies.
    pub const NONE: AccessModes = AccessModes(0);

    /// Create a mask from raw bits.
    pub fn from_bits(bits: u32) -> Self {
        AccessModes(bits)
    }

    /// All of GSM, UMTS, and LTE.
    pub fn all() -> Self {
        AccessModes(
            RadioAccessMode::Gsm as u32
                | RadioAccessMode::Umts as u32
                | RadioAccessMode::Lte as u32,
        )
    }

    /// Add one mode to the mask.
    pub fn with(self, mode: RadioAccessMode) -> Self {
        AccessModes(self.0 | mode as u32)
    }

    /// Whether the mask includes the given concrete mode.
    ///
    /// `Any` has no capability bit; asking for it always returns `false`.
    pub fn contains(&self, mode: RadioAccessMode) -> bool {
        self.0 & mode as u32 != 0
    }

    /// Raw bit representation.
    pub fn bits(&self) -> u32 {
        self.0
    }
}

/// Modem power state, as reported by the radio collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioState {
    /// Radio is powered off.
    Off,
    /// Radio is powered on.
    On,
    /// The modem is temporarily unavailable (resetting, crashed).
    Unavailable,
}

/// Network registration status reported by the peer.
///
/// The raw values match the 3GPP/RIL encoding. Values above 10 carry a
/// combined "emergency calls possible" flavor and map to the base
/// status by subtracting 10.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistrationStatus {
    /// Not registered, not searching.
    NotRegistered = 0,
    /// Registered on the home network.
    Registered = 1,
    /// Not registered, searching for an operator.
    Searching = 2,
    /// Registration denied.
    Denied = 3,
    /// Status unknown.
    Unknown = 4,
    /// Registered while roaming.
    Roaming = 5,
}

impl RegistrationStatus {
    /// Map a raw peer status code to a status.
    ///
    /// Codes above 10 are combined registered/emergency-only encodings
    /// and have 10 subtracted first. Anything outside the known range
    /// collapses to [`RegistrationStatus::Unknown`].
    pub fn from_raw(raw: i32) -> Self {
        let raw = if raw > 10 { raw - 10 } else { raw };
        match raw {
            0 => RegistrationStatus::NotRegistered,
            1 => RegistrationStatus::Registered,
            2 => RegistrationStatus::Searching,
            3 => RegistrationStatus::Denied,
            5 => RegistrationStatus::Roaming,
            _ => RegistrationStatus::Unknown,
        }
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RegistrationStatus::NotRegistered => "not registered",
            RegistrationStatus::Registered => "registered",
            RegistrationStatus::Searching => "searching",
            RegistrationStatus::Denied => "denied",
            RegistrationStatus::Unknown => "unknown",
            RegistrationStatus::Roaming => "roaming",
        };
        write!(f, "{s}")
    }
}

/// Peer-reported voice or data registration state.
///
/// Two independent instances exist, one for voice service and one for
/// data service. `-1` means unknown for the integer fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationState {
    /// Registration status.
    pub status: RegistrationStatus,
    /// Access mode bucket derived from the raw technology code.
    pub tech: Option<RadioAccessMode>,
    /// Raw peer technology code, retained verbatim (`-1` = unknown).
    pub raw_tech: i32,
    /// Location area code (`-1` = unknown).
    pub lac: i32,
    /// Cell id (`-1` = unknown).
    pub ci: i32,
    /// Maximum number of simultaneous data calls.
    pub max_calls: u32,
}

impl RegistrationState {
    /// The canonical "nothing known" value.
    ///
    /// Every decode attempt starts from this so that a failed decode
    /// never leaves stale fields mixed with fresh ones.
    pub fn unknown() -> Self {
        RegistrationState {
            status: RegistrationStatus::Unknown,
            tech: None,
            raw_tech: -1,
            lac: -1,
            ci: -1,
            max_calls: 0,
        }
    }
}

impl Default for RegistrationState {
    fn default() -> Self {
        Self::unknown()
    }
}

/// Status of an operator entry.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorStatus {
    /// Status unknown.
    Unknown = 0,
    /// Operator is available for selection.
    Available = 1,
    /// The currently registered operator.
    Current = 2,
    /// Selection of this operator is forbidden.
    Forbidden = 3,
}

/// Maximum operator display-name length kept in [`OperatorInfo::name`].
pub const MAX_OPERATOR_NAME_LEN: usize = 63;

/// The current network operator.
///
/// Equality is structural over every field; the engine uses it to
/// decide whether an operator poll actually changed anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorInfo {
    /// Mobile country code, always 3 digits.
    pub mcc: String,
    /// Mobile network code, 2 or 3 digits.
    pub mnc: String,
    /// Display name, truncated to [`MAX_OPERATOR_NAME_LEN`] bytes.
    pub name: String,
    /// Entry status.
    pub status: OperatorStatus,
    /// Access technology the operator was seen on, when known.
    pub tech: Option<RadioAccessMode>,
}

/// Packet-data protocol of a context or profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GprsProto {
    /// IPv4 only.
    Ip,
    /// IPv6 only.
    Ipv6,
    /// Dual-stack IPv4v6.
    Ipv4v6,
}

/// Authentication method of a context or profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GprsAuthMethod {
    /// No authentication.
    None,
    /// PAP only.
    Pap,
    /// CHAP only.
    Chap,
    /// Either PAP or CHAP.
    Any,
}

/// The class of a provisioned data context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GprsContextType {
    /// The default internet context.
    Internet,
    /// The MMS context.
    Mms,
}

/// Settings of one provisioned data context, as exposed by the GPRS
/// context provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GprsContext {
    /// Access point name.
    pub apn: String,
    /// Authentication user name (may be empty).
    pub username: String,
    /// Authentication password (may be empty).
    pub password: String,
    /// Authentication method.
    pub auth: GprsAuthMethod,
    /// Packet-data protocol.
    pub proto: GprsProto,
}

/// Well-known peer-side data profile ids.
pub mod profile_id {
    /// The default (internet) profile.
    pub const DEFAULT: i32 = 0;
    /// Tethered profile.
    pub const TETHERED: i32 = 1;
    /// IMS profile.
    pub const IMS: i32 = 2;
    /// FOTA profile.
    pub const FOTA: i32 = 3;
    /// CBS profile.
    pub const CBS: i32 = 4;
    /// First OEM-specific profile id.
    pub const OEM_BASE: i32 = 1000;
}

/// Wire value of the 3GPP profile type, the only one this engine emits.
pub const PROFILE_TYPE_3GPP: i32 = 1;

/// A peer-side stored APN + credential record, referenced by id during
/// data-call setup.
///
/// The `max_conns*` and `wait_time` fields sit at fixed positions in
/// the wire encoding and are always zero today.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataProfile {
    /// Profile id (see [`profile_id`]).
    pub profile_id: i32,
    /// Profile type, fixed to [`PROFILE_TYPE_3GPP`].
    pub profile_type: i32,
    /// Access point name.
    pub apn: String,
    /// Authentication user name.
    pub username: String,
    /// Authentication password.
    pub password: String,
    /// Authentication method.
    pub auth: GprsAuthMethod,
    /// Packet-data protocol.
    pub proto: GprsProto,
    /// Maximum connection duration (wire field, unused).
    pub max_conns_time: i32,
    /// Maximum connection count (wire field, unused).
    pub max_conns: i32,
    /// Retry wait time (wire field, unused).
    pub wait_time: i32,
    /// Whether the profile is enabled.
    pub enabled: bool,
}

impl DataProfile {
    /// Build a profile from context settings.
    ///
    /// When both username and password are empty the credentials are
    /// dropped and the auth method collapses to
    /// [`GprsAuthMethod::None`], mirroring what the peer expects.
    pub fn from_context(ctx: &GprsContext, profile_id: i32) -> Self {
        let has_creds = !ctx.username.is_empty() || !ctx.password.is_empty();
        let (auth, username, password) = if has_creds {
            (ctx.auth, ctx.username.clone(), ctx.password.clone())
        } else {
            (GprsAuthMethod::None, String::new(), String::new())
        };
        DataProfile {
            profile_id,
            profile_type: PROFILE_TYPE_3GPP,
            apn: ctx.apn.clone(),
            username,
            password,
            auth,
            proto: ctx.proto,
            max_conns_time: 0,
            max_conns: 0,
            wait_time: 0,
            enabled: true,
        }
    }
}
