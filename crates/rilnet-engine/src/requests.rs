//! Request payload builders.
//!
//! Pure encoders producing the parcel payloads the engine submits.
//! Query requests carry no payload and need no builder.

use rilnet_core::{DataProfile, GprsAuthMethod, GprsContext, GprsProto};

use crate::parcel::ParcelWriter;

/// Wire string for a packet-data protocol.
pub fn proto_str(proto: GprsProto) -> &'static str {
    match proto {
        GprsProto::Ip => "IP",
        GprsProto::Ipv6 => "IPV6",
        GprsProto::Ipv4v6 => "IPV4V6",
    }
}

/// Wire code for an authentication method.
pub fn auth_code(auth: GprsAuthMethod) -> i32 {
    match auth {
        GprsAuthMethod::None => 0,
        GprsAuthMethod::Pap => 1,
        GprsAuthMethod::Chap => 2,
        GprsAuthMethod::Any => 3,
    }
}

/// Build a set-preferred-network-type payload: element count, then the
/// raw RAT code.
pub fn set_rat_payload(rat: i32) -> Vec<u8> {
    let mut w = ParcelWriter::with_capacity(8);
    w.put_i32(1).put_i32(rat);
    w.into_payload()
}

/// Build the default set-initial-attach-APN payload.
///
/// Vendor adapters may supply their own layout instead; this is the
/// generic `apn, protocol, auth, username, password` form. Credentials
/// collapse to empty + no-auth when both are empty.
pub fn set_initial_attach_apn_payload(ctx: &GprsContext) -> Vec<u8> {
    let has_creds = !ctx.username.is_empty() || !ctx.password.is_empty();
    let (auth, username, password) = if has_creds {
        (ctx.auth, ctx.username.as_str(), ctx.password.as_str())
    } else {
        (GprsAuthMethod::None, "", "")
    };

    let mut w = ParcelWriter::new();
    w.put_string(&ctx.apn)
        .put_string(proto_str(ctx.proto))
        .put_i32(auth_code(auth))
        .put_string(username)
        .put_string(password);
    w.into_payload()
}

/// Build a set-data-profile payload enumerating every profile.
///
/// There is no incremental form — the peer always receives the full
/// list.
pub fn set_data_profiles_payload(profiles: &[DataProfile]) -> Vec<u8> {
    let mut w = ParcelWriter::new();
    w.put_i32(profiles.len() as i32);
    for p in profiles {
        w.put_i32(p.profile_id)
            .put_string(&p.apn)
            .put_string(proto_str(p.proto))
            .put_i32(auth_code(p.auth))
            .put_string(&p.username)
            .put_string(&p.password)
            .put_i32(p.profile_type)
            .put_i32(p.max_conns_time)
            .put_i32(p.max_conns)
            .put_i32(p.wait_time)
            .put_i32(p.enabled as i32);
    }
    w.into_payload()
}
