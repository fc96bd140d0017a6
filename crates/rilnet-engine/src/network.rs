//! The network engine: registration tracking and preferred-RAT
//! negotiation.
//!
//! One engine instance runs per modem slot as a single spawned task —
//! every state transition happens inside it, in reaction to request
//! completions, unsolicited peer events, timer expiries, or
//! collaborator changes (radio, SIM card, SIM settings, GPRS watch).
//! Nothing blocks: submissions are fire-and-forget and completions
//! re-enter the task as events.
//!
//! [`RilNetwork`] is the public handle. It carries the command channel
//! into the task, a broadcast of change events out of it, and a watch
//! with the latest [`NetworkSnapshot`] for accessor-style reads.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use rilnet_core::{
    profile_id, Completion, DataProfile, Error, NetworkEvent, OperatorInfo, OperatorStatus,
    RadioAccessMode, RadioState, RegistrationState, RequestId, RequestOpts, Result, RetryPolicy,
    RilIo, RilOpcode, RilRequest, UnsolEvent, MAX_OPERATOR_NAME_LEN,
};

use crate::config::NetworkConfig;
use crate::decode;
use crate::gprs::{GprsSnapshot, GprsWatch};
use crate::radio::{Radio, RadioStatus};
use crate::rat;
use crate::requests;
use crate::sim::{SimCard, SimSettings, SimSettingsSnapshot};
use crate::vendor::VendorAdapter;

/// Dwell time after submitting a set-RAT command. While armed, no new
/// set-RAT goes out — peers oscillate otherwise.
const SET_RAT_HOLDOFF: Duration = Duration::from_secs(2);

/// Transport retry interval for registration and preferred-mode polls.
const POLL_RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// The engine's view of the network, published through a watch channel.
///
/// Change events carry no payload; subscribers read this instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSnapshot {
    /// Voice registration state.
    pub voice: RegistrationState,
    /// Data registration state.
    pub data: RegistrationState,
    /// Current operator, when registered to one.
    pub operator: Option<OperatorInfo>,
    /// Peer-confirmed preferred mode.
    pub pref_mode: RadioAccessMode,
    /// Cross-modem ceiling on the preferred mode.
    pub max_pref_mode: RadioAccessMode,
    /// Raw peer preferred-network-type code (`-1` = not yet known).
    pub raw_rat: i32,
}

impl Default for NetworkSnapshot {
    fn default() -> Self {
        NetworkSnapshot {
            voice: RegistrationState::unknown(),
            data: RegistrationState::unknown(),
            operator: None,
            pref_mode: RadioAccessMode::Any,
            max_pref_mode: RadioAccessMode::Any,
            raw_rat: -1,
        }
    }
}

/// Lifecycle of the set-RAT command, made explicit so the invariants
/// are checkable instead of scattered over booleans.
///
/// The assert flag and the deferred force-check are orthogonal inputs —
/// either can coincide with any phase — and stay separate fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SetRatPhase {
    /// Nothing in flight, holdoff clear.
    Idle,
    /// A set-RAT request is in flight (holdoff armed at submission).
    AwaitingSet,
    /// The set completed but the holdoff has not expired yet.
    Holdoff,
}

impl SetRatPhase {
    fn begin_set(&mut self) {
        *self = SetRatPhase::AwaitingSet;
    }

    fn set_done(&mut self, holdoff_armed: bool) {
        *self = if holdoff_armed {
            SetRatPhase::Holdoff
        } else {
            SetRatPhase::Idle
        };
    }

    fn holdoff_expired(&mut self) {
        if *self == SetRatPhase::Holdoff {
            *self = SetRatPhase::Idle;
        }
    }
}

/// At most one in-flight request per concern.
#[derive(Debug, Default, Clone, Copy)]
struct Pending {
    operator_poll: Option<RequestId>,
    voice_poll: Option<RequestId>,
    data_poll: Option<RequestId>,
    /// The distinguished startup preferred-mode query.
    startup_query: Option<RequestId>,
    query_rat: Option<RequestId>,
    set_rat: Option<RequestId>,
    set_data_profiles: Option<RequestId>,
}

/// Commands from the handle into the engine task.
pub(crate) enum Command {
    SetMaxPrefMode {
        mode: RadioAccessMode,
        force_check: bool,
    },
    AssertPrefMode {
        immediate: bool,
    },
    QueryRegistrationState,
}

pub(crate) struct Engine {
    io: Arc<dyn RilIo>,
    radio: Radio,
    sim: SimCard,
    settings: SimSettings,
    gprs: GprsWatch,
    vendor: Option<Arc<dyn VendorAdapter>>,
    config: NetworkConfig,

    event_tx: broadcast::Sender<NetworkEvent>,
    snap_tx: watch::Sender<NetworkSnapshot>,
    done_tx: mpsc::UnboundedSender<Completion>,

    voice: RegistrationState,
    data: RegistrationState,
    operator: Option<OperatorInfo>,

    /// Raw peer preferred-network-type code, `-1` until first queried.
    rat: i32,
    pref_mode: RadioAccessMode,
    max_pref_mode: RadioAccessMode,
    assert_rat: bool,
    phase: SetRatPhase,
    holdoff_deadline: Option<Instant>,
    force_deadline: Option<Instant>,

    pending: Pending,
    data_profiles: Vec<DataProfile>,
    need_attach_apn: bool,
    must_set_attach_apn: bool,

    /// Previous collaborator snapshots, kept to tell which field of a
    /// combined watch update actually changed.
    last_radio: RadioStatus,
    last_settings: SimSettingsSnapshot,
    last_gprs: GprsSnapshot,
}

impl Engine {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        io: Arc<dyn RilIo>,
        radio: Radio,
        sim: SimCard,
        settings: SimSettings,
        gprs: GprsWatch,
        vendor: Option<Arc<dyn VendorAdapter>>,
        config: NetworkConfig,
        event_tx: broadcast::Sender<NetworkEvent>,
        snap_tx: watch::Sender<NetworkSnapshot>,
        done_tx: mpsc::UnboundedSender<Completion>,
    ) -> Self {
        let last_radio = radio.status();
        let last_settings = settings.snapshot();
        let last_gprs = gprs.snapshot();
        Engine {
            io,
            radio,
            sim,
            settings,
            gprs,
            vendor,
            config,
            event_tx,
            snap_tx,
            done_tx,
            voice: RegistrationState::unknown(),
            data: RegistrationState::unknown(),
            operator: None,
            rat: -1,
            pref_mode: RadioAccessMode::Any,
            max_pref_mode: RadioAccessMode::Any,
            assert_rat: false,
            phase: SetRatPhase::Idle,
            holdoff_deadline: None,
            force_deadline: None,
            pending: Pending::default(),
            data_profiles: Vec::new(),
            need_attach_apn: false,
            must_set_attach_apn: false,
            last_radio,
            last_settings,
            last_gprs,
        }
    }

    /// Query the initial state.
    ///
    /// The preferred mode is queried unconditionally; registration is
    /// polled only when the radio is already powered on, because
    /// querying network state before power-on upsets some peers.
    fn startup(&mut self) {
        let id = self.io.submit(
            RilRequest::query(RilOpcode::GetPreferredNetworkType),
            RequestOpts::default(),
            self.done_tx.clone(),
        );
        self.pending.startup_query = Some(id);

        if self.radio.status().state == RadioState::On {
            self.poll_state();
        }

        self.need_attach_apn = self.compute_need_attach_apn();
        self.must_set_attach_apn = self.need_attach_apn;

        if self.config.use_data_profiles {
            self.check_data_profiles();
        }
        self.try_set_initial_attach_apn();
        self.publish_snapshot();
    }

    /// Cancel everything still in flight.
    fn shutdown(&mut self) {
        let Pending {
            operator_poll,
            voice_poll,
            data_poll,
            startup_query,
            query_rat,
            set_rat,
            set_data_profiles,
        } = self.pending;
        for id in [
            operator_poll,
            voice_poll,
            data_poll,
            startup_query,
            query_rat,
            set_rat,
            set_data_profiles,
        ]
        .into_iter()
        .flatten()
        {
            self.io.cancel(id);
        }
        self.pending = Pending::default();
    }

    // -----------------------------------------------------------------
    // Registration state tracking
    // -----------------------------------------------------------------

    /// Issue (or retry) one poll. An existing pending request is nudged
    /// to retry right away instead of waiting out its retry interval; a
    /// fresh one is submitted with unlimited transport retries.
    fn poll_and_retry(&self, existing: Option<RequestId>, opcode: RilOpcode) -> RequestId {
        if let Some(id) = existing {
            self.io.retry_now(id);
            id
        } else {
            self.io.submit(
                RilRequest::query(opcode),
                RequestOpts {
                    timeout: None,
                    retry: Some(RetryPolicy::unlimited(POLL_RETRY_INTERVAL)),
                },
                self.done_tx.clone(),
            )
        }
    }

    /// Poll the operator and both registration states.
    fn poll_state(&mut self) {
        debug!("polling network state");
        let id = self.poll_and_retry(self.pending.operator_poll, RilOpcode::Operator);
        self.pending.operator_poll = Some(id);
        self.poll_registration();
    }

    /// Poll the voice and data registration states.
    fn poll_registration(&mut self) {
        let id = self.poll_and_retry(self.pending.voice_poll, RilOpcode::VoiceRegistrationState);
        self.pending.voice_poll = Some(id);
        let id = self.poll_and_retry(self.pending.data_poll, RilOpcode::DataRegistrationState);
        self.pending.data_poll = Some(id);
    }

    fn on_operator_reply(&mut self, c: Completion) {
        if !c.ok() {
            return;
        }
        let reply = match decode::decode_operator(&c.payload) {
            Ok(reply) => reply,
            Err(e) => {
                debug!(error = %e, "broken operator response");
                return;
            }
        };

        let parsed = reply
            .numeric
            .as_deref()
            .and_then(decode::parse_mcc_mnc);

        let changed = match parsed {
            Some(mm) => {
                // Without a +tech suffix, assume the technology we are
                // registered on for voice.
                let tech = mm.tech.or(self.voice.tech);
                let name = reply
                    .long_name
                    .or(reply.short_name)
                    .or(reply.numeric)
                    .unwrap_or_default();
                let op = OperatorInfo {
                    mcc: mm.mcc,
                    mnc: mm.mnc,
                    name: clamp_name(&name),
                    status: OperatorStatus::Current,
                    tech,
                };
                if self.operator.as_ref() != Some(&op) {
                    debug!(
                        name = %op.name,
                        mcc = %op.mcc,
                        mnc = %op.mnc,
                        "operator changed"
                    );
                    self.operator = Some(op);
                    true
                } else {
                    false
                }
            }
            None => {
                if self.operator.take().is_some() {
                    debug!("no operator");
                    true
                } else {
                    false
                }
            }
        };

        if changed {
            self.notify(NetworkEvent::OperatorChanged);
        }
    }

    fn on_voice_reply(&mut self, c: Completion) {
        if !c.ok() {
            return;
        }
        match decode::decode_registration(&c.payload) {
            Ok(state) => {
                if state != self.voice {
                    debug!(status = %state.status, "voice registration changed");
                    self.voice = state;
                    self.notify(NetworkEvent::VoiceStateChanged);
                }
            }
            Err(e) => debug!(error = %e, "broken voice registration response"),
        }
    }

    fn on_data_reply(&mut self, c: Completion) {
        if !c.ok() {
            return;
        }
        match decode::decode_registration(&c.payload) {
            Ok(state) => {
                if state != self.data {
                    debug!(status = %state.status, "data registration changed");
                    self.data = state;
                    self.notify(NetworkEvent::DataStateChanged);
                }
            }
            Err(e) => debug!(error = %e, "broken data registration response"),
        }
    }

    // -----------------------------------------------------------------
    // RAT policy
    // -----------------------------------------------------------------

    /// The access mode the policy wants right now.
    ///
    /// Only one powered slot may claim LTE on dual-SIM hardware, so a
    /// powered-off radio forces the ceiling down to GSM even before the
    /// per-slot maximum is applied. `Any` is zero and absorbs nothing:
    /// when both inputs are concrete the numerically smaller wins,
    /// otherwise whichever is concrete.
    fn actual_pref_mode(&self) -> RadioAccessMode {
        let pref = self.settings.snapshot().pref_mode;
        let max = if self.radio.status().state == RadioState::On {
            self.max_pref_mode
        } else {
            RadioAccessMode::Gsm
        };
        if pref != RadioAccessMode::Any && max != RadioAccessMode::Any {
            pref.min(max)
        } else if pref != RadioAccessMode::Any {
            pref
        } else {
            max
        }
    }

    /// Map an access mode to the wire code, honoring the SIM capability
    /// mask: a mode whose technology bit is absent falls back toward
    /// GSM.
    fn mode_to_rat(&self, mode: RadioAccessMode) -> i32 {
        let techs = self.settings.snapshot().techs;
        if matches!(mode, RadioAccessMode::Any | RadioAccessMode::Lte)
            && techs.contains(RadioAccessMode::Lte)
        {
            return self.config.lte_network_mode;
        }
        if mode != RadioAccessMode::Gsm && techs.contains(RadioAccessMode::Umts) {
            return self.config.umts_network_mode;
        }
        rat::GSM_ONLY
    }

    /// Setting the RAT is known to starve SIM I/O on some peers, so it
    /// is gated on the card being idle, not just ready.
    fn can_set_pref_mode(&self) -> bool {
        let sim = self.sim.status();
        self.radio.status().online
            && sim.ready
            && !sim.io_active
            && self.holdoff_deadline.is_none()
    }

    fn clear_holdoff(&mut self) {
        self.holdoff_deadline = None;
        self.phase.holdoff_expired();
    }

    /// Evaluate the target RAT and submit a set if it differs from the
    /// peer's (or an assert is outstanding).
    ///
    /// `immediate` cancels the holdoff so the set goes out right away;
    /// a scheduled force-check upgrades any evaluation to immediate.
    fn check_pref_mode(&mut self, immediate: bool) {
        let mut immediate = immediate;
        let target = self.mode_to_rat(self.actual_pref_mode());

        if self.force_deadline.take().is_some() {
            // The deferred check was scheduled to force an evaluation
            // right now; don't let the holdoff swallow it.
            immediate = true;
        }

        if self.rat != target {
            debug!(current = self.rat, target, "preferred network type out of sync");
        }

        if immediate {
            self.clear_holdoff();
        }

        if self.rat != target || self.assert_rat {
            if self.holdoff_deadline.is_none() {
                self.set_pref_mode(target);
            } else {
                debug!(target, "holdoff armed, deferring");
            }
        }
    }

    fn set_pref_mode(&mut self, target: i32) {
        if self.rat != target || self.assert_rat {
            self.set_rat(target);
        }
    }

    fn set_rat(&mut self, target: i32) {
        let sim = self.sim.status();
        if self.pending.set_rat.is_none()
            && self.radio.status().online
            && sim.ready
            && !sim.io_active
            && self.holdoff_deadline.is_none()
        {
            debug!(rat = target, "setting preferred network type");
            let id = self.io.submit(
                RilRequest::new(
                    RilOpcode::SetPreferredNetworkType,
                    requests::set_rat_payload(target),
                ),
                RequestOpts {
                    timeout: Some(self.config.network_mode_timeout),
                    retry: None,
                },
                self.done_tx.clone(),
            );
            self.pending.set_rat = Some(id);

            // The request is on its way; the assertion is served.
            self.assert_rat = false;
            self.phase.begin_set();
            self.holdoff_deadline = Some(Instant::now() + SET_RAT_HOLDOFF);
        } else {
            debug!(rat = target, "need to set preferred network type");
        }
    }

    fn on_set_rat_done(&mut self, c: Completion) {
        if !c.ok() {
            warn!(status = c.status, "failed to set preferred network type");
        }
        self.phase.set_done(self.holdoff_deadline.is_some());
        // Ground truth over assumed state: ask the peer what actually
        // took effect, whether the set succeeded or not.
        self.query_pref_mode();
    }

    fn query_pref_mode(&mut self) {
        if let Some(id) = self.pending.query_rat.take() {
            self.io.cancel(id);
        }
        let id = self.io.submit(
            RilRequest::query(RilOpcode::GetPreferredNetworkType),
            RequestOpts {
                timeout: None,
                retry: Some(RetryPolicy::unlimited(POLL_RETRY_INTERVAL)),
            },
            self.done_tx.clone(),
        );
        self.pending.query_rat = Some(id);
    }

    fn update_rat(&mut self, raw: i32) {
        let previous = self.pref_mode;
        self.rat = raw;
        self.pref_mode = rat::rat_to_mode(raw);
        debug!(rat = raw, mode = %self.pref_mode, "preferred network type");
        if self.pref_mode != previous {
            self.notify(NetworkEvent::PrefModeChanged);
        }
    }

    fn on_query_rat_reply(&mut self, c: Completion) {
        if !c.ok() {
            warn!(status = c.status, "preferred mode query failed");
            return;
        }
        self.update_rat(decode::decode_pref_mode(&c.payload));
        if self.can_set_pref_mode() {
            self.check_pref_mode(false);
        }
    }

    fn on_startup_query_reply(&mut self, c: Completion) {
        if !c.ok() {
            warn!(status = c.status, "startup preferred mode query failed");
            return;
        }
        self.update_rat(decode::decode_pref_mode(&c.payload));
        // The first ground truth always gets a policy check, regardless
        // of the online/ready gating.
        self.check_pref_mode(false);
    }

    /// Update the cross-modem ceiling.
    pub(crate) fn set_max_pref_mode(&mut self, mode: RadioAccessMode, force_check: bool) {
        if self.max_pref_mode != mode || force_check {
            if self.max_pref_mode != mode {
                debug!(mode = %mode, "max preferred mode");
                self.max_pref_mode = mode;
                self.notify(NetworkEvent::MaxPrefModeChanged);
                self.check_initial_attach_apn();
            }
            self.check_pref_mode(true);
        }
    }

    /// Force re-application of the preferred mode even when it looks in
    /// sync — used after capability changes, when the peer may have
    /// silently reverted it.
    pub(crate) fn assert_pref_mode(&mut self, immediate: bool) {
        self.assert_rat = true;
        self.check_pref_mode(immediate);
    }

    fn schedule_force_check(&mut self) {
        if self.force_deadline.is_none() {
            debug!("scheduling preferred mode check");
            self.force_deadline = Some(Instant::now());
        } else {
            debug!("preferred mode check already scheduled");
        }
    }

    // -----------------------------------------------------------------
    // Data profiles
    // -----------------------------------------------------------------

    /// Rebuild the desired profile list from context settings and
    /// resubmit it if anything changed. No provider means no peer
    /// interaction at all — just drop the cache.
    fn check_data_profiles(&mut self) {
        let g = self.gprs.snapshot();
        if !g.present {
            self.data_profiles.clear();
            return;
        }

        let mut profiles = Vec::new();
        if let Some(internet) = &g.internet {
            debug!(apn = %internet.apn, "internet apn");
            profiles.push(DataProfile::from_context(internet, profile_id::DEFAULT));
        }
        if let Some(mms) = &g.mms {
            debug!(apn = %mms.apn, "mms apn");
            profiles.push(DataProfile::from_context(
                mms,
                self.config.mms_data_profile_id,
            ));
        }

        if profiles == self.data_profiles {
            return;
        }
        self.data_profiles = profiles;
        self.submit_data_profiles();
    }

    fn submit_data_profiles(&mut self) {
        // Only the latest desired state may ever be applied.
        if let Some(id) = self.pending.set_data_profiles.take() {
            self.io.cancel(id);
        }
        let id = self.io.submit(
            RilRequest::new(
                RilOpcode::SetDataProfile,
                requests::set_data_profiles_payload(&self.data_profiles),
            ),
            RequestOpts::default(),
            self.done_tx.clone(),
        );
        self.pending.set_data_profiles = Some(id);
    }

    fn on_set_data_profiles_done(&mut self, c: Completion) {
        if !c.ok() {
            warn!(status = c.status, "failed to set data profiles");
        }
    }

    // -----------------------------------------------------------------
    // Initial attach APN
    // -----------------------------------------------------------------

    /// LTE attaches with an APN; UMTS and GSM do not.
    fn compute_need_attach_apn(&self) -> bool {
        self.gprs.snapshot().present
            && self.radio.status().state == RadioState::On
            && matches!(
                self.actual_pref_mode(),
                RadioAccessMode::Any | RadioAccessMode::Lte
            )
    }

    fn check_initial_attach_apn(&mut self) {
        let need = self.compute_need_attach_apn();
        if self.need_attach_apn != need {
            debug!(need, "initial attach apn");
            self.need_attach_apn = need;
            if need {
                // We didn't need one and now we do.
                self.must_set_attach_apn = true;
            }
        }
        self.try_set_initial_attach_apn();
    }

    fn try_set_initial_attach_apn(&mut self) {
        if self.need_attach_apn && self.must_set_attach_apn {
            if let Some(ctx) = self.gprs.snapshot().internet {
                self.must_set_attach_apn = false;
                let payload = self
                    .vendor
                    .as_ref()
                    .and_then(|v| v.build_attach_apn_request(&ctx))
                    .unwrap_or_else(|| requests::set_initial_attach_apn_payload(&ctx));
                debug!(apn = %ctx.apn, "setting initial attach apn");
                self.io.submit(
                    RilRequest::new(RilOpcode::SetInitialAttachApn, payload),
                    RequestOpts::default(),
                    self.done_tx.clone(),
                );
            }
        }
    }

    // -----------------------------------------------------------------
    // Event dispatch
    // -----------------------------------------------------------------

    fn on_completion(&mut self, c: Completion) {
        let id = c.id;
        if self.pending.operator_poll == Some(id) {
            self.pending.operator_poll = None;
            self.on_operator_reply(c);
        } else if self.pending.voice_poll == Some(id) {
            self.pending.voice_poll = None;
            self.on_voice_reply(c);
        } else if self.pending.data_poll == Some(id) {
            self.pending.data_poll = None;
            self.on_data_reply(c);
        } else if self.pending.startup_query == Some(id) {
            self.pending.startup_query = None;
            self.on_startup_query_reply(c);
        } else if self.pending.query_rat == Some(id) {
            self.pending.query_rat = None;
            self.on_query_rat_reply(c);
        } else if self.pending.set_rat == Some(id) {
            self.pending.set_rat = None;
            self.on_set_rat_done(c);
        } else if self.pending.set_data_profiles == Some(id) {
            self.pending.set_data_profiles = None;
            self.on_set_data_profiles_done(c);
        } else {
            // Fire-and-forget requests (initial attach APN) land here.
            debug!(id = id.raw(), status = c.status, "untracked completion");
        }
    }

    fn on_unsolicited(&mut self, event: UnsolEvent) {
        match event {
            UnsolEvent::NetworkStateChanged => {
                debug!("network state changed");
                self.poll_state();
            }
            UnsolEvent::RadioCapabilityChanged => {
                debug!("radio capability changed");
                self.assert_pref_mode(false);
            }
        }
    }

    fn on_radio_changed(&mut self, status: RadioStatus) {
        let last = std::mem::replace(&mut self.last_radio, status);
        if status.state != last.state {
            self.check_pref_mode(false);
            self.check_initial_attach_apn();
            if status.state == RadioState::On {
                self.poll_state();
            }
        }
        if status.online != last.online && self.can_set_pref_mode() {
            self.check_pref_mode(true);
        }
    }

    fn on_sim_changed(&mut self) {
        if self.can_set_pref_mode() {
            self.check_pref_mode(false);
        }
    }

    fn on_settings_changed(&mut self, snapshot: SimSettingsSnapshot) {
        let last = std::mem::replace(&mut self.last_settings, snapshot);
        if self.last_settings.pref_mode != last.pref_mode {
            // Don't evaluate synchronously: other listeners (the data
            // manager, most importantly) may want to adjust the max
            // mode first. One deferred evaluation covers them all.
            self.schedule_force_check();
        }
    }

    fn on_gprs_changed(&mut self, snapshot: GprsSnapshot) {
        let last = std::mem::replace(&mut self.last_gprs, snapshot.clone());
        let presence_changed = snapshot.present != last.present;
        let internet_changed = snapshot.internet != last.internet;
        let mms_changed = snapshot.mms != last.mms;

        if presence_changed {
            debug!(present = snapshot.present, "gprs service change");
            self.must_set_attach_apn = true;
        }
        if internet_changed {
            self.must_set_attach_apn = true;
        }

        if (presence_changed || internet_changed || mms_changed) && self.config.use_data_profiles {
            self.check_data_profiles();
        }
        if presence_changed || internet_changed {
            self.check_initial_attach_apn();
        }
    }

    fn on_command(&mut self, cmd: Command) {
        match cmd {
            Command::SetMaxPrefMode { mode, force_check } => {
                self.set_max_pref_mode(mode, force_check)
            }
            Command::AssertPrefMode { immediate } => self.assert_pref_mode(immediate),
            Command::QueryRegistrationState => self.poll_registration(),
        }
    }

    // -----------------------------------------------------------------
    // Timers
    // -----------------------------------------------------------------

    fn next_deadline(&self) -> Option<Instant> {
        match (self.force_deadline, self.holdoff_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn on_timer(&mut self) {
        let now = Instant::now();
        if self.force_deadline.is_some_and(|d| d <= now) {
            self.force_deadline = None;
            debug!("running deferred preferred mode check");
            self.check_pref_mode(true);
            self.check_initial_attach_apn();
        }
        if self.holdoff_deadline.is_some_and(|d| d <= now) {
            self.holdoff_deadline = None;
            self.phase.holdoff_expired();
            self.check_pref_mode(false);
        }
    }

    // -----------------------------------------------------------------
    // Notification
    // -----------------------------------------------------------------

    fn publish_snapshot(&self) {
        let _ = self.snap_tx.send(NetworkSnapshot {
            voice: self.voice,
            data: self.data,
            operator: self.operator.clone(),
            pref_mode: self.pref_mode,
            max_pref_mode: self.max_pref_mode,
            raw_rat: self.rat,
        });
    }

    fn notify(&mut self, event: NetworkEvent) {
        self.publish_snapshot();
        let _ = self.event_tx.send(event);
    }

    // -----------------------------------------------------------------
    // Task loop
    // -----------------------------------------------------------------

    pub(crate) async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<Command>,
        mut done_rx: mpsc::UnboundedReceiver<Completion>,
        cancel: CancellationToken,
    ) {
        let mut unsol_rx = self.io.subscribe_unsolicited();
        let mut radio_rx = self.radio.subscribe();
        let mut sim_rx = self.sim.subscribe();
        let mut settings_rx = self.settings.subscribe();
        let mut gprs_rx = self.gprs.subscribe();

        self.startup();

        loop {
            let deadline = self.next_deadline();
            tokio::select! {
                // Drain queued reactions before a deferred force-check
                // fires, so every listener has adjusted shared inputs
                // by the time the consolidated evaluation runs.
                biased;

                _ = cancel.cancelled() => {
                    debug!("engine task canceled");
                    break;
                }

                cmd = cmd_rx.recv() => match cmd {
                    Some(cmd) => self.on_command(cmd),
                    None => break,
                },

                Some(c) = done_rx.recv() => self.on_completion(c),

                ev = unsol_rx.recv() => match ev {
                    Ok(ev) => self.on_unsolicited(ev),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "unsolicited events lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("unsolicited channel closed");
                        break;
                    }
                },

                Ok(()) = radio_rx.changed() => {
                    let status = *radio_rx.borrow_and_update();
                    self.on_radio_changed(status);
                }

                Ok(()) = sim_rx.changed() => {
                    sim_rx.borrow_and_update();
                    self.on_sim_changed();
                }

                Ok(()) = settings_rx.changed() => {
                    let snapshot = settings_rx.borrow_and_update().clone();
                    self.on_settings_changed(snapshot);
                }

                Ok(()) = gprs_rx.changed() => {
                    let snapshot = gprs_rx.borrow_and_update().clone();
                    self.on_gprs_changed(snapshot);
                }

                _ = time::sleep_until(deadline.unwrap_or_else(Instant::now)),
                        if deadline.is_some() => {
                    self.on_timer();
                }
            }
        }

        self.shutdown();
    }
}

/// Truncate an operator display name to its bounded length without
/// splitting a UTF-8 sequence.
fn clamp_name(name: &str) -> String {
    if name.len() <= MAX_OPERATOR_NAME_LEN {
        return name.to_owned();
    }
    let mut end = MAX_OPERATOR_NAME_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_owned()
}

/// Handle to a running network engine.
///
/// Constructed via [`NetworkBuilder`](crate::builder::NetworkBuilder).
/// Dropping the handle tears the engine down: the task is canceled,
/// pending requests die with it, and no further event is emitted.
pub struct RilNetwork {
    cmd_tx: mpsc::Sender<Command>,
    event_tx: broadcast::Sender<NetworkEvent>,
    snap_rx: watch::Receiver<NetworkSnapshot>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl RilNetwork {
    pub(crate) fn new(
        cmd_tx: mpsc::Sender<Command>,
        event_tx: broadcast::Sender<NetworkEvent>,
        snap_rx: watch::Receiver<NetworkSnapshot>,
        cancel: CancellationToken,
        task: JoinHandle<()>,
    ) -> Self {
        RilNetwork {
            cmd_tx,
            event_tx,
            snap_rx,
            cancel,
            task,
        }
    }

    /// Subscribe to change events.
    pub fn subscribe(&self) -> broadcast::Receiver<NetworkEvent> {
        self.event_tx.subscribe()
    }

    /// The engine's current view of the network.
    pub fn snapshot(&self) -> NetworkSnapshot {
        self.snap_rx.borrow().clone()
    }

    /// Update the cross-modem ceiling on the preferred mode.
    ///
    /// `force_check` re-evaluates the preferred mode even when the
    /// ceiling did not change.
    pub async fn set_max_pref_mode(
        &self,
        mode: RadioAccessMode,
        force_check: bool,
    ) -> Result<()> {
        self.cmd_tx
            .send(Command::SetMaxPrefMode { mode, force_check })
            .await
            .map_err(|_| Error::NotConnected)
    }

    /// Force re-application of the preferred mode on the next check.
    pub async fn assert_pref_mode(&self, immediate: bool) -> Result<()> {
        self.cmd_tx
            .send(Command::AssertPrefMode { immediate })
            .await
            .map_err(|_| Error::NotConnected)
    }

    /// Re-poll the voice and data registration states.
    pub async fn query_registration_state(&self) -> Result<()> {
        self.cmd_tx
            .send(Command::QueryRegistrationState)
            .await
            .map_err(|_| Error::NotConnected)
    }

    /// Gracefully stop the engine and wait for it to finish canceling
    /// its pending requests.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        let _ = (&mut self.task).await;
    }
}

impl Drop for RilNetwork {
    fn drop(&mut self) {
        // Graceful: signal the task to exit at its next loop iteration.
        self.cancel.cancel();
        // Safety net in case the task is stuck somewhere that doesn't
        // respect the token.
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parcel::ParcelWriter;
    use rilnet_core::{
        AccessModes, GprsAuthMethod, GprsContext, GprsContextType, STATUS_FAILURE, STATUS_SUCCESS,
    };
    use rilnet_test_harness::MockIo;

    struct TestBed {
        engine: Engine,
        io: Arc<MockIo>,
        done_rx: mpsc::UnboundedReceiver<Completion>,
        event_rx: broadcast::Receiver<NetworkEvent>,
        _snap_rx: watch::Receiver<NetworkSnapshot>,
        radio: Radio,
        sim: SimCard,
        settings: SimSettings,
        gprs: GprsWatch,
    }

    impl TestBed {
        /// Feed queued completions back into the engine, the way the
        /// task loop would.
        fn pump(&mut self) {
            while let Ok(c) = self.done_rx.try_recv() {
                self.engine.on_completion(c);
            }
        }

        fn drain_events(&mut self) -> Vec<NetworkEvent> {
            let mut out = Vec::new();
            while let Ok(ev) = self.event_rx.try_recv() {
                out.push(ev);
            }
            out
        }

        fn sets(&self) -> usize {
            self.io.submit_count(RilOpcode::SetPreferredNetworkType)
        }
    }

    /// An engine over a mock transport with the radio up, the SIM
    /// ready, and an LTE-capable slot — the state where everything is
    /// allowed. Tests turn individual gates back off.
    fn bed() -> TestBed {
        bed_with(NetworkConfig::default(), AccessModes::all())
    }

    fn bed_with(config: NetworkConfig, techs: AccessModes) -> TestBed {
        let io = Arc::new(MockIo::new());
        let radio = Radio::new();
        radio.set_state(RadioState::On);
        radio.set_online(true);
        let sim = SimCard::new();
        sim.set_ready(true);
        let settings = SimSettings::new(techs);
        let gprs = GprsWatch::new();

        let (event_tx, event_rx) = broadcast::channel(64);
        let (snap_tx, snap_rx) = watch::channel(NetworkSnapshot::default());
        let (done_tx, done_rx) = mpsc::unbounded_channel();

        let engine = Engine::new(
            io.clone(),
            radio.clone(),
            sim.clone(),
            settings.clone(),
            gprs.clone(),
            None,
            config,
            event_tx,
            snap_tx,
            done_tx,
        );
        TestBed {
            engine,
            io,
            done_rx,
            event_rx,
            _snap_rx: snap_rx,
            radio,
            sim,
            settings,
            gprs,
        }
    }

    fn pref_mode_payload(rat: i32) -> Vec<u8> {
        let mut w = ParcelWriter::new();
        w.put_i32(1).put_i32(rat);
        w.into_payload()
    }

    fn registration_payload(fields: &[Option<&str>]) -> Vec<u8> {
        let mut w = ParcelWriter::new();
        w.put_i32(fields.len() as i32);
        for f in fields {
            match f {
                Some(s) => w.put_string(s),
                None => w.put_null_string(),
            };
        }
        w.into_payload()
    }

    fn operator_payload(long: Option<&str>, short: Option<&str>, numeric: Option<&str>) -> Vec<u8> {
        let mut w = ParcelWriter::new();
        w.put_i32(3);
        for f in [long, short, numeric] {
            match f {
                Some(s) => w.put_string(s),
                None => w.put_null_string(),
            };
        }
        w.into_payload()
    }

    fn internet_ctx() -> GprsContext {
        GprsContext {
            apn: "internet".into(),
            username: String::new(),
            password: String::new(),
            auth: GprsAuthMethod::None,
            proto: rilnet_core::GprsProto::Ip,
        }
    }

    fn mms_ctx() -> GprsContext {
        GprsContext {
            apn: "mms.example".into(),
            username: String::new(),
            password: String::new(),
            auth: GprsAuthMethod::None,
            proto: rilnet_core::GprsProto::Ip,
        }
    }

    // -----------------------------------------------------------------
    // Startup
    // -----------------------------------------------------------------

    #[test]
    fn startup_queries_pref_mode_without_polling_powered_off_radio() {
        let mut t = bed();
        t.radio.set_state(RadioState::Off);
        t.engine.last_radio = t.radio.status();
        t.engine.startup();
        assert_eq!(t.io.submit_count(RilOpcode::GetPreferredNetworkType), 1);
        assert_eq!(t.io.submit_count(RilOpcode::Operator), 0);
        assert_eq!(t.io.submit_count(RilOpcode::VoiceRegistrationState), 0);
        assert_eq!(t.io.submit_count(RilOpcode::DataRegistrationState), 0);
    }

    #[test]
    fn startup_polls_state_when_radio_on() {
        let mut t = bed();
        t.engine.startup();
        assert_eq!(t.io.submit_count(RilOpcode::Operator), 1);
        assert_eq!(t.io.submit_count(RilOpcode::VoiceRegistrationState), 1);
        assert_eq!(t.io.submit_count(RilOpcode::DataRegistrationState), 1);
    }

    #[test]
    fn startup_reply_checks_pref_mode_and_emits_change() {
        let mut t = bed();
        t.engine.startup();
        t.io.complete_next(
            RilOpcode::GetPreferredNetworkType,
            STATUS_SUCCESS,
            pref_mode_payload(rat::GSM_ONLY),
        );
        t.pump();
        assert_eq!(t.engine.rat, rat::GSM_ONLY);
        assert_eq!(t.engine.pref_mode, RadioAccessMode::Gsm);
        assert!(t.drain_events().contains(&NetworkEvent::PrefModeChanged));
        // LTE-capable slot with an LTE preference: the peer is out of
        // sync and a set goes out straight away.
        let sets = t.io.submitted_with(RilOpcode::SetPreferredNetworkType);
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].payload, requests::set_rat_payload(rat::LTE_GSM_WCDMA));
    }

    #[test]
    fn startup_reply_in_sync_submits_nothing() {
        let mut t = bed();
        t.engine.startup();
        t.io.complete_next(
            RilOpcode::GetPreferredNetworkType,
            STATUS_SUCCESS,
            pref_mode_payload(rat::LTE_GSM_WCDMA),
        );
        t.pump();
        assert_eq!(t.sets(), 0);
    }

    #[test]
    fn failed_startup_reply_is_ignored() {
        let mut t = bed();
        t.engine.startup();
        t.io.complete_next(
            RilOpcode::GetPreferredNetworkType,
            STATUS_FAILURE,
            pref_mode_payload(rat::GSM_ONLY),
        );
        t.pump();
        assert_eq!(t.engine.rat, -1);
        assert_eq!(t.sets(), 0);
    }

    // -----------------------------------------------------------------
    // RAT policy: target computation
    // -----------------------------------------------------------------

    #[test]
    fn actual_pref_mode_picks_smaller_of_both() {
        let mut t = bed();
        t.settings.set_pref_mode(RadioAccessMode::Lte);
        t.engine.max_pref_mode = RadioAccessMode::Umts;
        assert_eq!(t.engine.actual_pref_mode(), RadioAccessMode::Umts);

        t.settings.set_pref_mode(RadioAccessMode::Gsm);
        assert_eq!(t.engine.actual_pref_mode(), RadioAccessMode::Gsm);
    }

    #[test]
    fn actual_pref_mode_any_yields_to_the_other() {
        let mut t = bed();
        t.settings.set_pref_mode(RadioAccessMode::Any);
        t.engine.max_pref_mode = RadioAccessMode::Umts;
        assert_eq!(t.engine.actual_pref_mode(), RadioAccessMode::Umts);

        t.settings.set_pref_mode(RadioAccessMode::Lte);
        t.engine.max_pref_mode = RadioAccessMode::Any;
        assert_eq!(t.engine.actual_pref_mode(), RadioAccessMode::Lte);

        t.settings.set_pref_mode(RadioAccessMode::Any);
        assert_eq!(t.engine.actual_pref_mode(), RadioAccessMode::Any);
    }

    #[test]
    fn powered_off_radio_forces_gsm_ceiling() {
        let mut t = bed();
        t.settings.set_pref_mode(RadioAccessMode::Lte);
        t.engine.max_pref_mode = RadioAccessMode::Lte;
        assert_eq!(t.engine.actual_pref_mode(), RadioAccessMode::Lte);

        t.radio.set_state(RadioState::Off);
        assert_eq!(t.engine.actual_pref_mode(), RadioAccessMode::Gsm);
    }

    #[test]
    fn mode_to_rat_honors_capability_mask() {
        let t = bed();
        assert_eq!(
            t.engine.mode_to_rat(RadioAccessMode::Lte),
            rat::LTE_GSM_WCDMA
        );
        assert_eq!(
            t.engine.mode_to_rat(RadioAccessMode::Any),
            rat::LTE_GSM_WCDMA
        );
        assert_eq!(
            t.engine.mode_to_rat(RadioAccessMode::Umts),
            rat::GSM_WCDMA_AUTO
        );
        assert_eq!(t.engine.mode_to_rat(RadioAccessMode::Gsm), rat::GSM_ONLY);
    }

    #[test]
    fn mode_to_rat_falls_back_without_lte_bit() {
        let t = bed_with(
            NetworkConfig::default(),
            AccessModes::NONE
                .with(RadioAccessMode::Gsm)
                .with(RadioAccessMode::Umts),
        );
        assert_eq!(
            t.engine.mode_to_rat(RadioAccessMode::Lte),
            rat::GSM_WCDMA_AUTO
        );
        assert_eq!(
            t.engine.mode_to_rat(RadioAccessMode::Any),
            rat::GSM_WCDMA_AUTO
        );
    }

    #[test]
    fn mode_to_rat_gsm_only_slot() {
        let t = bed_with(
            NetworkConfig::default(),
            AccessModes::NONE.with(RadioAccessMode::Gsm),
        );
        assert_eq!(t.engine.mode_to_rat(RadioAccessMode::Lte), rat::GSM_ONLY);
        assert_eq!(t.engine.mode_to_rat(RadioAccessMode::Umts), rat::GSM_ONLY);
    }

    // -----------------------------------------------------------------
    // RAT policy: gating, holdoff, assert
    // -----------------------------------------------------------------

    #[test]
    fn sim_io_activity_defers_set() {
        let mut t = bed();
        t.engine.startup();
        t.sim.set_io_active(true);
        t.io.complete_next(
            RilOpcode::GetPreferredNetworkType,
            STATUS_SUCCESS,
            pref_mode_payload(rat::GSM_ONLY),
        );
        t.pump();
        assert_eq!(t.sets(), 0);

        // I/O finishes: the SIM reaction re-evaluates and submits.
        t.sim.set_io_active(false);
        t.engine.on_sim_changed();
        assert_eq!(t.sets(), 1);
    }

    #[test]
    fn offline_radio_defers_set() {
        let mut t = bed();
        t.radio.set_online(false);
        t.engine.last_radio = t.radio.status();
        t.engine.startup();
        t.io.complete_next(
            RilOpcode::GetPreferredNetworkType,
            STATUS_SUCCESS,
            pref_mode_payload(rat::GSM_ONLY),
        );
        t.pump();
        assert_eq!(t.sets(), 0);

        t.radio.set_online(true);
        t.engine.on_radio_changed(t.radio.status());
        assert_eq!(t.sets(), 1);
    }

    /// Drive the bed to a settled, in-sync state: first set completed,
    /// ground truth re-queried, holdoff still armed.
    fn settle_in_sync(t: &mut TestBed) {
        t.engine.startup();
        t.io.complete_next(
            RilOpcode::GetPreferredNetworkType,
            STATUS_SUCCESS,
            pref_mode_payload(rat::GSM_ONLY),
        );
        t.pump();
        assert_eq!(t.sets(), 1);
        t.io.complete_next(RilOpcode::SetPreferredNetworkType, STATUS_SUCCESS, vec![]);
        t.pump();
        t.io.complete_next(
            RilOpcode::GetPreferredNetworkType,
            STATUS_SUCCESS,
            pref_mode_payload(rat::LTE_GSM_WCDMA),
        );
        t.pump();
    }

    #[test]
    fn holdoff_blocks_second_set_until_expiry() {
        let mut t = bed();
        settle_in_sync(&mut t);

        // New target during the holdoff: deferred, however often the
        // check runs.
        t.settings.set_pref_mode(RadioAccessMode::Gsm);
        t.engine.check_pref_mode(false);
        t.engine.check_pref_mode(false);
        assert_eq!(t.sets(), 1);

        // Holdoff expiry re-runs the check and the set goes out.
        t.engine.holdoff_deadline = Some(Instant::now());
        t.engine.on_timer();
        let sets = t.io.submitted_with(RilOpcode::SetPreferredNetworkType);
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[1].payload, requests::set_rat_payload(rat::GSM_ONLY));
    }

    #[test]
    fn immediate_check_bypasses_holdoff() {
        let mut t = bed();
        settle_in_sync(&mut t);

        t.settings.set_pref_mode(RadioAccessMode::Gsm);
        t.engine.check_pref_mode(true);
        assert_eq!(t.sets(), 2);
        assert_eq!(t.engine.holdoff_deadline.is_some(), true);
    }

    #[test]
    fn set_in_flight_blocks_resubmission() {
        let mut t = bed();
        t.engine.startup();
        t.io.complete_next(
            RilOpcode::GetPreferredNetworkType,
            STATUS_SUCCESS,
            pref_mode_payload(rat::GSM_ONLY),
        );
        t.pump();
        assert_eq!(t.sets(), 1);

        // The set has not completed; even an immediate check must not
        // double-submit.
        t.settings.set_pref_mode(RadioAccessMode::Umts);
        t.engine.check_pref_mode(true);
        assert_eq!(t.sets(), 1);
    }

    #[test]
    fn assert_resubmits_matching_rat() {
        let mut t = bed();
        t.engine.startup();
        t.io.complete_next(
            RilOpcode::GetPreferredNetworkType,
            STATUS_SUCCESS,
            pref_mode_payload(rat::LTE_GSM_WCDMA),
        );
        t.pump();
        assert_eq!(t.sets(), 0);

        t.engine.assert_pref_mode(true);
        assert_eq!(t.sets(), 1);
        assert!(!t.engine.assert_rat);
    }

    #[test]
    fn failed_set_still_requeries_ground_truth() {
        let mut t = bed();
        t.engine.startup();
        t.io.complete_next(
            RilOpcode::GetPreferredNetworkType,
            STATUS_SUCCESS,
            pref_mode_payload(rat::GSM_ONLY),
        );
        t.pump();
        assert_eq!(t.sets(), 1);

        t.io.complete_next(RilOpcode::SetPreferredNetworkType, STATUS_FAILURE, vec![]);
        t.pump();
        // One startup query plus the post-set re-query.
        assert_eq!(t.io.submit_count(RilOpcode::GetPreferredNetworkType), 2);
    }

    #[test]
    fn capability_change_asserts_pref_mode() {
        let mut t = bed();
        t.engine.startup();
        t.io.complete_next(
            RilOpcode::GetPreferredNetworkType,
            STATUS_SUCCESS,
            pref_mode_payload(rat::LTE_GSM_WCDMA),
        );
        t.pump();
        assert_eq!(t.sets(), 0);

        t.engine.on_unsolicited(UnsolEvent::RadioCapabilityChanged);
        assert_eq!(t.sets(), 1);
    }

    #[test]
    fn max_pref_mode_change_emits_and_applies() {
        let mut t = bed();
        settle_in_sync(&mut t);
        t.drain_events();

        t.engine.set_max_pref_mode(RadioAccessMode::Umts, false);
        assert!(t
            .drain_events()
            .contains(&NetworkEvent::MaxPrefModeChanged));
        // Immediate check: holdoff canceled, UMTS code submitted.
        let sets = t.io.submitted_with(RilOpcode::SetPreferredNetworkType);
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[1].payload, requests::set_rat_payload(rat::GSM_WCDMA_AUTO));

        // Unchanged without force: nothing at all.
        t.engine.set_max_pref_mode(RadioAccessMode::Umts, false);
        assert!(t.drain_events().is_empty());
    }

    #[test]
    fn force_check_is_scheduled_once_and_runs_immediate() {
        let mut t = bed();
        settle_in_sync(&mut t);

        // Two near-simultaneous preference changes coalesce into one
        // deferred evaluation.
        t.settings.set_pref_mode(RadioAccessMode::Gsm);
        t.engine.on_settings_changed(t.settings.snapshot());
        t.settings.set_pref_mode(RadioAccessMode::Umts);
        t.engine.on_settings_changed(t.settings.snapshot());
        assert!(t.engine.force_deadline.is_some());
        assert_eq!(t.sets(), 1);

        // The deferred check forces its way through the holdoff.
        t.engine.on_timer();
        assert!(t.engine.force_deadline.is_none());
        let sets = t.io.submitted_with(RilOpcode::SetPreferredNetworkType);
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[1].payload, requests::set_rat_payload(rat::GSM_WCDMA_AUTO));
    }

    // -----------------------------------------------------------------
    // Registration tracking
    // -----------------------------------------------------------------

    #[test]
    fn poll_state_retries_pending_requests() {
        let mut t = bed();
        t.engine.poll_state();
        assert_eq!(t.io.total_submitted(), 3);
        let op_id = t.io.submitted_with(RilOpcode::Operator)[0].id;

        // Re-trigger while pending: retry, never a second request.
        t.engine.poll_state();
        assert_eq!(t.io.total_submitted(), 3);
        assert_eq!(t.io.retry_count(op_id), 1);
    }

    #[test]
    fn voice_reply_updates_state_and_emits_once() {
        let mut t = bed();
        t.engine.poll_state();
        let payload =
            registration_payload(&[Some("1"), Some("0017"), Some("05a4"), Some("14")]);
        t.io.complete_next(
            RilOpcode::VoiceRegistrationState,
            STATUS_SUCCESS,
            payload.clone(),
        );
        t.pump();
        assert_eq!(t.engine.voice.status, rilnet_core::RegistrationStatus::Registered);
        assert_eq!(t.engine.voice.tech, Some(RadioAccessMode::Lte));
        assert!(t.drain_events().contains(&NetworkEvent::VoiceStateChanged));

        // Identical poll result: no event.
        t.engine.poll_registration();
        t.io.complete_next(RilOpcode::VoiceRegistrationState, STATUS_SUCCESS, payload);
        t.pump();
        assert!(t.drain_events().is_empty());
    }

    #[test]
    fn data_reply_failure_and_garbage_retain_cache() {
        let mut t = bed();
        t.engine.poll_state();
        let good = registration_payload(&[Some("1"), Some("0017"), Some("05a4")]);
        t.io.complete_next(RilOpcode::DataRegistrationState, STATUS_SUCCESS, good);
        t.pump();
        let cached = t.engine.data;
        t.drain_events();

        // Non-success completion: ignored wholesale.
        t.engine.poll_registration();
        t.io.complete_next(
            RilOpcode::DataRegistrationState,
            STATUS_FAILURE,
            registration_payload(&[Some("0"), None, None]),
        );
        t.pump();
        assert_eq!(t.engine.data, cached);

        // Malformed payload: decode skipped, cache retained.
        t.engine.poll_registration();
        t.io.complete_next(RilOpcode::DataRegistrationState, STATUS_SUCCESS, vec![9, 9]);
        t.pump();
        assert_eq!(t.engine.data, cached);
        assert!(t.drain_events().is_empty());
    }

    #[test]
    fn operator_reply_builds_current_operator() {
        let mut t = bed();
        t.engine.poll_state();
        t.io.complete_next(
            RilOpcode::Operator,
            STATUS_SUCCESS,
            operator_payload(Some("Sonera"), Some("SON"), Some("24491")),
        );
        t.pump();
        let op = t.engine.operator.clone().unwrap();
        assert_eq!(op.name, "Sonera");
        assert_eq!(op.mcc, "244");
        assert_eq!(op.mnc, "91");
        assert_eq!(op.status, OperatorStatus::Current);
        assert!(t.drain_events().contains(&NetworkEvent::OperatorChanged));
    }

    #[test]
    fn operator_name_falls_back_to_numeric() {
        let mut t = bed();
        t.engine.poll_state();
        t.io.complete_next(
            RilOpcode::Operator,
            STATUS_SUCCESS,
            operator_payload(None, None, Some("24412")),
        );
        t.pump();
        assert_eq!(t.engine.operator.as_ref().unwrap().name, "24412");
    }

    #[test]
    fn operator_tech_from_suffix_or_voice_state() {
        let mut t = bed();
        t.engine.poll_state();
        t.io.complete_next(
            RilOpcode::VoiceRegistrationState,
            STATUS_SUCCESS,
            registration_payload(&[Some("1"), None, None, Some("3")]),
        );
        t.pump();
        // No suffix: operator inherits the voice technology.
        t.io.complete_next(
            RilOpcode::Operator,
            STATUS_SUCCESS,
            operator_payload(Some("Op"), None, Some("24412")),
        );
        t.pump();
        assert_eq!(
            t.engine.operator.as_ref().unwrap().tech,
            Some(RadioAccessMode::Umts)
        );

        // Explicit +tech suffix wins.
        t.engine.poll_state();
        t.io.complete_next(
            RilOpcode::Operator,
            STATUS_SUCCESS,
            operator_payload(Some("Op"), None, Some("24412+14")),
        );
        t.pump();
        assert_eq!(
            t.engine.operator.as_ref().unwrap().tech,
            Some(RadioAccessMode::Lte)
        );
    }

    #[test]
    fn unchanged_operator_reply_emits_nothing() {
        let mut t = bed();
        t.engine.poll_state();
        let payload = operator_payload(Some("Sonera"), None, Some("24491"));
        t.io.complete_next(RilOpcode::Operator, STATUS_SUCCESS, payload.clone());
        t.pump();
        t.drain_events();

        t.engine.poll_state();
        t.io.complete_next(RilOpcode::Operator, STATUS_SUCCESS, payload);
        t.pump();
        assert!(t.drain_events().is_empty());
    }

    #[test]
    fn unparsable_numeric_clears_operator() {
        let mut t = bed();
        t.engine.poll_state();
        t.io.complete_next(
            RilOpcode::Operator,
            STATUS_SUCCESS,
            operator_payload(Some("Sonera"), None, Some("24491")),
        );
        t.pump();
        assert!(t.engine.operator.is_some());
        t.drain_events();

        t.engine.poll_state();
        t.io.complete_next(
            RilOpcode::Operator,
            STATUS_SUCCESS,
            operator_payload(None, None, None),
        );
        t.pump();
        assert!(t.engine.operator.is_none());
        assert!(t.drain_events().contains(&NetworkEvent::OperatorChanged));
    }

    #[test]
    fn network_state_unsolicited_triggers_full_poll() {
        let mut t = bed();
        t.engine.on_unsolicited(UnsolEvent::NetworkStateChanged);
        assert_eq!(t.io.submit_count(RilOpcode::Operator), 1);
        assert_eq!(t.io.submit_count(RilOpcode::VoiceRegistrationState), 1);
        assert_eq!(t.io.submit_count(RilOpcode::DataRegistrationState), 1);
    }

    // -----------------------------------------------------------------
    // Data profiles
    // -----------------------------------------------------------------

    fn profile_bed() -> TestBed {
        let config = NetworkConfig {
            use_data_profiles: true,
            mms_data_profile_id: rilnet_core::profile_id::IMS,
            ..NetworkConfig::default()
        };
        bed_with(config, AccessModes::all())
    }

    #[test]
    fn unchanged_contexts_submit_profiles_once() {
        let mut t = profile_bed();
        t.gprs.set_present(true);
        t.gprs
            .set_context(GprsContextType::Internet, Some(internet_ctx()));
        t.engine.on_gprs_changed(t.gprs.snapshot());
        assert_eq!(t.io.submit_count(RilOpcode::SetDataProfile), 1);

        // Same settings, second evaluation: no resubmission.
        t.engine.check_data_profiles();
        assert_eq!(t.io.submit_count(RilOpcode::SetDataProfile), 1);
    }

    #[test]
    fn changed_contexts_cancel_in_flight_submission() {
        let mut t = profile_bed();
        t.gprs.set_present(true);
        t.gprs
            .set_context(GprsContextType::Internet, Some(internet_ctx()));
        t.engine.on_gprs_changed(t.gprs.snapshot());
        let first = t.io.submitted_with(RilOpcode::SetDataProfile)[0].id;

        t.gprs.set_context(GprsContextType::Mms, Some(mms_ctx()));
        t.engine.on_gprs_changed(t.gprs.snapshot());
        assert_eq!(t.io.submit_count(RilOpcode::SetDataProfile), 2);
        assert!(t.io.was_canceled(first));
    }

    #[test]
    fn absent_gprs_clears_cache_without_commands() {
        let mut t = profile_bed();
        t.gprs.set_present(true);
        t.gprs
            .set_context(GprsContextType::Internet, Some(internet_ctx()));
        t.engine.on_gprs_changed(t.gprs.snapshot());
        assert!(!t.engine.data_profiles.is_empty());
        t.io.complete_next(RilOpcode::SetDataProfile, STATUS_SUCCESS, vec![]);
        t.pump();

        t.gprs.set_present(false);
        t.engine.on_gprs_changed(t.gprs.snapshot());
        assert!(t.engine.data_profiles.is_empty());
        // No "clear profiles" command exists; nothing was submitted.
        assert_eq!(t.io.submit_count(RilOpcode::SetDataProfile), 1);
    }

    #[test]
    fn profile_sync_disabled_by_default() {
        let mut t = bed();
        t.gprs.set_present(true);
        t.gprs
            .set_context(GprsContextType::Internet, Some(internet_ctx()));
        t.engine.on_gprs_changed(t.gprs.snapshot());
        assert_eq!(t.io.submit_count(RilOpcode::SetDataProfile), 0);
    }

    // -----------------------------------------------------------------
    // Initial attach APN
    // -----------------------------------------------------------------

    #[test]
    fn gprs_appearance_submits_attach_apn_once() {
        let mut t = bed();
        t.gprs.set_present(true);
        t.gprs
            .set_context(GprsContextType::Internet, Some(internet_ctx()));
        t.engine.on_gprs_changed(t.gprs.snapshot());
        assert_eq!(t.io.submit_count(RilOpcode::SetInitialAttachApn), 1);
        let sent = t.io.submitted_with(RilOpcode::SetInitialAttachApn);
        assert_eq!(
            sent[0].payload,
            requests::set_initial_attach_apn_payload(&internet_ctx())
        );

        // Re-evaluation without new triggers: already applied.
        t.engine.check_initial_attach_apn();
        assert_eq!(t.io.submit_count(RilOpcode::SetInitialAttachApn), 1);
    }

    #[test]
    fn umts_ceiling_needs_no_attach_apn() {
        let mut t = bed();
        t.settings.set_pref_mode(RadioAccessMode::Umts);
        t.gprs.set_present(true);
        t.gprs
            .set_context(GprsContextType::Internet, Some(internet_ctx()));
        t.engine.on_gprs_changed(t.gprs.snapshot());
        assert_eq!(t.io.submit_count(RilOpcode::SetInitialAttachApn), 0);
    }

    #[test]
    fn need_transition_rearms_submission() {
        let mut t = bed();
        t.gprs.set_present(true);
        t.gprs
            .set_context(GprsContextType::Internet, Some(internet_ctx()));
        t.engine.on_gprs_changed(t.gprs.snapshot());
        assert_eq!(t.io.submit_count(RilOpcode::SetInitialAttachApn), 1);

        // Radio drops: no longer needed.
        t.radio.set_state(RadioState::Off);
        t.engine.on_radio_changed(t.radio.status());
        assert!(!t.engine.need_attach_apn);

        // Radio returns: needed again, so it must be resubmitted.
        t.radio.set_state(RadioState::On);
        t.engine.on_radio_changed(t.radio.status());
        assert_eq!(t.io.submit_count(RilOpcode::SetInitialAttachApn), 2);
    }

    #[test]
    fn vendor_adapter_payload_wins() {
        struct FixedVendor;
        impl VendorAdapter for FixedVendor {
            fn build_attach_apn_request(&self, _ctx: &GprsContext) -> Option<Vec<u8>> {
                Some(vec![0xAB, 0xCD])
            }
        }

        let mut t = bed();
        t.engine.vendor = Some(Arc::new(FixedVendor));
        t.gprs.set_present(true);
        t.gprs
            .set_context(GprsContextType::Internet, Some(internet_ctx()));
        t.engine.on_gprs_changed(t.gprs.snapshot());
        let sent = t.io.submitted_with(RilOpcode::SetInitialAttachApn);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].payload, vec![0xAB, 0xCD]);
    }

    #[test]
    fn internet_context_change_resubmits_attach_apn() {
        let mut t = bed();
        t.gprs.set_present(true);
        t.gprs
            .set_context(GprsContextType::Internet, Some(internet_ctx()));
        t.engine.on_gprs_changed(t.gprs.snapshot());
        assert_eq!(t.io.submit_count(RilOpcode::SetInitialAttachApn), 1);

        let mut changed = internet_ctx();
        changed.apn = "internet.v2".into();
        t.gprs.set_context(GprsContextType::Internet, Some(changed));
        t.engine.on_gprs_changed(t.gprs.snapshot());
        assert_eq!(t.io.submit_count(RilOpcode::SetInitialAttachApn), 2);
    }

    // -----------------------------------------------------------------
    // Task-level behavior
    // -----------------------------------------------------------------

    /// Let the engine task process everything that is currently ready.
    async fn settle() {
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
    }

    struct TaskBed {
        io: Arc<MockIo>,
        radio: Radio,
        sim: SimCard,
        settings: SimSettings,
        gprs: GprsWatch,
    }

    fn task_bed() -> TaskBed {
        let io = Arc::new(MockIo::new());
        let radio = Radio::new();
        radio.set_state(RadioState::On);
        radio.set_online(true);
        let sim = SimCard::new();
        sim.set_ready(true);
        TaskBed {
            io,
            radio,
            sim,
            settings: SimSettings::new(AccessModes::all()),
            gprs: GprsWatch::new(),
        }
    }

    fn spawn_network(t: &TaskBed) -> RilNetwork {
        crate::builder::NetworkBuilder::new().build(
            t.io.clone(),
            t.radio.clone(),
            t.sim.clone(),
            t.settings.clone(),
            t.gprs.clone(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn task_applies_pref_mode_and_honors_holdoff() {
        let t = task_bed();
        let network = spawn_network(&t);
        settle().await;
        assert_eq!(t.io.submit_count(RilOpcode::GetPreferredNetworkType), 1);

        // Peer reports GSM-only: out of sync, one set goes out.
        t.io.complete_next(
            RilOpcode::GetPreferredNetworkType,
            STATUS_SUCCESS,
            pref_mode_payload(rat::GSM_ONLY),
        );
        settle().await;
        let sets = t.io.submitted_with(RilOpcode::SetPreferredNetworkType);
        assert_eq!(sets.len(), 1);

        // Complete the set; ground truth is re-queried and confirms.
        t.io.complete(sets[0].id, STATUS_SUCCESS, vec![]);
        settle().await;
        t.io.complete_next(
            RilOpcode::GetPreferredNetworkType,
            STATUS_SUCCESS,
            pref_mode_payload(rat::LTE_GSM_WCDMA),
        );
        settle().await;

        // A capability change during the holdoff is deferred...
        t.io.emit_unsolicited(UnsolEvent::RadioCapabilityChanged);
        settle().await;
        assert_eq!(t.io.submit_count(RilOpcode::SetPreferredNetworkType), 1);

        // ...and applied when the holdoff expires.
        time::advance(Duration::from_millis(2100)).await;
        settle().await;
        assert_eq!(t.io.submit_count(RilOpcode::SetPreferredNetworkType), 2);

        drop(network);
    }

    #[tokio::test(start_paused = true)]
    async fn task_runs_deferred_check_after_settings_change() {
        let t = task_bed();
        let network = spawn_network(&t);
        settle().await;
        t.io.complete_next(
            RilOpcode::GetPreferredNetworkType,
            STATUS_SUCCESS,
            pref_mode_payload(rat::LTE_GSM_WCDMA),
        );
        settle().await;
        assert_eq!(t.io.submit_count(RilOpcode::SetPreferredNetworkType), 0);

        // A preference change is not applied synchronously; the
        // deferred check picks it up on the next loop pass.
        t.settings.set_pref_mode(RadioAccessMode::Gsm);
        settle().await;
        let sets = t.io.submitted_with(RilOpcode::SetPreferredNetworkType);
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].payload, requests::set_rat_payload(rat::GSM_ONLY));

        drop(network);
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_cancels_pending_and_silences_events() {
        let t = task_bed();
        let network = spawn_network(&t);
        let mut events = network.subscribe();
        settle().await;
        assert!(t.io.pending_count() > 0);

        let submitted_before = t.io.total_submitted();
        network.shutdown().await;
        assert_eq!(t.io.pending_count(), 0);

        // Stale triggers after teardown: nothing may happen.
        t.radio.set_state(RadioState::Off);
        t.radio.set_state(RadioState::On);
        t.sim.set_io_active(true);
        t.io.emit_unsolicited(UnsolEvent::NetworkStateChanged);
        time::advance(Duration::from_secs(5)).await;
        settle().await;

        assert_eq!(t.io.total_submitted(), submitted_before);
        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Closed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn handle_commands_reach_the_engine() {
        let t = task_bed();
        let network = spawn_network(&t);
        settle().await;

        network
            .set_max_pref_mode(RadioAccessMode::Umts, false)
            .await
            .unwrap();
        settle().await;
        assert_eq!(network.snapshot().max_pref_mode, RadioAccessMode::Umts);

        // The startup polls are still pending, so a re-poll command
        // retries them through the transport instead of duplicating.
        network.query_registration_state().await.unwrap();
        settle().await;
        assert_eq!(t.io.submit_count(RilOpcode::VoiceRegistrationState), 1);
        let voice_id = t.io.submitted_with(RilOpcode::VoiceRegistrationState)[0].id;
        assert_eq!(t.io.retry_count(voice_id), 1);

        drop(network);
    }
}
