//! Decoding session: epoch buffer, pending fix and the epoch synchronizer.
//!
//! One [Session] owns every piece of mutable state the decoders share
//! ([GpsTimeState], [EpochBuffer], pending [PendingFix], phase trackers)
//! and is driven one frame at a time, strictly in arrival order.
use log::{debug, error, info, trace, warn};

use std::ops::Range;

use hifitime::prelude::Epoch;
use thiserror::Error;
use tokio::sync::watch;

use crate::{
    collecter::{EpochSink, ObsEpoch},
    device::Device,
    message::{
        DELIMITER, DecodingError, FrameError, IgnoredMessage, MessageType, RawFrame,
        checked_payload,
        mben::{MBEN_CHECKSUM_LEN, MbenFlags, MbenRecord, RawMben},
        pben::{PBEN_CHECKSUM_LEN, PbenRecord},
        quality::PhaseTracker,
    },
    runtime::GpsTimeState,
};

/// Accepted PRN, upper bound excluded. PRN 32 is rejected,
/// like the receiver interface always did: review before widening.
pub const PRN_RANGE: Range<u8> = 1..32;

/// [EpochBuffer] slots, indexed by PRN
const SLOTS: usize = 33;

/// Epoch synchronizer state
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Satellite blocks of the current epoch are still coming
    #[default]
    AwaitingEpoch,
    /// All satellite blocks received, waiting for the matching PBEN
    EpochReady,
}

/// One satellite of the epoch in progress
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SatelliteSlot {
    pub record: MbenRecord,
    pub flags: MbenFlags,
}

/// MBEN blocks of the epoch in progress, indexed by PRN.
#[derive(Debug, Clone)]
pub struct EpochBuffer {
    slots: [Option<SatelliteSlot>; SLOTS],
    /// Last block of this epoch received
    full: bool,
    /// Dating of the latest block (last writer wins)
    identity: String,
}

impl Default for EpochBuffer {
    fn default() -> Self {
        Self {
            slots: [None; SLOTS],
            full: false,
            identity: String::new(),
        }
    }
}

impl EpochBuffer {
    /// Stores (or replaces) the slot of this PRN and dates the buffer.
    /// The last block of an epoch marks the buffer full.
    pub fn insert(&mut self, epoch: Epoch, slot: SatelliteSlot) {
        let prn = slot.record.prn() as usize;

        if prn >= SLOTS {
            return;
        }

        if slot.record.is_last() {
            self.full = true;
        }

        self.identity = GpsTimeState::identity(epoch);
        self.slots[prn] = Some(slot);
    }

    pub fn is_full(&self) -> bool {
        self.full
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    #[cfg(test)]
    pub fn slot(&self, prn: u8) -> Option<&SatelliteSlot> {
        self.slots.get(prn as usize)?.as_ref()
    }

    /// Populated PRNs, in increasing order
    #[cfg(test)]
    pub fn prns(&self) -> Vec<u8> {
        self.satellites().map(|slot| slot.record.prn()).collect()
    }

    pub fn satellites(&self) -> impl Iterator<Item = &SatelliteSlot> {
        self.slots.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.satellites().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Unsets all slots
    pub fn clear(&mut self) {
        self.slots = [None; SLOTS];
        self.full = false;
        self.identity.clear();
    }
}

/// Latest PBEN and its dating
#[derive(Debug, Clone, PartialEq)]
pub struct PendingFix {
    pub record: PbenRecord,
    pub epoch: Epoch,
    pub identity: String,
}

/// Session statistics
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Counters {
    pub frames: usize,
    pub mben: usize,
    pub pben: usize,
    pub ignored: usize,
    pub out_of_range: usize,
    pub unknown: usize,
    pub bad_trailers: usize,
    pub checksum_errors: usize,
    pub corrupted: usize,
    pub mismatches: usize,
    pub epochs: usize,
}

impl std::fmt::Display for Counters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "frames={} mben={} pben={} ignored={} out-of-range={} unknown={} bad-trailer={} checksum={} corrupted={} mismatch={} epochs={}",
            self.frames,
            self.mben,
            self.pben,
            self.ignored,
            self.out_of_range,
            self.unknown,
            self.bad_trailers,
            self.checksum_errors,
            self.corrupted,
            self.mismatches,
            self.epochs,
        )
    }
}

/// Frame processing errors. None of them is fatal.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Decoding(#[from] DecodingError),
}

/// Non erroneous outcome of one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decoded {
    /// Delimiter leftover
    Nothing,
    /// MBEN folded into the epoch buffer
    Mben { prn: u8, left: u8 },
    /// New fix pending
    Pben { tow: f64, rollover: bool },
    /// MBEN dropped: PRN outside of accepted range
    OutOfRangePrn(u8),
    /// PBEN dropped: no MBEN received yet
    PrematurePben,
    /// Recognized, not interpreted
    Ignored(IgnoredMessage),
}

pub struct Session {
    /// GPS time state
    time: GpsTimeState,

    /// Epoch in progress
    buffer: EpochBuffer,

    /// Latest fix
    fix: Option<PendingFix>,

    /// Latest fix not evaluated yet
    fix_pending: bool,

    /// Phase continuity, per PRN and frequency
    trackers: [[PhaseTracker; 3]; SLOTS],

    /// Accepted PRN
    prn_range: Range<u8>,

    /// Synchronizer state
    state: SyncState,

    /// At least one MBEN was folded
    mben_seen: bool,

    counters: Counters,
}

impl Session {
    /// Creates a new [Session] seeded with current GPS week
    pub fn new(week: u32) -> Self {
        Self {
            time: GpsTimeState::new(week),
            buffer: EpochBuffer::default(),
            fix: None,
            fix_pending: false,
            trackers: [[PhaseTracker::default(); 3]; SLOTS],
            prn_range: PRN_RANGE,
            state: SyncState::default(),
            mben_seen: false,
            counters: Counters::default(),
        }
    }

    /// Overrides the accepted PRN range (upper bound excluded, 32 at most).
    pub fn with_prn_range(mut self, range: Range<u8>) -> Self {
        self.prn_range = range.start..range.end.min(SLOTS as u8);
        self
    }

    pub fn time(&self) -> &GpsTimeState {
        &self.time
    }

    #[cfg(test)]
    pub fn buffer(&self) -> &EpochBuffer {
        &self.buffer
    }

    #[cfg(test)]
    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    #[cfg(test)]
    pub fn is_fix_pending(&self) -> bool {
        self.fix_pending
    }

    pub fn last_fix(&self) -> Option<&PendingFix> {
        self.fix.as_ref()
    }

    /// Processes one delimited frame then runs the readiness check.
    /// Returns true when an epoch was handed to `sink`.
    pub fn process_frame<S: EpochSink>(&mut self, bytes: &[u8], sink: &mut S) -> bool {
        self.counters.frames += 1;

        match self.dispatch(bytes) {
            Ok(decoded) => {
                trace!("{:?}", decoded);
                match decoded {
                    Decoded::Mben { .. } => self.counters.mben += 1,
                    Decoded::Pben { .. } => self.counters.pben += 1,
                    Decoded::OutOfRangePrn(_) => self.counters.out_of_range += 1,
                    Decoded::Ignored(_) => self.counters.ignored += 1,
                    Decoded::Nothing | Decoded::PrematurePben => {},
                }
            },
            Err(Error::Frame(e)) => {
                match e {
                    FrameError::UnknownMessage(_) => self.counters.unknown += 1,
                    FrameError::BadTrailer(_) | FrameError::Truncated(_) => {
                        self.counters.bad_trailers += 1
                    },
                }
                warn!("{} - {}", self.time.current_epoch(), e);
            },
            Err(Error::Decoding(e)) => {
                match e {
                    DecodingError::Checksum { .. } => self.counters.checksum_errors += 1,
                    DecodingError::CorruptedRecord { .. } => self.counters.corrupted += 1,
                }
                error!("{} - {}", self.time.current_epoch(), e);
            },
        }

        self.transition(sink)
    }

    /// Frames, identifies and decodes one frame
    pub fn dispatch(&mut self, bytes: &[u8]) -> Result<Decoded, Error> {
        let frame = match RawFrame::parse(bytes)? {
            Some(frame) => frame,
            None => return Ok(Decoded::Nothing),
        };

        trace!(
            "{} frame ({}, {} bytes)",
            frame.kind,
            frame.kind.code(),
            frame.body.len()
        );

        match frame.kind {
            MessageType::Mben => self.process_mben(frame.body),
            MessageType::Pben => self.process_pben(frame.body),
            MessageType::Ignored(msg) => Ok(Decoded::Ignored(msg)),
        }
    }

    fn process_mben(&mut self, body: &[u8]) -> Result<Decoded, Error> {
        let payload = checked_payload("MBEN", body, MBEN_CHECKSUM_LEN)?;
        let raw = RawMben::decode(payload)?;

        if !self.prn_range.contains(&raw.prn) {
            return Ok(Decoded::OutOfRangePrn(raw.prn));
        }

        let (record, flags) = MbenRecord::from_raw(&raw, &mut self.trackers[raw.prn as usize]);

        let epoch = self.time.epoch_from_seq(raw.seq);

        debug!(
            "{} - ({}) MBEN left={} el={} az={} ch={}",
            epoch, record.sv, record.left, record.elevation, record.azimuth, record.channel
        );

        self.buffer.insert(epoch, SatelliteSlot { record, flags });
        self.mben_seen = true;

        Ok(Decoded::Mben {
            prn: raw.prn,
            left: raw.left,
        })
    }

    fn process_pben(&mut self, body: &[u8]) -> Result<Decoded, Error> {
        if !self.mben_seen {
            return Ok(Decoded::PrematurePben);
        }

        let payload = checked_payload("PBEN", body, PBEN_CHECKSUM_LEN)?;
        let record = PbenRecord::decode(payload)?;

        let rollover = self.time.update_tow(record.tow);

        if rollover {
            info!("GPS week rollover: now week {}", self.time.week);
        }

        let epoch = GpsTimeState::epoch(self.time.week, record.tow);

        if self.time.latch_first_observation(epoch) {
            info!(
                "{} - first observation ({})",
                self.time.utc_time(),
                record.site
            );
        }

        debug!(
            "{} - PBEN site={} pdop={:.2} x={:.3} y={:.3} z={:.3}",
            epoch,
            record.site,
            record.pdop,
            record.position.0,
            record.position.1,
            record.position.2
        );

        let tow = record.tow;

        self.fix = Some(PendingFix {
            identity: GpsTimeState::identity(epoch),
            epoch,
            record,
        });

        self.fix_pending = true;

        Ok(Decoded::Pben { tow, rollover })
    }

    /// Readiness check, once per processed frame.
    fn transition<S: EpochSink>(&mut self, sink: &mut S) -> bool {
        if self.state == SyncState::AwaitingEpoch && self.buffer.is_full() {
            self.state = SyncState::EpochReady;
        }

        if self.state != SyncState::EpochReady || !self.fix_pending {
            return false;
        }

        // a pending fix is evaluated only once
        self.fix_pending = false;

        let fix = match self.fix.as_ref() {
            Some(fix) => fix,
            None => return false,
        };

        if fix.identity != self.buffer.identity() {
            self.counters.mismatches += 1;
            debug!(
                "epoch mismatch: satellites {} fix {}",
                self.buffer.identity(),
                fix.identity
            );
            return false;
        }

        let epoch = ObsEpoch {
            epoch: fix.epoch,
            identity: fix.identity.clone(),
            satellites: self.buffer.satellites().copied().collect(),
            fix: fix.record.clone(),
        };

        debug!("{} - epoch ready ({} satellites)", epoch.epoch, epoch.satellites.len());

        let emitted = sink.emit(epoch);

        if emitted {
            self.counters.epochs += 1;
        }

        self.buffer.clear();
        self.state = SyncState::AwaitingEpoch;
        emitted
    }

    /// Consumes `device` until it is exhausted, an I/O error occurs or
    /// `shutdown` is raised. The epoch in progress is discarded on exit,
    /// I/O errors included.
    pub fn run<S: EpochSink>(
        &mut self,
        device: &mut Device,
        sink: &mut S,
        shutdown: &watch::Receiver<bool>,
    ) -> std::io::Result<()> {
        let result = loop {
            if *shutdown.borrow() {
                info!("{} - shutdown requested", self.time.current_epoch());
                break Ok(());
            }

            match device.read_frame(DELIMITER) {
                Ok(Some(frame)) => {
                    if self.process_frame(&frame, sink) {
                        trace!("{} - epoch handed off", self.time.current_epoch());
                    }
                },
                Ok(None) => {
                    if device.is_exhausted() {
                        info!("{} - consumed all content", self.time.current_epoch());
                        break Ok(());
                    }
                },
                Err(e) => {
                    error!("{} - read error: {}", self.time.current_epoch(), e);
                    break Err(e);
                },
            }
        };

        if !self.buffer.is_empty() {
            debug!("discarding partial epoch ({} satellites)", self.buffer.len());
            self.buffer.clear();
            self.state = SyncState::AwaitingEpoch;
        }

        info!("{}", self.counters);
        result
    }
}

/// Raises the shutdown flag. A session that already ended
/// (every receiver dropped) is not an error worth aborting for.
pub fn request_shutdown(shutdown: &watch::Sender<bool>) {
    if let Err(e) = shutdown.send(true) {
        warn!("shutdown request not delivered: {}", e);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::message::{
        fixtures::{frame, with_checksum},
        mben::fixtures::raw_mben,
        pben::fixtures::pben,
    };

    use crate::device::{Interface, test::Hiccup};

    use std::io::{Cursor, ErrorKind, Read};

    const WEEK: u32 = 2100;

    fn mben_frame(seq: u16, left: u8, prn: u8) -> Vec<u8> {
        let payload = raw_mben(seq, left, prn).encode();
        frame("MPC", &with_checksum(&payload, MBEN_CHECKSUM_LEN))
    }

    fn pben_frame(tow: f64) -> Vec<u8> {
        let payload = pben(tow).encode();
        frame("PBN", &with_checksum(&payload, PBEN_CHECKSUM_LEN))
    }

    #[test]
    fn partial_epoch() {
        let mut session = Session::new(WEEK);
        let mut sink = Vec::<ObsEpoch>::new();

        assert!(!session.process_frame(&mben_frame(2000, 3, 12), &mut sink));

        assert!(!session.buffer().is_full());
        assert_eq!(session.buffer().prns(), vec![12]);
        assert_eq!(session.state(), SyncState::AwaitingEpoch);
        assert_eq!(session.counters().mben, 1);
    }

    #[test]
    fn last_block_fills_buffer() {
        let mut session = Session::new(WEEK);
        let mut sink = Vec::<ObsEpoch>::new();

        // whatever was received before
        session.process_frame(&mben_frame(2000, 0, 3), &mut sink);

        assert!(session.buffer().is_full());
        assert_eq!(session.buffer().len(), 1);
        assert_eq!(session.state(), SyncState::EpochReady);
        assert!(sink.is_empty());
    }

    #[test]
    fn same_prn_replaces_slot() {
        let mut session = Session::new(WEEK);
        let mut sink = Vec::<ObsEpoch>::new();

        session.process_frame(&mben_frame(2000, 2, 5), &mut sink);
        session.process_frame(&mben_frame(2000, 1, 5), &mut sink);

        assert_eq!(session.buffer().len(), 1);
        assert_eq!(session.buffer().slot(5).unwrap().record.left, 1);
    }

    #[test]
    fn end_to_end() {
        let mut session = Session::new(WEEK);
        let mut sink = Vec::<ObsEpoch>::new();

        assert!(!session.process_frame(&mben_frame(2000, 2, 5), &mut sink));
        assert!(!session.process_frame(&mben_frame(2000, 0, 5), &mut sink));
        assert!(session.process_frame(&pben_frame(100.0), &mut sink));

        assert_eq!(sink.len(), 1);

        let epoch = &sink[0];
        assert_eq!(epoch.epoch, GpsTimeState::epoch(WEEK, 100.0));
        assert_eq!(epoch.satellites.len(), 1);
        assert_eq!(epoch.satellites[0].record.prn(), 5);
        assert_eq!(epoch.fix, pben(100.0));

        assert!(session.buffer().is_empty());
        assert!(!session.buffer().is_full());
        assert!(!session.is_fix_pending());
        assert_eq!(session.state(), SyncState::AwaitingEpoch);
        assert_eq!(session.counters().epochs, 1);
    }

    #[test]
    fn mismatching_fix_is_dropped() {
        let mut session = Session::new(WEEK);
        let mut sink = Vec::<ObsEpoch>::new();

        session.process_frame(&mben_frame(2000, 1, 5), &mut sink);
        session.process_frame(&mben_frame(2000, 0, 9), &mut sink);

        let identity = session.buffer().identity().to_string();

        // fix of the next epoch
        assert!(!session.process_frame(&pben_frame(130.0), &mut sink));

        assert!(sink.is_empty());
        assert!(!session.is_fix_pending());
        assert!(session.buffer().is_full());
        assert_eq!(session.buffer().prns(), vec![5, 9]);
        assert_eq!(session.buffer().identity(), identity);
        assert_eq!(session.counters().mismatches, 1);
    }

    #[test]
    fn early_fix_waits_for_last_block() {
        let mut session = Session::new(WEEK);
        let mut sink = Vec::<ObsEpoch>::new();

        session.process_frame(&mben_frame(2000, 1, 5), &mut sink);
        session.process_frame(&pben_frame(100.0), &mut sink);

        assert!(session.is_fix_pending());
        assert!(sink.is_empty());

        assert!(session.process_frame(&mben_frame(2000, 0, 9), &mut sink));
        assert_eq!(sink.len(), 1);
        assert_eq!(sink[0].satellites.len(), 2);
    }

    #[test]
    fn fix_is_evaluated_once() {
        let mut session = Session::new(WEEK);
        let mut sink = Vec::<ObsEpoch>::new();

        session.process_frame(&mben_frame(2000, 0, 5), &mut sink);
        session.process_frame(&pben_frame(130.0), &mut sink);

        // epoch redated by the latest block: fix is no longer pending
        session.process_frame(&mben_frame(2600, 0, 5), &mut sink);
        assert!(sink.is_empty());

        session.process_frame(&pben_frame(130.0), &mut sink);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn prn_boundaries() {
        let mut session = Session::new(WEEK);

        for prn in [0, 32] {
            let payload = with_checksum(&raw_mben(2000, 1, prn).encode(), MBEN_CHECKSUM_LEN);
            assert_eq!(
                session.dispatch(&frame("MPC", &payload)),
                Ok(Decoded::OutOfRangePrn(prn))
            );
        }

        assert!(session.buffer().is_empty());

        for prn in [1, 31] {
            let payload = with_checksum(&raw_mben(2000, 1, prn).encode(), MBEN_CHECKSUM_LEN);
            assert_eq!(
                session.dispatch(&frame("MPC", &payload)),
                Ok(Decoded::Mben { prn, left: 1 })
            );
        }

        assert_eq!(session.buffer().prns(), vec![1, 31]);
    }

    #[test]
    fn widened_prn_range() {
        let mut session = Session::new(WEEK).with_prn_range(1..40);
        let payload = with_checksum(&raw_mben(2000, 1, 32).encode(), MBEN_CHECKSUM_LEN);

        assert_eq!(
            session.dispatch(&frame("MPC", &payload)),
            Ok(Decoded::Mben { prn: 32, left: 1 })
        );

        let payload = with_checksum(&raw_mben(2000, 1, 33).encode(), MBEN_CHECKSUM_LEN);
        assert_eq!(
            session.dispatch(&frame("MPC", &payload)),
            Ok(Decoded::OutOfRangePrn(33))
        );
    }

    #[test]
    fn checksum_failure_mutates_nothing() {
        let mut session = Session::new(WEEK);
        let mut sink = Vec::<ObsEpoch>::new();

        session.process_frame(&mben_frame(2000, 1, 5), &mut sink);
        session.process_frame(&pben_frame(100.0), &mut sink);

        let buffer = session.buffer().clone();
        let time = session.time().clone();

        let mut corrupt = with_checksum(&raw_mben(2020, 0, 7).encode(), MBEN_CHECKSUM_LEN);
        corrupt[10] ^= 0x20;

        assert!(matches!(
            session.dispatch(&frame("MPC", &corrupt)),
            Err(Error::Decoding(DecodingError::Checksum { .. }))
        ));

        assert_eq!(session.buffer().prns(), buffer.prns());
        assert_eq!(session.buffer().identity(), buffer.identity());
        assert_eq!(session.buffer().is_full(), buffer.is_full());
        assert_eq!(session.time(), &time);

        session.process_frame(&frame("MPC", &corrupt), &mut sink);
        assert_eq!(session.counters().checksum_errors, 1);
    }

    #[test]
    fn corrupted_records() {
        let mut session = Session::new(WEEK);
        let mut sink = Vec::<ObsEpoch>::new();

        let payload = raw_mben(2000, 0, 5).encode();
        let short = with_checksum(&payload[..80], MBEN_CHECKSUM_LEN);

        session.process_frame(&frame("MPC", &short), &mut sink);

        assert!(session.buffer().is_empty());
        assert_eq!(session.counters().corrupted, 1);
    }

    #[test]
    fn premature_pben() {
        let mut session = Session::new(WEEK);

        assert_eq!(
            session.dispatch(&pben_frame(100.0)),
            Ok(Decoded::PrematurePben)
        );

        // even corrupted
        assert_eq!(
            session.dispatch(&frame("PBN", b"not even close")),
            Ok(Decoded::PrematurePben)
        );

        assert!(!session.is_fix_pending());
        assert!(session.last_fix().is_none());
        assert_eq!(session.time().tow, 0.0);
    }

    #[test]
    fn week_rollover() {
        let mut session = Session::new(WEEK);
        let mut sink = Vec::<ObsEpoch>::new();

        session.process_frame(&mben_frame(0, 1, 5), &mut sink);

        assert_eq!(
            session.dispatch(&pben_frame(604_799.0)),
            Ok(Decoded::Pben {
                tow: 604_799.0,
                rollover: false
            })
        );
        assert_eq!(session.time().week, WEEK);

        assert_eq!(
            session.dispatch(&pben_frame(0.0)),
            Ok(Decoded::Pben {
                tow: 0.0,
                rollover: true
            })
        );
        assert_eq!(session.time().week, WEEK + 1);
        assert_eq!(
            session.last_fix().unwrap().epoch,
            GpsTimeState::epoch(WEEK + 1, 0.0)
        );

        let first = session.time().first_observation().unwrap();
        assert_eq!(first, GpsTimeState::epoch(WEEK, 604_799.0));
    }

    #[test]
    fn ignored_and_unknown_frames() {
        let mut session = Session::new(WEEK);
        let mut sink = Vec::<ObsEpoch>::new();

        session.process_frame(b",SNV,some ephemeris data\r\n$PASHR", &mut sink);
        session.process_frame(b",XYZ,some payload\r\n$PASHR", &mut sink);
        session.process_frame(b",MPC,no trailer here$PASHR", &mut sink);
        session.process_frame(b"$PASHR", &mut sink);

        let counters = session.counters();
        assert_eq!(counters.frames, 4);
        assert_eq!(counters.ignored, 1);
        assert_eq!(counters.unknown, 1);
        assert_eq!(counters.bad_trailers, 1);
        assert!(session.buffer().is_empty());
    }

    #[test]
    fn replay() {
        let mut stream = b"$PASHR,PRT,A,5*1C\r\n$PASHR".to_vec();

        for tow in [100.0, 130.0] {
            let seq = (tow * 20.0) as u16;
            stream.extend(mben_frame(seq, 2, 5));
            stream.extend(mben_frame(seq, 1, 12));
            stream.extend(mben_frame(seq, 0, 24));
            stream.extend(pben_frame(tow));
        }

        // partial epoch
        stream.extend(mben_frame(3200, 1, 5));

        let mut device = Device::new(Interface::from_reader(Cursor::new(stream)));

        let mut session = Session::new(WEEK);
        let mut sink = Vec::<ObsEpoch>::new();
        let (_tx, rx) = watch::channel(false);

        session.run(&mut device, &mut sink, &rx).unwrap();

        assert_eq!(sink.len(), 2);
        assert_eq!(sink[0].epoch, GpsTimeState::epoch(WEEK, 100.0));
        assert_eq!(sink[1].epoch, GpsTimeState::epoch(WEEK, 130.0));

        for epoch in sink.iter() {
            let prns = epoch
                .satellites
                .iter()
                .map(|slot| slot.record.prn())
                .collect::<Vec<_>>();
            assert_eq!(prns, vec![5, 12, 24]);
        }

        assert!(session.buffer().is_empty());
        assert_eq!(session.counters().epochs, 2);
    }

    #[test]
    fn shutdown() {
        let mut stream = Vec::new();
        stream.extend(mben_frame(2000, 0, 5));
        stream.extend(pben_frame(100.0));

        let mut device = Device::new(Interface::from_reader(Cursor::new(stream)));

        let mut session = Session::new(WEEK);
        let mut sink = Vec::<ObsEpoch>::new();

        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        session.run(&mut device, &mut sink, &rx).unwrap();

        assert!(sink.is_empty());
        assert_eq!(session.counters().frames, 0);
    }

    #[test]
    fn timeouts_do_not_end_replay() {
        let mut stream = Vec::new();
        stream.extend(mben_frame(2000, 1, 5));
        stream.extend(mben_frame(2000, 0, 12));
        stream.extend(pben_frame(100.0));

        let mut device = Device::new(Interface::from_reader(Hiccup::new(
            ErrorKind::TimedOut,
            &stream,
        )));

        let mut session = Session::new(WEEK);
        let mut sink = Vec::<ObsEpoch>::new();
        let (_tx, rx) = watch::channel(false);

        session.run(&mut device, &mut sink, &rx).unwrap();

        assert_eq!(sink.len(), 1);
        assert_eq!(sink[0].epoch, GpsTimeState::epoch(WEEK, 100.0));
        assert_eq!(sink[0].satellites.len(), 2);
    }

    /// Serves its content, then fails
    struct Severed(Cursor<Vec<u8>>);

    impl Read for Severed {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.0.read(buf)? {
                0 => Err(std::io::Error::from(ErrorKind::BrokenPipe)),
                size => Ok(size),
            }
        }
    }

    #[test]
    fn read_error_tears_down() {
        let mut stream = Vec::new();
        stream.extend(mben_frame(2000, 1, 5));
        stream.extend(mben_frame(2000, 1, 12));

        let mut device = Device::new(Interface::from_reader(Severed(Cursor::new(stream))));

        let mut session = Session::new(WEEK);
        let mut sink = Vec::<ObsEpoch>::new();
        let (_tx, rx) = watch::channel(false);

        let err = session.run(&mut device, &mut sink, &rx).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BrokenPipe);

        // partial epoch discarded
        assert!(sink.is_empty());
        assert!(session.buffer().is_empty());
        assert_eq!(session.state(), SyncState::AwaitingEpoch);
        assert_eq!(session.counters().mben, 2);
    }

    #[test]
    fn shutdown_requests() {
        let (tx, rx) = watch::channel(false);
        request_shutdown(&tx);
        assert!(*rx.borrow());

        // session already gone
        drop(rx);
        request_shutdown(&tx);
    }
}
