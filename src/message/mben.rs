//! MBEN: per satellite measurement block (`$PASHR,MPC`).
//!
//! Big endian layout, 94 bytes followed by a single XOR checksum byte:
//!
//! | offset | size | field                                         |
//! |--------|------|-----------------------------------------------|
//! | 0      | 2    | sequence tag (50 ms, modulo 30 minutes)       |
//! | 2      | 1    | number of MBEN blocks left in this epoch      |
//! | 3      | 1    | PRN                                           |
//! | 4      | 1    | elevation (degrees)                           |
//! | 5      | 1    | azimuth (2 degrees unit)                      |
//! | 6      | 1    | channel                                       |
//! | 7      | 29   | C/A block                                     |
//! | 36     | 29   | L1 (P code) block                             |
//! | 65     | 29   | L2 (P code) block                             |
//!
//! Each block: warning, goodbad, polarity, SNR register, phase quality (1 byte each),
//! full phase (f64, cycles), raw range (f64, seconds), Doppler (i32, 1E-4 Hz),
//! smoothing (i32).
use gnss::prelude::{Constellation, SV};
use rinex::prelude::obs::{LliFlags, SNR};

use crate::message::{
    DecodingError, be_f64, be_i32, be_u16,
    quality::{self, PhaseTracker},
};

/// Payload length, checksum excluded
pub const MBEN_PAYLOAD_LEN: usize = 94;

/// Checksum length
pub const MBEN_CHECKSUM_LEN: usize = 1;

const HEADER_LEN: usize = 7;
const BLOCK_LEN: usize = 29;

/// Frequency (tracking channel) of one MBEN block
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Band {
    /// L1 C/A code
    CA,
    /// L1 P code
    L1,
    /// L2 P code
    L2,
}

impl Band {
    /// All frequencies, in transmission order
    pub const ALL: [Band; 3] = [Band::CA, Band::L1, Band::L2];

    pub fn index(&self) -> usize {
        match self {
            Self::CA => 0,
            Self::L1 => 1,
            Self::L2 => 2,
        }
    }
}

impl std::fmt::Display for Band {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CA => write!(f, "C/A"),
            Self::L1 => write!(f, "L1"),
            Self::L2 => write!(f, "L2"),
        }
    }
}

/// One frequency block, in receiver units
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct RawSignal {
    pub warn: u8,
    pub goodbad: u8,
    pub polarity: u8,
    pub snr: u8,
    pub phase_quality: u8,
    pub phase: f64,
    pub range: f64,
    pub doppler: i32,
    pub smoothing: i32,
}

impl RawSignal {
    fn decode(buf: &[u8]) -> Self {
        Self {
            warn: buf[0],
            goodbad: buf[1],
            polarity: buf[2],
            snr: buf[3],
            phase_quality: buf[4],
            phase: be_f64(buf, 5),
            range: be_f64(buf, 13),
            doppler: be_i32(buf, 21),
            smoothing: be_i32(buf, 25),
        }
    }

    #[cfg(test)]
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&[
            self.warn,
            self.goodbad,
            self.polarity,
            self.snr,
            self.phase_quality,
        ]);
        buf.extend_from_slice(&self.phase.to_be_bytes());
        buf.extend_from_slice(&self.range.to_be_bytes());
        buf.extend_from_slice(&self.doppler.to_be_bytes());
        buf.extend_from_slice(&self.smoothing.to_be_bytes());
    }
}

/// MBEN block, as transmitted
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct RawMben {
    /// Sequence tag: 50 ms ticks, modulo 30 minutes
    pub seq: u16,
    /// Blocks left in this epoch
    pub left: u8,
    pub prn: u8,
    pub elevation: u8,
    /// Azimuth, in 2 degrees unit
    pub azimuth: u8,
    pub channel: u8,
    /// C/A, L1, L2 blocks
    pub signals: [RawSignal; 3],
}

impl RawMben {
    /// Decodes a checksum free payload
    pub fn decode(payload: &[u8]) -> Result<Self, DecodingError> {
        if payload.len() != MBEN_PAYLOAD_LEN {
            return Err(DecodingError::CorruptedRecord {
                message: "MBEN",
                expected: MBEN_PAYLOAD_LEN,
                got: payload.len(),
            });
        }

        let signals = std::array::from_fn(|i| {
            let offset = HEADER_LEN + i * BLOCK_LEN;
            RawSignal::decode(&payload[offset..offset + BLOCK_LEN])
        });

        Ok(Self {
            seq: be_u16(payload, 0),
            left: payload[2],
            prn: payload[3],
            elevation: payload[4],
            azimuth: payload[5],
            channel: payload[6],
            signals,
        })
    }

    #[cfg(test)]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(MBEN_PAYLOAD_LEN);
        buf.extend_from_slice(&self.seq.to_be_bytes());
        buf.extend_from_slice(&[
            self.left,
            self.prn,
            self.elevation,
            self.azimuth,
            self.channel,
        ]);
        for signal in self.signals.iter() {
            signal.encode(&mut buf);
        }
        buf
    }
}

/// One frequency, in physical units
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Signal {
    /// SNR (dB-Hz)
    pub snr: f64,
    /// Pseudo range (m)
    pub range: f64,
    /// Carrier phase (cycles), ambiguity corrected
    pub phase: f64,
    /// Doppler (Hz)
    pub doppler: f64,
    pub warn: u8,
    pub goodbad: u8,
    pub polarity: u8,
    pub phase_quality: u8,
    pub smoothing: i32,
}

/// Quality indicators of one frequency. The LLI is shared by range and Doppler,
/// phase starts from the same value and may gain discontinuities.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalFlags {
    pub lli: LliFlags,
    pub phase_lli: LliFlags,
    /// Signal strength indicator shared by all observables
    pub ssi: Option<SNR>,
}

impl Default for SignalFlags {
    fn default() -> Self {
        Self {
            lli: LliFlags::empty(),
            phase_lli: LliFlags::empty(),
            ssi: None,
        }
    }
}

/// [SignalFlags] for C/A, L1 and L2
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct MbenFlags {
    pub signals: [SignalFlags; 3],
}

impl MbenFlags {
    pub fn signal(&self, band: Band) -> &SignalFlags {
        &self.signals[band.index()]
    }
}

/// MBEN block converted to physical units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MbenRecord {
    pub sv: SV,
    pub seq: u16,
    pub left: u8,
    /// Elevation (degrees)
    pub elevation: u8,
    /// Azimuth (degrees)
    pub azimuth: u16,
    pub channel: u8,
    pub signals: [Signal; 3],
}

impl MbenRecord {
    /// Converts a [RawMben] and derives its [MbenFlags].
    /// `trackers` is the phase continuity state of this PRN, per [Band].
    pub fn from_raw(raw: &RawMben, trackers: &mut [PhaseTracker; 3]) -> (Self, MbenFlags) {
        let mut signals = [Signal::default(); 3];
        let mut flags = MbenFlags::default();

        for band in Band::ALL {
            let i = band.index();
            let rs = &raw.signals[i];

            signals[i] = Signal {
                snr: quality::snr(rs.snr),
                range: quality::range_m(rs.range),
                doppler: quality::doppler_hz(rs.doppler),
                phase: rs.phase,
                warn: rs.warn,
                goodbad: rs.goodbad,
                polarity: rs.polarity,
                phase_quality: rs.phase_quality,
                smoothing: rs.smoothing,
            };

            let lli = quality::lli(rs.warn, rs.goodbad);
            flags.signals[i].lli = lli;
            flags.signals[i].phase_lli = lli;
        }

        for band in Band::ALL {
            let i = band.index();
            let (phase, lli) = trackers[i].correct(signals[i].phase, flags.signals[i].phase_lli);
            signals[i].phase = phase;
            flags.signals[i].phase_lli = lli;
        }

        for band in Band::ALL {
            let i = band.index();
            flags.signals[i].ssi = quality::signal_strength(signals[i].snr);
        }

        let record = Self {
            sv: SV::new(Constellation::GPS, raw.prn),
            seq: raw.seq,
            left: raw.left,
            elevation: raw.elevation,
            azimuth: raw.azimuth as u16 * 2,
            channel: raw.channel,
            signals,
        };

        (record, flags)
    }

    pub fn prn(&self) -> u8 {
        self.sv.prn
    }

    pub fn signal(&self, band: Band) -> &Signal {
        &self.signals[band.index()]
    }

    /// True for the last block of an epoch
    pub fn is_last(&self) -> bool {
        self.left == 0
    }
}


#[cfg(test)]
mod test {
    use super::fixtures::raw_mben;
    use super::*;

    #[test]
    fn mben_decoding() {
        let raw = raw_mben(2000, 4, 12);
        let bytes = raw.encode();
        assert_eq!(bytes.len(), MBEN_PAYLOAD_LEN);

        let decoded = RawMben::decode(&bytes).unwrap();
        assert_eq!(decoded, raw);
        assert_eq!(decoded.seq, 2000);
        assert_eq!(decoded.left, 4);
        assert_eq!(decoded.prn, 12);
        assert_eq!(decoded.signals[2].doppler, 15_584);
    }

    #[test]
    fn corrupted_mben() {
        let bytes = raw_mben(0, 0, 1).encode();

        assert_eq!(
            RawMben::decode(&bytes[..93]),
            Err(DecodingError::CorruptedRecord {
                message: "MBEN",
                expected: 94,
                got: 93,
            })
        );

        let mut longer = bytes.clone();
        longer.push(0);
        assert!(RawMben::decode(&longer).is_err());
    }

    #[test]
    fn mben_conversion() {
        let mut raw = raw_mben(100, 0, 7);
        raw.signals[1].warn = 0x80;

        let mut trackers = [PhaseTracker::default(); 3];
        let (record, flags) = MbenRecord::from_raw(&raw, &mut trackers);

        assert_eq!(record.prn(), 7);
        assert_eq!(record.sv, SV::new(Constellation::GPS, 7));
        assert_eq!(record.azimuth, 120);
        assert!(record.is_last());

        let ca = record.signal(Band::CA);
        assert_eq!(ca.snr, 45.0);
        assert_eq!(ca.doppler, 2.0);
        assert_eq!(ca.phase, 123_456.75);
        assert!((ca.range - 0.072 * 299_792_458.0).abs() < 1.0E-6);

        // one LLI per frequency
        let l1 = flags.signal(Band::L1);
        assert_eq!(l1.lli, LliFlags::LOCK_LOSS);
        assert_eq!(l1.phase_lli, LliFlags::LOCK_LOSS);
        assert_eq!(flags.signal(Band::CA).lli, LliFlags::empty());

        // signal strength from descaled SNR
        assert_eq!(flags.signal(Band::CA).ssi, Some(SNR::DbHz42_47));
        assert_eq!(flags.signal(Band::L1).ssi, Some(SNR::DbHz36_41));
        assert_eq!(flags.signal(Band::L2).ssi, Some(SNR::DbHz30_35));
    }

    #[test]
    fn phase_discontinuity_only_flags_phase() {
        let mut trackers = [PhaseTracker::default(); 3];

        let raw = raw_mben(100, 1, 7);
        let _ = MbenRecord::from_raw(&raw, &mut trackers);

        let mut raw = raw_mben(700, 1, 7);
        raw.signals[2].phase = 5.0E7;

        let (record, flags) = MbenRecord::from_raw(&raw, &mut trackers);
        assert_eq!(record.signal(Band::L2).phase, 5.0E7);

        let l2 = flags.signal(Band::L2);
        assert_eq!(l2.phase_lli, LliFlags::LOCK_LOSS);
        assert_eq!(l2.lli, LliFlags::empty());
        assert_eq!(flags.signal(Band::CA).phase_lli, LliFlags::empty());
    }
}
