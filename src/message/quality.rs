//! Unit conversions and signal quality indicators applied to MBEN blocks.
use rinex::prelude::obs::{LliFlags, SNR};

/// Speed of light in km/s
pub const LIGHT_SPEED_KM_S: f64 = 299_792.458;

/// Z-12 SNR register scaling
pub const SNR_SCALE: f64 = 4.0;

/// Doppler is transmitted in 1E-4 Hz
pub const DOPPLER_SCALE: f64 = 10_000.0;

/// RINEX phase fields hold 9 integer digits at most
pub const PHASE_LIMIT: f64 = 1.0E9;

/// Granularity of the integer ambiguity we remove on phase overflow
pub const PHASE_ROLLOVER: f64 = 1.0E8;

/// Largest phase variation, in cycles, between two consecutive
/// observations of one channel that we consider continuous
/// (6 kHz Doppler sustained for 30 minutes is about 1.1E7).
pub const MAX_PHASE_STEP: f64 = 2.0E7;

// warning byte
const WARN_PHASE_QUESTIONABLE: u8 = 0x04;
const WARN_CYCLE_SLIP: u8 = 0x40;
const WARN_LOCK_LOSS: u8 = 0x80;

/// goodbad value once code and/or carrier phase are measured.
/// Lower non null values are acquisition states.
const GOODBAD_MEASURED: u8 = 22;

/// Descales the SNR register
pub fn snr(raw: u8) -> f64 {
    raw as f64 / SNR_SCALE
}

/// Converts raw range (seconds) to meters
pub fn range_m(raw: f64) -> f64 {
    raw * LIGHT_SPEED_KM_S * 1000.0
}

/// Converts raw Doppler to Hz
pub fn doppler_hz(raw: i32) -> f64 {
    raw as f64 / DOPPLER_SCALE
}

/// Derives one [LliFlags] for a frequency, from its warning and goodbad bytes.
pub fn lli(warn: u8, goodbad: u8) -> LliFlags {
    let mut flags = LliFlags::empty();

    if warn & (WARN_LOCK_LOSS | WARN_CYCLE_SLIP) != 0 {
        flags |= LliFlags::LOCK_LOSS;
    }

    if warn & WARN_PHASE_QUESTIONABLE != 0 {
        flags |= LliFlags::HALF_CYCLE_SLIP;
    }

    if goodbad > 0 && goodbad < GOODBAD_MEASURED {
        flags |= LliFlags::LOCK_LOSS;
    }

    flags
}

/// RINEX signal strength indicator, from SNR in dB-Hz.
/// None when the channel reports no signal.
pub fn signal_strength(snr: f64) -> Option<SNR> {
    if snr > 0.0 { Some(SNR::from(snr)) } else { None }
}

/// Carrier phase continuity, tracked per channel (PRN and frequency)
/// for the whole session.
///
/// The Z-12 accumulates phase without bound. Once an observation no longer fits
/// in a RINEX field, an integer number of cycles is removed and kept as the
/// channel offset, which is applied to all following observations until
/// the channel is lost. Every change of that offset is a phase discontinuity
/// and is reported as loss of lock.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct PhaseTracker {
    /// Integer ambiguity removed from raw phase
    offset: f64,
    /// Last raw observation
    last: Option<f64>,
}

impl PhaseTracker {
    /// Corrects `raw` phase and updates `lli` on discontinuities.
    pub fn correct(&mut self, raw: f64, mut lli: LliFlags) -> (f64, LliFlags) {
        if raw == 0.0 || !raw.is_finite() {
            // channel not tracked
            *self = Self::default();
            return (0.0, lli);
        }

        if let Some(last) = self.last {
            if (raw - last).abs() > MAX_PHASE_STEP {
                lli |= LliFlags::LOCK_LOSS;
            }
        }

        let mut phase = raw - self.offset;

        if phase.abs() >= PHASE_LIMIT {
            self.offset = (raw / PHASE_ROLLOVER).round() * PHASE_ROLLOVER;
            phase = raw - self.offset;
            lli |= LliFlags::LOCK_LOSS;
        }

        self.last = Some(raw);
        (phase, lli)
    }

    /// Current ambiguity offset, in cycles
    #[cfg(test)]
    pub fn offset(&self) -> f64 {
        self.offset
    }
}
