use hifitime::prelude::{Epoch, TimeScale};

/// Week duration, in milliseconds
const WEEK_MS: i64 = 604_800_000;

/// MBEN sequence tags wrap every 30 minutes
const SEQ_PERIOD_MS: i64 = 1_800_000;

/// MBEN sequence tag unit
const SEQ_TICK_MS: i64 = 50;

/// The receiver transmits the week counter modulo 1024
pub const WEEK_ROLLOVER: u32 = 1024;

/// Session GPS time state: anchored by PBEN solutions,
/// used to date MBEN sequence tags.
#[derive(Debug, Clone, PartialEq)]
pub struct GpsTimeState {
    /// Current GPS week
    pub week: u32,

    /// Current time of week (s)
    pub tow: f64,

    /// Previous time of week (s)
    pub last_tow: f64,

    /// First PBEN [Epoch] of this session
    first_observation: Option<Epoch>,
}

impl GpsTimeState {
    pub fn new(week: u32) -> Self {
        Self {
            week,
            tow: 0.0,
            last_tow: 0.0,
            first_observation: None,
        }
    }

    /// Builds a [TimeScale::GPST] [Epoch] from week and time of week (s).
    pub fn epoch(week: u32, tow: f64) -> Epoch {
        let nanos = (tow.max(0.0) * 1000.0).round() as u64 * 1_000_000;
        Epoch::from_time_of_week(week, nanos, TimeScale::GPST)
    }

    /// Identity of an [Epoch]. MBEN and PBEN are paired when their
    /// identities are byte for byte identical.
    pub fn identity(epoch: Epoch) -> String {
        epoch.to_string()
    }

    /// Latest [Epoch] anchored by a PBEN
    pub fn current_epoch(&self) -> Epoch {
        Self::epoch(self.week, self.tow)
    }

    /// Returns current epoch in [TimeScale::UTC]
    pub fn utc_time(&self) -> Epoch {
        self.current_epoch().to_time_scale(TimeScale::UTC)
    }

    /// Dates a sequence tag (50 ms ticks, modulo 30 minutes) using current
    /// time of week as anchor: the closest candidate to the anchor wins.
    pub fn epoch_from_seq(&self, seq: u16) -> Epoch {
        let anchor_ms = (self.tow * 1000.0).round() as i64;
        let seq_ms = (seq as i64 * SEQ_TICK_MS).rem_euclid(SEQ_PERIOD_MS);

        let mut tow_ms = anchor_ms - anchor_ms.rem_euclid(SEQ_PERIOD_MS) + seq_ms;

        if tow_ms - anchor_ms > SEQ_PERIOD_MS / 2 {
            tow_ms -= SEQ_PERIOD_MS;
        } else if anchor_ms - tow_ms > SEQ_PERIOD_MS / 2 {
            tow_ms += SEQ_PERIOD_MS;
        }

        let mut week = self.week;

        if tow_ms < 0 {
            week = week.saturating_sub(1);
            tow_ms += WEEK_MS;
        } else if tow_ms >= WEEK_MS {
            week += 1;
            tow_ms -= WEEK_MS;
        }

        Epoch::from_time_of_week(week, tow_ms as u64 * 1_000_000, TimeScale::GPST)
    }

    /// Latches a new time of week. Returns true when this
    /// triggered a week rollover (time of week went backwards).
    pub fn update_tow(&mut self, tow: f64) -> bool {
        let rollover = tow < self.last_tow;

        if rollover {
            self.week += 1;
        }

        self.tow = tow;
        self.last_tow = tow;
        rollover
    }

    /// Latches the first observation of this session.
    /// Returns true if `epoch` was latched.
    pub fn latch_first_observation(&mut self, epoch: Epoch) -> bool {
        if self.first_observation.is_none() {
            self.first_observation = Some(epoch);
            true
        } else {
            false
        }
    }

    pub fn first_observation(&self) -> Option<Epoch> {
        self.first_observation
    }
}

/// Restores a full week number from the 10 bit counter transmitted
/// by the receiver, picking the candidate closest to `reference_week`
/// (usually derived from the host clock).
pub fn fix_rollover(raw_week: u32, reference_week: u32) -> u32 {
    let raw_week = raw_week % WEEK_ROLLOVER;
    let mut week = reference_week - reference_week % WEEK_ROLLOVER + raw_week;

    if week > reference_week + WEEK_ROLLOVER / 2 && week >= WEEK_ROLLOVER {
        week -= WEEK_ROLLOVER;
    } else if week + WEEK_ROLLOVER / 2 < reference_week {
        week += WEEK_ROLLOVER;
    }

    week
}

/// Week number of a `$PASHR,DAL` almanac sentence (field 13),
/// with or without trailing NMEA checksum.
pub fn parse_dal_week(sentence: &str) -> Option<u32> {
    let sentence = sentence.trim();
    let sentence = sentence.strip_prefix("$PASHR,").unwrap_or(sentence);

    let mut fields = sentence.split(',');

    if fields.next()? != "DAL" {
        return None;
    }

    let week = fields.nth(12)?;
    let week = week.split('*').next()?;
    week.trim().parse::<u32>().ok()
}

/// Week number of a `$PASHR,WKN` response
pub fn parse_wkn_week(response: &str) -> Option<u32> {
    let response = response.trim();
    let response = response.strip_prefix("$PASHR,").unwrap_or(response);

    let mut fields = response.split(',');

    if fields.next()? != "WKN" {
        return None;
    }

    let week = fields.next()?;
    let week = week.split('*').next()?;
    week.trim().parse::<u32>().ok()
}
