use log::{debug, error, info};

use std::io::{BufWriter, Write};

use hifitime::prelude::{Epoch, TimeScale};
use itertools::Itertools;
use serde::Serialize;
use tokio::sync::mpsc::Receiver as Rx;

use crate::{
    collecter::{Message, ObsEpoch, fd::FileDescriptor, settings::Settings},
    message::{mben::Band, pben::PbenRecord},
};

/// One frequency, as released
#[derive(Debug, Serialize)]
struct SignalRecord {
    band: String,
    snr: f64,
    range: f64,
    phase: f64,
    doppler: f64,
    lli: u8,
    phase_lli: u8,
    /// RINEX signal strength digit
    ssi: Option<String>,
}

/// One satellite, as released
#[derive(Debug, Serialize)]
struct SatelliteRecord {
    sv: String,
    elevation: u8,
    azimuth: u16,
    channel: u8,
    signals: Vec<SignalRecord>,
}

/// One epoch, as released: a single JSON line
#[derive(Debug, Serialize)]
struct EpochRecord<'a> {
    epoch: String,
    week: u32,
    tow: f64,
    fix: &'a PbenRecord,
    satellites: Vec<SatelliteRecord>,
}

impl<'a> EpochRecord<'a> {
    fn new(obs: &'a ObsEpoch) -> Self {
        let (week, nanos) = obs.epoch.to_time_scale(TimeScale::GPST).to_time_of_week();

        let satellites = obs
            .satellites
            .iter()
            .sorted_by_key(|slot| slot.record.prn())
            .map(|slot| SatelliteRecord {
                sv: slot.record.sv.to_string(),
                elevation: slot.record.elevation,
                azimuth: slot.record.azimuth,
                channel: slot.record.channel,
                signals: Band::ALL
                    .iter()
                    .map(|band| {
                        let signal = slot.record.signal(*band);
                        let flags = slot.flags.signal(*band);
                        SignalRecord {
                            band: band.to_string(),
                            snr: signal.snr,
                            range: signal.range,
                            phase: signal.phase,
                            doppler: signal.doppler,
                            lli: flags.lli.bits(),
                            phase_lli: flags.phase_lli.bits(),
                            ssi: flags.ssi.map(|snr| format!("{:x}", snr)),
                        }
                    })
                    .collect(),
            })
            .collect();

        Self {
            epoch: obs.identity.clone(),
            week,
            tow: nanos as f64 * 1.0E-9,
            fix: &obs.fix,
            satellites,
        }
    }
}

pub struct Collecter {
    /// [Epoch] of deployment
    deploy_epoch: Option<Epoch>,

    /// [Message]ing handle
    rx: Rx<Message>,

    /// [Settings]
    settings: Settings,

    /// Current [FileDescriptor] handle
    fd: Option<BufWriter<FileDescriptor>>,

    /// Number of released epochs
    released: usize,
}

impl Collecter {
    /// Builds new [Collecter]
    pub fn new(settings: Settings, rx: Rx<Message>) -> Self {
        Self {
            rx,
            settings,
            fd: Default::default(),
            deploy_epoch: Default::default(),
            released: 0,
        }
    }

    pub async fn run(&mut self) {
        while let Some(msg) = self.rx.recv().await {
            match msg {
                Message::Epoch(epoch) => {
                    if self.deploy_epoch.is_none() {
                        if let Err(e) = self.open(&epoch) {
                            error!("{} - failed to create output: {}", epoch.epoch, e);
                            return;
                        }
                    }

                    match self.release_epoch(&epoch) {
                        Ok(_) => {
                            debug!("{} - new epoch released", epoch.epoch);
                        },
                        Err(e) => {
                            error!("{} - failed to release epoch: {}", epoch.epoch, e);
                        },
                    }
                },
                Message::Shutdown => break,
            }
        }

        self.close();
    }

    #[cfg(test)]
    pub fn released(&self) -> usize {
        self.released
    }

    fn open(&mut self, epoch: &ObsEpoch) -> std::io::Result<()> {
        let filename = self.settings.filename(&epoch.fix.site, epoch.epoch);
        let fd = FileDescriptor::new(self.settings.gzip, &filename)?;

        info!("{} - collecting into \"{}\"", epoch.epoch, filename);

        self.deploy_epoch = Some(epoch.epoch);
        self.fd = Some(BufWriter::new(fd));
        Ok(())
    }

    fn release_epoch(&mut self, epoch: &ObsEpoch) -> std::io::Result<()> {
        let fd = match self.fd.as_mut() {
            Some(fd) => fd,
            None => return Ok(()),
        };

        let record = EpochRecord::new(epoch);

        serde_json::to_writer(&mut *fd, &record)?;
        fd.write_all(b"\n")?;

        let _ = fd.flush(); // improves interaction

        self.released += 1;
        Ok(())
    }

    fn close(&mut self) {
        if let Some(fd) = self.fd.take() {
            let result = fd
                .into_inner()
                .map_err(|e| e.into_error())
                .and_then(|fd| fd.finish());

            if let Err(e) = result {
                error!("failed to terminate output: {}", e);
            }
        }

        info!("{} epoch(s) released", self.released);
    }
}
