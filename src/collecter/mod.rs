use log::error;

use hifitime::prelude::Epoch;
use tokio::sync::mpsc::Sender;

pub mod fd;
pub mod observation;
pub mod settings;

use crate::{message::pben::PbenRecord, session::SatelliteSlot};

/// One synchronized epoch: all satellite blocks and the matching fix
#[derive(Debug, Clone, PartialEq)]
pub struct ObsEpoch {
    /// GPST [Epoch]
    pub epoch: Epoch,
    pub identity: String,
    /// Satellites, by increasing PRN
    pub satellites: Vec<SatelliteSlot>,
    pub fix: PbenRecord,
}

#[derive(Debug)]
pub enum Message {
    /// New [ObsEpoch] to release
    Epoch(ObsEpoch),
    /// Graceful exit
    Shutdown,
}

/// Consumer of synchronized epochs
pub trait EpochSink {
    /// Hands `epoch` off. Returns false when it could not be delivered.
    fn emit(&mut self, epoch: ObsEpoch) -> bool;
}

impl EpochSink for Vec<ObsEpoch> {
    fn emit(&mut self, epoch: ObsEpoch) -> bool {
        self.push(epoch);
        true
    }
}

/// Blocking hand-off to the collecter task.
/// Must not be used from within the async runtime.
impl EpochSink for Sender<Message> {
    fn emit(&mut self, epoch: ObsEpoch) -> bool {
        let t = epoch.epoch;
        match self.blocking_send(Message::Epoch(epoch)) {
            Ok(_) => true,
            Err(e) => {
                error!("{} - failed to release epoch: {}", t, e);
                false
            },
        }
    }
}
