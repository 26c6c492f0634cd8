//! PBEN: position, velocity and time solution (`$PASHR,PBN`).
//!
//! Big endian layout, 54 bytes followed by a 16-bit word sum checksum:
//! time of week (i32, ms), site (4 ASCII bytes), ECEF position (3 x f64, m),
//! clock offset (f32, m), ECEF velocity (3 x f32, m/s), clock drift (f32, m/s),
//! PDOP (u16, 1E-2).
use serde::Serialize;

use crate::message::{DecodingError, be_f32, be_f64, be_i32, be_u16};

/// Payload length, checksum excluded
pub const PBEN_PAYLOAD_LEN: usize = 54;

/// Checksum length
pub const PBEN_CHECKSUM_LEN: usize = 2;

/// Decoded and scaled PBEN
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct PbenRecord {
    /// GPS time of week (s)
    pub tow: f64,
    /// Site label
    pub site: String,
    /// ECEF position (m)
    pub position: (f64, f64, f64),
    /// ECEF velocity (m/s)
    pub velocity: (f64, f64, f64),
    /// Receiver clock offset (m)
    pub clock_offset: f64,
    /// Receiver clock drift (m/s)
    pub clock_drift: f64,
    /// Position dilution of precision
    pub pdop: f64,
}

impl PbenRecord {
    /// Decodes a checksum free payload
    pub fn decode(payload: &[u8]) -> Result<Self, DecodingError> {
        if payload.len() != PBEN_PAYLOAD_LEN {
            return Err(DecodingError::CorruptedRecord {
                message: "PBEN",
                expected: PBEN_PAYLOAD_LEN,
                got: payload.len(),
            });
        }

        let site = String::from_utf8_lossy(&payload[4..8])
            .trim_end_matches(['\0', ' '])
            .to_string();

        Ok(Self {
            tow: be_i32(payload, 0) as f64 / 1000.0,
            site,
            position: (
                be_f64(payload, 8),
                be_f64(payload, 16),
                be_f64(payload, 24),
            ),
            clock_offset: be_f32(payload, 32) as f64,
            velocity: (
                be_f32(payload, 36) as f64,
                be_f32(payload, 40) as f64,
                be_f32(payload, 44) as f64,
            ),
            clock_drift: be_f32(payload, 48) as f64,
            pdop: be_u16(payload, 52) as f64 / 100.0,
        })
    }

    #[cfg(test)]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(PBEN_PAYLOAD_LEN);
        buf.extend_from_slice(&((self.tow * 1000.0).round() as i32).to_be_bytes());

        let mut site = [b' '; 4];
        for (i, b) in self.site.bytes().take(4).enumerate() {
            site[i] = b;
        }
        buf.extend_from_slice(&site);

        for value in [self.position.0, self.position.1, self.position.2] {
            buf.extend_from_slice(&value.to_be_bytes());
        }
        buf.extend_from_slice(&(self.clock_offset as f32).to_be_bytes());
        for value in [self.velocity.0, self.velocity.1, self.velocity.2] {
            buf.extend_from_slice(&(value as f32).to_be_bytes());
        }
        buf.extend_from_slice(&(self.clock_drift as f32).to_be_bytes());
        buf.extend_from_slice(&((self.pdop * 100.0).round() as u16).to_be_bytes());
        buf
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::PbenRecord;

    /// Static receiver, in Dayton (OH)
    pub fn pben(tow: f64) -> PbenRecord {
        PbenRecord {
            tow,
            site: "N8UR".to_string(),
            position: (506_088.25, -4_882_946.5, 4_059_716.75),
            velocity: (0.0, 0.5, -0.25),
            clock_offset: 1234.5,
            clock_drift: -0.125,
            pdop: 1.75,
        }
    }
}

#[cfg(test)]
mod test {
    use super::fixtures::pben;
    use super::*;

    #[test]
    fn pben_decoding() {
        let record = pben(345_600.5);
        let bytes = record.encode();
        assert_eq!(bytes.len(), PBEN_PAYLOAD_LEN);

        let decoded = PbenRecord::decode(&bytes).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(decoded.tow, 345_600.5);
        assert_eq!(decoded.site, "N8UR");
        assert_eq!(decoded.pdop, 1.75);
    }

    #[test]
    fn site_label_padding() {
        let mut record = pben(1.0);
        record.site = "AB".to_string();

        let decoded = PbenRecord::decode(&record.encode()).unwrap();
        assert_eq!(decoded.site, "AB");
    }

    #[test]
    fn corrupted_pben() {
        let bytes = pben(0.0).encode();
        assert_eq!(
            PbenRecord::decode(&bytes[1..]),
            Err(DecodingError::CorruptedRecord {
                message: "PBEN",
                expected: 54,
                got: 53,
            })
        );
        assert!(PbenRecord::decode(&[]).is_err());
    }
}
