//! FFT stream wire protocol.
//!
//! A connection starts with a 2-byte config message, followed by a steady
//! stream of fixed-size data messages carrying one big-endian IEEE-754 f32
//! per frequency band. The receiver answers every fully-read message
//! (config included) with a single acknowledgement byte, so that the ACK
//! packet goes out as quickly as possible and never delays the server's
//! next data message.

use std::time::Duration;

use thiserror::Error;

/// Size of the config message in bytes.
pub const CONFIG_MSG_SIZE: usize = 2;

/// Acknowledgement byte. The value is arbitrary; only its arrival matters.
pub const ACK: u8 = b'1';

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("truncated message: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
}

/// Stream parameters announced by the server. Immutable for the lifetime of
/// a connection; recomputed on reconnect.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct StreamConfig {
    /// FFT sample rate in frames per second.
    pub sample_rate: u8,
    /// Number of frequency bands per frame.
    pub band_count: u8,
}

impl StreamConfig {
    /// Size of each data message in bytes.
    pub fn frame_byte_size(&self) -> usize {
        usize::from(self.band_count) * size_of::<f32>()
    }

    /// Expected interval between two data messages.
    pub fn period(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.sample_rate.max(1)))
    }
}

/// One frame of per-band loudness values, in dBFS.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame(pub Vec<f32>);

impl AudioFrame {
    pub fn bands(&self) -> &[f32] {
        &self.0
    }
}

pub fn decode_config(bytes: &[u8]) -> Result<StreamConfig, ProtocolError> {
    if bytes.len() < CONFIG_MSG_SIZE {
        return Err(ProtocolError::Truncated {
            expected: CONFIG_MSG_SIZE,
            actual: bytes.len(),
        });
    }
    Ok(StreamConfig {
        sample_rate: bytes[0],
        band_count: bytes[1],
    })
}

#[allow(dead_code)]
pub fn encode_config(config: &StreamConfig) -> [u8; CONFIG_MSG_SIZE] {
    [config.sample_rate, config.band_count]
}

/// Decodes a data message. The float values are passed through unvalidated:
/// NaN and infinities reach the caller, which clamps them when mapping to
/// brightness.
pub fn decode_frame(bytes: &[u8], band_count: u8) -> Result<AudioFrame, ProtocolError> {
    let expected = usize::from(band_count) * size_of::<f32>();
    if bytes.len() != expected {
        return Err(ProtocolError::Truncated {
            expected,
            actual: bytes.len(),
        });
    }
    let bands = bytes
        .chunks_exact(size_of::<f32>())
        .map(|chunk| f32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    Ok(AudioFrame(bands))
}

#[allow(dead_code)]
pub fn encode_frame(frame: &AudioFrame) -> Vec<u8> {
    frame
        .bands()
        .iter()
        .flat_map(|band| band.to_be_bytes())
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_decode_config() {
        let config = decode_config(&[20, 9]).unwrap();
        assert_eq!(config.sample_rate, 20);
        assert_eq!(config.band_count, 9);
        assert_eq!(config.period(), Duration::from_millis(50));
        assert_eq!(config.frame_byte_size(), 36);
    }

    #[test]
    fn test_decode_config_truncated() {
        assert!(matches!(
            decode_config(&[20]),
            Err(ProtocolError::Truncated {
                expected: 2,
                actual: 1
            })
        ));
    }

    #[test]
    fn test_frame_round_trip() {
        let bytes: Vec<u8> = [-27.0f32, 0.0, -13.5, f32::NAN, f32::INFINITY]
            .iter()
            .flat_map(|band| band.to_be_bytes())
            .collect();
        let frame = decode_frame(&bytes, 5).unwrap();
        assert_eq!(frame.bands()[0], -27.0);
        assert!(frame.bands()[3].is_nan());
        // re-encoding reproduces the exact wire bytes, NaN payload included
        assert_eq!(encode_frame(&frame), bytes);
    }

    #[test]
    fn test_decode_frame_length_mismatch() {
        assert!(matches!(
            decode_frame(&[0; 35], 9),
            Err(ProtocolError::Truncated {
                expected: 36,
                actual: 35
            })
        ));
        assert!(decode_frame(&[0; 36], 9).is_ok());
    }
}
