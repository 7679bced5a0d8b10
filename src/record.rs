//! Wire format of the current-TSO record.
//!
//! The record published for client discovery is UTF-8 text of the form
//! `<host:port>#<epoch>`: a single `#` separator, no whitespace, no
//! trailing newline. The parser splits on the first `#`; anything else
//! is malformed and, on the promotion path, escalates to the panicker
//! because it means the coordination record is corrupt.

use std::fmt;

use snafu::{OptionExt, Snafu, ensure};

/// Largest epoch the record format admits (signed 64-bit range).
const MAX_EPOCH: u64 = i64::MAX as u64;

/// The coordinates and epoch of the current master TSO.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TsoRecord {
    /// Advertised `host:port` of the master instance.
    pub host_and_port: String,
    /// Epoch of the mastership term that published this record.
    pub epoch: u64,
}

/// Malformed current-TSO record payload.
#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum RecordError {
    /// The payload is not UTF-8 text.
    #[snafu(display("record payload is not valid utf-8"))]
    NotUtf8,
    /// The `#` separator between coordinates and epoch is missing.
    #[snafu(display("record {payload:?} is missing the '#' separator"))]
    MissingSeparator {
        /// The offending payload, lossily decoded.
        payload: String,
    },
    /// Nothing precedes the separator.
    #[snafu(display("record {payload:?} has empty host coordinates"))]
    EmptyHost {
        /// The offending payload.
        payload: String,
    },
    /// The epoch is not a plain decimal in the signed 64-bit range.
    #[snafu(display("record {payload:?} carries a malformed epoch"))]
    BadEpoch {
        /// The offending payload.
        payload: String,
    },
}

impl TsoRecord {
    /// Build a record from parts.
    pub fn new(host_and_port: impl Into<String>, epoch: u64) -> Self {
        Self {
            host_and_port: host_and_port.into(),
            epoch,
        }
    }

    /// Encode to the wire payload.
    pub fn encode(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    /// Parse a wire payload.
    pub fn parse(bytes: &[u8]) -> Result<Self, RecordError> {
        let text = std::str::from_utf8(bytes).ok().context(NotUtf8Snafu)?;
        let (host, epoch_text) = text.split_once('#').context(MissingSeparatorSnafu { payload: text })?;
        ensure!(!host.is_empty(), EmptyHostSnafu { payload: text });

        // Plain decimal only: no sign, no leading '+', nothing after.
        let digits_only = !epoch_text.is_empty() && epoch_text.bytes().all(|b| b.is_ascii_digit());
        ensure!(digits_only, BadEpochSnafu { payload: text });
        let epoch: u64 = epoch_text.parse().ok().context(BadEpochSnafu { payload: text })?;
        ensure!(epoch <= MAX_EPOCH, BadEpochSnafu { payload: text });

        Ok(Self {
            host_and_port: host.to_string(),
            epoch,
        })
    }
}

impl fmt::Display for TsoRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.host_and_port, self.epoch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_wire_form() {
        let record = TsoRecord::new("10.0.0.7:54758", 42);
        let bytes = record.encode();
        assert_eq!(bytes, b"10.0.0.7:54758#42");
        assert_eq!(TsoRecord::parse(&bytes).unwrap(), record);
    }

    #[test]
    fn splits_on_first_separator_only() {
        // A second '#' lands in the epoch field and is rejected there.
        let err = TsoRecord::parse(b"host:1234#7#8").unwrap_err();
        assert!(matches!(err, RecordError::BadEpoch { .. }));
    }

    #[test]
    fn rejects_missing_separator() {
        let err = TsoRecord::parse(b"host:1234 7").unwrap_err();
        assert!(matches!(err, RecordError::MissingSeparator { .. }));
    }

    #[test]
    fn rejects_empty_host() {
        let err = TsoRecord::parse(b"#7").unwrap_err();
        assert!(matches!(err, RecordError::EmptyHost { .. }));
    }

    #[test]
    fn rejects_signed_padded_or_overflowing_epochs() {
        for payload in [
            b"h:1#-7".as_slice(),
            b"h:1#+7",
            b"h:1# 7",
            b"h:1#7\n",
            b"h:1#",
            b"h:1#9223372036854775808", // i64::MAX + 1
        ] {
            assert!(
                matches!(TsoRecord::parse(payload).unwrap_err(), RecordError::BadEpoch { .. }),
                "payload {payload:?} should be rejected"
            );
        }
    }

    #[test]
    fn accepts_epoch_at_signed_boundary() {
        let record = TsoRecord::parse(b"h:1#9223372036854775807").unwrap();
        assert_eq!(record.epoch, i64::MAX as u64);
    }

    #[test]
    fn rejects_non_utf8_payloads() {
        assert_eq!(TsoRecord::parse(&[0xff, 0xfe, b'#', b'1']).unwrap_err(), RecordError::NotUtf8);
    }
}
