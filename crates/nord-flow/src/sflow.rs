//! Minimal sFlow v5 datagram decoder.
//!
//! Parses the datagram header and per-sample headers; record bodies are
//! carried opaque (the store keeps the whole decode as JSON). Flow
//! protocols are lossy by design — anything malformed is an error the
//! listener drops.

use serde::Serialize;
use std::net::{Ipv4Addr, Ipv6Addr};

const SFLOW_VERSION: u32 = 5;
/// Sanity bound; real datagrams carry a handful of samples.
const MAX_SAMPLES: u32 = 256;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("datagram truncated at byte {0}")]
    Truncated(usize),
    #[error("unsupported sFlow version {0}")]
    BadVersion(u32),
    #[error("unsupported agent address type {0}")]
    BadAddressType(u32),
    #[error("implausible sample count {0}")]
    BadSampleCount(u32),
}

#[derive(Debug, Serialize)]
pub struct Datagram {
    pub version: u32,
    pub agent_address: String,
    pub sub_agent_id: u32,
    pub sequence_number: u32,
    /// Agent uptime in milliseconds.
    pub uptime: u32,
    pub samples: Vec<Sample>,
}

/// One sample header. `format` is the low 12 bits of the sample type:
/// 1 = flow, 2 = counters, 3 = expanded flow, 4 = expanded counters.
#[derive(Debug, Serialize)]
pub struct Sample {
    pub format: u32,
    pub sequence_number: u32,
    pub source_id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_pool: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drops: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<u32>,
    pub records: u32,
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.pos + n > self.buf.len() {
            return Err(DecodeError::Truncated(self.pos));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }
}

pub fn decode(buf: &[u8]) -> Result<Datagram, DecodeError> {
    let mut r = Reader::new(buf);

    let version = r.u32()?;
    if version != SFLOW_VERSION {
        return Err(DecodeError::BadVersion(version));
    }

    let agent_address = match r.u32()? {
        1 => {
            let b = r.take(4)?;
            Ipv4Addr::new(b[0], b[1], b[2], b[3]).to_string()
        }
        2 => {
            let b = r.take(16)?;
            let mut octets = [0u8; 16];
            octets.copy_from_slice(b);
            Ipv6Addr::from(octets).to_string()
        }
        other => return Err(DecodeError::BadAddressType(other)),
    };

    let sub_agent_id = r.u32()?;
    let sequence_number = r.u32()?;
    let uptime = r.u32()?;

    let sample_count = r.u32()?;
    if sample_count > MAX_SAMPLES {
        return Err(DecodeError::BadSampleCount(sample_count));
    }

    let mut samples = Vec::with_capacity(sample_count as usize);
    for _ in 0..sample_count {
        let sample_type = r.u32()?;
        let length = r.u32()? as usize;
        let body = r.take(length)?;

        let format = sample_type & 0xfff;
        let mut body = Reader::new(body);
        match format {
            // Flow sample: full sampling header before the records.
            1 => samples.push(Sample {
                format,
                sequence_number: body.u32()?,
                source_id: body.u32()?,
                sampling_rate: Some(body.u32()?),
                sample_pool: Some(body.u32()?),
                drops: Some(body.u32()?),
                input: Some(body.u32()?),
                output: Some(body.u32()?),
                records: body.u32()?,
            }),
            // Counter sample: just sequence, source, record count.
            2 => samples.push(Sample {
                format,
                sequence_number: body.u32()?,
                source_id: body.u32()?,
                sampling_rate: None,
                sample_pool: None,
                drops: None,
                input: None,
                output: None,
                records: body.u32()?,
            }),
            // Expanded and enterprise formats: header only.
            _ => samples.push(Sample {
                format,
                sequence_number: body.u32().unwrap_or(0),
                source_id: 0,
                sampling_rate: None,
                sample_pool: None,
                drops: None,
                input: None,
                output: None,
                records: 0,
            }),
        }
    }

    Ok(Datagram {
        version,
        agent_address,
        sub_agent_id,
        sequence_number,
        uptime,
        samples,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_u32(buf: &mut Vec<u8>, v: u32) {
        buf.extend_from_slice(&v.to_be_bytes());
    }

    fn header(buf: &mut Vec<u8>, samples: u32) {
        push_u32(buf, 5); // version
        push_u32(buf, 1); // ipv4 agent address
        buf.extend_from_slice(&[192, 0, 2, 9]);
        push_u32(buf, 0); // sub agent
        push_u32(buf, 42); // sequence
        push_u32(buf, 123_456); // uptime
        push_u32(buf, samples);
    }

    #[test]
    fn decodes_flow_sample_header() {
        let mut body = Vec::new();
        push_u32(&mut body, 7); // sequence
        push_u32(&mut body, 1); // source id
        push_u32(&mut body, 512); // sampling rate
        push_u32(&mut body, 100_000); // pool
        push_u32(&mut body, 0); // drops
        push_u32(&mut body, 3); // input
        push_u32(&mut body, 5); // output
        push_u32(&mut body, 0); // records

        let mut buf = Vec::new();
        header(&mut buf, 1);
        push_u32(&mut buf, 1); // sample type: flow
        push_u32(&mut buf, body.len() as u32);
        buf.extend_from_slice(&body);

        let datagram = decode(&buf).unwrap();
        assert_eq!(datagram.agent_address, "192.0.2.9");
        assert_eq!(datagram.sequence_number, 42);
        assert_eq!(datagram.samples.len(), 1);

        let sample = &datagram.samples[0];
        assert_eq!(sample.format, 1);
        assert_eq!(sample.sampling_rate, Some(512));
        assert_eq!(sample.input, Some(3));
    }

    #[test]
    fn decodes_counter_sample_header() {
        let mut body = Vec::new();
        push_u32(&mut body, 9);
        push_u32(&mut body, 2);
        push_u32(&mut body, 4); // records

        let mut buf = Vec::new();
        header(&mut buf, 1);
        push_u32(&mut buf, 2); // counter sample
        push_u32(&mut buf, body.len() as u32);
        buf.extend_from_slice(&body);

        let datagram = decode(&buf).unwrap();
        assert_eq!(datagram.samples[0].format, 2);
        assert_eq!(datagram.samples[0].records, 4);
        assert_eq!(datagram.samples[0].sampling_rate, None);
    }

    #[test]
    fn rejects_wrong_version() {
        let mut buf = Vec::new();
        push_u32(&mut buf, 4);
        assert!(matches!(decode(&buf), Err(DecodeError::BadVersion(4))));
    }

    #[test]
    fn rejects_truncated_datagram() {
        let mut buf = Vec::new();
        header(&mut buf, 1);
        push_u32(&mut buf, 1);
        push_u32(&mut buf, 64); // claims 64 bytes, delivers none
        assert!(matches!(decode(&buf), Err(DecodeError::Truncated(_))));
    }

    #[test]
    fn empty_datagram_has_no_samples() {
        let mut buf = Vec::new();
        header(&mut buf, 0);
        let datagram = decode(&buf).unwrap();
        assert!(datagram.samples.is_empty());
    }
}
