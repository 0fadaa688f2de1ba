//! miniSEED 2 data record decoding.
//!
//! Supports the fixed header, blockettes 1000 and 1001, and the encodings
//! FDSN data centres actually serve: INT16, INT32, FLOAT32, FLOAT64, Steim1
//! and Steim2.

use crate::prelude::{PipelineError, StageResult};
use crate::waveform::{SampleRun, StationChannelId};
use crate::window::{shift, Timestamp};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use chrono::{NaiveDate, TimeZone, Utc};

const FIXED_HEADER_LEN: usize = 48;
const DEFAULT_RECORD_LEN: usize = 512;
const STEIM_FRAME_LEN: usize = 64;
const TIME_CORRECTION_APPLIED: u8 = 0x02;

/// One decoded data record.
#[derive(Debug, Clone)]
pub struct MseedRecord {
    pub id: StationChannelId,
    pub start: Timestamp,
    pub sampling_rate: f64,
    pub samples: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Int16,
    Int32,
    Float32,
    Float64,
    Steim1,
    Steim2,
}

impl Encoding {
    fn from_code(code: u8) -> StageResult<Self> {
        match code {
            1 => Ok(Self::Int16),
            3 => Ok(Self::Int32),
            4 => Ok(Self::Float32),
            5 => Ok(Self::Float64),
            10 => Ok(Self::Steim1),
            11 => Ok(Self::Steim2),
            other => Err(PipelineError::Decode(format!(
                "unsupported miniSEED encoding {other}"
            ))),
        }
    }
}

/// Endian-aware view over a byte slice.
#[derive(Clone, Copy)]
struct Words<'a> {
    bytes: &'a [u8],
    big_endian: bool,
}

impl<'a> Words<'a> {
    fn u16(&self, at: usize) -> u16 {
        if self.big_endian {
            BigEndian::read_u16(&self.bytes[at..])
        } else {
            LittleEndian::read_u16(&self.bytes[at..])
        }
    }

    fn i16(&self, at: usize) -> i16 {
        self.u16(at) as i16
    }

    fn i32(&self, at: usize) -> i32 {
        if self.big_endian {
            BigEndian::read_i32(&self.bytes[at..])
        } else {
            LittleEndian::read_i32(&self.bytes[at..])
        }
    }

    fn f32(&self, at: usize) -> f32 {
        if self.big_endian {
            BigEndian::read_f32(&self.bytes[at..])
        } else {
            LittleEndian::read_f32(&self.bytes[at..])
        }
    }

    fn f64(&self, at: usize) -> f64 {
        if self.big_endian {
            BigEndian::read_f64(&self.bytes[at..])
        } else {
            LittleEndian::read_f64(&self.bytes[at..])
        }
    }
}

/// Decodes every data record in a dataselect response body.
pub fn decode_records(bytes: &[u8]) -> StageResult<Vec<MseedRecord>> {
    let mut records = Vec::new();
    let mut offset = 0;
    while offset + FIXED_HEADER_LEN <= bytes.len() {
        let (record, length) = decode_record(&bytes[offset..], offset)?;
        records.extend(record);
        offset += length;
    }
    Ok(records)
}

/// Keeps the records for `id` as sample runs, in the order they were served.
pub fn records_to_runs(records: Vec<MseedRecord>, id: &StationChannelId) -> Vec<SampleRun> {
    records
        .into_iter()
        .filter(|record| &record.id == id)
        .map(|record| SampleRun::new(record.start, record.sampling_rate, record.samples))
        .collect()
}

fn ascii_field(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_string()
}

fn decode_record(bytes: &[u8], offset: usize) -> StageResult<(Option<MseedRecord>, usize)> {
    let quality = bytes[6];
    if !matches!(quality, b'D' | b'R' | b'Q' | b'M') {
        return Err(PipelineError::Decode(format!(
            "record at byte {offset} has no data quality indicator ({:?})",
            quality as char
        )));
    }

    let year_be = BigEndian::read_u16(&bytes[20..]);
    let header = Words {
        bytes,
        big_endian: (1900..=2100).contains(&year_be),
    };

    let id = StationChannelId {
        network: ascii_field(&bytes[18..20]),
        station: ascii_field(&bytes[8..13]),
        location: ascii_field(&bytes[13..15]),
        channel: ascii_field(&bytes[15..18]),
    };
    let start = decode_btime(&header, 20, offset)?;
    let sample_count = header.u16(30) as usize;
    let sampling_rate = sampling_rate(header.i16(32), header.i16(34));
    let activity_flags = bytes[36];
    let time_correction = header.i32(40);
    let data_offset = header.u16(44) as usize;

    let mut encoding = None;
    let mut data_big_endian = header.big_endian;
    let mut record_len = DEFAULT_RECORD_LEN;
    let mut microseconds = 0i8;
    let mut blockette = header.u16(46) as usize;
    while blockette != 0 && blockette + 8 <= bytes.len() {
        let kind = header.u16(blockette);
        let next = header.u16(blockette + 2) as usize;
        match kind {
            1000 => {
                encoding = Some(Encoding::from_code(bytes[blockette + 4])?);
                data_big_endian = bytes[blockette + 5] == 1;
                let exponent = bytes[blockette + 6];
                record_len = 1usize.checked_shl(u32::from(exponent)).ok_or_else(|| {
                    PipelineError::Decode(format!(
                        "record at byte {offset} declares length 2^{exponent}"
                    ))
                })?;
            }
            1001 => microseconds = bytes[blockette + 5] as i8,
            _ => {}
        }
        if next <= blockette {
            break;
        }
        blockette = next;
    }

    if record_len > bytes.len() || record_len < FIXED_HEADER_LEN {
        return Err(PipelineError::Decode(format!(
            "record at byte {offset} declares length {record_len} but {} bytes remain",
            bytes.len()
        )));
    }
    if sample_count == 0 || sampling_rate <= 0.0 {
        return Ok((None, record_len));
    }
    let encoding = encoding.ok_or_else(|| {
        PipelineError::Decode(format!("record at byte {offset} lacks blockette 1000"))
    })?;
    if data_offset < FIXED_HEADER_LEN || data_offset > record_len {
        return Err(PipelineError::Decode(format!(
            "record at byte {offset} has data offset {data_offset} outside the record"
        )));
    }

    let data = Words {
        bytes: &bytes[data_offset..record_len],
        big_endian: data_big_endian,
    };
    let samples = decode_samples(data, encoding, sample_count)?;

    let mut correction = 0.0;
    if activity_flags & TIME_CORRECTION_APPLIED == 0 {
        correction += time_correction as f64 * 1e-4;
    }
    correction += microseconds as f64 * 1e-6;

    let record = MseedRecord {
        id,
        start: shift(start, correction),
        sampling_rate,
        samples,
    };
    Ok((Some(record), record_len))
}

fn decode_btime(header: &Words<'_>, at: usize, offset: usize) -> StageResult<Timestamp> {
    let year = header.u16(at) as i32;
    let day_of_year = header.u16(at + 2) as u32;
    let hour = header.bytes[at + 4] as u32;
    let minute = header.bytes[at + 5] as u32;
    let second = header.bytes[at + 6] as u32;
    let ten_thousandths = header.u16(at + 8) as f64;

    let invalid = || PipelineError::Decode(format!("record at byte {offset} has an invalid start time"));
    // A leap second is carried forward into the next minute.
    let naive = NaiveDate::from_yo_opt(year, day_of_year)
        .and_then(|date| date.and_hms_opt(hour, minute, second.min(59)))
        .ok_or_else(invalid)?;
    let base = Utc.from_utc_datetime(&naive);
    let leap = if second > 59 { 1.0 } else { 0.0 };
    Ok(shift(base, leap + ten_thousandths * 1e-4))
}

fn sampling_rate(factor: i16, multiplier: i16) -> f64 {
    let (f, m) = (factor as f64, multiplier as f64);
    match (factor, multiplier) {
        (0, _) => 0.0,
        (_, 0) => f.abs(),
        (fa, ma) if fa > 0 && ma > 0 => f * m,
        (fa, ma) if fa > 0 && ma < 0 => -f / m,
        (fa, ma) if fa < 0 && ma > 0 => -m / f,
        _ => 1.0 / (f * m),
    }
}

fn decode_samples(data: Words<'_>, encoding: Encoding, count: usize) -> StageResult<Vec<f64>> {
    let width = match encoding {
        Encoding::Int16 => 2,
        Encoding::Int32 | Encoding::Float32 => 4,
        Encoding::Float64 => 8,
        Encoding::Steim1 | Encoding::Steim2 => return decode_steim(data, encoding, count),
    };
    if count * width > data.bytes.len() {
        return Err(PipelineError::Decode(format!(
            "{count} samples of {width} bytes exceed the {} byte data section",
            data.bytes.len()
        )));
    }
    Ok((0..count)
        .map(|index| {
            let at = index * width;
            match encoding {
                Encoding::Int16 => data.i16(at) as f64,
                Encoding::Int32 => data.i32(at) as f64,
                Encoding::Float32 => data.f32(at) as f64,
                _ => data.f64(at),
            }
        })
        .collect())
}

fn sign_extend(value: u32, bits: u32) -> i32 {
    ((value << (32 - bits)) as i32) >> (32 - bits)
}

fn unpack(word: u32, bits: u32, count: u32, differences: &mut Vec<i32>) {
    let mask = (1u32 << bits) - 1;
    for index in 0..count {
        let shift = bits * (count - 1 - index);
        differences.push(sign_extend((word >> shift) & mask, bits));
    }
}

fn decode_steim(data: Words<'_>, encoding: Encoding, count: usize) -> StageResult<Vec<f64>> {
    let frames = data.bytes.len() / STEIM_FRAME_LEN;
    let mut differences: Vec<i32> = Vec::with_capacity(count + 8);
    let mut first_sample = None;
    let mut last_sample = 0;

    'frames: for frame in 0..frames {
        let base = frame * STEIM_FRAME_LEN;
        let control = data.i32(base) as u32;
        for word_index in 1..16 {
            if differences.len() >= count {
                break 'frames;
            }
            let word = data.i32(base + 4 * word_index) as u32;
            if frame == 0 && word_index == 1 {
                first_sample = Some(word as i32);
                continue;
            }
            if frame == 0 && word_index == 2 {
                last_sample = word as i32;
                continue;
            }
            let nibble = (control >> (30 - 2 * word_index)) & 0x3;
            match (encoding, nibble) {
                (_, 0) => {}
                (_, 1) => unpack(word, 8, 4, &mut differences),
                (Encoding::Steim1, 2) => unpack(word, 16, 2, &mut differences),
                (Encoding::Steim1, _) => differences.push(word as i32),
                (_, 2) => match word >> 30 {
                    1 => unpack(word, 30, 1, &mut differences),
                    2 => unpack(word, 15, 2, &mut differences),
                    3 => unpack(word, 10, 3, &mut differences),
                    _ => return Err(steim_error(frame, word_index)),
                },
                _ => match word >> 30 {
                    0 => unpack(word, 6, 5, &mut differences),
                    1 => unpack(word, 5, 6, &mut differences),
                    2 => unpack(word, 4, 7, &mut differences),
                    _ => return Err(steim_error(frame, word_index)),
                },
            }
        }
    }

    let first = first_sample
        .ok_or_else(|| PipelineError::Decode("Steim data section holds no frames".into()))?;
    if differences.len() < count {
        return Err(PipelineError::Decode(format!(
            "Steim data holds {} differences, header declares {count} samples",
            differences.len()
        )));
    }

    // The first difference refers to the previous record and is ignored.
    let mut samples = Vec::with_capacity(count);
    let mut current = first;
    samples.push(current as f64);
    for difference in differences.iter().skip(1).take(count - 1) {
        current = current.wrapping_add(*difference);
        samples.push(current as f64);
    }
    if current != last_sample {
        log::warn!("Steim integration ended at {current}, reverse constant is {last_sample}");
    }
    Ok(samples)
}

fn steim_error(frame: usize, word: usize) -> PipelineError {
    PipelineError::Decode(format!("invalid Steim2 sub-code in frame {frame} word {word}"))
}
