//! Wire codec for log packets.
//!
//! The layout: a type byte, the memory id, and for unit-bearing packets two
//! UUID slots (all-zero meaning absent), the length-prefixed UTF-8 language
//! tags and texts, and finally the timestamp as a length-prefixed ASCII
//! decimal of milliseconds since epoch with `0` standing for "no timestamp"
//! (legacy quirk, kept for compatibility with logs written by older nodes).
//!
//! Decoding is strict. An unknown type byte or a truncated buffer poisons
//! position accounting for the whole channel, so it is reported as
//! [`BinaryLogError::MalformedPacket`] and halts the polling worker instead
//! of being skipped.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use crate::error::BinaryLogError;
use crate::model::LanguageDirection;

const TYPE_DELETION: u8 = 0x00;
const TYPE_ADDITION: u8 = 0x01;
const TYPE_OVERWRITE_BY_VALUE: u8 = 0x02;
const TYPE_OVERWRITE_BY_TUID: u8 = 0x03;

/// Fields common to every unit-bearing packet.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitPayload {
    pub direction: LanguageDirection,
    pub owner: Option<Uuid>,
    pub memory: i64,
    pub tuid: Option<Uuid>,
    pub sentence: String,
    pub translation: String,
    pub timestamp: Option<DateTime<Utc>>,
}

/// A wire-level event. Carries no channel or position; the transport assigns
/// those at append time and attaches them when the record is read back.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Deletion {
        memory: i64,
    },
    Addition(UnitPayload),
    OverwriteByValue {
        unit: UnitPayload,
        previous_sentence: String,
        previous_translation: String,
    },
    OverwriteByTuid(UnitPayload),
}

impl Packet {
    pub fn deletion(memory: i64) -> Self {
        Packet::Deletion { memory }
    }

    pub fn addition(unit: UnitPayload) -> Self {
        Packet::Addition(unit)
    }

    pub fn overwrite_by_value(
        unit: UnitPayload,
        previous_sentence: &str,
        previous_translation: &str,
    ) -> Self {
        Packet::OverwriteByValue {
            unit,
            previous_sentence: previous_sentence.to_string(),
            previous_translation: previous_translation.to_string(),
        }
    }

    pub fn overwrite_by_tuid(unit: UnitPayload) -> Self {
        Packet::OverwriteByTuid(unit)
    }

    fn type_byte(&self) -> u8 {
        match self {
            Packet::Deletion { .. } => TYPE_DELETION,
            Packet::Addition(_) => TYPE_ADDITION,
            Packet::OverwriteByValue { .. } => TYPE_OVERWRITE_BY_VALUE,
            Packet::OverwriteByTuid(_) => TYPE_OVERWRITE_BY_TUID,
        }
    }

    pub fn memory(&self) -> i64 {
        match self {
            Packet::Deletion { memory } => *memory,
            Packet::Addition(unit)
            | Packet::OverwriteByValue { unit, .. }
            | Packet::OverwriteByTuid(unit) => unit.memory,
        }
    }

    /// Serialize for appending to the log.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(64);

        buf.put_u8(self.type_byte());
        buf.put_i64(self.memory());

        let unit = match self {
            Packet::Deletion { .. } => return buf.to_vec(),
            Packet::Addition(unit)
            | Packet::OverwriteByValue { unit, .. }
            | Packet::OverwriteByTuid(unit) => unit,
        };

        put_uuid(&mut buf, unit.owner);
        put_uuid(&mut buf, unit.tuid);
        put_string(&mut buf, &unit.direction.source.to_string());
        put_string(&mut buf, &unit.direction.target.to_string());
        put_string(&mut buf, &unit.sentence);
        put_string(&mut buf, &unit.translation);

        if let Packet::OverwriteByValue {
            previous_sentence,
            previous_translation,
            ..
        } = self
        {
            put_string(&mut buf, previous_sentence);
            put_string(&mut buf, previous_translation);
        }

        let millis = unit.timestamp.map(|t| t.timestamp_millis()).unwrap_or(0);
        put_string(&mut buf, &millis.to_string());

        buf.to_vec()
    }

    /// Parse a packet from the bytes read back from the log.
    pub fn decode(payload: &[u8]) -> Result<Packet, BinaryLogError> {
        let mut buf = Bytes::copy_from_slice(payload);

        if buf.remaining() < 9 {
            return Err(malformed("buffer too short for header"));
        }
        let type_byte = buf.get_u8();
        let memory = buf.get_i64();

        if type_byte == TYPE_DELETION {
            return Ok(Packet::Deletion { memory });
        }
        if type_byte > TYPE_OVERWRITE_BY_TUID {
            return Err(malformed(&format!("unknown type: {}", type_byte)));
        }

        let owner = get_uuid(&mut buf)?;
        let tuid = get_uuid(&mut buf)?;

        let source = get_string(&mut buf)?;
        let target = get_string(&mut buf)?;
        let direction = LanguageDirection::parse(&source, &target)
            .map_err(|e| malformed(&e.to_string()))?;

        let sentence = get_string(&mut buf)?;
        let translation = get_string(&mut buf)?;

        let (previous_sentence, previous_translation) = if type_byte == TYPE_OVERWRITE_BY_VALUE {
            (Some(get_string(&mut buf)?), Some(get_string(&mut buf)?))
        } else {
            (None, None)
        };

        let millis: i64 = get_string(&mut buf)?
            .parse()
            .map_err(|_| malformed("invalid timestamp"))?;
        let timestamp = if millis == 0 {
            None
        } else {
            Some(
                Utc.timestamp_millis_opt(millis)
                    .single()
                    .ok_or_else(|| malformed("timestamp out of range"))?,
            )
        };

        let unit = UnitPayload {
            direction,
            owner,
            memory,
            tuid,
            sentence,
            translation,
            timestamp,
        };

        Ok(match type_byte {
            TYPE_ADDITION => Packet::Addition(unit),
            TYPE_OVERWRITE_BY_VALUE => Packet::OverwriteByValue {
                unit,
                // Both are present for this type, checked above.
                previous_sentence: previous_sentence.unwrap_or_default(),
                previous_translation: previous_translation.unwrap_or_default(),
            },
            _ => Packet::OverwriteByTuid(unit),
        })
    }
}

fn malformed(reason: &str) -> BinaryLogError {
    BinaryLogError::MalformedPacket(reason.to_string())
}

fn put_uuid(buf: &mut BytesMut, uuid: Option<Uuid>) {
    let (high, low) = match uuid {
        Some(uuid) => uuid.as_u64_pair(),
        None => (0, 0),
    };
    buf.put_u64(high);
    buf.put_u64(low);
}

fn get_uuid(buf: &mut Bytes) -> Result<Option<Uuid>, BinaryLogError> {
    if buf.remaining() < 16 {
        return Err(malformed("truncated uuid"));
    }
    let high = buf.get_u64();
    let low = buf.get_u64();
    if high == 0 && low == 0 {
        Ok(None)
    } else {
        Ok(Some(Uuid::from_u64_pair(high, low)))
    }
}

fn put_string(buf: &mut BytesMut, value: &str) {
    buf.put_i32(value.len() as i32);
    buf.put_slice(value.as_bytes());
}

fn get_string(buf: &mut Bytes) -> Result<String, BinaryLogError> {
    if buf.remaining() < 4 {
        return Err(malformed("truncated string length"));
    }
    let length = buf.get_i32();
    if length < 0 || buf.remaining() < length as usize {
        return Err(malformed("truncated string payload"));
    }
    let raw = buf.split_to(length as usize);
    String::from_utf8(raw.to_vec()).map_err(|_| malformed("string is not valid utf-8"))
}
