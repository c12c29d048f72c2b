//! Positional field encoding for songs and events
//!
//! Structured values travel as space-separated fields in a fixed order.
//! There is no escaping: a field containing a space or newline cannot be
//! represented, and [`is_wire_safe`] reports whether a value survives.

use crate::error::{Error, Result};
use crate::models::{Event, Song};

/// Whether `field` can be sent as a single positional field
pub fn is_wire_safe(field: &str) -> bool {
    !field.is_empty() && !field.contains([' ', '\n', '\r'])
}

/// Fail with [`Error::Protocol`] unless `value` is [`is_wire_safe`]
pub fn check_field(what: &str, value: &str) -> Result<()> {
    if is_wire_safe(value) {
        Ok(())
    } else {
        Err(Error::Protocol(format!(
            "{} '{}' must be non-empty without spaces or line breaks",
            what,
            value.escape_debug()
        )))
    }
}

/// Every field of `song` fits its positional slot
pub fn check_song(song: &Song) -> Result<()> {
    check_field("song name", &song.name)?;
    check_field("author", &song.author)?;
    check_field("performer", &song.performer)?;
    if !song.length.is_finite() || song.length < 0.0 {
        return Err(Error::Protocol(format!("length out of range '{}'", song.length)));
    }
    Ok(())
}

/// Every field of `event` fits its positional slot
pub fn check_event(event: &Event) -> Result<()> {
    check_field("event name", &event.name)?;
    check_field("place", &event.place)?;
    check_field("date", &event.date)?;
    check_field("type", &event.kind)?;
    check_field("performer", &event.performer)
}

fn split_fields(line: &str) -> Result<Vec<&str>> {
    let fields: Vec<&str> = line.split(' ').collect();
    if fields.iter().any(|f| f.is_empty()) {
        return Err(Error::Protocol(format!("empty field in '{}'", line)));
    }
    Ok(fields)
}

fn parse_length(field: &str) -> Result<f64> {
    let length: f64 = field
        .parse()
        .map_err(|_| Error::Protocol(format!("invalid length '{}'", field)))?;
    if !length.is_finite() || length < 0.0 {
        return Err(Error::Protocol(format!("length out of range '{}'", field)));
    }
    Ok(length)
}

fn parse_bpm(field: &str) -> Result<u32> {
    field
        .parse()
        .map_err(|_| Error::Protocol(format!("invalid bpm '{}'", field)))
}

/// `name author length bpm` row of a `show_songs` listing
pub fn song_row(song: &Song) -> String {
    format!("{} {} {} {}", song.name, song.author, song.length, song.bpm)
}

/// Parse a listing row; the performer is the one the listing was requested for
pub fn parse_song_row(line: &str, performer: &str) -> Result<Song> {
    match split_fields(line)?.as_slice() {
        [name, author, length, bpm] => Ok(Song::new(
            *name,
            Some(author.to_string()),
            parse_length(length)?,
            parse_bpm(bpm)?,
            performer,
        )),
        other => Err(Error::Protocol(format!(
            "song row needs 4 fields, got {}",
            other.len()
        ))),
    }
}

/// `name author length bpm performer` payload of `add_song`
pub fn song_payload(song: &Song) -> String {
    format!(
        "{} {} {} {} {}",
        song.name, song.author, song.length, song.bpm, song.performer
    )
}

/// Parse an `add_song` payload
///
/// Four fields mean the author was left out: `name length bpm performer`.
pub fn parse_song_payload(line: &str) -> Result<Song> {
    match split_fields(line)?.as_slice() {
        [name, author, length, bpm, performer] => Ok(Song::new(
            *name,
            Some(author.to_string()),
            parse_length(length)?,
            parse_bpm(bpm)?,
            *performer,
        )),
        [name, length, bpm, performer] => Ok(Song::new(
            *name,
            None,
            parse_length(length)?,
            parse_bpm(bpm)?,
            *performer,
        )),
        other => Err(Error::Protocol(format!(
            "song payload needs 5 fields, got {}",
            other.len()
        ))),
    }
}

/// `name place date type` row of a `show_events` listing
pub fn event_row(event: &Event) -> String {
    format!("{} {} {} {}", event.name, event.place, event.date, event.kind)
}

/// Parse a listing row; the performer is the one the listing was requested for
pub fn parse_event_row(line: &str, performer: &str) -> Result<Event> {
    match split_fields(line)?.as_slice() {
        [name, place, date, kind] => Ok(Event::new(
            *name,
            Some(place.to_string()),
            *date,
            *kind,
            performer,
        )),
        other => Err(Error::Protocol(format!(
            "event row needs 4 fields, got {}",
            other.len()
        ))),
    }
}

/// `name place date type performer` payload of `add_event`
pub fn event_payload(event: &Event) -> String {
    format!(
        "{} {} {} {} {}",
        event.name, event.place, event.date, event.kind, event.performer
    )
}

/// Parse an `add_event` payload
///
/// Four fields mean the place was left out: `name date type performer`.
pub fn parse_event_payload(line: &str) -> Result<Event> {
    match split_fields(line)?.as_slice() {
        [name, place, date, kind, performer] => Ok(Event::new(
            *name,
            Some(place.to_string()),
            *date,
            *kind,
            *performer,
        )),
        [name, date, kind, performer] => Ok(Event::new(*name, None, *date, *kind, *performer)),
        other => Err(Error::Protocol(format!(
            "event payload needs 5 fields, got {}",
            other.len()
        ))),
    }
}
