use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use common::ContainerType;
use lofty::file::{AudioFile, TaggedFile, TaggedFileExt};
use lofty::tag::{Accessor, ItemKey, Tag, TagType};
use ogg_pager::Packets;
use tracing::debug;

use crate::tags::{
    normalize, AudioProperties, EmbeddedPicture, FieldMap, FormatTag, GenericTag, RawTags,
    TrackMetadata, ALBUM_ARTIST_KEY, BLOCK_PICTURE_KEY, DISC_NUMBER_KEY,
};

const VORBIS_COMMENT_HEAD: &[u8] = b"\x03vorbis";
const OPUS_COMMENT_HEAD: &[u8] = b"OpusTags";

/// Why a candidate file produced no record. Skips are expected outcomes, not
/// failures of the scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Unreadable(String),
    NoTag,
    NoAudioProperties,
}

impl SkipReason {
    pub fn label(&self) -> &'static str {
        match self {
            SkipReason::Unreadable(_) => "unreadable",
            SkipReason::NoTag => "no_tag",
            SkipReason::NoAudioProperties => "no_audio_properties",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Unreadable(err) => write!(f, "unreadable: {}", err),
            SkipReason::NoTag => write!(f, "no tag present"),
            SkipReason::NoAudioProperties => write!(f, "no audio properties"),
        }
    }
}

pub fn read_track(path: &Path, container: ContainerType) -> Result<TrackMetadata, SkipReason> {
    read_raw_tags(path, container).map(normalize)
}

pub fn read_raw_tags(path: &Path, container: ContainerType) -> Result<RawTags, SkipReason> {
    let tagged_file =
        lofty::read_from_path(path).map_err(|err| SkipReason::Unreadable(err.to_string()))?;
    let tag = tagged_file
        .primary_tag()
        .or_else(|| tagged_file.first_tag())
        .ok_or(SkipReason::NoTag)?;
    let properties = audio_properties(&tagged_file)?;

    let specific = match container {
        ContainerType::Mp3 => tagged_file.tag(TagType::Id3v2).map(|id3| FormatTag::Id3v2 {
            fields: field_map(id3),
            attached_pictures: id3
                .pictures()
                .iter()
                .map(|picture| picture.data().to_vec())
                .collect(),
        }),
        ContainerType::Ogg => tagged_file
            .tag(TagType::VorbisComments)
            .map(|comments| {
                let mut fields = field_map(comments);
                // lofty decodes these into `pictures` and drops the broken
                // ones; keep the raw values so the first field can win.
                for block in raw_block_pictures(path) {
                    fields.insert(BLOCK_PICTURE_KEY, block);
                }
                FormatTag::Vorbis {
                    fields,
                    pictures: comments
                        .pictures()
                        .iter()
                        .map(|picture| EmbeddedPicture {
                            kind: picture.pic_type(),
                            data: picture.data().to_vec(),
                        })
                        .collect(),
                }
            }),
    };

    Ok(RawTags {
        container,
        generic: generic_tag(tag),
        properties,
        specific,
    })
}

fn audio_properties(tagged_file: &TaggedFile) -> Result<AudioProperties, SkipReason> {
    let properties = tagged_file.properties();
    let duration = properties.duration();
    if properties.sample_rate().is_none() && duration.is_zero() {
        return Err(SkipReason::NoAudioProperties);
    }
    let duration_secs = duration.as_secs().min(u64::from(u32::MAX)) as u32;
    let bitrate_kbps = properties
        .audio_bitrate()
        .or(properties.overall_bitrate())
        .unwrap_or(0);
    Ok(AudioProperties {
        duration_secs,
        bitrate_kbps,
    })
}

/// `METADATA_BLOCK_PICTURE` values from the comment header, in file order.
fn raw_block_pictures(path: &Path) -> Vec<String> {
    let packets = File::open(path)
        .map_err(ogg_pager::PageError::from)
        .and_then(|file| Packets::read_count(&mut BufReader::new(file), 2));
    let packets = match packets {
        Ok(packets) => packets,
        Err(err) => {
            debug!("Failed to re-read comment header of {:?}: {}", path, err);
            return Vec::new();
        }
    };
    let Some(packet) = packets.get(1) else {
        return Vec::new();
    };
    let body = if let Some(body) = packet.strip_prefix(VORBIS_COMMENT_HEAD) {
        body
    } else if let Some(body) = packet.strip_prefix(OPUS_COMMENT_HEAD) {
        body
    } else {
        return Vec::new();
    };

    comment_entries(body)
        .into_iter()
        .filter_map(|entry| {
            let (key, value) = entry.split_once('=')?;
            key.eq_ignore_ascii_case(BLOCK_PICTURE_KEY)
                .then(|| value.to_string())
        })
        .collect()
}

/// Splits a comment header body (vendor string, count, length-prefixed
/// `KEY=VALUE` entries, all little-endian) into its entries. Stops at the
/// first truncated entry.
fn comment_entries(body: &[u8]) -> Vec<String> {
    let mut rest = body;
    let mut entries = Vec::new();

    let Some(vendor_len) = take_u32_le(&mut rest) else {
        return entries;
    };
    let Some(tail) = rest.get(vendor_len as usize..) else {
        return entries;
    };
    rest = tail;
    let Some(count) = take_u32_le(&mut rest) else {
        return entries;
    };
    for _ in 0..count {
        let Some(len) = take_u32_le(&mut rest) else {
            break;
        };
        let Some(entry) = rest.get(..len as usize) else {
            break;
        };
        entries.push(String::from_utf8_lossy(entry).into_owned());
        rest = &rest[len as usize..];
    }
    entries
}

fn take_u32_le(rest: &mut &[u8]) -> Option<u32> {
    let head: [u8; 4] = rest.get(..4)?.try_into().ok()?;
    *rest = &rest[4..];
    Some(u32::from_le_bytes(head))
}

fn generic_tag(tag: &Tag) -> GenericTag {
    GenericTag {
        title: text(tag.title()),
        artist: text(tag.artist()),
        album: text(tag.album()),
        genre: text(tag.genre()),
        track: tag.track().unwrap_or(0),
        year: tag
            .get_string(&ItemKey::Year)
            .or_else(|| tag.get_string(&ItemKey::RecordingDate))
            .and_then(parse_year)
            .unwrap_or(0),
        fields: field_map(tag),
    }
}

fn text(value: Option<std::borrow::Cow<'_, str>>) -> String {
    value.map(|v| v.into_owned()).unwrap_or_default()
}

fn field_map(tag: &Tag) -> FieldMap {
    let mut fields = FieldMap::new();
    for item in tag.items() {
        let Some(value) = item.value().text() else {
            continue;
        };
        if let Some(name) = property_name(item.key()) {
            fields.insert(name, value);
        }
    }
    fields
}

fn property_name(key: &ItemKey) -> Option<&str> {
    match key {
        ItemKey::AlbumArtist => Some(ALBUM_ARTIST_KEY),
        ItemKey::DiscNumber => Some(DISC_NUMBER_KEY),
        ItemKey::TrackTitle => Some("TITLE"),
        ItemKey::TrackArtist => Some("ARTIST"),
        ItemKey::AlbumTitle => Some("ALBUM"),
        ItemKey::Genre => Some("GENRE"),
        ItemKey::TrackNumber => Some("TRACKNUMBER"),
        ItemKey::Unknown(name) => Some(name.as_str()),
        _ => None,
    }
}

fn parse_year(text: &str) -> Option<u32> {
    let mut digits = String::new();
    for ch in text.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            if digits.len() == 4 {
                break;
            }
        } else if !digits.is_empty() {
            break;
        }
    }
    digits.parse().ok()
}
