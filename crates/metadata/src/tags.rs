use std::collections::BTreeMap;

use common::ContainerType;
use lofty::picture::PictureType;

use crate::picture::{decode_base64, parse_flac_picture};

pub const ALBUM_ARTIST_KEY: &str = "ALBUMARTIST";
pub const DISC_NUMBER_KEY: &str = "DISCNUMBER";
pub const BLOCK_PICTURE_KEY: &str = "METADATA_BLOCK_PICTURE";

const COVER_PRIORITY: [PictureType; 3] = [
    PictureType::CoverFront,
    PictureType::Media,
    PictureType::Other,
];

/// One canonical record per audio file, whatever tag format it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackMetadata {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub album_artist: String,
    pub genre: String,
    pub container: ContainerType,
    pub track_number: u32,
    pub disc_number: u32,
    pub year: u32,
    pub duration_secs: u32,
    pub bitrate_kbps: u32,
    pub cover: Vec<u8>,
}

/// Property names are stored uppercase; lookups are case-insensitive.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FieldMap {
    fields: BTreeMap<String, Vec<String>>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.fields
            .entry(key.to_ascii_uppercase())
            .or_default()
            .push(value.into());
    }

    pub fn first(&self, key: &str) -> Option<&str> {
        self.fields
            .get(&key.to_ascii_uppercase())
            .and_then(|values| values.first())
            .map(String::as_str)
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for FieldMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = FieldMap::new();
        for (key, value) in iter {
            map.insert(key.as_ref(), value);
        }
        map
    }
}

#[derive(Debug, Default, Clone)]
pub struct GenericTag {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub genre: String,
    pub track: u32,
    pub year: u32,
    pub fields: FieldMap,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AudioProperties {
    pub duration_secs: u32,
    pub bitrate_kbps: u32,
}

#[derive(Debug, Clone)]
pub struct EmbeddedPicture {
    pub kind: PictureType,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub enum FormatTag {
    Id3v2 {
        fields: FieldMap,
        attached_pictures: Vec<Vec<u8>>,
    },
    Vorbis {
        fields: FieldMap,
        pictures: Vec<EmbeddedPicture>,
    },
}

/// Tag data as read from a file, before any precedence is applied.
#[derive(Debug, Clone)]
pub struct RawTags {
    pub container: ContainerType,
    pub generic: GenericTag,
    pub properties: AudioProperties,
    pub specific: Option<FormatTag>,
}

struct FieldOverride {
    key: &'static str,
    apply: fn(&mut TrackMetadata, &str),
}

// Applied in order, generic fields first, then the format-specific ones.
const FIELD_OVERRIDES: [FieldOverride; 2] = [
    FieldOverride {
        key: ALBUM_ARTIST_KEY,
        apply: set_album_artist,
    },
    FieldOverride {
        key: DISC_NUMBER_KEY,
        apply: set_disc_number,
    },
];

fn set_album_artist(draft: &mut TrackMetadata, value: &str) {
    draft.album_artist = value.to_string();
}

fn set_disc_number(draft: &mut TrackMetadata, value: &str) {
    draft.disc_number = parse_number(value);
}

fn apply_field_overrides(draft: &mut TrackMetadata, fields: &FieldMap) {
    for rule in &FIELD_OVERRIDES {
        if let Some(value) = fields.first(rule.key) {
            (rule.apply)(draft, value);
        }
    }
}

pub fn normalize(raw: RawTags) -> TrackMetadata {
    let RawTags {
        container,
        generic,
        properties,
        specific,
    } = raw;

    let mut draft = TrackMetadata {
        title: generic.title,
        album_artist: generic.artist.clone(),
        artist: generic.artist,
        album: generic.album,
        genre: generic.genre,
        container,
        track_number: generic.track,
        disc_number: 0,
        year: generic.year,
        duration_secs: properties.duration_secs,
        bitrate_kbps: properties.bitrate_kbps,
        cover: Vec::new(),
    };
    apply_field_overrides(&mut draft, &generic.fields);

    match (container, specific) {
        (
            ContainerType::Mp3,
            Some(FormatTag::Id3v2 {
                fields,
                attached_pictures,
            }),
        ) => {
            if let Some(first) = attached_pictures.into_iter().next() {
                draft.cover = first;
            }
            apply_field_overrides(&mut draft, &fields);
        }
        (ContainerType::Ogg, Some(FormatTag::Vorbis { fields, pictures })) => {
            apply_field_overrides(&mut draft, &fields);
            draft.cover = resolve_vorbis_cover(&fields, &pictures);
        }
        _ => {}
    }

    draft
}

/// Picture list by type priority, then any picture, then a
/// `METADATA_BLOCK_PICTURE` field, which always has the last word even when
/// it fails to decode.
fn resolve_vorbis_cover(fields: &FieldMap, pictures: &[EmbeddedPicture]) -> Vec<u8> {
    let mut cover = COVER_PRIORITY
        .iter()
        .find_map(|kind| {
            pictures
                .iter()
                .find(|picture| picture.kind == *kind && !picture.data.is_empty())
        })
        .or_else(|| pictures.first())
        .map(|picture| picture.data.clone())
        .unwrap_or_default();

    if let Some(encoded) = fields.first(BLOCK_PICTURE_KEY) {
        let block = decode_base64(encoded);
        cover = parse_flac_picture(&block)
            .map(|picture| picture.data)
            .unwrap_or_default();
    }

    cover
}

/// Leading integer of values such as `"2"` or `"2/3"`; anything else is 0.
pub(crate) fn parse_number(text: &str) -> u32 {
    let head = text.split('/').next().unwrap_or(text).trim();
    let digits: String = head.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}
