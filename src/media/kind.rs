use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    /// Encoded audio samples
    Audio,

    /// Encoded video samples
    Video,
}

impl MediaKind {
    /// FLV tag type carrying this media
    pub fn tag_type(&self) -> u8 {
        match self {
            MediaKind::Audio => super::FLV_TAG_AUDIO,
            MediaKind::Video => super::FLV_TAG_VIDEO,
        }
    }

    fn bit(&self) -> u8 {
        match self {
            MediaKind::Audio => 0b01,
            MediaKind::Video => 0b10,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Audio => write!(f, "audio"),
            MediaKind::Video => write!(f, "video"),
        }
    }
}

/// Set of media kinds a muxer waits for before emitting output.
///
/// Insert-only: attaching a device marks its kind, nothing ever removes one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpectedMedia {
    bits: u8,
}

impl ExpectedMedia {
    /// Empty set
    pub fn new() -> Self {
        ExpectedMedia::default()
    }

    /// Mark a kind as expected. Returns false if it already was.
    pub fn insert(&mut self, kind: MediaKind) -> bool {
        let added = !self.contains(kind);
        self.bits |= kind.bit();
        added
    }

    /// Check membership
    pub fn contains(&self, kind: MediaKind) -> bool {
        self.bits & kind.bit() != 0
    }

    /// Check if nothing is expected
    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// Number of expected kinds
    pub fn len(&self) -> usize {
        self.bits.count_ones() as usize
    }

    /// True once every expected kind is also in `seen`
    pub fn is_satisfied_by(&self, seen: &ExpectedMedia) -> bool {
        self.bits & !seen.bits == 0
    }

    /// Iterate expected kinds, audio first
    pub fn iter(&self) -> impl Iterator<Item = MediaKind> + '_ {
        [MediaKind::Audio, MediaKind::Video]
            .into_iter()
            .filter(move |kind| self.contains(*kind))
    }
}

impl FromIterator<MediaKind> for ExpectedMedia {
    fn from_iter<I: IntoIterator<Item = MediaKind>>(iter: I) -> Self {
        let mut media = ExpectedMedia::new();
        for kind in iter {
            media.insert(kind);
        }
        media
    }
}
