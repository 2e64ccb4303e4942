use serde::{Deserialize, Serialize};

/// Per-track metadata a provider may know beyond the item's own title/author.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub song: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
}

/// Tags written into the converted file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSet {
    pub song: String,
    pub artist: String,
    pub album: String,
}

fn present(value: Option<&String>) -> Option<String> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty()).map(str::to_string)
}

impl TagSet {
    /// Resolve tags, falling back to the item title for the song, the item author
    /// for the artist, and an empty album.
    pub fn resolve(track: Option<&TrackInfo>, title: &str, author: &str) -> Self {
        let song = track.and_then(|t| present(t.song.as_ref()));
        let artist = track.and_then(|t| present(t.artist.as_ref()));
        let album = track.and_then(|t| present(t.album.as_ref()));
        TagSet {
            song: song.unwrap_or_else(|| title.to_string()),
            artist: artist.unwrap_or_else(|| author.to_string()),
            album: album.unwrap_or_default(),
        }
    }
}
