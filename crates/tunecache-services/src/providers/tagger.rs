//! ID3 tagging through `lofty`.

use async_trait::async_trait;
use lofty::config::WriteOptions;
use lofty::picture::{MimeType, Picture, PictureType};
use lofty::prelude::*;
use lofty::tag::Tag;
use std::path::{Path, PathBuf};

use tunecache_core::models::TagSet;

use super::{ProviderError, TaggingService};

#[derive(Debug, Default, Clone, Copy)]
pub struct LoftyTagger;

impl LoftyTagger {
    pub fn new() -> Self {
        Self
    }
}

fn cover_mime(data: &[u8]) -> MimeType {
    if data.starts_with(&[0x89, b'P', b'N', b'G']) {
        MimeType::Png
    } else {
        MimeType::Jpeg
    }
}

fn write_tags(path: &Path, tags: &TagSet, cover: Option<Vec<u8>>) -> Result<(), ProviderError> {
    let mut tagged_file =
        lofty::read_from_path(path).map_err(|e| ProviderError::Tag(e.to_string()))?;

    if tagged_file.primary_tag().is_none() {
        let tag_type = tagged_file.primary_tag_type();
        tagged_file.insert_tag(Tag::new(tag_type));
    }
    let tag = tagged_file
        .primary_tag_mut()
        .ok_or_else(|| ProviderError::Tag("file format does not support tags".to_string()))?;

    tag.set_title(tags.song.clone());
    tag.set_artist(tags.artist.clone());
    if !tags.album.is_empty() {
        tag.set_album(tags.album.clone());
    }

    if let Some(data) = cover {
        tag.remove_picture_type(PictureType::CoverFront);
        let mime = cover_mime(&data);
        tag.push_picture(Picture::new_unchecked(
            PictureType::CoverFront,
            Some(mime),
            Some("Cover".to_string()),
            data,
        ));
    }

    tag.save_to_path(path, WriteOptions::default())
        .map_err(|e| ProviderError::Tag(e.to_string()))
}

#[async_trait]
impl TaggingService for LoftyTagger {
    #[tracing::instrument(skip(self, tags, cover), fields(path = %path.display()))]
    async fn tag(&self, path: &Path, tags: &TagSet, cover: Option<&[u8]>) -> Result<(), ProviderError> {
        let path: PathBuf = path.to_path_buf();
        let tags = tags.clone();
        let cover = cover.map(<[u8]>::to_vec);
        tokio::task::spawn_blocking(move || write_tags(&path, &tags, cover))
            .await
            .map_err(|e| ProviderError::Tag(format!("tagging task panicked: {}", e)))?
    }
}
