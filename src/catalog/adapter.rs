//! Adapter layer: Convert catalog DTOs to domain models
//!
//! This is the ONLY place where DTO types are converted to domain types.
//! If MusicBrainz or the Cover Art Archive change their response format,
//! only this file and dto.rs need to change.

use super::dto;
use crate::model::ArtworkCandidate;

/// Build candidates for every image listed for a release.
///
/// Catalog order is preserved; ranking happens in the resolver.
pub fn to_candidates(
    release: &dto::Release,
    listing: &dto::CoverArtResponse,
) -> Vec<ArtworkCandidate> {
    let release_artist = build_artist_string(&release.artist_credit)
        .unwrap_or_else(|| "Unknown Artist".to_string());

    listing
        .images
        .iter()
        .filter(|image| !image.image.is_empty())
        .map(|image| ArtworkCandidate {
            id: format!("{}/{}", release.id, image.id),
            source_url: image.image.clone(),
            thumbnail_url: image
                .thumbnails
                .large
                .clone()
                .or_else(|| image.thumbnails.small.clone())
                .or_else(|| image.thumbnails.xlarge.clone()),
            release_id: release.id.clone(),
            release_title: release.title.clone(),
            release_artist: release_artist.clone(),
            release_date: release.date.clone().filter(|d| !d.is_empty()),
            width: None,
            height: None,
            byte_size: None,
            is_front_cover: image.front || image.types.iter().any(|t| t == "Front"),
            is_approved: image.approved,
        })
        .collect()
}

/// Build a combined artist string from artist credits
fn build_artist_string(credits: &[dto::ArtistCredit]) -> Option<String> {
    if credits.is_empty() {
        return None;
    }

    let mut result = String::new();
    for credit in credits {
        // Use credited name if available, otherwise official name
        let name = credit.name.as_ref().unwrap_or(&credit.artist.name);
        result.push_str(name);

        // Add join phrase if present (e.g., " & ", " feat. ")
        if let Some(ref join) = credit.joinphrase {
            result.push_str(join);
        }
    }

    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release(credits: Vec<dto::ArtistCredit>) -> dto::Release {
        dto::Release {
            id: "rel-1".to_string(),
            score: Some(100),
            title: "Abbey Road".to_string(),
            status: Some("Official".to_string()),
            date: Some("1969-09-26".to_string()),
            country: None,
            artist_credit: credits,
        }
    }

    fn credit(name: &str, join: Option<&str>) -> dto::ArtistCredit {
        dto::ArtistCredit {
            artist: dto::Artist {
                id: format!("{name}-id"),
                name: name.to_string(),
            },
            name: None,
            joinphrase: join.map(str::to_string),
        }
    }

    fn image(id: &str, front: bool, types: &[&str]) -> dto::Image {
        dto::Image {
            id: id.to_string(),
            front,
            back: false,
            types: types.iter().map(|t| t.to_string()).collect(),
            image: format!("http://caa.example/{id}.jpg"),
            thumbnails: dto::Thumbnails {
                small: Some(format!("http://caa.example/{id}-250.jpg")),
                large: Some(format!("http://caa.example/{id}-500.jpg")),
                xlarge: None,
            },
            approved: true,
            comment: None,
        }
    }

    #[test]
    fn test_candidates_keep_catalog_order() {
        let listing = dto::CoverArtResponse {
            images: vec![image("1", false, &["Back"]), image("2", true, &["Front"])],
            release: None,
        };
        let candidates = to_candidates(&release(vec![credit("The Beatles", None)]), &listing);

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].id, "rel-1/1");
        assert!(!candidates[0].is_front_cover);
        assert!(candidates[1].is_front_cover);
        assert_eq!(candidates[1].release_artist, "The Beatles");
        assert_eq!(candidates[1].release_date.as_deref(), Some("1969-09-26"));
        assert_eq!(
            candidates[1].thumbnail_url.as_deref(),
            Some("http://caa.example/2-500.jpg")
        );
        assert!(candidates[1].width.is_none());
    }

    #[test]
    fn test_front_type_without_flag_counts_as_front() {
        let listing = dto::CoverArtResponse {
            images: vec![image("1", false, &["Front", "Medium"])],
            release: None,
        };
        let candidates = to_candidates(&release(vec![]), &listing);
        assert!(candidates[0].is_front_cover);
        assert_eq!(candidates[0].release_artist, "Unknown Artist");
    }

    #[test]
    fn test_build_artist_string_joins_credits() {
        let credits = vec![credit("Queen", Some(" & ")), credit("David Bowie", Some(""))];
        assert_eq!(
            build_artist_string(&credits).as_deref(),
            Some("Queen & David Bowie")
        );
        assert!(build_artist_string(&[]).is_none());
    }
}
