//! Reconciles extracted images with georeferenced link records.
//!
//! Each image is resolved by the first rule that applies:
//!
//! 1. a manual identifier → object number pair;
//! 2. exactly one link whose linked identifier equals the image identifier;
//! 3. a visually recorded page position.
//!
//! Images no rule resolves are reported, never dropped silently.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use nalgebra::Point2;
use tracing::{info, warn};

use crate::georeference::GeoreferencedLinkRecord;
use crate::model::ImageRecord;

/// Which rule produced a match.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MatchMethod {
    Manual,
    Identifier,
    Visual,
}

impl MatchMethod {
    /// Human-readable description stored with each full record.
    pub fn description(&self) -> &'static str {
        match self {
            MatchMethod::Identifier => {
                "String matching on image file identifiers and file identifiers from links"
            }
            MatchMethod::Manual => {
                "Image file identifier and PDF Object ID number pair, from manual_pairs.csv"
            }
            MatchMethod::Visual => {
                "Visually collected PDF coordinates for missing link, from files_without_links.csv"
            }
        }
    }
}

/// Where a matched image gets its location from.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<'a> {
    /// A georeferenced link, found by [`MatchMethod::Manual`] or [`MatchMethod::Identifier`].
    Link {
        record: &'a GeoreferencedLinkRecord,
        method: MatchMethod,
    },
    /// A page position that still has to be georeferenced.
    Visual(Point2<f64>),
}

impl Resolution<'_> {
    pub fn method(&self) -> MatchMethod {
        match self {
            Resolution::Link { method, .. } => *method,
            Resolution::Visual(_) => MatchMethod::Visual,
        }
    }
}

/// Why an image could not be matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnmatchedReason {
    /// No link points at the image.
    NoLink,
    /// Several links point at the image; holds their object numbers.
    Ambiguous(Vec<u32>),
    /// A manual pair names an object number with no link record.
    ManualLinkMissing(u32),
}

impl fmt::Display for UnmatchedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnmatchedReason::NoLink => write!(f, "no link records found"),
            UnmatchedReason::Ambiguous(ids) => {
                write!(f, "more than one link record found (PDF Object ID Numbers {ids:?})")
            }
            UnmatchedReason::ManualLinkMissing(id) => {
                write!(f, "manual pair names PDF Object ID Number {id}, which has no link record")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchedImage<'a> {
    pub image: &'a ImageRecord,
    pub resolution: Resolution<'a>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnmatchedImage<'a> {
    pub image: &'a ImageRecord,
    pub reason: UnmatchedReason,
}

/// Result of matching one batch. Every image lands in exactly one of
/// `matched` or `unmatched`, in input order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MatchOutcome<'a> {
    pub matched: Vec<MatchedImage<'a>>,
    pub unmatched: Vec<UnmatchedImage<'a>>,
    /// Object numbers of links no image was matched to.
    pub unmatched_links: Vec<u32>,
}

impl MatchOutcome<'_> {
    /// `true` if any image failed to match.
    pub fn has_issues(&self) -> bool {
        !self.unmatched.is_empty()
    }
}

/// Matches images against georeferenced links for one index document.
#[derive(Debug, Clone, Default)]
pub struct RecordMatcher {
    manual_pairs: BTreeMap<String, u32>,
    visual_overrides: BTreeMap<String, Point2<f64>>,
}

impl RecordMatcher {
    pub fn new(
        manual_pairs: BTreeMap<String, u32>,
        visual_overrides: BTreeMap<String, Point2<f64>>,
    ) -> Self {
        Self {
            manual_pairs,
            visual_overrides,
        }
    }

    /// Resolves every image and reports what could not be resolved.
    pub fn match_records<'a>(
        &self,
        images: &'a [ImageRecord],
        links: &'a [GeoreferencedLinkRecord],
    ) -> MatchOutcome<'a> {
        info!("matching {} images against {} links", images.len(), links.len());
        let mut outcome = MatchOutcome::default();
        let mut used_links = BTreeSet::new();

        for image in images {
            match self.resolve(image, links) {
                Ok(resolution) => {
                    if let Resolution::Link { record, .. } = &resolution {
                        used_links.insert(record.object_id());
                    }
                    outcome.matched.push(MatchedImage { image, resolution });
                }
                Err(reason) => {
                    warn!("{} for file identifier {}", reason, image.identifier());
                    outcome.unmatched.push(UnmatchedImage { image, reason });
                }
            }
        }

        outcome.unmatched_links = links
            .iter()
            .map(GeoreferencedLinkRecord::object_id)
            .filter(|id| !used_links.contains(id))
            .collect();
        if !outcome.unmatched_links.is_empty() {
            warn!(
                "{} link records were not matched: {:?}",
                outcome.unmatched_links.len(),
                outcome.unmatched_links
            );
        }
        outcome
    }

    fn resolve<'a>(
        &self,
        image: &ImageRecord,
        links: &'a [GeoreferencedLinkRecord],
    ) -> Result<Resolution<'a>, UnmatchedReason> {
        let identifier = image.identifier();

        if let Some(&object_id) = self.manual_pairs.get(&identifier) {
            return links
                .iter()
                .find(|link| link.object_id() == object_id)
                .map(|record| Resolution::Link {
                    record,
                    method: MatchMethod::Manual,
                })
                .ok_or(UnmatchedReason::ManualLinkMissing(object_id));
        }

        let candidates: Vec<&GeoreferencedLinkRecord> = links
            .iter()
            .filter(|link| link.linked_identifier() == identifier)
            .collect();
        if candidates.len() == 1 {
            return Ok(Resolution::Link {
                record: candidates[0],
                method: MatchMethod::Identifier,
            });
        }

        if let Some(position) = self.visual_overrides.get(&identifier) {
            return Ok(Resolution::Visual(*position));
        }

        match candidates.len() {
            0 => Err(UnmatchedReason::NoLink),
            _ => Err(UnmatchedReason::Ambiguous(
                candidates.iter().map(|link| link.object_id()).collect(),
            )),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::georeference::LinkLocation;

    pub(crate) fn image(identifier: &str) -> ImageRecord {
        ImageRecord {
            file_name: format!("{identifier}.pdf"),
            source_path: format!("input/macomb/1961/{identifier}.pdf"),
            width: 100,
            height: 80,
            color_space: "DeviceGray".into(),
            bits_per_component: 8,
            filter: "DCTDecode".into(),
            created_file_name: format!("dte_aerial_{identifier}.jpg"),
        }
    }

    pub(crate) fn link(object_id: u32, identifier: &str) -> GeoreferencedLinkRecord {
        GeoreferencedLinkRecord {
            location: LinkLocation {
                object_id,
                linked_identifier: identifier.into(),
                x: object_id as f64,
                y: 10.0,
            },
            longitude: -83.0 + object_id as f64 / 1000.0,
            latitude: 42.5,
            county: Some("Macomb".into()),
        }
    }

    #[test]
    fn unique_identifier_matches() {
        let images = [image("a"), image("b")];
        let links = [link(1, "a"), link(2, "b"), link(3, "c")];
        let outcome = RecordMatcher::default().match_records(&images, &links);

        assert_eq!(outcome.matched.len(), 2);
        assert!(!outcome.has_issues());
        assert_eq!(outcome.matched[1].resolution.method(), MatchMethod::Identifier);
        assert_eq!(outcome.unmatched_links, vec![3]);
    }

    #[test]
    fn manual_pair_takes_precedence_over_identifier() {
        let images = [image("a")];
        let links = [link(1, "a"), link(2, "a-typo")];
        let manual = BTreeMap::from([("a".to_string(), 2)]);
        let outcome = RecordMatcher::new(manual, BTreeMap::new()).match_records(&images, &links);

        match &outcome.matched[0].resolution {
            Resolution::Link { record, method } => {
                assert_eq!(record.object_id(), 2);
                assert_eq!(*method, MatchMethod::Manual);
            }
            other => panic!("unexpected resolution {other:?}"),
        }
        assert_eq!(outcome.unmatched_links, vec![1]);
    }

    #[test]
    fn manual_pair_to_unknown_link_is_reported() {
        let images = [image("a")];
        let links = [link(1, "a")];
        let manual = BTreeMap::from([("a".to_string(), 99)]);
        let outcome = RecordMatcher::new(manual, BTreeMap::new()).match_records(&images, &links);

        assert!(outcome.matched.is_empty());
        assert_eq!(outcome.unmatched[0].reason, UnmatchedReason::ManualLinkMissing(99));
    }

    #[test]
    fn missing_and_ambiguous_links_are_reported() {
        let images = [image("lonely"), image("twin")];
        let links = [link(5, "twin"), link(6, "twin")];
        let outcome = RecordMatcher::default().match_records(&images, &links);

        assert!(outcome.matched.is_empty());
        assert!(outcome.has_issues());
        assert_eq!(outcome.unmatched[0].reason, UnmatchedReason::NoLink);
        assert_eq!(outcome.unmatched[1].reason, UnmatchedReason::Ambiguous(vec![5, 6]));
        assert_eq!(outcome.unmatched_links, vec![5, 6]);
    }

    #[test]
    fn visual_override_covers_images_without_a_unique_link() {
        let images = [image("lonely"), image("twin"), image("linked")];
        let links = [link(5, "twin"), link(6, "twin"), link(7, "linked")];
        let visual = BTreeMap::from([
            ("lonely".to_string(), Point2::new(10.0, 20.0)),
            ("twin".to_string(), Point2::new(30.0, 40.0)),
            ("linked".to_string(), Point2::new(50.0, 60.0)),
        ]);
        let outcome = RecordMatcher::new(BTreeMap::new(), visual).match_records(&images, &links);

        assert_eq!(outcome.matched.len(), 3);
        assert_eq!(outcome.matched[0].resolution, Resolution::Visual(Point2::new(10.0, 20.0)));
        assert_eq!(outcome.matched[1].resolution, Resolution::Visual(Point2::new(30.0, 40.0)));
        assert_eq!(outcome.matched[2].resolution.method(), MatchMethod::Identifier);
    }

    #[test]
    fn every_image_lands_in_exactly_one_bucket() {
        let names = ["a", "b", "c", "d", "e", "f"];
        let images: Vec<_> = names.iter().map(|n| image(n)).collect();
        let links = [link(1, "a"), link(2, "b"), link(3, "b"), link(4, "x"), link(5, "e")];
        let manual = BTreeMap::from([("c".to_string(), 4), ("f".to_string(), 42)]);
        let visual = BTreeMap::from([("d".to_string(), Point2::new(1.0, 1.0))]);
        let matcher = RecordMatcher::new(manual, visual);

        let first = matcher.match_records(&images, &links);
        let second = matcher.match_records(&images, &links);
        assert_eq!(first, second);

        let mut seen: Vec<&str> = first
            .matched
            .iter()
            .map(|m| m.image.file_name.as_str())
            .chain(first.unmatched.iter().map(|u| u.image.file_name.as_str()))
            .collect();
        seen.sort_unstable();
        let mut expected: Vec<_> = images.iter().map(|i| i.file_name.as_str()).collect();
        expected.sort_unstable();
        assert_eq!(seen, expected);
        assert_eq!(first.matched.len(), 4);
        assert_eq!(first.unmatched.len(), 2);
    }
}
