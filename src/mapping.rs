use std::fmt;

use crate::geocode::AddressRecord;

/// Candidate Nominatim address fields for `MWG:Country`, by decreasing
/// priority.
const COUNTRY_FIELDS: &[&str] = &["country", "country_name"];

/// Candidate Nominatim address fields for `MWG:State`, by decreasing
/// priority. For rural areas the county is often the only thing populated,
/// so it sits at the end of the list as a last resort.
///
/// Field selection is based on the OpenCage address-formatting component
/// tables: <https://github.com/OpenCageData/address-formatting>
const STATE_FIELDS: &[&str] = &[
    "state",
    "province",
    "region",
    "island",
    "state_code",
    "state_district",
    "county",
    "county_code",
];

/// Candidate Nominatim address fields for `MWG:City`, by decreasing
/// priority.
const CITY_FIELDS: &[&str] = &[
    "city",
    "town",
    "village",
    "hamlet",
    "locality",
    "neighbourhood",
    "suburb",
    "city_district",
];

/// The metadata tags this tool writes, per the Metadata Working Group tag
/// standard (`MWG:` composite tags fan out to the matching EXIF/IPTC/XMP
/// locations — see the exiftool MWG tag documentation).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Country,
    State,
    City,
    Location,
}

impl Tag {
    /// The exiftool tag name this variant writes to.
    pub fn exiftool_name(&self) -> &'static str {
        match self {
            Tag::Country => "MWG:Country",
            Tag::State => "MWG:State",
            Tag::City => "MWG:City",
            Tag::Location => "MWG:Location",
        }
    }

    fn candidate_fields(&self) -> &'static [&'static str] {
        match self {
            Tag::Country => COUNTRY_FIELDS,
            Tag::State => STATE_FIELDS,
            Tag::City => CITY_FIELDS,
            // Location is derived from display_name, not the address map
            Tag::Location => &[],
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.exiftool_name())
    }
}

/// One tag-value pair destined for a metadata write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagAssignment {
    pub tag: Tag,
    pub value: String,
}

impl TagAssignment {
    fn new(tag: Tag, value: &str) -> Self {
        Self {
            tag,
            value: value.to_string(),
        }
    }

    /// Render as an exiftool command-line argument (`-TAG=VALUE`).
    pub fn to_exiftool_arg(&self) -> String {
        format!("-{}={}", self.tag.exiftool_name(), self.value)
    }
}

/// Map a provider address record to the list of tags to write.
///
/// For each structured tag (Country, State, City) the first populated
/// candidate field wins; empty strings count as absent. The Location tag is
/// the first component of `display_name` (finest-grained first in Nominatim's
/// convention) — except when that component is just the house number, in
/// which case the first two components are joined so we don't emit a bare
/// number as the place name.
///
/// Pure function; a sparse or entirely empty record simply yields fewer
/// assignments.
///
/// # Example
///
/// ```rust
/// use photo_geocoder::geocode::AddressRecord;
/// use photo_geocoder::mapping::{map_address, Tag};
///
/// let mut record = AddressRecord::default();
/// record.display_name = Some("Springfield, Greene County, Missouri".into());
///
/// let tags = map_address(&record);
/// assert_eq!(tags.len(), 1);
/// assert_eq!(tags[0].tag, Tag::Location);
/// assert_eq!(tags[0].value, "Springfield");
/// ```
pub fn map_address(record: &AddressRecord) -> Vec<TagAssignment> {
    let mut assignments = Vec::new();

    for tag in [Tag::Country, Tag::State, Tag::City] {
        let value = tag
            .candidate_fields()
            .iter()
            .filter_map(|field| record.field(field))
            .find(|value| !value.is_empty());
        if let Some(value) = value {
            assignments.push(TagAssignment::new(tag, value));
        }
    }

    if let Some(location) = best_display_location(record) {
        assignments.push(TagAssignment {
            tag: Tag::Location,
            value: location,
        });
    }

    assignments
}

/// Pick the best free-text location from `display_name`.
fn best_display_location(record: &AddressRecord) -> Option<String> {
    let display_name = record.display_name.as_deref()?;
    if display_name.is_empty() {
        return None;
    }

    let components: Vec<&str> = display_name.split(", ").collect();
    let house_number = record.field("house_number");

    match house_number {
        Some(number) if components[0] == number && components.len() > 1 => {
            Some(components[..2].join(", "))
        }
        _ => Some(components[0].to_string()),
    }
}
