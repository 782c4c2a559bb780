use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Weekday};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized publish date: {original:?}")]
pub struct DateParseError {
    pub original: String,
}

/// Layouts in the order they are tried. Numeric-zone forms come before their
/// named-zone twins, and the loose zone-less form is last.
const LAYOUTS: [DateLayout; 6] = [
    DateLayout::Rfc1123Numeric,
    DateLayout::Rfc1123Named,
    DateLayout::Rfc822Numeric,
    DateLayout::Rfc822Named,
    DateLayout::Rfc3339,
    DateLayout::Naive,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DateLayout {
    /// `Mon, 02 Jan 2006 15:04:05 -0700`
    Rfc1123Numeric,
    /// `Mon, 02 Jan 2006 15:04:05 MST`
    Rfc1123Named,
    /// `02 Jan 06 15:04 -0700`
    Rfc822Numeric,
    /// `02 Jan 06 15:04 MST`
    Rfc822Named,
    /// `2006-01-02T15:04:05-07:00`
    Rfc3339,
    /// `2006-01-02 15:04:05`, read as UTC
    Naive,
}

impl DateLayout {
    fn parse(self, value: &str) -> Option<DateTime<FixedOffset>> {
        match self {
            DateLayout::Rfc1123Numeric => {
                let rest = strip_weekday(value)?;
                DateTime::parse_from_str(rest, "%d %b %Y %H:%M:%S %z").ok()
            }
            DateLayout::Rfc1123Named => {
                let rest = strip_weekday(value)?;
                parse_with_named_zone(rest, "%d %b %Y %H:%M:%S")
            }
            DateLayout::Rfc822Numeric => {
                let expanded = expand_two_digit_year(value)?;
                DateTime::parse_from_str(&expanded, "%d %b %Y %H:%M %z").ok()
            }
            DateLayout::Rfc822Named => {
                let expanded = expand_two_digit_year(value)?;
                parse_with_named_zone(&expanded, "%d %b %Y %H:%M")
            }
            DateLayout::Rfc3339 => DateTime::parse_from_rfc3339(value).ok(),
            DateLayout::Naive => NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|naive| naive.and_utc().fixed_offset()),
        }
    }
}

/// Parses a feed item's publish date, keeping the offset it was written with.
pub fn normalize_published(raw: &str) -> Result<DateTime<FixedOffset>, DateParseError> {
    let value = raw.trim();
    LAYOUTS
        .iter()
        .find_map(|layout| layout.parse(value))
        .ok_or_else(|| DateParseError {
            original: raw.to_string(),
        })
}

// The weekday must be a real day name but is not checked against the date;
// plenty of feeds get it wrong.
fn strip_weekday(value: &str) -> Option<&str> {
    let (day, rest) = value.split_once(", ")?;
    day.parse::<Weekday>().ok()?;
    Some(rest)
}

/// Widens the two-digit year of `02 Jan 06 15:04 ...` to four digits.
/// `69` through `99` land in the 1900s, the rest in the 2000s.
fn expand_two_digit_year(value: &str) -> Option<String> {
    let mut fields = value.splitn(4, ' ');
    let (day, month, year, rest) = (fields.next()?, fields.next()?, fields.next()?, fields.next()?);
    if year.len() != 2 || !year.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let century = if year >= "69" { "19" } else { "20" };
    Some(format!("{day} {month} {century}{year} {rest}"))
}

fn parse_with_named_zone(value: &str, layout: &str) -> Option<DateTime<FixedOffset>> {
    let (stamp, zone) = value.rsplit_once(' ')?;
    let offset = named_zone_offset(zone)?;
    let naive = NaiveDateTime::parse_from_str(stamp, layout).ok()?;
    offset.from_local_datetime(&naive).single()
}

fn named_zone_offset(zone: &str) -> Option<FixedOffset> {
    let hours = match zone {
        "UT" | "UTC" | "GMT" | "Z" => 0,
        "EST" => -5,
        "EDT" => -4,
        "CST" => -6,
        "CDT" => -5,
        "MST" => -7,
        "MDT" => -6,
        "PST" => -8,
        "PDT" => -7,
        // unknown abbreviations carry no offset information
        other if (3..=5).contains(&other.len()) && other.bytes().all(|b| b.is_ascii_uppercase()) => 0,
        _ => return None,
    };
    FixedOffset::east_opt(hours * 3600)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(offset_hours: i32, y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(offset_hours * 3600)
            .unwrap()
            .with_ymd_and_hms(y, mo, d, h, mi, s)
            .unwrap()
    }

    #[test]
    fn rfc1123_numeric_and_rfc3339_agree() {
        let expected = at(-7, 2006, 1, 2, 15, 4, 5);
        let rfc1123 = normalize_published("Mon, 02 Jan 2006 15:04:05 -0700").unwrap();
        let iso = normalize_published("2006-01-02T15:04:05-07:00").unwrap();

        assert_eq!(rfc1123, expected);
        assert_eq!(iso, expected);
        assert_eq!(rfc1123.offset(), iso.offset());
    }

    #[test]
    fn rfc1123_named_zones() {
        let gmt = normalize_published("Mon, 02 Jan 2006 22:04:05 GMT").unwrap();
        let mst = normalize_published("Mon, 02 Jan 2006 15:04:05 MST").unwrap();
        let pst = normalize_published("Mon, 02 Jan 2006 14:04:05 PST").unwrap();

        assert_eq!(gmt, at(-7, 2006, 1, 2, 15, 4, 5));
        assert_eq!(mst, gmt);
        assert_eq!(pst, gmt);
        assert_eq!(pst.offset().local_minus_utc(), -8 * 3600);
    }

    #[test]
    fn unknown_zone_abbreviation_is_read_as_zero_offset() {
        let parsed = normalize_published("Mon, 02 Jan 2006 15:04:05 CET").unwrap();
        assert_eq!(parsed, at(0, 2006, 1, 2, 15, 4, 5));
    }

    #[test]
    fn rfc822_variants() {
        let numeric = normalize_published("02 Jan 06 15:04 -0700").unwrap();
        let named = normalize_published("02 Jan 06 22:04 UTC").unwrap();

        assert_eq!(numeric, at(-7, 2006, 1, 2, 15, 4, 0));
        assert_eq!(named, numeric);
    }

    #[test]
    fn two_digit_years_pivot_at_69() {
        let sixty_nine = normalize_published("02 Jan 69 15:04 GMT").unwrap();
        let sixty_eight = normalize_published("02 Jan 68 15:04 +0000").unwrap();
        let ninety_nine = normalize_published("31 Dec 99 23:59 -0500").unwrap();

        assert_eq!(sixty_nine, at(0, 1969, 1, 2, 15, 4, 0));
        assert_eq!(sixty_eight, at(0, 2068, 1, 2, 15, 4, 0));
        assert_eq!(ninety_nine, at(-5, 1999, 12, 31, 23, 59, 0));
    }

    #[test]
    fn rfc822_needs_exactly_two_year_digits() {
        assert!(normalize_published("02 Jan 2006 15:04 -0700").is_err());
        assert!(normalize_published("02 Jan 6 15:04 GMT").is_err());
    }

    #[test]
    fn rfc3339_with_utc_designator_and_fraction() {
        let parsed = normalize_published("2024-03-10T08:30:00.250Z").unwrap();
        assert_eq!(parsed.timestamp_millis(), at(0, 2024, 3, 10, 8, 30, 0).timestamp_millis() + 250);
    }

    #[test]
    fn naive_form_is_utc() {
        let parsed = normalize_published("2006-01-02 22:04:05").unwrap();
        assert_eq!(parsed, at(0, 2006, 1, 2, 22, 4, 5));
    }

    #[test]
    fn weekday_is_not_checked_against_date() {
        let parsed = normalize_published("Fri, 02 Jan 2006 15:04:05 -0700").unwrap();
        assert_eq!(parsed, at(-7, 2006, 1, 2, 15, 4, 5));
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        let parsed = normalize_published("\n   Mon, 02 Jan 2006 15:04:05 -0700  ").unwrap();
        assert_eq!(parsed, at(-7, 2006, 1, 2, 15, 4, 5));
    }

    #[test]
    fn unsupported_strings_fail_with_original_text() {
        for raw in [
            "",
            "yesterday",
            "Mon, 02 Jan 2006",
            "Xyz, 02 Jan 2006 15:04:05 -0700",
            "2006-13-45T99:00:00Z",
            "02/01/2006 15:04:05",
            "Mon, 02 Jan 2006 15:04:05 +0000 extra",
            "Mon, 02 Jan 2006 15:04:05 gmt+1",
        ] {
            let error = normalize_published(raw).expect_err(raw);
            assert_eq!(error.original, raw);
        }
    }
}
