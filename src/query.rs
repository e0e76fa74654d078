use crate::capture_time;
use crate::store::PhotoRecord;
use itertools::Itertools;
use log::warn;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};


/// Order of the photos returned by a query, by capture time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    /// Only `desc` sorts in descending order, any other value falls back to ascending
    pub fn from_param(param: Option<&str>) -> Self {
        match param {
            Some("desc") => SortOrder::Desc,
            _ => SortOrder::Asc,
        }
    }
}


/// Query parameters of the photos API
#[derive(FromForm, Default, Debug, Clone)]
pub struct PhotoQuery {
    pub location: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub sort_order: Option<String>,
}

/// A photo as returned by the photos API : every stored field in stored order, except the
/// internal timestamp
#[derive(Debug, PartialEq)]
pub struct PhotoView<'a>(&'a Map<String, Value>);

impl<'a> PhotoView<'a> {
    pub fn filename(&self) -> Option<&'a str> {
        self.0.get("filename").and_then(Value::as_str)
    }
}

impl<'a> From<&'a PhotoRecord> for PhotoView<'a> {
    fn from(record: &'a PhotoRecord) -> Self {
        Self(record.fields())
    }
}

impl Serialize for PhotoView<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
        where S: Serializer
    {
        let fields = self.0.iter().filter(|(key, _)| key.as_str() != "timestamp");
        let mut map = serializer.serialize_map(None)?;
        for (key, value) in fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl PhotoQuery {

    /// Filter, sort and project the given records. Photos whose location is `unknown_location`
    /// are only matched by a location filter equal to it.
    pub fn apply<'a>(&self, records: &'a [PhotoRecord], unknown_location: &str) -> Vec<PhotoView<'a>> {
        let location = self.location.as_deref().map(|l| l.trim().to_lowercase()).unwrap_or_default();
        let unknown_location = unknown_location.to_lowercase();
        let time_range = self.time_range();

        let descending = self.sort_order() == SortOrder::Desc;
        records.iter()
            .filter(|record| location.is_empty() || matches_location(record, &location, &unknown_location))
            .filter(|record| match time_range {
                Some((start, end)) => match record.timestamp() {
                    Some(ts) => start.map_or(true, |start| ts >= start) && end.map_or(true, |end| ts <= end),
                    None => false,
                },
                None => true,
            })
            .sorted_by(|a, b| {
                let (a, b) = (a.timestamp().unwrap_or(0), b.timestamp().unwrap_or(0));
                if descending { b.cmp(&a) } else { a.cmp(&b) }
            })
            .map(PhotoView::from)
            .collect()
    }

    pub fn sort_order(&self) -> SortOrder {
        SortOrder::from_param(self.sort_order.as_deref())
    }

    /// Parse the time bounds of the query. Returns None when no bound is given, or when any
    /// given bound is malformed, in which case the time filter is skipped altogether.
    fn time_range(&self) -> Option<(Option<i64>, Option<i64>)> {
        let start = self.start_time.as_deref().filter(|s| !s.is_empty());
        let end = self.end_time.as_deref().filter(|s| !s.is_empty());
        if start.is_none() && end.is_none() {
            return None;
        }

        let parse = |bound: Option<&str>| bound.map(capture_time::parse_timestamp).transpose();
        match (parse(start), parse(end)) {
            (Ok(start), Ok(end)) => Some((start, end)),
            (Err(error), _) | (_, Err(error)) => {
                warn!("Invalid time range ({:?} - {:?}) : {}, skipping the time filter", start, end, error);
                None
            }
        }
    }

}

/// Case-insensitive substring match, except for the unknown location which must match exactly
fn matches_location(record: &PhotoRecord, location: &str, unknown_location: &str) -> bool {
    let record_location = record.location().to_lowercase();
    if record_location == unknown_location {
        location == unknown_location
    } else {
        record_location.contains(location)
    }
}
