use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use chrono::{Local, NaiveDateTime, TimeZone};
use exif::{In, Reader, Tag, Value};
use log::debug;


/// Format of the `time` field of a photo record, compatible with `<input type="datetime-local">`
pub const TIME_FORMAT: &'static str = "%Y-%m-%dT%H:%M";

/// Format of the date/time tags in EXIF metadata
pub const EXIF_TIME_FORMAT: &'static str = "%Y:%m:%d %H:%M:%S";

/// EXIF tags holding the capture time, in priority order
const CAPTURE_TIME_TAGS: [Tag; 2] = [Tag::DateTimeOriginal, Tag::DateTimeDigitized];


/// Try to read the capture time embedded in the EXIF metadata of the given image, formatted
/// with TIME_FORMAT. Returns None if the file can't be read, has no EXIF metadata, has no
/// capture time tag, or if the tag doesn't follow EXIF_TIME_FORMAT.
pub fn resolve_capture_time(path: &Path) -> Option<String> {
    debug!("Reading EXIF capture time from \"{}\"", path.display());

    let raw = match read_exif_capture_time(path) {
        Ok(Some(raw)) => raw,
        Ok(None) => {
            debug!("No \"DateTimeOriginal\" or \"DateTimeDigitized\" tag in \"{}\"", path.display());
            return None;
        }
        Err(error) => {
            debug!("Unable to read EXIF metadata from \"{}\" : {}", path.display(), error);
            return None;
        }
    };

    match NaiveDateTime::parse_from_str(&raw, EXIF_TIME_FORMAT) {
        Ok(datetime) => {
            let formatted = datetime.format(TIME_FORMAT).to_string();
            debug!("EXIF capture time of \"{}\" : {}", path.display(), formatted);
            Some(formatted)
        }
        Err(error) => {
            debug!("Unexpected EXIF time \"{}\" in \"{}\" : {}", raw, path.display(), error);
            None
        }
    }
}

/// Return the raw value of the first non-empty capture time tag found in the given file
fn read_exif_capture_time(path: &Path) -> Result<Option<String>, exif::Error> {
    let file = File::open(path)?;
    let exif = Reader::new().read_from_container(&mut BufReader::new(&file))?;

    for tag in CAPTURE_TIME_TAGS {
        if let Some(field) = exif.get_field(tag, In::PRIMARY) {
            if let Value::Ascii(ref values) = field.value {
                if let Some(value) = values.first().filter(|v| !v.is_empty()) {
                    return Ok(Some(String::from_utf8_lossy(value).trim().to_string()));
                }
            }
        }
    }
    Ok(None)
}

/// Parse a time formatted with TIME_FORMAT and return it as a Unix timestamp
pub fn parse_timestamp(time: &str) -> Result<i64, chrono::ParseError> {
    NaiveDateTime::parse_from_str(time, TIME_FORMAT).map(|datetime| to_timestamp(&datetime))
}

/// Convert a naive date/time, taken as local time, to a Unix timestamp. Ambiguous local times
/// resolve to the earliest instant, and local times skipped by a DST change are taken as UTC.
pub fn to_timestamp(datetime: &NaiveDateTime) -> i64 {
    Local.from_local_datetime(datetime)
        .earliest()
        .map(|local| local.timestamp())
        .unwrap_or_else(|| datetime.and_utc().timestamp())
}

/// Current local time, formatted with TIME_FORMAT
pub fn now_formatted() -> String {
    Local::now().format(TIME_FORMAT).to_string()
}


#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::{tempdir, TempDir};

    /// Build a minimal JPEG file containing only an EXIF segment with the given ASCII tags
    pub(crate) fn jpeg_with_exif(tags: &[(u16, &str)]) -> Vec<u8> {
        // Little-endian TIFF header, IFD0 at offset 8 with a single pointer to the Exif IFD
        let exif_ifd_offset: u32 = 8 + 2 + 12 + 4;
        let mut tiff: Vec<u8> = vec![b'I', b'I', 0x2a, 0x00, 8, 0, 0, 0];
        tiff.extend_from_slice(&1u16.to_le_bytes());
        tiff.extend_from_slice(&0x8769u16.to_le_bytes());
        tiff.extend_from_slice(&4u16.to_le_bytes());
        tiff.extend_from_slice(&1u32.to_le_bytes());
        tiff.extend_from_slice(&exif_ifd_offset.to_le_bytes());
        tiff.extend_from_slice(&0u32.to_le_bytes());

        // Exif IFD, with the strings stored right after it
        let mut data_offset = exif_ifd_offset + 2 + 12 * tags.len() as u32 + 4;
        let mut data: Vec<u8> = Vec::new();
        tiff.extend_from_slice(&(tags.len() as u16).to_le_bytes());
        for (tag, value) in tags {
            let mut bytes = value.as_bytes().to_vec();
            bytes.push(0);
            tiff.extend_from_slice(&tag.to_le_bytes());
            tiff.extend_from_slice(&2u16.to_le_bytes());
            tiff.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            tiff.extend_from_slice(&data_offset.to_le_bytes());
            data_offset += bytes.len() as u32;
            data.extend_from_slice(&bytes);
        }
        tiff.extend_from_slice(&0u32.to_le_bytes());
        tiff.extend_from_slice(&data);

        let mut jpeg: Vec<u8> = vec![0xff, 0xd8, 0xff, 0xe1];
        jpeg.extend_from_slice(&((2 + 6 + tiff.len()) as u16).to_be_bytes());
        jpeg.extend_from_slice(b"Exif\0\0");
        jpeg.extend_from_slice(&tiff);
        jpeg.extend_from_slice(&[0xff, 0xd9]);
        jpeg
    }

    /// Write the content to a file in a new temporary directory, removed when the returned guard is dropped
    fn write_temp(name: &str, content: &[u8]) -> (TempDir, PathBuf) {
        let dir = tempdir().unwrap();
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn reads_original_capture_time() {
        let (_dir, path) = write_temp("original.jpg", &jpeg_with_exif(&[
            (0x9003, "2021:06:15 08:30:45"),
            (0x9004, "2022:01:01 00:00:00"),
        ]));
        assert_eq!(resolve_capture_time(&path), Some("2021-06-15T08:30".to_string()));
    }

    #[test]
    fn falls_back_to_digitized_time() {
        let (_dir, path) = write_temp("digitized.jpg", &jpeg_with_exif(&[(0x9004, "2019:12:31 23:59:59")]));
        assert_eq!(resolve_capture_time(&path), Some("2019-12-31T23:59".to_string()));
    }

    #[test]
    fn malformed_original_time_is_not_replaced() {
        let (_dir, path) = write_temp("malformed.jpg", &jpeg_with_exif(&[
            (0x9003, "2021-06-15 08:30:45"),
            (0x9004, "2019:12:31 23:59:59"),
        ]));
        assert_eq!(resolve_capture_time(&path), None);
    }

    #[test]
    fn unreadable_files_have_no_capture_time() {
        let (_dir, path) = write_temp("not_an_image.png", b"definitely not a png");
        assert_eq!(resolve_capture_time(&path), None);
        assert_eq!(resolve_capture_time(Path::new("/nonexistent/photo.jpg")), None);
    }

    #[test]
    fn timestamps_follow_the_time_format() {
        let datetime = NaiveDateTime::parse_from_str("2023-10-26T14:05", TIME_FORMAT).unwrap();
        assert_eq!(parse_timestamp("2023-10-26T14:05").unwrap(), to_timestamp(&datetime));
        assert_eq!(parse_timestamp("2023-10-26T14:06").unwrap() - parse_timestamp("2023-10-26T14:05").unwrap(), 60);
        assert!(parse_timestamp("2023-10-26 14:05").is_err());
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn now_is_parseable() {
        assert!(parse_timestamp(&now_formatted()).is_ok());
    }
}
