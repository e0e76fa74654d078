use crate::Error;
use crate::capture_time;
use std::io;
use std::path::{Path, PathBuf};
use log::{info, warn};
use rocket::serde::{Serialize, Deserialize};
use rocket::tokio::{fs, sync::Mutex};
use serde_json::{Map, Value, ser::PrettyFormatter};


/// Time used to backfill the timestamp of a record that has no `time` field
const DEFAULT_TIME: &'static str = "2000-01-01T00:00";


/// A photo, as saved in the metadata file. The JSON object is kept as-is, in its stored key order,
/// and the known fields are read leniently : a field that is missing or of the wrong type reads
/// as empty instead of invalidating the record.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(transparent)]
pub struct PhotoRecord(Map<String, Value>);

impl PhotoRecord {

    pub fn new(filename: &str, time: &str, location: &str, path: &str, timestamp: i64) -> Self {
        let mut fields = Map::new();
        fields.insert("filename".to_string(), Value::from(filename));
        fields.insert("time".to_string(), Value::from(time));
        fields.insert("location".to_string(), Value::from(location));
        fields.insert("path".to_string(), Value::from(path));
        fields.insert("timestamp".to_string(), Value::from(timestamp));
        Self(fields)
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn filename(&self) -> &str {
        self.str_field("filename").unwrap_or_default()
    }

    pub fn time(&self) -> Option<&str> {
        self.str_field("time")
    }

    pub fn location(&self) -> &str {
        self.str_field("location").unwrap_or_default()
    }

    pub fn path(&self) -> &str {
        self.str_field("path").unwrap_or_default()
    }

    /// Capture time in seconds since the epoch, if the record has an integer `timestamp`
    pub fn timestamp(&self) -> Option<i64> {
        self.0.get("timestamp").and_then(Value::as_i64)
    }

    /// Every stored field, in stored order
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn fields_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.0
    }

    /// Compute the timestamp from the `time` field if the record has none, using 0 if it can't be parsed
    pub fn backfill_timestamp(&mut self) {
        if !self.0.contains_key("timestamp") {
            let time = match self.0.get("time") {
                None => Some(DEFAULT_TIME),
                Some(time) => time.as_str(),
            };
            let timestamp = time.and_then(|t| capture_time::parse_timestamp(t).ok()).unwrap_or(0);
            self.0.insert("timestamp".to_string(), Value::from(timestamp));
        }
    }
}


/// Flat JSON file holding the list of every uploaded photo. The whole file is read for each
/// request and rewritten for each upload. Writes go through a temporary file renamed over the
/// metadata file, under the store's lock.
pub struct MetadataStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl MetadataStore {

    pub fn new<P>(path: P) -> Self
        where P: AsRef<Path>
    {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the metadata file with an empty list if it doesn't exist yet
    pub async fn init(&self) -> Result<(), Error> {
        match fs::metadata(&self.path).await {
            Ok(_) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                info!("Creating empty metadata file \"{}\"", self.path.display());
                self.save(&[]).await
            }
            Err(error) => Err(Error::FileError(error, self.path.clone())),
        }
    }

    /// Load every record from the metadata file, backfilling missing timestamps. A file that
    /// can't be read or isn't a JSON array is reset to an empty list.
    pub async fn load(&self) -> Result<Vec<PhotoRecord>, Error> {
        if let Some(records) = self.read().await {
            return Ok(records);
        }

        // Check again under the lock, a writer may have replaced the file in the meantime
        let _guard = self.write_lock.lock().await;
        match self.read().await {
            Some(records) => Ok(records),
            None => {
                warn!("Resetting metadata file \"{}\" to an empty list", self.path.display());
                self.write(&[]).await?;
                Ok(Vec::new())
            }
        }
    }

    /// Rewrite the whole metadata file with the given records
    pub async fn save(&self, records: &[PhotoRecord]) -> Result<(), Error> {
        let _guard = self.write_lock.lock().await;
        self.write(records).await
    }

    /// Append a record at the end of the metadata file
    pub async fn append(&self, record: PhotoRecord) -> Result<(), Error> {
        let _guard = self.write_lock.lock().await;
        let mut records = match self.read().await {
            Some(records) => records,
            None => {
                warn!("Replacing invalid metadata file \"{}\"", self.path.display());
                Vec::new()
            }
        };
        records.push(record);
        self.write(&records).await
    }

    /// Read and parse the metadata file. Returns None if it is unreadable or invalid.
    async fn read(&self) -> Option<Vec<PhotoRecord>> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Some(Vec::new()),
            Err(error) => {
                warn!("Unable to read metadata file \"{}\" : {}", self.path.display(), error);
                return None;
            }
        };

        match serde_json::from_str::<Vec<Value>>(&content) {
            Ok(values) => Some(values.into_iter()
                .filter_map(|value| match value {
                    Value::Object(fields) => {
                        let mut record = PhotoRecord(fields);
                        record.backfill_timestamp();
                        Some(record)
                    }
                    other => {
                        warn!("Ignoring a metadata entry that is not an object : {}", other);
                        None
                    }
                })
                .collect()),
            Err(error) => {
                warn!("Invalid metadata file \"{}\" : {}", self.path.display(), error);
                None
            }
        }
    }

    /// Serialize the records with a 4-space indent into a temporary file, then move it over the
    /// metadata file. The caller must hold the write lock.
    async fn write(&self, records: &[PhotoRecord]) -> Result<(), Error> {
        let mut buffer: Vec<u8> = Vec::new();
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, PrettyFormatter::with_indent(b"    "));
        records.serialize(&mut serializer)?;

        let mut temp_path = self.path.clone().into_os_string();
        temp_path.push(".tmp");
        let temp_path = PathBuf::from(temp_path);
        fs::write(&temp_path, buffer).await
            .map_err(|e| Error::FileError(e, temp_path.clone()))?;
        fs::rename(&temp_path, &self.path).await
            .map_err(|e| Error::FileError(e, self.path.clone()))
    }

}
